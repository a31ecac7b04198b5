//! Heuristic recovery of length-prefixed strings from captured bytes.
//!
//! Used as a diagnostic when the structured decoder cannot make sense of a
//! reply. Anything it reports may be a coincidence.

use std::collections::BTreeMap;

use serde::Serialize;

use super::parser::Width;

/// A candidate string found in the raw reply. `start` is the offset of the
/// length prefix, `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Spectre {
    pub length: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Candidates keyed by prefix width in bytes.
pub type Spectrum = BTreeMap<usize, Vec<Spectre>>;

/// Prefix widths tried, widest first. Bytes claimed by a wider match are not
/// reused by a narrower one.
pub const SCAN_WIDTHS: [Width; 3] = [Width::Four, Width::Two, Width::One];

/// Lowest byte value accepted inside a candidate string.
const MIN_PRINTABLE: u8 = 32;

pub fn scan(data: &[u8]) -> Spectrum {
    let mut spectrum = Spectrum::new();
    let mut claimed = vec![false; data.len()];

    for width in SCAN_WIDTHS {
        let w = width.bytes();
        let found = spectrum.entry(w).or_default();

        if data.len() < w {
            continue;
        }

        for start in 0..=data.len() - w {
            let Ok(length) = usize::try_from(width.decode(&data[start..])) else {
                continue;
            };
            if length == 0 {
                continue;
            }
            let Some(end) = (start + w).checked_add(length) else {
                continue;
            };
            if end > data.len() {
                continue;
            }

            let body = &data[start + w..end];
            if body.iter().any(|&b| b < MIN_PRINTABLE) || claimed[start..end].contains(&true) {
                continue;
            }

            found.push(Spectre {
                length,
                text: String::from_utf8_lossy(body).into_owned(),
                start,
                end,
            });
            claimed[start..end].fill(true);
        }
    }

    spectrum
}
