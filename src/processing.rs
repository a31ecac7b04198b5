use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::QueryError;
use crate::scanner::targets::Target;
use crate::scanner::ServerQueryResult;

/// The outcome of one query in the shape it is printed.
///
/// A failure that still produced a result (protocol drift) reports both.
#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub target: String,
    pub queried_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ServerQueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryReport {
    pub fn new(
        target: &Target,
        queried_at: DateTime<Utc>,
        outcome: Result<ServerQueryResult, QueryError>,
    ) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(e) => {
                let error = e.to_string();
                (e.into_partial_result(), Some(error))
            }
        };

        Self {
            target: target.to_string(),
            queried_at,
            result,
            error,
        }
    }

    pub fn strip_diagnostics(&mut self) {
        if let Some(result) = &mut self.result {
            result.strip_diagnostics();
        }
    }
}
