use std::fmt;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use factorio_query::processing::QueryReport;
use factorio_query::{query_server, QueryConfig, Target};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(required = true, help = "Servers to query, as host[:port]")]
    targets: Vec<String>,

    #[arg(long, short, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    #[arg(long, default_value_t = false, help = "Include raw reply bytes and recovered strings")]
    raw: bool,

    #[arg(long, default_value_t = 100, help = "Probe reply timeout in milliseconds")]
    handshake_timeout_ms: u64,

    #[arg(long, default_value_t = 50, help = "Per-field read timeout in milliseconds")]
    field_timeout_ms: u64,

    #[arg(long, default_value_t = 100, help = "Idle time that ends a reply, in milliseconds")]
    quiescence_ms: u64,

    #[arg(long, default_value_t = 2000, help = "Limit for one whole query in milliseconds")]
    deadline_ms: u64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Pretty => write!(f, "pretty"),
            OutputFormat::Compact => write!(f, "compact"),
        }
    }
}

impl Args {
    fn query_config(&self) -> QueryConfig {
        QueryConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            field_timeout: Duration::from_millis(self.field_timeout_ms),
            drain_quiescence: Duration::from_millis(self.quiescence_ms),
            query_deadline: Duration::from_millis(self.deadline_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.query_config();
    debug!(?config, "query limits");

    let targets = args
        .targets
        .iter()
        .map(|raw| raw.parse::<Target>().with_context(|| format!("bad target {raw:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!("Querying {} server(s)...", targets.len());

    // Each query owns its socket and buffers, so they can all run at once.
    let handles = targets
        .into_iter()
        .map(|target| {
            let config = config.clone();
            tokio::spawn(async move {
                let queried_at = Utc::now();
                let outcome = query_server(&target, &config).await;
                QueryReport::new(&target, queried_at, outcome)
            })
        })
        .collect::<Vec<_>>();

    let mut failures = 0;
    for handle in handles {
        let mut report = handle.await.context("query task panicked")?;
        if !args.raw {
            report.strip_diagnostics();
        }
        if report.error.is_some() {
            failures += 1;
        }

        let json = match args.format {
            OutputFormat::Pretty => serde_json::to_string_pretty(&report)?,
            OutputFormat::Compact => serde_json::to_string(&report)?,
        };
        println!("{json}");
    }

    info!("Done! {} failed", failures);

    Ok(())
}
