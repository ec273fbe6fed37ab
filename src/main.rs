//! # Work Replica Set Controller
//!
//! Watches `WorkReplicaSet` resources across all namespaces and keeps one
//! `DeliveryWork` per cluster selected by their placements.
//!
//! Configuration comes from environment variables (see
//! [`ControllerConfig::from_env`]); the flags below override them.

use anyhow::Result;
use clap::Parser;
use workset_controller::config::{ControllerConfig, LogFormat};
use workset_controller::runtime;

/// Work Replica Set Controller
#[derive(Parser, Debug)]
#[command(name = "workset-controller", version, about, long_about = None)]
struct Cli {
    /// Port for /metrics, /healthz and /readyz (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Replica sets reconciled in parallel (overrides MAX_CONCURRENT_RECONCILIATIONS)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log level: error, warn, info, debug, trace (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit human-readable logs instead of JSON
    #[arg(long)]
    text_logs: bool,
}

impl Cli {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_reconciliations = concurrency.max(1);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.text_logs {
            config.log_format = LogFormat::Text;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ControllerConfig::from_env();
    Cli::parse().apply(&mut config);

    runtime::initialization::init_tracing(&config)?;
    let init = runtime::initialization::initialize(config).await?;
    runtime::run(init).await
}
