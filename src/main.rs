//! Order-management client: runs every call shape once against a server.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ordermgmt_client::{ClientConfig, Orchestrator, Scenario, TracingReporter};

#[derive(Parser, Debug)]
#[command(name = "ordermgmt-client")]
#[command(about = "Exercise the order-management service with all four call shapes")]
struct Args {
    /// Server endpoint (host:port or unix:/path)
    #[arg(short, long, env = "ORDERMGMT_ENDPOINT", default_value = ordermgmt_client::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-call deadline in milliseconds
    #[arg(long, env = "ORDERMGMT_DEADLINE_MS", default_value_t = 5000)]
    deadline_ms: u64,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Pause between the two batches of processed orders, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let args = Args::parse();

    let config = match ClientConfig::builder().endpoint(&args.endpoint) {
        Ok(builder) => builder
            .call_deadline(Duration::from_millis(args.deadline_ms))
            .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
            .build(),
        Err(e) => {
            tracing::error!("Invalid endpoint {}: {}", args.endpoint, e);
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = match Orchestrator::connect(&config, Arc::new(TracingReporter)).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!("did not connect: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let scenario = Scenario {
        process_pause: Duration::from_millis(args.pause_ms),
        ..Scenario::default()
    };
    let orchestrator = orchestrator.with_scenario(scenario);

    let report = orchestrator.run().await;
    for failure in report.failures() {
        tracing::warn!(
            "{} did not complete: {}",
            failure.name,
            failure
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
    }
    orchestrator.close().await;

    ExitCode::SUCCESS
}
