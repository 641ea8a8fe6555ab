use clap::Parser;
use clap_dashboard::cli::{self, Cli};
use telemetry::LogConfig;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = telemetry::init_structured_logging(
        LogConfig::new("clap-dashboard").with_version(env!("CARGO_PKG_VERSION")),
    );

    if let Err(err) = cli::run(cli).await {
        error!(error = %err, "command failed");
        return Err(err);
    }
    Ok(())
}
