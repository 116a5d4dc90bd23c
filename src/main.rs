use anyhow::Result;
use clap::Parser;
use moneywatch::config::AppConfig;
use moneywatch::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = AppConfig::from_env();
    let result = moneywatch::run(config).await;

    if let Err(e) = &result {
        tracing::error!(error = %e, "Server failed");
    }
    result
}
