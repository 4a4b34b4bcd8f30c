use anyhow::{Context, Result};
use meal_planner::cli::{parse_args, run};
use meal_planner::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli_args = parse_args();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");

    run(cli_args, config).await
}
