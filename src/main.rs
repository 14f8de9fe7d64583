use anyhow::Result;
use log::info;

use dex_price_scanner::cli::{build_cli, CliApp, CliOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    let options = CliOptions::from_matches(&matches);

    info!("starting dex-price-scanner {}", env!("CARGO_PKG_VERSION"));
    let app = CliApp::new(options)?;
    app.run().await
}
