//! briefbot - Telegram summary bot
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments, wiring the pieces together, and handling top-level
//! errors.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use briefbot::bot::Bot;
use briefbot::payments::PaymentApi;
use briefbot::pipeline::{LiveUpstream, Pipeline};
use briefbot::prefs::StyleBook;
use briefbot::telegram::Telegram;
use briefbot::{Config, Store};

#[derive(Parser)]
#[command(name = "briefbot")]
#[command(author, version, about = "Telegram bot for text, video, and article summarisation", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to briefbot.toml in the usual places)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials usually live in a local .env during development.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    config.validate().context("configuration is incomplete")?;

    let store = Store::open(&config.storage.path).context("failed to open storage")?;
    log::info!("storage ready at {}", config.storage.path.display());

    let telegram =
        Telegram::new(config.telegram_token()?).context("failed to build the Telegram client")?;
    let payments = PaymentApi::from_config(&config.payment);

    let styles = Arc::new(StyleBook::new());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::clone(&styles),
        config.quota.free_per_day,
        LiveUpstream::new(config.clone()),
    );
    let bot = Bot::new(telegram, store, styles, pipeline, payments, config);

    bot.run().await.context("bot stopped")
}
