//! repaint-bot — entry point.
//!
//! ```text
//! repaint-bot                          Run with ./repaint.toml
//! repaint-bot --config <path>          Load a custom config TOML
//! repaint-bot --token A --token B      Add worker tokens
//! repaint-bot --image logo.png         Override the target image
//! repaint-bot --gen-config             Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use repaint_core::{CanvasApi, Dispatcher, HttpCanvasApi, TargetImage, Worker};
use repaint_bot::config::BotConfig;
use repaint_bot::signal::cancel_on_interrupt;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "repaint-bot", about = "Keep a shared pixel canvas in sync with a target image")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "repaint.toml")]
    config: PathBuf,

    /// API token for an extra worker (repeatable).
    #[arg(short, long = "token")]
    tokens: Vec<String>,

    /// Target image, overriding the config file.
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BotConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config. Tracing is not up yet, so a bad file goes to stderr.
    let mut config = match BotConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    config.apply_overrides(&cli.tokens, cli.image.as_deref());

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("repaint-bot v{}", env!("CARGO_PKG_VERSION"));
    if !cli.config.exists() {
        info!("no config at {}; using defaults", cli.config.display());
    }
    info!("api: {}", config.api.base_url);
    info!("target: {}", config.target.image.display());
    info!("workers: {}", config.workers.tokens.len());

    // Everything up to here is configuration; any failure is fatal.
    let target = match TargetImage::open(
        &config.target.image,
        config.target.offset_x,
        config.target.offset_y,
    ) {
        Ok(t) => t,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let api: Arc<dyn CanvasApi> = Arc::new(HttpCanvasApi::new(config.to_api_config())?);
    let workers = Worker::from_tokens(config.workers.tokens.iter().cloned(), api);

    let mut dispatcher =
        match Dispatcher::start(workers, target, config.to_dispatcher_config()).await {
            Ok(d) => d,
            Err(e) => {
                error!("startup failed: {e}");
                std::process::exit(1);
            }
        };

    // Ctrl-C handler.
    let stop = dispatcher.shutdown_handle();
    tokio::spawn(cancel_on_interrupt(tokio::signal::ctrl_c(), stop));

    dispatcher.run().await;

    Ok(())
}
