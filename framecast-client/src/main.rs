//! framecast client: entry point.
//!
//! ```text
//! framecast                       Stream with framecast.toml (or defaults)
//! framecast --config <path>       Load a custom config TOML
//! framecast --gen-config          Write default config to stdout
//! framecast --endpoint tcp://host:7340 --fps 15 --encoding base64-json
//! ```

use std::path::PathBuf;

use clap::Parser;
use framecast_core::PayloadEncoding;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framecast_client::config::{ClientConfig, LoggingConfig, Overrides};
use framecast_client::service::{StreamClient, exit_code};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast", about = "Stream captured frames to an ingestion endpoint")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framecast.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Ingestion endpoint, `tcp://host:port`.
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Namespace selected during the handshake.
    #[arg(long)]
    channel: Option<String>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Compression quality, 1..=100.
    #[arg(short, long)]
    quality: Option<u8>,

    /// Payload framing: binary or base64-json.
    #[arg(long)]
    encoding: Option<PayloadEncoding>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config. Tracing starts before any outcome is reported.
    let loaded = ClientConfig::load(&cli.config);
    let level = match &loaded {
        Ok(Some(config)) => config.logging.level.clone(),
        _ => LoggingConfig::default().level,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match loaded {
        Ok(Some(config)) => config,
        Ok(None) => {
            info!("no config at {}; using defaults", cli.config.display());
            ClientConfig::default()
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(exit_code(&Err(e)));
        }
    };
    config.apply(Overrides {
        endpoint: cli.endpoint,
        channel: cli.channel,
        fps: cli.fps,
        quality: cli.quality,
        encoding: cli.encoding,
    });

    info!("framecast v{}", env!("CARGO_PKG_VERSION"));
    info!("endpoint: {}{}", config.stream.endpoint, config.stream.channel);
    info!("target FPS: {}", config.stream.fps);
    info!("encoding: {}", config.stream.encoding);

    let client = StreamClient::new(config);
    let stop = client.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    let result = client.run().await;
    if let Err(e) = &result {
        error!("Failed to connect or stream: {e}");
    }
    // Skip runtime teardown: a stalled capture read may still hold a
    // blocking-pool thread.
    std::process::exit(exit_code(&result));
}
