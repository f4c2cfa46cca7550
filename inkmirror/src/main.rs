//! inkmirror entry point.
//!
//! ```text
//! inkmirror                          Mirror using inkmirror.toml or defaults
//! inkmirror --config <path>          Load a custom config TOML
//! inkmirror --gen-config             Write default config to stdout
//! inkmirror --host <addr>            Override the tablet address
//! inkmirror --pid <n>                Skip process discovery
//! inkmirror --base-address <hex>     Skip framebuffer discovery
//! inkmirror --dump <path>            Save the last frame on exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkmirror::config::MirrorConfig;
use inkmirror::service::MirrorService;
use inkmirror_core::window::parse_hex_address;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "inkmirror", about = "Mirror an e-paper tablet's screen and stylus over SSH")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "inkmirror.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Tablet address, overrides `remote.host`.
    #[arg(long)]
    host: Option<String>,

    /// Id of the display process.
    #[arg(long)]
    pid: Option<u32>,

    /// Address of the first framebuffer pixel, in hex.
    #[arg(long, value_parser = parse_address)]
    base_address: Option<u64>,

    /// Write the last received frame (raw pixels) to this file.
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn parse_address(text: &str) -> Result<u64, String> {
    parse_hex_address(text).map_err(|e| e.to_string())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&MirrorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = MirrorConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.remote.host = host;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("inkmirror v{}", env!("CARGO_PKG_VERSION"));
    info!("tablet: {}@{}:{}", config.remote.user, config.remote.host, config.remote.port);
    info!(
        "capture: {} ({:?}), pointer: {} ({})",
        config.capture.enabled,
        config.capture.compression,
        config.pointer.enabled,
        config.pointer.device
    );

    let shell = Arc::new(config.to_shell());
    let service = MirrorService::new(config, shell)
        .with_pid(cli.pid)
        .with_base_address(cli.base_address)
        .with_dump_path(cli.dump);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let summary = service.run().await?;
    info!("fps at exit: {:.3}", summary.stats.fps);

    Ok(())
}
