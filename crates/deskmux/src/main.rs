//! `deskmuxd` entrypoint: parses CLI args, loads configuration, wires a
//! `deskmux_core::server::Server` to a concrete desktop engine, and runs the
//! Unix-socket accept loop the core deliberately leaves to its caller.

mod placeholder_desktop;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use deskmux_core::config::DeskmuxConfig;
use deskmux_core::desktop::DesktopEngine;
use deskmux_core::error::ConfigError;
use deskmux_core::server::Server;

use placeholder_desktop::PlaceholderDesktop;

/// Headless terminal-desktop multiplexing server.
#[derive(Parser, Debug)]
#[command(name = "deskmuxd", version, about = "Headless terminal-desktop multiplexing server")]
struct Args {
    /// Path to a TOML config file. Defaults to `$XDG_CONFIG_HOME/deskmux/config.toml`
    /// if present, otherwise built-in defaults.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Override the Unix-domain socket path to listen on.
    #[arg(long = "listen")]
    listen: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<DeskmuxConfig> {
    let mut config = if let Some(path) = &args.config {
        DeskmuxConfig::load_from_path(path)?
    } else {
        match dirs::config_dir() {
            Some(dir) => {
                let default_path = dir.join("deskmux").join("config.toml");
                match DeskmuxConfig::load_from_path(&default_path) {
                    Ok(cfg) => cfg,
                    Err(ConfigError::FileNotFound(_)) => DeskmuxConfig::default(),
                    Err(err) => return Err(err.into()),
                }
            }
            None => DeskmuxConfig::default(),
        }
    };

    if let Some(listen) = &args.listen {
        config.listen_path = listen.clone();
    }
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    deskmux_core::logging::init_logging(&config.logging)?;

    info!(
        listen_path = %config.listen_path.display(),
        snapshot_path = %config.snapshot_path.display(),
        "deskmuxd starting"
    );

    let engine: Arc<dyn DesktopEngine> = Arc::new(PlaceholderDesktop::new());
    let server = Arc::new(Server::new(&config, engine, tokio::runtime::Handle::current()));

    let shutdown_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, saving snapshot before exit");
            if let Err(err) = shutdown_server.save_snapshot() {
                error!(error = %err, "failed to save snapshot on shutdown");
            }
            std::process::exit(0);
        }
    });

    let listen_path = config.listen_path.clone();
    tokio::task::spawn_blocking(move || transport::serve(server, &listen_path)).await??;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}
