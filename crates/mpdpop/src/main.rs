use anyhow::{Context, Result};
use clap::Parser;
use mpdpop_client::Player;
use mpdpop_core::config::Config;
use mpdpop_core::model::StateChange;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Watch a music daemon and emit its state changes as JSON lines.
///
/// A popover UI (or anything else) reads stdout: one JSON object per
/// state change. Logs go to stderr.
#[derive(Parser)]
#[command(name = "mpdpop", version)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/mpdpop/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start with the popover treated as visible, enabling the
    /// elapsed-time fast poll from the beginning.
    #[arg(long)]
    visible: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mpdpop=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path).context("loading config")?,
        None => Config::load().context("loading config")?,
    };
    info!(host = %config.daemon.host, port = config.daemon.port, "mpdpop starting");

    let (events_tx, mut events) = mpsc::unbounded_channel::<StateChange>();
    let player = Player::new(&config, events_tx);
    player.set_visible(cli.visible);

    loop {
        tokio::select! {
            Some(change) = events.recv() => {
                if let StateChange::TrackChanged { .. } = &change {
                    info!(track = %player.song().describe(), "track changed");
                }
                println!("{}", serde_json::to_string(&change)?);
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupt received");
                break;
            }
        }
    }

    info!("mpdpop shutting down");
    player.stop().await;
    Ok(())
}
