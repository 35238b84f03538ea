use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mpdpop_client::song::fetch_artwork;
use mpdpop_client::{ConnectionManager, Mode};
use mpdpop_core::config::Config;
use mpdpop_core::model::PlayState;
use mpdpop_core::protocol;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

#[derive(Parser)]
#[command(name = "mpdpopctl", about = "Control the music daemon mpdpop watches", version)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/mpdpop/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Daemon host (overrides the config)
    #[arg(long)]
    host: Option<String>,

    /// Daemon port (overrides the config)
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show playback status
    Status,
    /// Show the current track
    Song,
    /// Pause playback
    Pause,
    /// Resume playback
    Play,
    /// Toggle between playing and paused
    Toggle,
    /// Jump to the previous track
    Previous,
    /// Jump to the next track
    Next,
    /// Seek to an absolute position in the current track
    Seek {
        /// Position in seconds
        seconds: f64,
    },
    /// Switch random mode on or off
    Random { value: Switch },
    /// Switch repeat mode on or off
    Repeat { value: Switch },
    /// Save the current track's embedded artwork to a file
    Artwork {
        /// Destination path
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(value: Switch) -> bool {
        matches!(value, Switch::On)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path).context("loading config")?,
        None => Config::load().context("loading config")?,
    };
    let mut daemon = config.daemon.clone();
    if let Some(host) = cli.host {
        daemon.host = host;
    }
    if let Some(port) = cli.port {
        daemon.port = port;
    }

    let manager = ConnectionManager::new(Arc::new(RwLock::new(daemon)), Mode::Command);

    match cli.command {
        Command::Status => {
            let pairs = manager.execute("status").await?;
            let status = protocol::status_snapshot(&pairs);
            println!(
                "state:  {}",
                status.state.unwrap_or_default()
            );
            if let Some(elapsed) = status.elapsed {
                println!("elapsed: {elapsed:.1}s");
            }
            println!("random: {}", on_off(status.random));
            println!("repeat: {}", on_off(status.repeat));
        }
        Command::Song => {
            let pairs = manager.execute("currentsong").await?;
            let song = protocol::song_snapshot(&pairs);
            let Some(uri) = &song.uri else {
                println!("nothing queued");
                return Ok(());
            };
            println!(
                "{} - {}",
                song.artist.as_deref().unwrap_or("Unknown artist"),
                song.title.as_deref().unwrap_or("Unknown title"),
            );
            println!("  file:     {uri}");
            if let Some(duration) = song.duration {
                println!("  duration: {duration:.1}s");
            }
        }
        Command::Pause => {
            manager.execute("pause 1").await?;
        }
        Command::Play => {
            manager.execute("pause 0").await?;
        }
        Command::Toggle => {
            let pairs = manager.execute("status").await?;
            let playing = protocol::status_snapshot(&pairs).state == Some(PlayState::Playing);
            manager
                .execute(if playing { "pause 1" } else { "pause 0" })
                .await?;
        }
        Command::Previous => {
            manager.execute("previous").await?;
        }
        Command::Next => {
            manager.execute("next").await?;
        }
        Command::Seek { seconds } => {
            manager.execute(&format!("seekcur {seconds}")).await?;
        }
        Command::Random { value } => {
            manager
                .execute(&format!("random {}", u8::from(bool::from(value))))
                .await?;
        }
        Command::Repeat { value } => {
            manager
                .execute(&format!("repeat {}", u8::from(bool::from(value))))
                .await?;
        }
        Command::Artwork { output } => {
            let pairs = manager.execute("currentsong").await?;
            let song = protocol::song_snapshot(&pairs);
            let Some(uri) = &song.uri else {
                bail!("nothing queued");
            };
            let data = fetch_artwork(&manager, uri, config.player.artwork_max_bytes).await?;
            if data.is_empty() {
                bail!("{uri} has no embedded artwork");
            }
            std::fs::write(&output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {} bytes to {}", data.len(), output.display());
        }
    }

    Ok(())
}

fn on_off(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    }
}
