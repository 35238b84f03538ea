use crate::connection::{ConnectionManager, Mode};
use crate::error::Result;
use crate::song::SongTracker;
use crate::status::StatusTracker;
use mpdpop_core::config::{Config, DaemonConfig};
use mpdpop_core::model::{Song, StateChange, Status};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The daemon client: owns the long-lived idle connection, a command
/// connection, both trackers and the background update loop.
///
/// The loop is the only task that touches the idle connection. Control
/// commands go through the command manager, so they are never queued
/// behind an outstanding `idle` wait.
pub struct Player {
    idle: Arc<ConnectionManager>,
    command: Arc<ConnectionManager>,
    status: Arc<StatusTracker>,
    song: Arc<SongTracker>,
    settings: Arc<RwLock<DaemonConfig>>,
    retry: Duration,
    visible: AtomicBool,
    shutdown: watch::Sender<bool>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Build the client and start its update loop. `events` is where
    /// every state change lands; the UI adapter holds the receiving end.
    pub fn new(config: &Config, events: mpsc::UnboundedSender<StateChange>) -> Arc<Self> {
        let settings = Arc::new(RwLock::new(config.daemon.clone()));
        let idle = Arc::new(ConnectionManager::new(Arc::clone(&settings), Mode::Idle));
        let command = Arc::new(ConnectionManager::new(Arc::clone(&settings), Mode::Command));

        let status = Arc::new(StatusTracker::new(
            Arc::clone(&idle),
            Arc::clone(&command),
            events.clone(),
            Duration::from_millis(config.player.elapsed_poll_ms),
        ));
        let song = Arc::new(SongTracker::new(
            Arc::clone(&idle),
            Arc::clone(&command),
            events,
            config.player.artwork_max_bytes,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let player = Arc::new(Self {
            idle,
            command,
            status,
            song,
            settings,
            retry: Duration::from_secs(config.player.retry_secs),
            visible: AtomicBool::new(false),
            shutdown,
            loop_task: Mutex::new(None),
        });

        let task = tokio::spawn(Arc::clone(&player).run_loop(shutdown_rx));
        *player
            .loop_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);
        player
    }

    /// connect → sync → idle-wait → sync → … for the process lifetime.
    /// Connect failures back off at a fixed interval; nothing in here is
    /// allowed to end the loop except the shutdown signal.
    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            if !self.idle.is_connected().await {
                if let Err(e) = self.idle.connect().await {
                    warn!(error = %e, retry_secs = self.retry.as_secs(), "daemon unreachable, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry) => {}
                        _ = shutdown.changed() => break,
                    }
                    continue;
                }
                info!("idle connection established");
            }

            if let Err(e) = self.sync().await {
                if e.is_connection() {
                    warn!(error = %e, "connection lost during sync");
                    self.idle.disconnect().await;
                    continue;
                }
                warn!(error = %e, "sync pass aborted, keeping previous state");
            }

            tokio::select! {
                result = self.idle.idle_wait() => match result {
                    Ok(subsystems) => debug!(?subsystems, "daemon reported changes"),
                    Err(e) => {
                        warn!(error = %e, "idle wait failed");
                        self.idle.disconnect().await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        self.idle.disconnect().await;
        self.command.disconnect().await;
        debug!("update loop stopped");
    }

    /// One sync pass: status before song, so a play-state transition and
    /// a track transition observed in the same cycle land together.
    async fn sync(&self) -> Result<()> {
        self.status.set().await?;
        let track_changed = self.song.set().await?;
        if track_changed {
            if let Some(uri) = self.song.song().uri {
                if let Err(e) = self.song.update_artwork(&uri).await {
                    debug!(uri = %uri, error = %e, "artwork fetch failed");
                }
            }
        }
        Ok(())
    }

    /// Stop the update loop, cancelling an in-flight idle wait, and
    /// release both connections. Idempotent.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.status.stop_elapsed_poll();
        let task = self
            .loop_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// The popover told us it is (in)visible. Visibility only gates the
    /// elapsed fast poll; the idle loop runs regardless.
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
        if visible {
            self.status.start_elapsed_poll();
        } else {
            self.status.stop_elapsed_poll();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Status {
        self.status.status()
    }

    pub fn song(&self) -> Song {
        self.song.song()
    }

    /// Point the client at a different daemon. Takes effect on the next
    /// (re)connection of either manager.
    pub fn update_daemon(&self, daemon: DaemonConfig) {
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = daemon;
    }

    // --- control commands (command connection; independent of the idle
    // loop; the daemon's change notification drives the next sync) ---

    async fn run_command(&self, command: &str) -> Result<()> {
        self.command.execute(command).await?;
        Ok(())
    }

    pub async fn pause(&self, value: bool) -> Result<()> {
        self.run_command(&format!("pause {}", u8::from(value))).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.run_command("previous").await
    }

    pub async fn next(&self) -> Result<()> {
        self.run_command("next").await
    }

    /// Absolute seek within the current track. Sets the local elapsed
    /// optimistically so the UI does not wait for the next sync.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.run_command(&format!("seekcur {seconds}")).await?;
        self.status.set_elapsed(seconds);
        Ok(())
    }

    pub async fn set_random(&self, value: bool) -> Result<()> {
        self.run_command(&format!("random {}", u8::from(value))).await
    }

    pub async fn set_repeat(&self, value: bool) -> Result<()> {
        self.run_command(&format!("repeat {}", u8::from(value))).await
    }
}
