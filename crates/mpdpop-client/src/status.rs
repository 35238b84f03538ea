use crate::connection::ConnectionManager;
use crate::error::Result;
use mpdpop_core::model::{StateChange, Status};
use mpdpop_core::protocol::{self, StatusSnapshot};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Mirrors the daemon's playback status into a change-notified [`Status`].
///
/// Writes come from two places only: `set()` during a sync pass (idle
/// connection) and the elapsed fast poll (command connection). Readers
/// always see a complete snapshot.
pub struct StatusTracker {
    status: RwLock<Status>,
    events: mpsc::UnboundedSender<StateChange>,
    idle: Arc<ConnectionManager>,
    command: Arc<ConnectionManager>,
    poll_interval: Duration,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusTracker {
    pub fn new(
        idle: Arc<ConnectionManager>,
        command: Arc<ConnectionManager>,
        events: mpsc::UnboundedSender<StateChange>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            status: RwLock::new(Status::default()),
            events,
            idle,
            command,
            poll_interval,
            poll_task: Mutex::new(None),
        }
    }

    /// Cloned snapshot of the current status.
    pub fn status(&self) -> Status {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Refresh from the daemon over the idle connection. On failure the
    /// prior snapshot is left untouched and the error is the caller's
    /// problem (reconnect or skip the pass).
    pub async fn set(&self) -> Result<()> {
        let pairs = self.idle.execute("status").await?;
        self.apply(protocol::status_snapshot(&pairs));
        Ok(())
    }

    /// Field-wise application: a field is written (and a notification
    /// emitted) only when the new value differs from the stored one.
    /// Fields the daemon did not report are left as they were.
    pub(crate) fn apply(&self, snapshot: StatusSnapshot) {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(new) = snapshot.state {
            if status.state != new {
                let old = status.state;
                status.state = new;
                let _ = self.events.send(StateChange::PlayStateChanged { old, new });
            }
        }
        if let Some(elapsed) = snapshot.elapsed {
            if status.elapsed != Some(elapsed) {
                status.elapsed = Some(elapsed);
                let _ = self.events.send(StateChange::ElapsedTick { elapsed });
            }
        }
        if let Some(random) = snapshot.random {
            if status.random != Some(random) {
                status.random = Some(random);
                let _ = self.events.send(StateChange::RandomChanged { value: random });
            }
        }
        if let Some(repeat) = snapshot.repeat {
            if status.repeat != Some(repeat) {
                status.repeat = Some(repeat);
                let _ = self.events.send(StateChange::RepeatChanged { value: repeat });
            }
        }
    }

    /// Optimistic local write, used by seek for immediate feedback.
    pub fn set_elapsed(&self, elapsed: f64) {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if status.elapsed != Some(elapsed) {
            status.elapsed = Some(elapsed);
            let _ = self.events.send(StateChange::ElapsedTick { elapsed });
        }
    }

    /// Start the fast elapsed poll: a fixed-interval `status` query on
    /// the command connection refreshing only `elapsed`. Runs while the
    /// popover is visible. Idempotent: a live timer is never doubled.
    pub fn start_elapsed_poll(self: &Arc<Self>) {
        let mut guard = self
            .poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let tracker = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(tracker.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                match tracker.command.execute("status").await {
                    Ok(pairs) => {
                        if let Some(elapsed) = protocol::status_snapshot(&pairs).elapsed {
                            tracker.set_elapsed(elapsed);
                        }
                    }
                    Err(e) => debug!(error = %e, "elapsed poll query failed"),
                }
            }
        }));
    }

    /// Cancel the fast poll. No-op when none is running.
    pub fn stop_elapsed_poll(&self) {
        let mut guard = self
            .poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = guard.take() {
            task.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for StatusTracker {
    fn drop(&mut self) {
        self.stop_elapsed_poll();
    }
}
