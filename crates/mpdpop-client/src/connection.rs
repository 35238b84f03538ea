use crate::error::{MpdError, Result};
use crate::transport::{BinaryChunk, Transport};
use mpdpop_core::config::DaemonConfig;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// How a manager treats its underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Long-lived connection for the blocking `idle` wait. Stays open
    /// across `execute` calls; keepalive enabled.
    Idle,
    /// Connect, run one command, disconnect. No state between calls.
    Command,
}

/// Owns at most one [`Transport`] and serializes every exchange on it.
/// The daemon cannot multiplex requests on a single TCP connection, so
/// the inner mutex is the whole concurrency story: one in-flight command
/// per manager, ever.
pub struct ConnectionManager {
    settings: Arc<RwLock<DaemonConfig>>,
    mode: Mode,
    transport: tokio::sync::Mutex<Option<Transport>>,
}

impl ConnectionManager {
    /// Host and port are re-read from `settings` at every connect, so a
    /// settings change takes effect on the next (re)connection.
    pub fn new(settings: Arc<RwLock<DaemonConfig>>, mode: Mode) -> Self {
        Self {
            settings,
            mode,
            transport: tokio::sync::Mutex::new(None),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Open the connection. Idempotent for idle mode; command mode always
    /// opens fresh.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.transport.lock().await;
        self.connect_locked(&mut slot).await
    }

    async fn connect_locked(&self, slot: &mut Option<Transport>) -> Result<()> {
        if slot.is_some() {
            if self.mode == Mode::Idle {
                return Ok(());
            }
            if let Some(old) = slot.take() {
                old.close().await;
            }
        }
        let (host, port) = {
            let settings = self
                .settings
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (settings.host.clone(), settings.port)
        };
        let keepalive = self.mode == Mode::Idle;
        let transport = Transport::connect(&host, port, keepalive).await?;
        debug!(host = %host, port, mode = ?self.mode, "connected to daemon");
        *slot = Some(transport);
        Ok(())
    }

    /// Always safe to call when not connected (no-op). Releases the
    /// socket.
    pub async fn disconnect(&self) {
        let mut slot = self.transport.lock().await;
        if let Some(transport) = slot.take() {
            transport.close().await;
            debug!(mode = ?self.mode, "disconnected from daemon");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Run one command exchange. Command mode wraps it in its own
    /// connect/disconnect; idle mode reuses the held connection and
    /// drops it on connection-type failures so the next call reconnects.
    pub async fn execute(&self, command: &str) -> Result<Vec<(String, String)>> {
        let mut slot = self.transport.lock().await;
        self.connect_locked(&mut slot).await?;
        let transport = slot.as_mut().ok_or_else(MpdError::not_connected)?;
        trace!(command, mode = ?self.mode, "execute");
        let result = transport.run(command).await;
        self.settle_locked(&mut slot, result.as_ref().err()).await;
        result
    }

    /// Binary-capable variant of [`execute`](Self::execute), used for
    /// `readpicture` chunks.
    pub async fn execute_binary(&self, command: &str) -> Result<Option<BinaryChunk>> {
        let mut slot = self.transport.lock().await;
        self.connect_locked(&mut slot).await?;
        let transport = slot.as_mut().ok_or_else(MpdError::not_connected)?;
        trace!(command, mode = ?self.mode, "execute (binary)");
        let result = transport.run_binary(command).await;
        self.settle_locked(&mut slot, result.as_ref().err()).await;
        result
    }

    /// Block until the daemon reports a change in the player or options
    /// subsystems, returning the changed subsystem names. Only valid on
    /// an already connected idle-mode manager.
    pub async fn idle_wait(&self) -> Result<Vec<String>> {
        let mut slot = self.transport.lock().await;
        let transport = slot.as_mut().ok_or_else(MpdError::not_connected)?;
        let result = transport.run("idle player options").await;
        self.settle_locked(&mut slot, result.as_ref().err()).await;
        let pairs = result?;
        Ok(pairs
            .into_iter()
            .filter(|(key, _)| key == "changed")
            .map(|(_, value)| value)
            .collect())
    }

    /// Post-exchange cleanup: command mode never keeps the connection,
    /// idle mode drops it only when the socket itself failed.
    async fn settle_locked(&self, slot: &mut Option<Transport>, error: Option<&MpdError>) {
        let drop_it = match self.mode {
            Mode::Command => true,
            Mode::Idle => error.is_some_and(MpdError::is_connection),
        };
        if drop_it {
            if let Some(transport) = slot.take() {
                transport.close().await;
            }
        }
    }
}
