use thiserror::Error;

/// Failure taxonomy for talking to the daemon.
///
/// `Connection` is retriable (the update loop backs off and reconnects),
/// `Protocol` aborts the current sync pass but keeps prior state, and
/// `Command` is surfaced to whoever issued the control command. Nothing
/// here ever terminates the process.
#[derive(Debug, Error)]
pub enum MpdError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command rejected by daemon: {message}")]
    Command { message: String },
}

impl MpdError {
    pub fn not_connected() -> Self {
        MpdError::Connection(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "not connected to daemon",
        ))
    }

    /// True for errors that mean the underlying socket is gone and a
    /// reconnect is in order.
    pub fn is_connection(&self) -> bool {
        matches!(self, MpdError::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, MpdError>;
