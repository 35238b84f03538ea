//! Client for a line-oriented music daemon: keeps a live mirror of its
//! playback state and current track, and issues control commands.
//!
//! The update loop holds one long-lived connection blocked in the
//! daemon's `idle` command; every reported change triggers a sync pass
//! that refreshes [`Status`](mpdpop_core::model::Status) and
//! [`Song`](mpdpop_core::model::Song) and publishes
//! [`StateChange`](mpdpop_core::model::StateChange) notifications.
//! Control commands use short-lived connections of their own, so they
//! never wait behind the idle block.

pub mod connection;
pub mod error;
pub mod player;
pub mod song;
pub mod status;
pub mod transport;

pub use connection::{ConnectionManager, Mode};
pub use error::{MpdError, Result};
pub use player::Player;
