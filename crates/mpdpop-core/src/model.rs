use serde::{Deserialize, Serialize};

/// Daemon playback state as reported by the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayState::Stopped => write!(f, "stopped"),
            PlayState::Paused => write!(f, "paused"),
            PlayState::Playing => write!(f, "playing"),
        }
    }
}

/// Mirror of the daemon's playback status. Fields the daemon did not
/// report (or has not reported yet) stay `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Status {
    pub state: PlayState,
    pub elapsed: Option<f64>,
    pub random: Option<bool>,
    pub repeat: Option<bool>,
}

/// Mirror of the current track. `uri` is the identity key: when it
/// changes, the cached artwork is no longer valid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Song {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub uri: Option<String>,
    pub duration: Option<f64>,
    pub artwork: Option<Vec<u8>>,
}

impl Song {
    pub fn describe(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("Unknown artist"),
            self.title.as_deref().unwrap_or("Unknown title"),
        )
    }
}

/// Change notifications published to the UI adapter (JSON-lines friendly).
/// Emitted only when the stored value actually changed, in the order the
/// fields were applied within one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateChange {
    #[serde(rename = "track_changed")]
    TrackChanged {
        uri: Option<String>,
        artist: Option<String>,
        title: Option<String>,
        duration: Option<f64>,
    },
    #[serde(rename = "play_state_changed")]
    PlayStateChanged { old: PlayState, new: PlayState },
    #[serde(rename = "random_changed")]
    RandomChanged { value: bool },
    #[serde(rename = "repeat_changed")]
    RepeatChanged { value: bool },
    #[serde(rename = "elapsed_tick")]
    ElapsedTick { elapsed: f64 },
}
