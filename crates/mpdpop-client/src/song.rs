use crate::connection::ConnectionManager;
use crate::error::{MpdError, Result};
use mpdpop_core::model::{Song, StateChange};
use mpdpop_core::protocol::{self, SongSnapshot};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// Mirrors the current track into a change-notified [`Song`]. The URI is
/// the track identity: a URI change invalidates the cached artwork and
/// is the only thing that fires `TrackChanged`.
pub struct SongTracker {
    song: RwLock<Song>,
    events: mpsc::UnboundedSender<StateChange>,
    idle: Arc<ConnectionManager>,
    command: Arc<ConnectionManager>,
    artwork_max_bytes: usize,
}

impl SongTracker {
    pub fn new(
        idle: Arc<ConnectionManager>,
        command: Arc<ConnectionManager>,
        events: mpsc::UnboundedSender<StateChange>,
        artwork_max_bytes: usize,
    ) -> Self {
        Self {
            song: RwLock::new(Song::default()),
            events,
            idle,
            command,
            artwork_max_bytes,
        }
    }

    /// Cloned snapshot of the current track.
    pub fn song(&self) -> Song {
        self.song
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Refresh from the daemon over the idle connection. Returns whether
    /// the track (URI) changed. Failure leaves the prior snapshot alone.
    pub async fn set(&self) -> Result<bool> {
        let pairs = self.idle.execute("currentsong").await?;
        Ok(self.apply(protocol::song_snapshot(&pairs)))
    }

    /// Apply a snapshot. All metadata fields land before the single
    /// `TrackChanged` notification goes out, so a consumer observing the
    /// track change always sees the matching artist/title/duration.
    pub(crate) fn apply(&self, snapshot: SongSnapshot) -> bool {
        let mut song = self
            .song
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let track_changed = song.uri != snapshot.uri;

        if song.artist != snapshot.artist {
            song.artist = snapshot.artist;
        }
        if song.title != snapshot.title {
            song.title = snapshot.title;
        }
        if song.duration != snapshot.duration {
            song.duration = snapshot.duration;
        }
        if track_changed {
            song.uri = snapshot.uri;
            song.artwork = None;
            let _ = self.events.send(StateChange::TrackChanged {
                uri: song.uri.clone(),
                artist: song.artist.clone(),
                title: song.title.clone(),
                duration: song.duration,
            });
        }
        track_changed
    }

    /// Fetch artwork for `uri` over the command connection and store it,
    /// unless the current track moved on while we were fetching.
    pub async fn update_artwork(&self, uri: &str) -> Result<()> {
        let data = fetch_artwork(&self.command, uri, self.artwork_max_bytes).await?;
        let mut song = self
            .song
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if song.uri.as_deref() == Some(uri) {
            song.artwork = if data.is_empty() { None } else { Some(data) };
        }
        Ok(())
    }
}

/// Assemble a track's artwork by issuing `readpicture` with an advancing
/// byte offset until the daemon returns an empty chunk. A track without
/// artwork yields an empty buffer, not an error. `max_bytes` bounds the
/// transfer against a daemon that never stops returning data.
pub async fn fetch_artwork(
    manager: &ConnectionManager,
    uri: &str,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = Vec::new();
    let mut offset: u64 = 0;
    loop {
        let command = format!("readpicture {} {offset}", protocol::escape_arg(uri));
        let chunk = match manager.execute_binary(&command).await {
            Ok(Some(chunk)) => chunk,
            // ACK on the first read: the track simply has no artwork.
            Ok(None) => break,
            Err(e) if offset == 0 => return Err(e),
            Err(e) => {
                // Mid-fetch failure: keep what we have, like a short read.
                warn!(uri, offset, error = %e, "artwork fetch aborted");
                break;
            }
        };
        if chunk.data.is_empty() {
            break;
        }
        if data.len() + chunk.data.len() > max_bytes {
            return Err(MpdError::Protocol(format!(
                "artwork for {uri:?} exceeds {max_bytes} bytes"
            )));
        }
        offset += chunk.data.len() as u64;
        data.extend_from_slice(&chunk.data);
        if chunk.total.is_some_and(|total| offset >= total) {
            break;
        }
    }
    Ok(data)
}
