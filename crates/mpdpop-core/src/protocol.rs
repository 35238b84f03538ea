//! Line-level helpers for the daemon's text protocol.
//!
//! Every response is a sequence of `key: value` lines terminated by `OK`
//! or `ACK [code@index] {command} message`. This module only classifies
//! and decodes lines; all I/O lives in mpdpop-client.

use crate::model::PlayState;

/// Bound on a single response line. Anything longer is a protocol error,
/// not something to buffer indefinitely.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Classification of one response line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Terminator: the command succeeded.
    Ok,
    /// Terminator: the daemon rejected the command.
    Ack(Ack),
    /// A `key: value` payload line.
    Pair(String, String),
    /// A line that is neither a terminator nor a well-formed pair.
    Garbage(String),
}

/// Decoded `ACK [code@index] {command} message` line. Daemons in the
/// wild are not perfectly consistent, so every part except the message
/// is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub code: Option<u32>,
    pub command: Option<String>,
    pub message: String,
}

pub fn classify(line: &str) -> Reply {
    if line == "OK" {
        return Reply::Ok;
    }
    if let Some(rest) = line.strip_prefix("ACK") {
        return Reply::Ack(parse_ack(rest.trim_start()));
    }
    match parse_pair(line) {
        Some((key, value)) => Reply::Pair(key.to_string(), value.to_string()),
        None => Reply::Garbage(line.to_string()),
    }
}

fn parse_ack(rest: &str) -> Ack {
    let mut code = None;
    let mut command = None;
    let mut message = rest;

    if let Some(stripped) = rest.strip_prefix('[') {
        if let Some(close) = stripped.find(']') {
            let inside = &stripped[..close];
            code = inside
                .split('@')
                .next()
                .and_then(|c| c.parse::<u32>().ok());
            message = stripped[close + 1..].trim_start();
        }
    }
    if let Some(stripped) = message.strip_prefix('{') {
        if let Some(close) = stripped.find('}') {
            command = Some(stripped[..close].to_string());
            message = stripped[close + 1..].trim_start();
        }
    }

    Ack {
        code,
        command,
        message: message.to_string(),
    }
}

/// Split a `key: value` line on the first colon-space.
pub fn parse_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(": ")?;
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Quote a command argument, escaping backslashes and double quotes.
/// Needed for URIs containing spaces (`readpicture "some dir/a.flac" 0`).
pub fn escape_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub fn parse_play_state(value: &str) -> Option<PlayState> {
    match value {
        "play" => Some(PlayState::Playing),
        "pause" => Some(PlayState::Paused),
        "stop" => Some(PlayState::Stopped),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Fields of interest from a `status` response. Unknown keys are
/// ignored; malformed values leave the field unset rather than failing
/// the whole response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusSnapshot {
    pub state: Option<PlayState>,
    pub elapsed: Option<f64>,
    pub random: Option<bool>,
    pub repeat: Option<bool>,
}

pub fn status_snapshot(pairs: &[(String, String)]) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::default();
    for (key, value) in pairs {
        match key.as_str() {
            "state" => snapshot.state = parse_play_state(value),
            "elapsed" => snapshot.elapsed = value.parse().ok(),
            "random" => snapshot.random = parse_bool(value),
            "repeat" => snapshot.repeat = parse_bool(value),
            _ => {}
        }
    }
    snapshot
}

/// Fields of interest from a `currentsong` response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SongSnapshot {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub uri: Option<String>,
    pub duration: Option<f64>,
}

pub fn song_snapshot(pairs: &[(String, String)]) -> SongSnapshot {
    let mut snapshot = SongSnapshot::default();
    for (key, value) in pairs {
        match key.as_str() {
            "Artist" => snapshot.artist = Some(value.clone()),
            "Title" => snapshot.title = Some(value.clone()),
            "file" => snapshot.uri = Some(value.clone()),
            "duration" => snapshot.duration = value.parse().ok(),
            // Older daemons only send the integer "Time" field.
            "Time" => {
                if snapshot.duration.is_none() {
                    snapshot.duration = value.parse().ok();
                }
            }
            _ => {}
        }
    }
    snapshot
}
