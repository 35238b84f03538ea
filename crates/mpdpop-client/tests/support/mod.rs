//! In-process fake music daemon for integration tests.
//!
//! Speaks just enough of the wire protocol: greeting, `status`,
//! `currentsong`, blocking `idle`, control commands, and chunked
//! `readpicture`. Tests mutate its state and trigger idle notifications
//! to drive the client's update loop.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct FakeState {
    play_state: String,
    elapsed: f64,
    random: bool,
    repeat: bool,
    song: Vec<(String, String)>,
    artwork: Option<Vec<u8>>,
    artwork_chunk: usize,
    /// Pathological mode: keep returning full chunks forever.
    endless_artwork: bool,
    commands: Vec<String>,
    idle_waiters: Vec<oneshot::Sender<String>>,
}

pub struct FakeDaemon {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    handle: JoinHandle<()>,
}

impl FakeDaemon {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    /// Bind a specific port (used by the reconnect test, which picks a
    /// port first and starts the daemon later).
    pub async fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(FakeState {
            play_state: "stop".into(),
            artwork_chunk: 1024,
            ..FakeState::default()
        }));

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&accept_state);
                tokio::spawn(handle_connection(stream, state));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_status(&self, play_state: &str, elapsed: f64, random: bool, repeat: bool) {
        let mut state = self.state.lock().unwrap();
        state.play_state = play_state.into();
        state.elapsed = elapsed;
        state.random = random;
        state.repeat = repeat;
    }

    pub fn set_song(&self, pairs: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.song = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    pub fn set_artwork(&self, data: Vec<u8>, chunk: usize) {
        let mut state = self.state.lock().unwrap();
        state.artwork = Some(data);
        state.artwork_chunk = chunk;
    }

    pub fn set_endless_artwork(&self, chunk: usize) {
        let mut state = self.state.lock().unwrap();
        state.endless_artwork = true;
        state.artwork_chunk = chunk;
    }

    /// Release every pending `idle` wait with a changed-subsystem reply.
    pub fn notify(&self, subsystem: &str) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            std::mem::take(&mut state.idle_waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(subsystem.to_string());
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn command_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Poll until the daemon has seen a command with this prefix.
    pub async fn wait_for_command(&self, prefix: &str, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.command_count(prefix) == 0 {
            if tokio::time::Instant::now() >= deadline {
                panic!("daemon never received {prefix:?}; saw {:?}", self.commands());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<Mutex<FakeState>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    if writer.write_all(b"OK MPD 0.23.5\n").await.is_err() {
        return;
    }

    while let Ok(Some(line)) = lines.next_line().await {
        state.lock().unwrap().commands.push(line.clone());

        let reply: Vec<u8> = if line == "status" {
            let s = state.lock().unwrap();
            format!(
                "volume: 100\nrepeat: {}\nrandom: {}\nstate: {}\nelapsed: {:.3}\nOK\n",
                u8::from(s.repeat),
                u8::from(s.random),
                s.play_state,
                s.elapsed,
            )
            .into_bytes()
        } else if line == "currentsong" {
            let s = state.lock().unwrap();
            let mut out = String::new();
            for (key, value) in &s.song {
                out.push_str(&format!("{key}: {value}\n"));
            }
            out.push_str("OK\n");
            out.into_bytes()
        } else if line.starts_with("idle") {
            let (tx, rx) = oneshot::channel::<String>();
            state.lock().unwrap().idle_waiters.push(tx);
            match rx.await {
                Ok(subsystem) => format!("changed: {subsystem}\nOK\n").into_bytes(),
                // Daemon shutting down mid-idle: just drop the connection.
                Err(_) => break,
            }
        } else if line.starts_with("readpicture") {
            let offset: usize = line
                .rsplit(' ')
                .next()
                .and_then(|o| o.parse().ok())
                .unwrap_or(0);
            readpicture_reply(&state, offset)
        } else if line.starts_with("pause")
            || line == "previous"
            || line == "next"
            || line.starts_with("seekcur")
            || line.starts_with("random")
            || line.starts_with("repeat")
        {
            b"OK\n".to_vec()
        } else {
            format!("ACK [5@0] {{}} unknown command \"{line}\"\n").into_bytes()
        };

        if writer.write_all(&reply).await.is_err() {
            break;
        }
    }
}

fn readpicture_reply(state: &Arc<Mutex<FakeState>>, offset: usize) -> Vec<u8> {
    let s = state.lock().unwrap();
    if s.endless_artwork {
        let mut out = format!("size: 1000000000\nbinary: {}\n", s.artwork_chunk).into_bytes();
        out.extend(std::iter::repeat(0xAB).take(s.artwork_chunk));
        out.extend_from_slice(b"\nOK\n");
        return out;
    }
    let Some(artwork) = &s.artwork else {
        return b"ACK [50@0] {readpicture} No file exists\n".to_vec();
    };
    let remaining = artwork.len().saturating_sub(offset);
    let n = remaining.min(s.artwork_chunk);
    let mut out = format!("size: {}\nbinary: {}\n", artwork.len(), n).into_bytes();
    out.extend_from_slice(&artwork[offset..offset + n]);
    out.extend_from_slice(b"\nOK\n");
    out
}
