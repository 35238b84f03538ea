use crate::error::{MpdError, Result};
use mpdpop_core::protocol::{self, Reply, MAX_LINE_LEN};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

/// Upper bound on a single `binary:` chunk the daemon may announce.
/// Daemons default to 8 KiB chunks; anything past this is not a chunk,
/// it is a lie.
const MAX_CHUNK_LEN: u64 = 16 * 1024 * 1024;

/// One binary-capable response (`readpicture`).
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryChunk {
    /// Total object size announced via `size:`, when present.
    pub total: Option<u64>,
    /// The raw chunk bytes. Empty when the read is past the end.
    pub data: Vec<u8>,
}

/// A single TCP connection to the daemon, speaking newline-terminated
/// commands and `key: value` responses.
pub struct Transport {
    stream: BufReader<TcpStream>,
}

impl Transport {
    /// Connect and consume the `OK MPD <version>` greeting. Idle-mode
    /// connections enable SO_KEEPALIVE so a silently dead peer is
    /// eventually noticed even while blocked in `idle`.
    pub async fn connect(host: &str, port: u16, keepalive: bool) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        if keepalive {
            let sock = socket2::SockRef::from(&stream);
            sock.set_keepalive(true)?;
        }

        let mut transport = Self {
            stream: BufReader::new(stream),
        };
        let greeting = transport.read_line().await?;
        if !greeting.starts_with("OK MPD") {
            return Err(MpdError::Protocol(format!(
                "unexpected greeting: {greeting:?}"
            )));
        }
        trace!(greeting = %greeting, "connected");
        Ok(transport)
    }

    pub async fn send_line(&mut self, command: &str) -> Result<()> {
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one newline-terminated line, bounded by `MAX_LINE_LEN`.
    /// Clean EOF is a connection loss; EOF mid-line or an oversized line
    /// is a protocol error.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        loop {
            let (consumed, done) = {
                let available = self.stream.fill_buf().await?;
                if available.is_empty() {
                    if line.is_empty() {
                        return Err(MpdError::Connection(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "daemon closed the connection",
                        )));
                    }
                    return Err(MpdError::Protocol(
                        "connection closed mid-line".into(),
                    ));
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&available[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        line.extend_from_slice(available);
                        (available.len(), false)
                    }
                }
            };
            self.stream.consume(consumed);
            if line.len() > MAX_LINE_LEN {
                return Err(MpdError::Protocol(format!(
                    "response line exceeds {MAX_LINE_LEN} bytes"
                )));
            }
            if done {
                break;
            }
        }
        String::from_utf8(line)
            .map_err(|_| MpdError::Protocol("response line is not UTF-8".into()))
    }

    /// Run one command exchange: send the line, then collect `key: value`
    /// pairs until the `OK` terminator. An `ACK` terminator becomes a
    /// `Command` error carrying the daemon's message.
    pub async fn run(&mut self, command: &str) -> Result<Vec<(String, String)>> {
        self.send_line(command).await?;
        let mut pairs = Vec::new();
        loop {
            let line = self.read_line().await?;
            match protocol::classify(&line) {
                Reply::Ok => return Ok(pairs),
                Reply::Ack(ack) => {
                    return Err(MpdError::Command {
                        message: ack.message,
                    })
                }
                Reply::Pair(key, value) => pairs.push((key, value)),
                Reply::Garbage(line) => {
                    return Err(MpdError::Protocol(format!(
                        "unparseable response line: {line:?}"
                    )))
                }
            }
        }
    }

    /// Run a binary-capable exchange (`readpicture`). A `binary: N` pair
    /// is followed by N raw bytes and a trailing newline before the `OK`.
    /// An `ACK` means "nothing there" and yields `None` rather than an
    /// error, mirroring a zero-length read.
    pub async fn run_binary(&mut self, command: &str) -> Result<Option<BinaryChunk>> {
        self.send_line(command).await?;
        let mut chunk = BinaryChunk {
            total: None,
            data: Vec::new(),
        };
        loop {
            let line = self.read_line().await?;
            match protocol::classify(&line) {
                Reply::Ok => return Ok(Some(chunk)),
                Reply::Ack(_) => return Ok(None),
                Reply::Pair(key, value) => match key.as_str() {
                    "size" => chunk.total = value.parse().ok(),
                    "binary" => {
                        let len: u64 = value.parse().map_err(|_| {
                            MpdError::Protocol(format!("bad binary length: {value:?}"))
                        })?;
                        if len > MAX_CHUNK_LEN {
                            return Err(MpdError::Protocol(format!(
                                "binary chunk of {len} bytes exceeds {MAX_CHUNK_LEN}"
                            )));
                        }
                        let mut data = vec![0u8; len as usize];
                        self.stream.read_exact(&mut data).await?;
                        // The chunk is followed by its own newline.
                        let mut nl = [0u8; 1];
                        self.stream.read_exact(&mut nl).await?;
                        if nl[0] != b'\n' {
                            return Err(MpdError::Protocol(
                                "binary chunk not newline-terminated".into(),
                            ));
                        }
                        chunk.data = data;
                    }
                    // type: and friends are not interesting here.
                    _ => {}
                },
                Reply::Garbage(line) => {
                    return Err(MpdError::Protocol(format!(
                        "unparseable response line: {line:?}"
                    )))
                }
            }
        }
    }

    /// Shut the socket down. Errors are irrelevant at this point.
    pub async fn close(mut self) {
        let _ = self.stream.get_mut().shutdown().await;
    }
}
