//! Channel to the tool server.
//!
//! Messages are newline-delimited JSON. The channel is split into a
//! [`FrameWriter`] and a [`FrameReader`] so that one task can keep reading
//! responses while callers write requests. [`StdioProcess`] spawns the server
//! and exposes its stdin/stdout as such a pair.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::TransportError;

/// How long a terminated server gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Writing half of a message channel.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one message.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Close the writing half. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reading half of a message channel.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next non-empty message.
    ///
    /// Fails with `ConnectionLost` once the peer has closed the channel.
    async fn receive(&mut self) -> Result<String, TransportError>;
}

/// Newline-delimited writer over any async byte sink.
pub struct LineWriter<W> {
    inner: W,
    closed: bool,
}

impl<W> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

#[async_trait]
impl<W> FrameWriter for LineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::connection_lost("channel closed"));
        }

        debug!(frame = message, "-> server");

        let write = async {
            self.inner.write_all(message.as_bytes()).await?;
            self.inner.write_all(b"\n").await?;
            // Flush so the server sees the message immediately
            self.inner.flush().await
        };

        write
            .await
            .map_err(|e| TransportError::connection_lost(format!("write failed: {}", e)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::connection_lost(format!("shutdown failed: {}", e)))
    }
}

/// Newline-delimited reader over any buffered async byte source.
///
/// Lines that are not valid UTF-8 are skipped, like any other stray output.
pub struct LineReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> FrameReader for LineReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn receive(&mut self) -> Result<String, TransportError> {
        loop {
            self.line.clear();
            let bytes_read = self
                .inner
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| TransportError::connection_lost(format!("read failed: {}", e)))?;

            if bytes_read == 0 {
                return Err(TransportError::connection_lost(
                    "server closed the channel (process may have exited)",
                ));
            }

            let text = match std::str::from_utf8(&self.line) {
                Ok(text) => text,
                Err(e) => {
                    debug!(bytes = bytes_read, error = %e, "Skipping non-UTF-8 output");
                    continue;
                }
            };

            let message = text.trim();
            if message.is_empty() {
                continue;
            }

            debug!(frame = message, "<- server");
            return Ok(message.to_string());
        }
    }
}

/// Writer half of a spawned server.
pub type StdioWriter = LineWriter<ChildStdin>;

/// Reader half of a spawned server.
pub type StdioReader = LineReader<BufReader<ChildStdout>>;

/// A spawned tool server process.
///
/// The child is killed if this handle is dropped without [`terminate`](Self::terminate).
pub struct StdioProcess {
    child: Child,
}

impl StdioProcess {
    /// Spawn the server with piped stdin/stdout. `env` is layered over the
    /// inherited environment.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&Path>,
    ) -> Result<(Self, StdioWriter, StdioReader), TransportError> {
        debug!(command = command, args = ?args, "Spawning MCP server process");

        let mut server = Command::new(command);
        server
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // server logs pass through
            .kill_on_drop(true);

        if let Some(cwd) = working_dir {
            server.current_dir(cwd);
        }

        let mut child = server.spawn().map_err(|e| {
            TransportError::connection_lost(format!("failed to spawn '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::connection_lost("failed to capture server stdin"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connection_lost("failed to capture server stdout"))?;

        debug!(pid = ?child.id(), "MCP server process spawned");

        Ok((
            Self { child },
            LineWriter::new(stdin),
            LineReader::new(BufReader::new(stdout)),
        ))
    }

    /// `None` once the child has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the server: SIGTERM first, then kill after a grace period.
    pub async fn terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            // Already reaped
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid = pid, error = %e, "SIGTERM failed");
            }

            tokio::select! {
                status = self.child.wait() => {
                    debug!(pid = pid, status = ?status.ok(), "MCP server exited");
                    return;
                }
                _ = tokio::time::sleep(TERMINATE_GRACE) => {
                    warn!(pid = pid, "MCP server did not exit gracefully, killing");
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!(pid = pid, error = %e, "Failed to kill MCP server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_framing_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (_client_read, client_write) = tokio::io::split(client);
        let (server_read, _server_write) = tokio::io::split(server);

        let mut writer = LineWriter::new(client_write);
        let mut reader = LineReader::new(BufReader::new(server_read));

        writer.send(r#"{"a":1}"#).await.unwrap();
        writer.send(r#"{"b":2}"#).await.unwrap();

        assert_eq!(reader.receive().await.unwrap(), r#"{"a":1}"#);
        assert_eq!(reader.receive().await.unwrap(), r#"{"b":2}"#);

        writer.close().await.unwrap();
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::ConnectionLost(_))
        ));
        assert!(matches!(
            writer.send("late").await,
            Err(TransportError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let input: &[u8] = b"\n   \n{\"ok\":true}\n";
        let mut reader = LineReader::new(input);
        assert_eq!(reader.receive().await.unwrap(), r#"{"ok":true}"#);
        assert!(reader.receive().await.is_err());
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_skipped() {
        let input: &[u8] = b"\xff\xfe server log\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n";
        let mut reader = LineReader::new(input);
        assert_eq!(
            reader.receive().await.unwrap(),
            r#"{"jsonrpc":"2.0","id":1,"result":{}}"#
        );
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_stdio_process_echo() {
        // 'cat' echoes every line back, which is enough to exercise the pipes
        let spawned = StdioProcess::spawn("cat", &[], &HashMap::new(), None);

        if let Ok((mut process, mut writer, mut reader)) = spawned {
            assert!(process.pid().is_some());

            writer.send(r#"{"test": "hello"}"#).await.unwrap();
            assert_eq!(reader.receive().await.unwrap(), r#"{"test": "hello"}"#);

            writer.close().await.unwrap();
            process.terminate().await;
            assert!(reader.receive().await.is_err());
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_connection_lost() {
        let result = StdioProcess::spawn(
            "definitely-not-a-real-petstore-binary",
            &[],
            &HashMap::new(),
            None,
        );
        assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
    }
}
