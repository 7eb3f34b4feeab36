//! Accepts TCP connections and spawns one session per connection. Each
//! session drives the core's public contract (`GET`/`SET`/`DEL`/`KEYS`)
//! against a minimal newline-delimited textual protocol.
//!
//! A full wire parser with quoting and binary-safe arguments is its own
//! concern; this reader is the concrete stand-in needed to exercise the
//! core end to end: one command per line, space-separated, with `SET`/`DEL`
//! values and keys given verbatim (no quoting, so no embedded spaces or
//! newlines — a real parser would lift that restriction without changing
//! anything below it).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::state_machine::StateMachine;

pub struct ClientGateway {
    state_machine: Arc<StateMachine>,
    cancel: CancellationToken,
}

impl ClientGateway {
    pub fn new(state_machine: Arc<StateMachine>, cancel: CancellationToken) -> Self {
        Self { state_machine, cancel }
    }

    /// Binds `addr` and accepts connections until the shared cancellation
    /// token fires (via `EventLoopHandle::stop`). The accept loop re-arms
    /// itself after every accepted socket.
    pub async fn serve(&self, addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(local_addr = ?listener.local_addr()?, "client gateway listening");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("client gateway stopping");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    let state_machine = self.state_machine.clone();
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = run_session(socket, state_machine, cancel).await {
                            tracing::debug!(peer = %peer, error = %err, "session ended with error");
                        }
                    });
                }
            }
        }
    }
}

async fn run_session(
    socket: TcpStream,
    state_machine: Arc<StateMachine>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let response = match dispatch(&state_machine, &line, &cancel).await {
            Some(Ok(response)) => response,
            Some(Err(err)) => format!("ERR {err}"),
            // Stop fired while a write's completion was still in flight;
            // the completion will never arrive (the event loop has already
            // torn down), so drop the session instead of waiting forever.
            None => return Ok(()),
        };

        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
}

/// Dispatches one command line. Returns `None` if `cancel` fired while
/// waiting on a write's completion, signalling the caller to drop the
/// session without writing a response.
async fn dispatch(
    state_machine: &StateMachine,
    line: &str,
    cancel: &CancellationToken,
) -> Option<crate::error::Result<String>> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or("").to_ascii_uppercase();

    match command.as_str() {
        "GET" => {
            let Some(key) = words.next() else {
                return Some(Ok("ERR wrong number of arguments for 'GET'".to_string()));
            };
            Some(state_machine.read(key.as_bytes()).await.map(|value| match value {
                Some(value) => String::from_utf8_lossy(&value).into_owned(),
                None => "nil".to_string(),
            }))
        }
        "SET" => {
            let (Some(key), Some(value)) = (words.next(), words.next()) else {
                return Some(Ok("ERR wrong number of arguments for 'SET'".to_string()));
            };
            let completion = state_machine.set(
                bytes::Bytes::copy_from_slice(key.as_bytes()),
                bytes::Bytes::copy_from_slice(value.as_bytes()),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = completion => result,
            };
            Some(
                result
                    .expect("event loop dropped the completion channel")
                    .map(|()| "OK".to_string()),
            )
        }
        "DEL" => {
            let keys: Vec<bytes::Bytes> = words.map(|k| bytes::Bytes::copy_from_slice(k.as_bytes())).collect();
            let completion = state_machine.del(keys);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = completion => result,
            };
            Some(
                result
                    .expect("event loop dropped the completion channel")
                    .map(|()| "OK".to_string()),
            )
        }
        "KEYS" => {
            let pattern = words.next().unwrap_or("");
            Some(state_machine.keys(pattern.as_bytes()).await.map(|keys| {
                keys.iter()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            }))
        }
        "" => Some(Ok(String::new())),
        other => Some(Ok(format!("ERR unknown command '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn start_gateway(harness: &TestHarness) -> std::net::SocketAddr {
        let cancel = harness.loop_handle.cancellation_token();
        let gateway = ClientGateway::new(harness.state_machine.clone(), cancel);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let bind_addr = addr;
        tokio::spawn(async move {
            let _ = gateway.serve(bind_addr).await;
        });
        // Give the listener a moment to bind before tests connect.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        addr
    }

    async fn roundtrip(addr: std::net::SocketAddr, command: &str) -> String {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(command.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        lines.next_line().await.unwrap().unwrap_or_default()
    }

    #[tokio::test]
    async fn set_then_get_over_tcp_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;
        let addr = start_gateway(&harness).await;

        assert_eq!(roundtrip(addr, "SET foo bar").await, "OK");
        assert_eq!(roundtrip(addr, "GET foo").await, "bar");
        assert_eq!(roundtrip(addr, "GET missing").await, "nil");

        harness.loop_handle.stop();
    }

    #[tokio::test]
    async fn del_and_keys_over_tcp_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;
        let addr = start_gateway(&harness).await;

        roundtrip(addr, "SET hello 1").await;
        roundtrip(addr, "SET help 1").await;
        roundtrip(addr, "SET world 1").await;

        assert_eq!(roundtrip(addr, "DEL world").await, "OK");

        let mut keys: Vec<&str> = roundtrip(addr, "KEYS h*").await.split(' ').collect();
        keys.sort();
        assert_eq!(keys, vec!["hello", "help"]);

        harness.loop_handle.stop();
    }

    #[tokio::test]
    async fn unknown_command_reports_error_test() {
        let dir = tempfile::tempdir().unwrap();
        let harness = TestHarness::create(dir.path()).await;
        let addr = start_gateway(&harness).await;

        assert_eq!(roundtrip(addr, "NOPE").await, "ERR unknown command 'NOPE'");

        harness.loop_handle.stop();
    }
}
