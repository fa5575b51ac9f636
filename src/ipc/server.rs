//! Unix domain socket server for IPC
//!
//! Provides request-response access to the engine and pushes engine events
//! to subscribed clients. Requests are forwarded to the engine task over
//! its command channel; the server never touches engine state directly.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{AppTarget, EngineCommand, EngineError};
use crate::events::EngineEvent;

use super::protocol::{DaemonStatus, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Handles shared by every client connection
#[derive(Clone)]
pub struct RequestContext {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    started_at: Instant,
}

impl RequestContext {
    pub fn new(
        commands: mpsc::Sender<EngineCommand>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            commands,
            events,
            started_at: Instant::now(),
        }
    }

    /// Send a command to the engine and wait for its reply
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, Response> {
        let (reply, rx) = oneshot::channel();
        let unavailable = || Response::error("engine_unavailable", "sequence engine is not running");

        self.commands
            .send(build(reply))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: RequestContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(socket_path: &Path, context: RequestContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only: the socket can reconfigure global hotkeys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one client until it disconnects
///
/// Responses and pushed events share one writer task so frames never
/// interleave on the wire.
pub async fn handle_client<S>(stream: S, context: RequestContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::channel::<Response>(32);

    let writer_task = tokio::spawn(async move {
        while let Some(response) = out_rx.recv().await {
            if let Err(e) = send_message(&mut writer, &response).await {
                debug!(?e, "failed to write response");
                break;
            }
        }
    });

    let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

    let result = async {
        while let Some(request) = read_message::<_, Request>(&mut reader).await? {
            debug!(?request, "received request");

            let (response, subscribe) = process_request(request, &context).await;
            if subscribe && forwarder.is_none() {
                debug!("client subscribed to notifications");
                forwarder = Some(forward_events(context.events.subscribe(), out_tx.clone()));
            }

            if out_tx.send(response).await.is_err() {
                break;
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    drop(out_tx);
    let _ = writer_task.await;

    result
}

/// Push engine events to a subscribed client
fn forward_events(
    mut events: broadcast::Receiver<EngineEvent>,
    out_tx: mpsc::Sender<Response>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if out_tx.send(Response::Event { event }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Read a length-prefixed JSON message; `None` on clean disconnect
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("client disconnected");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message of {} bytes exceeds limit", len);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    let message = serde_json::from_slice(&msg_buf).context("failed to parse message")?;
    Ok(Some(message))
}

/// Send a length-prefixed JSON message
pub async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

fn engine_error(e: EngineError) -> Response {
    Response::error(e.code(), e.to_string())
}

/// Process a request and return a response
/// Returns (Response, should_subscribe)
async fn process_request(request: Request, context: &RequestContext) -> (Response, bool) {
    let response = match request {
        Request::Ping => Ok(Response::Pong),

        Request::Subscribe => return (Response::Subscribed, true),

        Request::GetStatus => context
            .call(|reply| EngineCommand::Status { reply })
            .await
            .map(|status| {
                let uptime = context.started_at.elapsed().as_secs();
                Response::Status(DaemonStatus::new(status, uptime))
            }),

        Request::ListEntries => context
            .call(|reply| EngineCommand::ListEntries { reply })
            .await
            .map(|entries| Response::Entries { entries }),

        Request::GetEntry { index } => context
            .call(|reply| EngineCommand::GetEntry { index, reply })
            .await
            .map(|entry| Response::Entry { entry }),

        Request::SortEntries => context
            .call(|reply| EngineCommand::SortByName { reply })
            .await
            .map(|()| Response::Ok),

        Request::AddEntry {
            path,
            sequence,
            flags,
        } => context
            .call(|reply| EngineCommand::AddEntry {
                target: AppTarget::new(path),
                sequence,
                flags,
                reply,
            })
            .await
            .map(|result| match result {
                Ok(id) => Response::EntryAdded { id },
                Err(e) => engine_error(e),
            }),

        Request::RemoveEntry { index } => context
            .call(|reply| EngineCommand::RemoveEntry { index, reply })
            .await
            .map(|result| match result {
                Ok(_) => Response::Ok,
                Err(e) => engine_error(e),
            }),

        Request::ReplaceSequence { id, sequence } => context
            .call(|reply| EngineCommand::ReplaceSequence {
                id,
                sequence,
                reply,
            })
            .await
            .map(|result| result.map_or_else(engine_error, |()| Response::Ok)),

        Request::ReplaceFlags { id, flags } => context
            .call(|reply| EngineCommand::ReplaceFlags { id, flags, reply })
            .await
            .map(|result| result.map_or_else(engine_error, |()| Response::Ok)),

        Request::CheckConflict { sequence, .. } if sequence.is_empty() => Ok(Response::error(
            "invalid_request",
            "conflict check needs a non-empty sequence",
        )),

        Request::CheckConflict {
            sequence,
            excluding,
        } => context
            .call(|reply| EngineCommand::CheckConflict {
                sequence,
                excluding,
                reply,
            })
            .await
            .map(|existing| Response::Conflict { existing }),

        Request::Suspend => context
            .call(|reply| EngineCommand::Suspend { reply })
            .await
            .map(|()| Response::Ok),

        Request::Resume => context
            .call(|reply| EngineCommand::Resume { reply })
            .await
            .map(|()| Response::Ok),

        Request::SetEnabled { enabled } => context
            .call(|reply| EngineCommand::SetEnabled { enabled, reply })
            .await
            .map(|()| Response::Ok),
    };

    (response.unwrap_or_else(|e| e), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, EntryId, SequenceEngine};
    use crate::hotkey::{codes, HotkeyEvent, MemoryRegistry, Modifiers, ShortcutCombo};
    use std::path::PathBuf;

    fn cmd(key: u16) -> ShortcutCombo {
        ShortcutCombo::new(key, Modifiers::COMMAND)
    }

    /// Engine task plus a connected in-memory client
    fn start() -> (tokio::io::DuplexStream, mpsc::Sender<HotkeyEvent>) {
        let (event_tx, _) = broadcast::channel(16);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (hotkey_tx, hotkey_rx) = mpsc::channel(8);
        let (activation_tx, _) = mpsc::unbounded_channel();

        let mut engine = SequenceEngine::new(
            EngineConfig::default(),
            MemoryRegistry::new(),
            activation_tx,
            event_tx.clone(),
        );
        tokio::spawn(async move { engine.run(hotkey_rx, command_rx).await });

        let (client, server) = tokio::io::duplex(64 * 1024);
        let context = RequestContext::new(command_tx, event_tx);
        tokio::spawn(handle_client(server, context));

        (client, hotkey_tx)
    }

    async fn roundtrip(client: &mut tokio::io::DuplexStream, request: &Request) -> Response {
        send_message(client, request).await.unwrap();
        read_message(client).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (mut client, _hotkeys) = start();
        assert!(matches!(roundtrip(&mut client, &Request::Ping).await, Response::Pong));
    }

    #[tokio::test]
    async fn test_entry_lifecycle() {
        let (mut client, _hotkeys) = start();

        let add = Request::AddEntry {
            path: PathBuf::from("/Applications/Calculator.app"),
            sequence: vec![cmd(codes::KEY_A), cmd(codes::KEY_D)],
            flags: Default::default(),
        };
        let id = match roundtrip(&mut client, &add).await {
            Response::EntryAdded { id } => id,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(id, EntryId(1));

        let prefix = Request::AddEntry {
            path: PathBuf::from("/Applications/Xcode.app"),
            sequence: vec![cmd(codes::KEY_A)],
            flags: Default::default(),
        };
        match roundtrip(&mut client, &prefix).await {
            Response::Error { code, .. } => assert_eq!(code, "conflict"),
            other => panic!("unexpected response: {:?}", other),
        }

        let check = Request::CheckConflict {
            sequence: vec![cmd(codes::KEY_D)],
            excluding: None,
        };
        assert!(matches!(
            roundtrip(&mut client, &check).await,
            Response::Conflict { existing: None }
        ));

        match roundtrip(&mut client, &Request::GetStatus).await {
            Response::Status(status) => {
                assert_eq!(status.entry_count, 1);
                assert_eq!(status.bound_count, 1);
                assert_eq!(status.position, 0);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let remove = Request::RemoveEntry { index: 0 };
        assert!(matches!(roundtrip(&mut client, &remove).await, Response::Ok));
        match roundtrip(&mut client, &Request::ListEntries).await {
            Response::Entries { entries } => assert!(entries.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_and_sort_entries() {
        let (mut client, _hotkeys) = start();

        for (app, key) in [("Xcode", codes::KEY_A), ("Calculator", codes::KEY_D)] {
            let add = Request::AddEntry {
                path: PathBuf::from(format!("/Applications/{}.app", app)),
                sequence: vec![cmd(key)],
                flags: Default::default(),
            };
            assert!(matches!(
                roundtrip(&mut client, &add).await,
                Response::EntryAdded { .. }
            ));
        }

        assert!(matches!(
            roundtrip(&mut client, &Request::SortEntries).await,
            Response::Ok
        ));

        match roundtrip(&mut client, &Request::GetEntry { index: 0 }).await {
            Response::Entry { entry: Some(entry) } => {
                assert_eq!(entry.target.name(), "Calculator");
                assert_eq!(entry.id, EntryId(2));
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(matches!(
            roundtrip(&mut client, &Request::GetEntry { index: 2 }).await,
            Response::Entry { entry: None }
        ));
    }

    #[tokio::test]
    async fn test_empty_conflict_check_rejected() {
        let (mut client, _hotkeys) = start();
        let check = Request::CheckConflict {
            sequence: Vec::new(),
            excluding: None,
        };
        match roundtrip(&mut client, &check).await {
            Response::Error { code, .. } => assert_eq!(code, "invalid_request"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let (mut client, _hotkeys) = start();
        assert!(matches!(
            roundtrip(&mut client, &Request::Subscribe).await,
            Response::Subscribed
        ));

        send_message(&mut client, &Request::Suspend).await.unwrap();

        // The pushed event and the reply may arrive in either order
        let mut saw_ok = false;
        let mut saw_event = false;
        for _ in 0..2 {
            match read_message::<_, Response>(&mut client).await.unwrap().unwrap() {
                Response::Ok => saw_ok = true,
                Response::Event {
                    event: EngineEvent::Suspended,
                } => saw_event = true,
                other => panic!("unexpected response: {:?}", other),
            }
        }
        assert!(saw_ok && saw_event);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer
            .write_all(&(MAX_MESSAGE_LEN as u32 + 1).to_le_bytes())
            .await
            .unwrap();
        assert!(read_message::<_, Request>(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_disconnect() {
        let (writer, mut reader) = tokio::io::duplex(64);
        drop(writer);
        assert!(read_message::<_, Request>(&mut reader).await.unwrap().is_none());
    }
}
