//! WebSocket RPC transport
//!
//! Owns the physical connection, the sequence counter, the in-flight map of
//! pending calls, and the single background receive loop that classifies
//! every inbound frame: correlate it to a waiting request, or fan it out to
//! registered listeners. Reconnection policy lives outside; a transport is
//! constructed, connected once, and discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use crate::constants::{MAX_FRAME_SIZE, RESPONSE_TIMEOUT};
use crate::core::commands::{tokenize, CommandContext, CommandOptions};
use crate::core::events::{ChatEvent, EntityEvent, TeamEvent};
use crate::core::frame::{Request, ServerFrame};
use crate::core::pending::{pending_call, PendingCall};
use crate::core::registry::HandlerRegistry;
use crate::error::{CompanionError, Result};
use crate::identity::ServerIdentity;
use crate::proxy::VersionCache;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle. Disconnected is terminal until a fresh `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Relay routing for connections that cannot reach the server directly.
pub struct ProxyOptions {
    /// Base URL of the relay, e.g. `wss://relay.example.com`.
    pub base_url: String,
    pub version_cache: Arc<VersionCache>,
}

// State shared with the receive loop and its spawned dispatch tasks.
struct TransportShared {
    identity: ServerIdentity,
    command_options: Option<CommandOptions>,
    registry: Arc<HandlerRegistry>,
    pending: Mutex<HashMap<u32, PendingCall>>,
    state: AtomicU8,
}

/// The WebSocket-protocol RPC client.
pub struct Transport {
    shared: Arc<TransportShared>,
    proxy: Option<ProxyOptions>,
    writer: Mutex<Option<WsSink>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    seq: AtomicU32,
    response_timeout: Duration,
}

impl Transport {
    pub fn new(
        identity: ServerIdentity,
        command_options: Option<CommandOptions>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            shared: Arc::new(TransportShared {
                identity,
                command_options,
                registry,
                pending: Mutex::new(HashMap::new()),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
            }),
            proxy: None,
            writer: Mutex::new(None),
            reader_task: Mutex::new(None),
            seq: AtomicU32::new(1),
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Route the connection through a relay proxy.
    pub fn with_proxy(mut self, proxy: ProxyOptions) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Override the per-request response timeout (primarily for tests).
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Next sequence number, strictly increasing per transport, starting at 1.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of requests currently awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    async fn connection_url(&self) -> String {
        match &self.proxy {
            Some(proxy) => {
                let version = proxy.version_cache.get().await;
                format!(
                    "{}/game/{}/{}?v={}",
                    proxy.base_url,
                    self.shared.identity.host,
                    self.shared.identity.port.unwrap_or_default(),
                    version
                )
            }
            None => format!(
                "{}://{}",
                if self.shared.identity.secure { "wss" } else { "ws" },
                self.shared.identity.server_address()
            ),
        }
    }

    /// Open the socket and start the receive loop. On any network or
    /// handshake failure the state stays Disconnected and an error is
    /// returned; nothing panics.
    pub async fn connect(&self) -> Result<()> {
        self.shared
            .state
            .store(ConnectionState::Connecting as u8, Ordering::SeqCst);

        let url = self.connection_url().await;
        if let Err(err) = url::Url::parse(&url) {
            self.shared
                .state
                .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
            return Err(CompanionError::ConfigError(format!(
                "invalid connection URL {}: {}",
                url, err
            )));
        }

        let config = WebSocketConfig {
            max_message_size: Some(MAX_FRAME_SIZE),
            max_frame_size: Some(MAX_FRAME_SIZE),
            ..Default::default()
        };

        // The server drives its own keep-alives through protocol traffic;
        // the client never pings on its own.
        let stream = match connect_async_with_config(&url, Some(config), false).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                warn!("WebSocket connection error: {}", err);
                self.shared
                    .state
                    .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
                return Err(CompanionError::ConnectionError(err.to_string()));
            }
        };
        debug!("WebSocket connection established to {}", url);

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            receive_loop(shared, source).await;
        });
        *self.reader_task.lock().await = Some(task);

        self.shared
            .state
            .store(ConnectionState::Connected as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the receive loop and close the socket. Safe to call repeatedly
    /// or when already disconnected. In-flight calls are dropped so their
    /// waiters resolve instead of hanging.
    pub async fn disconnect(&self) {
        self.shared
            .state
            .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
        }

        self.shared.pending.lock().await.clear();
    }

    /// Send a request and wait for the correlated response.
    ///
    /// The pending call is inserted before the frame is written, so a
    /// response can never arrive ahead of its waiter. A write failure or
    /// timeout always removes the in-flight entry.
    pub async fn send_request(&self, request: Request) -> Result<ServerFrame> {
        let seq = request.seq;
        let (call, reply) = pending_call();
        self.shared.pending.lock().await.insert(seq, call);

        if let Err(err) = self.write_frame(&request).await {
            self.shared.pending.lock().await.remove(&seq);
            return Err(err);
        }

        match reply.wait(self.response_timeout).await {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.shared.pending.lock().await.remove(&seq);
                Err(err)
            }
        }
    }

    /// Fire-and-forget send for requests whose response nobody waits on.
    pub async fn send(&self, request: Request) -> Result<()> {
        self.write_frame(&request).await
    }

    async fn write_frame(&self, request: &Request) -> Result<()> {
        let data = request.encode()?;
        let mut writer = self.writer.lock().await;
        let sink = match writer.as_mut() {
            Some(sink) => sink,
            None => {
                warn!("No current WebSocket connection");
                return Err(CompanionError::ConnectionClosed);
            }
        };
        debug!("Sending request [{}]", request.seq);
        sink.send(Message::Binary(data)).await.map_err(|err| {
            CompanionError::ConnectionError(format!(
                "write failed for request {}: {}",
                request.seq, err
            ))
        })
    }
}

/// Read frames until the connection closes or an unrecoverable read error
/// occurs. Every frame is fanned out raw, decoded, and dispatched in spawned
/// tasks so a slow handler never stalls the next read.
async fn receive_loop(shared: Arc<TransportShared>, mut source: WsSource) {
    while let Some(next) = source.next().await {
        let data = match next {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Close(_)) => {
                debug!("Server closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!("Connection interrupted: {}", err);
                break;
            }
        };

        let raw_shared = shared.clone();
        let raw_data = data.clone();
        tokio::spawn(async move {
            dispatch_raw(&raw_shared, raw_data).await;
        });

        let frame = match ServerFrame::decode(&data) {
            Ok(frame) => frame,
            Err(err) => {
                // Malformed frames are dropped, never fatal.
                warn!("Failed to decode inbound frame: {}", err);
                continue;
            }
        };

        let handler_shared = shared.clone();
        tokio::spawn(async move {
            handle_message(&handler_shared, frame).await;
        });
    }

    shared
        .state
        .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
}

async fn dispatch_raw(shared: &TransportShared, data: Vec<u8>) {
    for handler in shared.registry.raw_handlers(&shared.identity).await {
        let data = data.clone();
        tokio::spawn(async move {
            handler(data).await;
        });
    }
}

/// Classify one decoded frame and route it.
///
/// Precedence: server-reported errors first, then command-prefixed chat,
/// then entity, team, and chat broadcasts, and finally plain responses.
/// Broadcasts are classified by their own tag and can never be mistaken for
/// a response.
async fn handle_message(shared: &TransportShared, frame: ServerFrame) {
    match frame {
        ServerFrame::Error { seq, error } => {
            let call = shared.pending.lock().await.remove(&seq);
            match call {
                Some(call) => {
                    debug!("Resolving request [{}] with server error", seq);
                    call.resolve(ServerFrame::Error { seq, error });
                }
                None => {
                    // Stray fault: an error with no waiting request.
                    error!("Unsolicited server error (seq {}): {}", seq, error);
                }
            }
        }

        ServerFrame::ChatBroadcast { message } => {
            if let Some(options) = &shared.command_options {
                if message.message.starts_with(&options.prefix) {
                    dispatch_command(shared, &options.prefix, message).await;
                    return;
                }
            }
            let event = ChatEvent { message };
            for handler in shared.registry.chat_handlers(&shared.identity).await {
                let event = event.clone();
                tokio::spawn(async move {
                    handler(event).await;
                });
            }
        }

        ServerFrame::EntityBroadcast { entity_id, payload } => {
            let event = EntityEvent { entity_id, payload };
            for handler in shared
                .registry
                .entity_handlers(&shared.identity, entity_id)
                .await
            {
                let event = event.clone();
                tokio::spawn(async move {
                    handler(event).await;
                });
            }
        }

        ServerFrame::TeamBroadcast {
            player_id,
            team_info,
        } => {
            let event = TeamEvent {
                player_id,
                team_info,
            };
            for handler in shared.registry.team_handlers(&shared.identity).await {
                let event = event.clone();
                tokio::spawn(async move {
                    handler(event).await;
                });
            }
        }

        ServerFrame::Response { seq, body } => {
            let call = shared.pending.lock().await.remove(&seq);
            match call {
                Some(call) => {
                    debug!("Resolving request [{}]", seq);
                    call.resolve(ServerFrame::Response { seq, body });
                }
                None => {
                    // Expected after a waiter timed out; drop silently.
                    debug!("Dropping response [{}] with no waiter", seq);
                }
            }
        }
    }
}

async fn dispatch_command(
    shared: &TransportShared,
    prefix: &str,
    message: crate::models::ChatMessage,
) {
    let parts = tokenize(&message.message);
    let first = match parts.first() {
        Some(first) => first,
        None => return,
    };
    let token = match first.strip_prefix(prefix) {
        Some(token) => token,
        None => return,
    };

    match shared.registry.lookup_command(&shared.identity, token).await {
        Some((name, handler)) => {
            let ctx = CommandContext::from_message(&message, name, parts[1..].to_vec());
            tokio::spawn(async move {
                handler(ctx).await;
            });
        }
        None => {
            debug!("No command registered for token '{}'", token);
        }
    }
}
