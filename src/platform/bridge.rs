//! Platform connector backed by an out-of-process bridge.
//!
//! The bridge owns the platform's wire protocol and exposes each session as
//! a WebSocket carrying JSON text frames:
//!
//! ```text
//! client ── start {session, auth, browser, timeouts} ──────────► bridge
//! client ◄────────────────────────────── ready {registered, user} ──
//! client ── request {id, op, args} ────────────────────────────►
//! client ◄──────────────────────────── result {id, ok, value, error}
//! client ◄── connection {state, status_code, user} | auth {file, data}
//!            | message {id, from, from_me, text}
//! ```
//!
//! One WebSocket is one platform session. A socket that ends without a
//! `connection` close frame is reported as a close with no status code.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{
    ConnectOptions, ConnectionUpdate, CredentialUpdate, DisconnectReason, IncomingMessage,
    OutgoingMessage, PlatformConnector, PlatformHandle, PlatformSession,
};
use crate::error::PlatformError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

type Waiter = (&'static str, oneshot::Sender<Result<Value, PlatformError>>);
type Pending = Arc<Mutex<HashMap<u64, Waiter>>>;

/// Where the bridge listens and how long requests may take.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub url: Url,
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Frames sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    Start {
        session: &'a str,
        /// File name to base64 content.
        auth: BTreeMap<&'a str, String>,
        browser: &'a [String; 2],
        connect_timeout_ms: u64,
        keep_alive_interval_ms: u64,
        ignore_groups: bool,
        mark_online: bool,
    },
    Request {
        id: u64,
        op: &'a str,
        args: Value,
    },
}

/// Frames received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Ready {
        registered: bool,
        #[serde(default)]
        user: Option<String>,
    },
    Connection {
        state: String,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        user: Option<String>,
    },
    Auth {
        file: String,
        data: String,
    },
    Message(IncomingMessage),
    Result {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Connects platform sessions through the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    config: BridgeConfig,
}

impl BridgeConnector {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PlatformConnector for BridgeConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<PlatformHandle, PlatformError> {
        let timeout = options.connect_timeout;

        let (stream, _response) = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        )
        .await
        .map_err(|_| PlatformError::Timeout {
            op: "connect".to_string(),
            timeout,
        })?
        .map_err(|e| PlatformError::Transport(format!("bridge connect failed: {}", e)))?;

        let (mut sink, stream) = stream.split();

        let auth = options
            .auth
            .iter()
            .map(|(file, data)| (file.as_str(), STANDARD.encode(data)))
            .collect();
        let start = ClientFrame::Start {
            session: options.session_id.as_str(),
            auth,
            browser: &options.browser,
            connect_timeout_ms: duration_ms(options.connect_timeout),
            keep_alive_interval_ms: duration_ms(options.keep_alive_interval),
            ignore_groups: true,
            mark_online: true,
        };
        send_frame(&mut sink, &start).await?;

        let (connection_tx, connection) = mpsc::unbounded_channel();
        let (credentials_tx, credentials) = mpsc::unbounded_channel();
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let shared = Arc::new(Shared::default());
        let reader = Reader {
            shared: Arc::clone(&shared),
            connection: connection_tx,
            credentials: credentials_tx,
            messages: messages_tx,
            ready: Some(ready_tx),
        };
        let reader_task = tokio::spawn(reader.run(stream));

        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(PlatformError::Transport(
                    "bridge closed before the session was ready".to_string(),
                ));
            }
            Err(_) => {
                reader_task.abort();
                return Err(PlatformError::Timeout {
                    op: "start".to_string(),
                    timeout,
                });
            }
        }

        tracing::debug!(
            session_id = %options.session_id,
            url = %self.config.url,
            registered = shared.registered.load(Ordering::Acquire),
            "Bridge session ready"
        );

        let session = BridgeSession {
            sink: tokio::sync::Mutex::new(sink),
            shared,
            next_id: AtomicU64::new(1),
            request_timeout: self.config.request_timeout,
            reader: reader_task,
        };

        Ok(PlatformHandle {
            session: Arc::new(session),
            connection,
            credentials,
            messages,
        })
    }
}

/// State shared between a session and its reader task.
#[derive(Default)]
struct Shared {
    alive: AtomicBool,
    registered: AtomicBool,
    user: RwLock<Option<String>>,
    pending: Pending,
}

impl Shared {
    fn set_user(&self, user: Option<String>) {
        if let Some(user) = user {
            *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
        }
    }
}

struct Reader {
    shared: Arc<Shared>,
    connection: mpsc::UnboundedSender<ConnectionUpdate>,
    credentials: mpsc::UnboundedSender<CredentialUpdate>,
    messages: mpsc::UnboundedSender<IncomingMessage>,
    ready: Option<oneshot::Sender<()>>,
}

impl Reader {
    async fn run(mut self, mut stream: SplitStream<WsStream>) {
        let mut saw_close = false;

        while let Some(next) = stream.next().await {
            match next {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<BridgeFrame>(text.as_str()) {
                        Ok(frame) => saw_close |= self.dispatch(frame),
                        Err(e) => tracing::warn!(error = %e, "Unparseable bridge frame"),
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(close = ?frame, "Bridge closed the socket");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Bridge socket error");
                    break;
                }
            }
        }

        self.shared.alive.store(false, Ordering::Release);
        if !saw_close {
            let _ = self
                .connection
                .send(ConnectionUpdate::Closed(DisconnectReason::unknown()));
        }
        // Dropping the senders fails every request still waiting.
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Route one frame. Returns whether it reported a connection close.
    fn dispatch(&mut self, frame: BridgeFrame) -> bool {
        match frame {
            BridgeFrame::Ready { registered, user } => {
                self.shared.registered.store(registered, Ordering::Release);
                self.shared.set_user(user);
                self.shared.alive.store(true, Ordering::Release);
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(());
                }
            }
            BridgeFrame::Connection {
                state,
                status_code,
                user,
            } => {
                self.shared.set_user(user);
                let update = match state.as_str() {
                    "connecting" => ConnectionUpdate::Connecting,
                    "open" => ConnectionUpdate::Open,
                    "close" | "closed" => {
                        self.shared.alive.store(false, Ordering::Release);
                        ConnectionUpdate::Closed(DisconnectReason { status_code })
                    }
                    other => {
                        tracing::debug!(state = other, "Ignoring unknown connection state");
                        return false;
                    }
                };
                let closed = matches!(update, ConnectionUpdate::Closed(_));
                let _ = self.connection.send(update);
                return closed;
            }
            BridgeFrame::Auth { file, data } => match STANDARD.decode(data) {
                Ok(data) => {
                    let _ = self.credentials.send(CredentialUpdate { key: file, data });
                }
                Err(e) => tracing::warn!(file = %file, error = %e, "Undecodable auth frame"),
            },
            BridgeFrame::Message(message) => {
                let _ = self.messages.send(message);
            }
            BridgeFrame::Result {
                id,
                ok,
                value,
                error,
            } => {
                let waiter = self
                    .shared
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                match waiter {
                    Some((op, tx)) => {
                        let result = if ok {
                            Ok(value.unwrap_or(Value::Null))
                        } else {
                            Err(PlatformError::Rejected {
                                op: op.to_string(),
                                reason: error.unwrap_or_else(|| "unknown error".to_string()),
                            })
                        };
                        let _ = tx.send(result);
                    }
                    None => tracing::debug!(id, "Result for unknown request"),
                }
            }
        }
        false
    }
}

/// A platform session living behind one bridge socket.
struct BridgeSession {
    sink: tokio::sync::Mutex<WsSink>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl BridgeSession {
    async fn request(&self, op: &'static str, args: Value) -> Result<Value, PlatformError> {
        if !self.is_alive() {
            return Err(PlatformError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (op, tx));

        let frame = ClientFrame::Request { id, op, args };
        if let Err(e) = send_frame(&mut *self.sink.lock().await, &frame).await {
            self.forget(id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PlatformError::Closed),
            Err(_) => {
                self.forget(id);
                Err(PlatformError::Timeout {
                    op: op.to_string(),
                    timeout: self.request_timeout,
                })
            }
        }
    }

    fn forget(&self, id: u64) {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

#[async_trait]
impl PlatformSession for BridgeSession {
    fn is_registered(&self) -> bool {
        self.shared.registered.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    fn user_id(&self) -> Option<String> {
        self.shared
            .user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request_pairing_code(
        &self,
        phone: &str,
        custom_code: Option<&str>,
    ) -> Result<String, PlatformError> {
        let value = self
            .request(
                "pairing_code",
                json!({ "phone": phone, "custom_code": custom_code }),
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Protocol(format!("pairing code is not a string: {}", value))
            })
    }

    async fn send_message(
        &self,
        jid: &str,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.request("send_message", json!({ "jid": jid, "message": message }))
            .await
            .map(|_| ())
    }

    async fn accept_group_invite(&self, code: &str) -> Result<(), PlatformError> {
        self.request("accept_invite", json!({ "code": code }))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), PlatformError> {
        if !self.is_alive() {
            return Ok(());
        }
        let result = self.request("close", json!({})).await.map(|_| ());
        if let Err(e) = self.sink.lock().await.close().await {
            tracing::debug!(error = %e, "Closing bridge socket failed");
        }
        result
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ClientFrame<'_>) -> Result<(), PlatformError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)
        .map_err(|e| PlatformError::Protocol(format!("frame encoding failed: {}", e)))?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| PlatformError::Transport(e.to_string()))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
