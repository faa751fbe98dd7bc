//! Scriptable platform used by the integration tests.
//!
//! Every `connect` creates a [`MockSession`] and hands the test a
//! [`MockControl`] for it, through which connection, credential and message
//! events are pushed as if they came from the platform.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use pairlink::error::PlatformError;
use pairlink::pairing::PairingService;
use pairlink::platform::{
    ConnectOptions, ConnectionUpdate, CredentialUpdate, DisconnectReason, IncomingMessage,
    OutgoingMessage, PlatformConnector, PlatformHandle, PlatformSession,
};
use pairlink::session::ConnectionStateMachine;
use pairlink::store::{CREDENTIALS_KEY, MemoryCredentialStore};
use pairlink::PipelineTimings;

pub const PAIRING_CODE: &str = "ABCD1234";
pub const USER_ID: &str = "15551234567:7@s.whatsapp.net";
pub const SELF_CHAT: &str = "15551234567@s.whatsapp.net";

/// Behavior of sessions created by a [`MockConnector`].
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub refuse_connect: bool,
    /// Sessions start registered. Otherwise a session is registered once
    /// persisted credentials are passed back in on reconnect.
    pub registered: bool,
    pub fail_sends: bool,
}

pub struct MockSession {
    registered: bool,
    fail_sends: bool,
    alive: AtomicBool,
    closes: AtomicU32,
    pairing_calls: Mutex<Vec<Option<String>>>,
    sent: Mutex<Vec<(String, OutgoingMessage, Instant)>>,
    invites: Mutex<Vec<String>>,
    connection: mpsc::UnboundedSender<ConnectionUpdate>,
}

impl MockSession {
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pairing_calls(&self) -> usize {
        self.pairing_calls.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage, Instant)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<String> {
        self.invites.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformSession for MockSession {
    fn is_registered(&self) -> bool {
        self.registered
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn user_id(&self) -> Option<String> {
        Some(USER_ID.to_string())
    }

    async fn request_pairing_code(
        &self,
        _phone: &str,
        custom_code: Option<&str>,
    ) -> Result<String, PlatformError> {
        self.pairing_calls
            .lock()
            .unwrap()
            .push(custom_code.map(str::to_string));
        Ok(PAIRING_CODE.to_string())
    }

    async fn send_message(
        &self,
        jid: &str,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), message.clone(), Instant::now()));
        if self.fail_sends {
            Err(PlatformError::Transport("send failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn accept_group_invite(&self, code: &str) -> Result<(), PlatformError> {
        self.invites.lock().unwrap().push(code.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), PlatformError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.alive.swap(false, Ordering::SeqCst) {
            let _ = self
                .connection
                .send(ConnectionUpdate::Closed(DisconnectReason::new(428)));
        }
        Ok(())
    }
}

/// Test-side handle of one connected session.
pub struct MockControl {
    pub options: ConnectOptions,
    pub session: Arc<MockSession>,
    connection: mpsc::UnboundedSender<ConnectionUpdate>,
    credentials: mpsc::UnboundedSender<CredentialUpdate>,
    messages: mpsc::UnboundedSender<IncomingMessage>,
}

impl MockControl {
    pub fn open(&self) {
        self.connection.send(ConnectionUpdate::Open).unwrap();
    }

    /// Simulate a platform-side close.
    pub fn close(&self, status_code: u16) {
        self.session.alive.store(false, Ordering::SeqCst);
        self.connection
            .send(ConnectionUpdate::Closed(DisconnectReason::new(status_code)))
            .unwrap();
    }

    pub fn push_credentials(&self, data: &[u8]) {
        self.credentials
            .send(CredentialUpdate {
                key: CREDENTIALS_KEY.to_string(),
                data: data.to_vec(),
            })
            .unwrap();
    }

    pub fn push_message(&self, message: IncomingMessage) {
        self.messages.send(message).unwrap();
    }
}

pub struct MockConnector {
    behavior: MockBehavior,
    connects: AtomicU32,
    controls_tx: mpsc::UnboundedSender<MockControl>,
    controls_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockControl>>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();
        Self {
            behavior,
            connects: AtomicU32::new(0),
            controls_tx,
            controls_rx: tokio::sync::Mutex::new(controls_rx),
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Wait for the next session the pipeline connects.
    pub async fn next_session(&self) -> MockControl {
        self.controls_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl PlatformConnector for MockConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<PlatformHandle, PlatformError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.behavior.refuse_connect {
            return Err(PlatformError::Transport("connection refused".to_string()));
        }

        let (connection_tx, connection) = mpsc::unbounded_channel();
        let (credentials_tx, credentials) = mpsc::unbounded_channel();
        let (messages_tx, messages) = mpsc::unbounded_channel();

        let session = Arc::new(MockSession {
            registered: self.behavior.registered || options.auth.contains_key(CREDENTIALS_KEY),
            fail_sends: self.behavior.fail_sends,
            alive: AtomicBool::new(true),
            closes: AtomicU32::new(0),
            pairing_calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            invites: Mutex::new(Vec::new()),
            connection: connection_tx.clone(),
        });

        let _ = self.controls_tx.send(MockControl {
            options,
            session: session.clone(),
            connection: connection_tx,
            credentials: credentials_tx,
            messages: messages_tx,
        });

        Ok(PlatformHandle {
            session,
            connection,
            credentials,
            messages,
        })
    }
}

/// Everything a journey test needs.
pub struct Harness {
    pub connector: Arc<MockConnector>,
    pub store: MemoryCredentialStore,
    pub service: PairingService,
}

pub fn harness(behavior: MockBehavior) -> Harness {
    harness_with(behavior, |machine| machine)
}

pub fn harness_with(
    behavior: MockBehavior,
    configure: impl FnOnce(ConnectionStateMachine) -> ConnectionStateMachine,
) -> Harness {
    let connector = Arc::new(MockConnector::new(behavior));
    let store = MemoryCredentialStore::new();
    let machine = configure(ConnectionStateMachine::new(
        connector.clone(),
        Arc::new(store.clone()),
        PipelineTimings::default(),
    ));
    let service = PairingService::new(Arc::new(machine), Arc::new(store.clone()));
    Harness {
        connector,
        store,
        service,
    }
}

/// Poll `condition` on the (paused) clock until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("condition not reached");
}
