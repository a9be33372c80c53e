//! Scripted in-memory transport used by session and dispatcher tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::error::EngineError;
use crate::transport::{
    Connection, ConnectionEvent, Connector, CredentialStore, Credentials, Presence, Receipt,
    Session, SessionState,
};

/// Shared state of the fake chat network.
pub(crate) struct MockNetwork {
    connects: AtomicUsize,
    logged_out: AtomicBool,
    stall: AtomicBool,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    event_tx: Option<mpsc::Sender<ConnectionEvent>>,
    calls: Vec<String>,
    fail_addresses: HashSet<String>,
    next_id: usize,
}

impl MockNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(MockNetwork {
            connects: AtomicUsize::new(0),
            logged_out: AtomicBool::new(false),
            stall: AtomicBool::new(false),
            state: Mutex::new(MockState::default()),
        })
    }

    pub(crate) fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            net: Arc::clone(self),
        })
    }

    /// Push a connection event into the currently live event stream.
    pub(crate) async fn emit(&self, event: ConnectionEvent) {
        let tx = self
            .state
            .lock()
            .unwrap()
            .event_tx
            .clone()
            .expect("no live connection to emit on");
        tx.send(event).await.expect("event stream dropped");
    }

    /// Ordered log of presence and send calls.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Make sends to this normalized address fail with a transport error.
    pub(crate) fn fail_address(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_addresses
            .insert(address.to_string());
    }

    /// Make every send hang forever.
    pub(crate) fn stall_sends(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    pub(crate) fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` connection attempts have been made.
    pub(crate) async fn wait_for_connects(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connects.load(Ordering::SeqCst) < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} connects"
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

struct MockConnector {
    net: Arc<MockNetwork>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _creds: Option<Credentials>,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<ConnectionEvent>), EngineError> {
        let (tx, rx) = mpsc::channel(32);
        self.net.state.lock().unwrap().event_tx = Some(tx);
        self.net.connects.fetch_add(1, Ordering::SeqCst);
        let conn: Arc<dyn Connection> = Arc::new(MockConnection {
            net: Arc::clone(&self.net),
        });
        Ok((conn, rx))
    }
}

struct MockConnection {
    net: Arc<MockNetwork>,
}

impl MockConnection {
    fn check_send(&self, address: &str) -> Result<Receipt, EngineError> {
        let mut state = self.net.state.lock().unwrap();
        if state.fail_addresses.contains(address) {
            return Err(EngineError::Transport("rejected by network".to_string()));
        }
        state.next_id += 1;
        Ok(Receipt {
            message_id: format!("mock-{}", state.next_id),
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_presence(&self, address: &str, presence: Presence) -> Result<(), EngineError> {
        let label = match presence {
            Presence::Composing => "composing",
            Presence::Paused => "paused",
        };
        self.net.record(format!("presence:{label}:{address}"));
        Ok(())
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<Receipt, EngineError> {
        if self.net.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let receipt = self.check_send(address)?;
        self.net.record(format!("text:{address}:{text}"));
        Ok(receipt)
    }

    async fn send_image(
        &self,
        address: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<Receipt, EngineError> {
        if self.net.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let receipt = self.check_send(address)?;
        self.net
            .record(format!("image:{address}:{}:{caption}", image.len()));
        Ok(receipt)
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.net.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Credential store backed by a plain mutex, for tests.
#[derive(Default)]
pub(crate) struct MemoryCredentialStore {
    creds: tokio::sync::Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub(crate) async fn current(&self) -> Option<Credentials> {
        self.creds.lock().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.creds.lock().await.clone())
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        *self.creds.lock().await = Some(creds.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.creds.lock().await = None;
        Ok(())
    }
}

/// Poll until the session reports the wanted state.
pub(crate) async fn wait_for_state(session: &Session, state: SessionState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if session.status().await.status == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state:?}"
        );
        sleep(Duration::from_millis(5)).await;
    }
}
