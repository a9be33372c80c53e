//! Persistent session over the chat network.
//!
//! The session owns the only live connection handle. All connection state is
//! mutated by a single event task reading from the connection's event queue;
//! other components only see immutable status snapshots.
//!
//! State machine:
//!
//! ```text
//! CONNECTING -> OPEN         successful handshake
//! CONNECTING -> CONNECTING   new QR challenge while waiting for linking
//! OPEN       -> CONNECTING   connection dropped, reconnect
//! OPEN       -> CLOSED       logout / session invalidated; credentials are
//!                            discarded and CONNECTING is re-entered with a
//!                            fresh QR challenge
//! ```
//!
//! There is no terminal state short of process exit: the task always works
//! its way back to OPEN.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::EngineError;
use crate::transport::{
    normalize_address, Connection, ConnectionEvent, Connector, CredentialStore, Presence, Receipt,
};

/// Delay before retrying a failed connection attempt.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Immutable status snapshot exposed to other components.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSnapshot {
    pub status: SessionState,
    /// Pending credential-linking challenge, present only while
    /// CONNECTING and unauthenticated
    #[serde(rename = "qrCode")]
    pub qr_code: Option<String>,
}

/// The single long-lived authenticated connection to the messaging network.
pub struct Session {
    status: RwLock<StatusSnapshot>,
    conn: RwLock<Option<Arc<dyn Connection>>>,
    /// One physical connection: concurrent campaigns serialize their sends here
    send_lock: Mutex<()>,
    logout_tx: mpsc::Sender<()>,
    compose_delay_ms: (u64, u64),
    send_timeout: Duration,
    default_country_code: String,
}

impl Session {
    /// Create the session and spawn its event task.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        store: Arc<dyn CredentialStore>,
        config: &Config,
    ) -> Arc<Self> {
        let (logout_tx, logout_rx) = mpsc::channel(1);

        let session = Arc::new(Session {
            status: RwLock::new(StatusSnapshot {
                status: SessionState::Connecting,
                qr_code: None,
            }),
            conn: RwLock::new(None),
            send_lock: Mutex::new(()),
            logout_tx,
            compose_delay_ms: config.compose_delay_ms,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            default_country_code: config.default_country_code.clone(),
        });

        tokio::spawn(run_event_task(
            Arc::clone(&session),
            connector,
            store,
            logout_rx,
        ));

        session
    }

    /// Current status snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        self.status.read().await.clone()
    }

    /// Send a text message, applying the humanization sequence first.
    pub async fn send_text(&self, phone: &str, text: &str) -> Result<Receipt, EngineError> {
        let _permit = self.send_lock.lock().await;
        let conn = self.open_connection().await?;
        let address = self.humanize(conn.as_ref(), phone).await?;
        self.with_timeout(conn.send_text(&address, text)).await
    }

    /// Send an image with a caption, applying the humanization sequence first.
    pub async fn send_image(
        &self,
        phone: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<Receipt, EngineError> {
        let _permit = self.send_lock.lock().await;
        let conn = self.open_connection().await?;
        let address = self.humanize(conn.as_ref(), phone).await?;
        self.with_timeout(conn.send_image(&address, image, caption))
            .await
    }

    /// Force CLOSED, discard stored credentials and re-enter CONNECTING to
    /// offer a fresh QR challenge.
    pub async fn logout(&self) -> Result<(), EngineError> {
        self.logout_tx
            .send(())
            .await
            .map_err(|_| EngineError::Transport("session task stopped".to_string()))
    }

    async fn open_connection(&self) -> Result<Arc<dyn Connection>, EngineError> {
        if self.status.read().await.status != SessionState::Open {
            return Err(EngineError::NotConnected);
        }
        self.conn
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotConnected)
    }

    /// Humanization sequence: signal "composing", wait a randomized delay,
    /// signal "paused", then hand back the normalized address for the send.
    /// Runs per call; the wait is an interruptible tokio sleep.
    async fn humanize(&self, conn: &dyn Connection, phone: &str) -> Result<String, EngineError> {
        let address = normalize_address(phone, &self.default_country_code);

        conn.send_presence(&address, Presence::Composing).await?;

        // Draw the delay before awaiting (ThreadRng is not Send)
        let (min, max) = self.compose_delay_ms;
        let delay_ms = rand::thread_rng().gen_range(min..=max);
        sleep(Duration::from_millis(delay_ms)).await;

        conn.send_presence(&address, Presence::Paused).await?;
        Ok(address)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.send_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Transport("send timed out".to_string())),
        }
    }

    async fn set_status(&self, state: SessionState, qr_code: Option<String>) {
        let mut status = self.status.write().await;
        status.status = state;
        status.qr_code = qr_code;
    }

    async fn set_connection(&self, conn: Option<Arc<dyn Connection>>) {
        *self.conn.write().await = conn;
    }
}

/// Event task: drives the state machine from the connection event queue.
async fn run_event_task(
    session: Arc<Session>,
    connector: Arc<dyn Connector>,
    store: Arc<dyn CredentialStore>,
    mut logout_rx: mpsc::Receiver<()>,
) {
    loop {
        session.set_connection(None).await;
        session.set_status(SessionState::Connecting, None).await;

        let creds = match store.load().await {
            Ok(creds) => creds,
            Err(e) => {
                warn!(error = %e, "session_credentials_load_failed");
                None
            }
        };

        info!(resuming = creds.is_some(), "session_connecting");

        let (conn, mut events) = match connector.connect(creds).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "session_connect_failed");
                tokio::select! {
                    _ = sleep(RECONNECT_DELAY) => {}
                    received = logout_rx.recv() => {
                        if received.is_none() {
                            return;
                        }
                        handle_logout(&session, &store, None).await;
                    }
                }
                continue;
            }
        };

        // Consume events until this connection ends, then reconnect.
        loop {
            tokio::select! {
                received = logout_rx.recv() => {
                    if received.is_none() {
                        return;
                    }
                    handle_logout(&session, &store, Some(conn.as_ref())).await;
                    break;
                }
                event = events.recv() => match event {
                    None => {
                        session.set_connection(None).await;
                        warn!("session_event_stream_closed");
                        break;
                    }
                    Some(ConnectionEvent::QrChallenge(qr)) => {
                        info!("session_qr_challenge");
                        session.set_status(SessionState::Connecting, Some(qr)).await;
                    }
                    Some(ConnectionEvent::Open) => {
                        info!("session_open");
                        session.set_connection(Some(Arc::clone(&conn))).await;
                        session.set_status(SessionState::Open, None).await;
                    }
                    Some(ConnectionEvent::CredentialsUpdated(creds)) => {
                        if let Err(e) = store.save(&creds).await {
                            warn!(error = %e, "session_credentials_save_failed");
                        }
                    }
                    Some(ConnectionEvent::Closed { logged_out }) => {
                        session.set_connection(None).await;
                        if logged_out {
                            warn!("session_logged_out");
                            if let Err(e) = store.clear().await {
                                warn!(error = %e, "session_credentials_clear_failed");
                            }
                            session.set_status(SessionState::Closed, None).await;
                        } else {
                            warn!("session_connection_dropped");
                        }
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_logout(
    session: &Session,
    store: &Arc<dyn CredentialStore>,
    conn: Option<&dyn Connection>,
) {
    info!("session_logout_requested");
    if let Some(conn) = conn {
        if let Err(e) = conn.logout().await {
            warn!(error = %e, "session_logout_send_failed");
        }
    }
    session.set_connection(None).await;
    if let Err(e) = store.clear().await {
        warn!(error = %e, "session_credentials_clear_failed");
    }
    session.set_status(SessionState::Closed, None).await;
}
