//! Loopback connector for local development.
//!
//! Stands in for a real chat-network adapter: it issues a QR challenge when
//! no credentials are stored, opens immediately, accepts every send and
//! logs it. Useful for exercising the full pipeline without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::transport::{Connection, ConnectionEvent, Connector, Credentials, Presence, Receipt};

pub struct DevConnector;

#[async_trait]
impl Connector for DevConnector {
    async fn connect(
        &self,
        creds: Option<Credentials>,
    ) -> Result<(Arc<dyn Connection>, mpsc::Receiver<ConnectionEvent>), EngineError> {
        let (tx, rx) = mpsc::channel(16);

        let creds = match creds {
            Some(creds) => creds,
            None => {
                // Fresh link: issue one QR challenge, then mint credentials
                let challenge = format!("dev-qr-{}", Uuid::new_v4());
                tx.send(ConnectionEvent::QrChallenge(challenge))
                    .await
                    .map_err(|_| EngineError::Transport("event stream closed".to_string()))?;
                Credentials {
                    device_id: Uuid::new_v4().to_string(),
                    key_material: "dev".to_string(),
                }
            }
        };

        tx.send(ConnectionEvent::CredentialsUpdated(creds))
            .await
            .map_err(|_| EngineError::Transport("event stream closed".to_string()))?;
        tx.send(ConnectionEvent::Open)
            .await
            .map_err(|_| EngineError::Transport("event stream closed".to_string()))?;

        let conn: Arc<dyn Connection> = Arc::new(DevConnection {
            event_tx: tx,
            next_id: AtomicUsize::new(1),
        });
        Ok((conn, rx))
    }
}

struct DevConnection {
    event_tx: mpsc::Sender<ConnectionEvent>,
    next_id: AtomicUsize,
}

impl DevConnection {
    fn receipt(&self) -> Receipt {
        Receipt {
            message_id: format!("dev-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
        }
    }
}

#[async_trait]
impl Connection for DevConnection {
    async fn send_presence(&self, address: &str, presence: Presence) -> Result<(), EngineError> {
        info!(address = %address, presence = ?presence, "dev_presence");
        Ok(())
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<Receipt, EngineError> {
        info!(address = %address, length = text.len(), "dev_text_sent");
        Ok(self.receipt())
    }

    async fn send_image(
        &self,
        address: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<Receipt, EngineError> {
        info!(
            address = %address,
            image_bytes = image.len(),
            caption = %caption,
            "dev_image_sent"
        );
        Ok(self.receipt())
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.event_tx
            .send(ConnectionEvent::Closed { logged_out: true })
            .await
            .map_err(|_| EngineError::Transport("event stream closed".to_string()))
    }
}
