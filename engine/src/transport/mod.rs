//! Transport layer: the single persistent connection to the chat network.
//!
//! The engine never talks to the protocol library directly. It goes through
//! the [`Session`], which owns the one live connection, runs the reconnect
//! state machine and applies the per-send humanization sequence.

pub mod creds;
pub mod dev;
#[cfg(test)]
pub(crate) mod mock;
pub mod session;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;

pub use creds::{CredentialStore, Credentials, FileCredentialStore};
pub use session::{Session, SessionState, StatusSnapshot};

/// Network address domain appended to normalized phone numbers.
pub const ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// Presence signal sent to a recipient before a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Paused,
}

/// Acknowledgement returned by the network for an accepted send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub message_id: String,
}

/// Events emitted by a live connection, consumed by the session task.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A new credential-linking QR challenge was issued while unauthenticated
    QrChallenge(String),
    /// Handshake completed, the connection is authenticated and usable
    Open,
    /// Refreshed credential material that must be persisted
    CredentialsUpdated(Credentials),
    /// The connection dropped; `logged_out` means the stored credentials
    /// were invalidated and must be discarded
    Closed { logged_out: bool },
}

/// Factory for new connections to the chat network.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection, resuming from stored credentials when present.
    ///
    /// Returns the send handle and the stream of connection events. The
    /// handle must not be used for sends until an [`ConnectionEvent::Open`]
    /// has been observed.
    async fn connect(
        &self,
        creds: Option<Credentials>,
    ) -> Result<
        (
            std::sync::Arc<dyn Connection>,
            mpsc::Receiver<ConnectionEvent>,
        ),
        EngineError,
    >;
}

/// Send primitives of one live connection.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    async fn send_presence(&self, address: &str, presence: Presence) -> Result<(), EngineError>;
    async fn send_text(&self, address: &str, text: &str) -> Result<Receipt, EngineError>;
    async fn send_image(
        &self,
        address: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<Receipt, EngineError>;
    /// Invalidate the server-side session. The connection is expected to
    /// emit `Closed { logged_out: true }` afterwards.
    async fn logout(&self) -> Result<(), EngineError>;
}

/// Normalize a raw phone number into a network address.
///
/// Strips everything but digits and prefixes the default country code when
/// the number is a bare 9-digit local number.
pub fn normalize_address(phone: &str, default_country_code: &str) -> String {
    let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 9 {
        digits = format!("{default_country_code}{digits}");
    }
    format!("{digits}{ADDRESS_SUFFIX}")
}
