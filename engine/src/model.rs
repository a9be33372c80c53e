//! Core records for campaigns, invitations and contacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content prefix that marks a campaign as a flyer campaign.
pub const FLYER_MARKER: &str = "[FLYER]";

/// One entry of a campaign's recipient list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    /// Raw phone number as submitted (normalized only at send time)
    pub phone: String,
    /// Display name used for personalization, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Recipient as accepted on the API boundary: either a bare phone string
/// or a `{phone, name}` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipientInput {
    Phone(String),
    Full(Recipient),
}

impl From<RecipientInput> for Recipient {
    fn from(input: RecipientInput) -> Self {
        match input {
            RecipientInput::Phone(phone) => Recipient { phone, name: None },
            RecipientInput::Full(r) => r,
        }
    }
}

/// Lifecycle of a campaign record.
///
/// `Pending` on creation, then exactly one transition to `Sent` or `Failed`
/// after every recipient has been attempted. Never goes back to `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CampaignStatus {
    Pending,
    Sent,
    Failed,
}

/// One submitted batch send (plain text or flyer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    /// Template for plain sends; `[FLYER] ...` label for flyer sends
    pub content: String,
    /// Fixed at creation; attempt order follows list order
    pub recipients: Vec<Recipient>,
    pub status: CampaignStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new PENDING campaign.
    pub fn new(sender_name: String, content: String, recipients: Vec<Recipient>) -> Self {
        Campaign {
            id: Uuid::new_v4(),
            sender_name,
            content,
            recipients,
            status: CampaignStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Whether this campaign was a flyer campaign.
    pub fn is_flyer(&self) -> bool {
        self.content.starts_with(FLYER_MARKER)
    }
}

/// Scan lifecycle of an invitation.
///
/// Starts `Sent`; flips to `Scanned` on the first verification lookup and
/// stays there. `Verified` is reserved for a manual confirmation step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationStatus {
    Sent,
    Scanned,
    Verified,
}

/// Per-recipient verification record tied to a flyer campaign.
///
/// The id is embedded into that recipient's QR verification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    #[serde(rename = "recipientName")]
    pub recipient_name: String,
    #[serde(rename = "recipientPhone")]
    pub recipient_phone: String,
    pub status: InvitationStatus,
    /// Back-reference to the owning campaign (lookup only)
    #[serde(rename = "messageId")]
    pub campaign_id: Uuid,
    /// Set at the SENT -> SCANNED transition and never overwritten
    #[serde(rename = "scannedAt")]
    pub scanned_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    /// Create a new SENT invitation for one recipient of a campaign.
    pub fn new(recipient_name: String, recipient_phone: String, campaign_id: Uuid) -> Self {
        Invitation {
            id: Uuid::new_v4(),
            recipient_name,
            recipient_phone,
            status: InvitationStatus::Sent,
            campaign_id,
            scanned_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Address-book entry, upserted on phone number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Outcome of one recipient's delivery attempt, recorded in list order.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub phone: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
