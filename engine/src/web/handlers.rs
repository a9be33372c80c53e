//! HTTP endpoint handlers.
//!
//! Submission endpoints persist the campaign and return immediately; the
//! per-recipient delivery loop runs in a background task owned by the
//! dispatcher. Handlers never wait on the transport.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::model::{Contact, Recipient, RecipientInput};
use crate::render::RawOverlayConfig;
use crate::repo::Repository;
use crate::transport::Session;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub session: Arc<Session>,
    pub repo: Arc<dyn Repository>,
}

/// Error body shared by every endpoint.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn engine_error_response(e: EngineError) -> Response {
    let status = match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::NotConnected => StatusCode::CONFLICT,
        EngineError::Render(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Transport(_) | EngineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Campaign Submission
// =============================================================================

/// Plain-text campaign request.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(rename = "senderName")]
    pub sender_name: String,
    pub recipients: Vec<RecipientInput>,
    pub content: String,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub id: Uuid,
    pub status: &'static str,
    #[serde(rename = "storagePath", skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

/// Plain-text campaign submission.
pub async fn send_campaign(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Response {
    if request.sender_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "senderName must not be empty");
    }
    if request.recipients.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "recipients must not be empty");
    }

    let recipients: Vec<Recipient> = request.recipients.into_iter().map(Into::into).collect();

    info!(
        sender = %request.sender_name,
        recipients = recipients.len(),
        "send_campaign_received"
    );

    match state
        .dispatcher
        .submit_plain(request.sender_name, recipients, request.content)
        .await
    {
        Ok(id) => (
            StatusCode::ACCEPTED,
            Json(SendResponse {
                id,
                status: "PENDING",
                storage_path: None,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "send_campaign_failed");
            engine_error_response(e)
        }
    }
}

/// Collected fields of a flyer multipart upload.
struct FlyerUpload {
    file: Vec<u8>,
    file_name: String,
    config: RawOverlayConfig,
    sender_name: Option<String>,
    recipients: Option<Vec<RecipientInput>>,
}

/// Read the multipart fields of the flyer endpoints. `senderName` and
/// `recipients` are only present on the submission endpoint.
async fn read_flyer_upload(mut multipart: Multipart) -> Result<FlyerUpload, String> {
    let mut file = None;
    let mut file_name = None;
    let mut config = None;
    let mut sender_name = None;
    let mut recipients = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid multipart body: {e}"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|n| n.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("failed to read file field: {e}"))?;
                file = Some(bytes.to_vec());
            }
            "config" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| format!("failed to read config field: {e}"))?;
                config = Some(
                    serde_json::from_str(&text).map_err(|e| format!("invalid config: {e}"))?,
                );
            }
            "senderName" => {
                sender_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| format!("failed to read senderName field: {e}"))?,
                );
            }
            "recipients" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| format!("failed to read recipients field: {e}"))?;
                recipients = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| format!("invalid recipients: {e}"))?,
                );
            }
            other => {
                warn!(field = %other, "flyer_upload_unknown_field");
            }
        }
    }

    Ok(FlyerUpload {
        file: file.ok_or("missing file field")?,
        file_name: file_name.unwrap_or_else(|| "template.png".to_string()),
        config: config.ok_or("missing config field")?,
        sender_name,
        recipients,
    })
}

/// Flyer campaign submission.
pub async fn send_flyer(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_flyer_upload(multipart).await {
        Ok(upload) => upload,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let sender_name = match upload.sender_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return error_response(StatusCode::BAD_REQUEST, "senderName must not be empty"),
    };
    let recipients: Vec<Recipient> = match upload.recipients {
        Some(list) if !list.is_empty() => list.into_iter().map(Into::into).collect(),
        _ => return error_response(StatusCode::BAD_REQUEST, "recipients must not be empty"),
    };

    info!(
        sender = %sender_name,
        recipients = recipients.len(),
        template = %upload.file_name,
        "send_flyer_received"
    );

    match state
        .dispatcher
        .submit_flyer(
            sender_name,
            upload.file,
            upload.file_name,
            upload.config,
            recipients,
        )
        .await
    {
        Ok((id, storage_path)) => (
            StatusCode::ACCEPTED,
            Json(SendResponse {
                id,
                status: "PENDING",
                storage_path: Some(storage_path),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "send_flyer_failed");
            engine_error_response(e)
        }
    }
}

/// Render one sample flyer with placeholder text and QR content.
pub async fn preview_flyer(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_flyer_upload(multipart).await {
        Ok(upload) => upload,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    match state.dispatcher.preview(&upload.file, upload.config) {
        Ok(bytes) => {
            let image = format!("data:image/png;base64,{}", BASE64.encode(bytes));
            Json(json!({ "image": image })).into_response()
        }
        Err(e) => {
            error!(error = %e, "preview_flyer_failed");
            engine_error_response(e)
        }
    }
}

// =============================================================================
// Campaign Queries
// =============================================================================

/// All campaigns, newest first.
pub async fn history(State(state): State<AppState>) -> Response {
    match state.dispatcher.history().await {
        Ok(campaigns) => Json(campaigns).into_response(),
        Err(e) => {
            error!(error = %e, "history_failed");
            engine_error_response(e)
        }
    }
}

/// Ordered delivery outcomes of one campaign.
pub async fn campaign_outcomes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.repo.get_campaign(id).await {
        Ok(Some(_)) => Json(state.dispatcher.outcomes(id).await).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "campaign not found"),
        Err(e) => {
            error!(error = %e, "campaign_outcomes_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Aggregated counters and per-day activity.
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.dispatcher.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!(error = %e, "stats_failed");
            engine_error_response(e)
        }
    }
}

// =============================================================================
// Invitations
// =============================================================================

/// Confirm an invitation scan. Idempotent: repeated calls return the same
/// scanned record.
pub async fn verify_invitation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.dispatcher.verify_invitation(id).await {
        Ok(invitation) => Json(json!({ "valid": true, "invitation": invitation })).into_response(),
        Err(EngineError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": false, "error": "invitation not found" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "verify_invitation_failed");
            engine_error_response(e)
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Current connection state plus the pending QR challenge, if any.
pub async fn session_status(State(state): State<AppState>) -> Response {
    Json(state.session.status().await).into_response()
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Tear the session down and discard stored credentials.
pub async fn session_logout(State(state): State<AppState>) -> Response {
    match state.session.logout().await {
        Ok(()) => Json(LogoutResponse {
            success: true,
            message: "logged out",
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "session_logout_failed");
            engine_error_response(e)
        }
    }
}

// =============================================================================
// Contacts
// =============================================================================

pub async fn create_contact(
    State(state): State<AppState>,
    Json(contact): Json<Contact>,
) -> Response {
    if contact.phone.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "phone must not be empty");
    }
    match state.repo.upsert_contacts(std::slice::from_ref(&contact)).await {
        Ok(()) => (StatusCode::CREATED, Json(contact)).into_response(),
        Err(e) => {
            error!(error = %e, "create_contact_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub imported: usize,
}

/// Bulk upsert keyed by phone.
pub async fn import_contacts(
    State(state): State<AppState>,
    Json(contacts): Json<Vec<Contact>>,
) -> Response {
    let contacts: Vec<Contact> = contacts
        .into_iter()
        .filter(|c| !c.phone.trim().is_empty())
        .collect();

    match state.repo.upsert_contacts(&contacts).await {
        Ok(()) => {
            info!(imported = contacts.len(), "contacts_imported");
            Json(ImportResponse {
                imported: contacts.len(),
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "import_contacts_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn list_contacts(State(state): State<AppState>) -> Response {
    match state.repo.list_contacts().await {
        Ok(contacts) => Json(contacts).into_response(),
        Err(e) => {
            error!(error = %e, "list_contacts_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
