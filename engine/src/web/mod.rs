//! HTTP surface of the campaign engine.
//!
//! Submission endpoints validate, persist and return; delivery runs in the
//! dispatcher's background tasks. Queries read the repository and the
//! dispatcher's in-process progress map.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/messaging/send", post(handlers::send_campaign))
        .route("/messaging/send-flyer", post(handlers::send_flyer))
        .route("/messaging/preview-flyer", post(handlers::preview_flyer))
        .route("/messaging/history", get(handlers::history))
        .route("/messaging/:id/outcomes", get(handlers::campaign_outcomes))
        .route("/messaging/stats", get(handlers::stats))
        .route("/invitations/:id/verify", get(handlers::verify_invitation))
        .route("/session/status", get(handlers::session_status))
        .route("/session/logout", post(handlers::session_logout))
        .route(
            "/contacts",
            post(handlers::create_contact).get(handlers::list_contacts),
        )
        .route("/contacts/import", post(handlers::import_contacts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
