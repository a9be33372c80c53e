//! Hellocast - bulk flyer campaign engine.
//!
//! One persistent chat-network session, shared by every campaign, feeds a
//! sequential dispatch pipeline:
//!
//! ```text
//! HTTP API → Dispatcher → Renderer → Session → chat network
//!                ↓
//!          Repository + flyer storage
//! ```
//!
//! Campaign submission persists a PENDING record and returns; delivery runs
//! in background tasks, one recipient at a time, with a humanization delay
//! applied before every send.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod render;
pub mod repo;
pub mod storage;
pub mod transport;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::EngineError;
pub use model::{Campaign, CampaignStatus, Contact, Invitation, InvitationStatus, Recipient};
pub use repo::{MemoryRepository, Repository};
pub use storage::FlyerStorage;
pub use transport::{Session, SessionState};
pub use web::AppState;
