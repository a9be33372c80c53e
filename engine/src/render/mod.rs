//! Flyer render pipeline.
//!
//! Maps user-authored preview-space overlay coordinates into native image
//! coordinates and composites personalized text and QR content onto the
//! campaign template.

pub mod flyer;
pub mod fonts;
pub mod overlay;

pub use flyer::{decode_normalized, encode_png, generate_qr, native_dimensions, render};
pub use fonts::FontCatalog;
pub use overlay::{place, FontFamily, Overlay, Placement, RawOverlayConfig};
