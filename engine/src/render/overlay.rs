//! Overlay configuration and the preview-to-native coordinate transform.
//!
//! Overlay positions are authored against a preview rendering of the
//! background whose dimensions may differ from the native image (the
//! preview is scaled to fit a UI viewport, with no aspect lock). The raw
//! config arrives loosely typed from the client and is normalized into
//! [`Overlay`] at the dispatcher boundary before it reaches the renderer.

use image::Rgba;
use serde::Deserialize;
use tracing::warn;

/// Overlay config exactly as submitted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOverlayConfig {
    /// Text anchor, preview-space pixels
    pub x: f64,
    pub y: f64,
    #[serde(rename = "fontSize")]
    pub font_size: f64,
    /// CSS-style color spec, e.g. "#ff0040"
    pub color: String,
    #[serde(default, rename = "fontFamily")]
    pub font_family: Option<String>,
    /// Preview canvas dimensions; absent means coordinates are native-space
    #[serde(default, rename = "previewWidth")]
    pub preview_width: Option<f64>,
    #[serde(default, rename = "previewHeight")]
    pub preview_height: Option<f64>,
    #[serde(default, rename = "qrConfig")]
    pub qr_config: Option<RawQrConfig>,
}

/// QR block config as submitted. `enabled` historically arrives as either
/// a boolean or the literal string "true"; anything else means disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct RawQrConfig {
    #[serde(default)]
    pub enabled: serde_json::Value,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub size: f64,
}

impl RawQrConfig {
    /// Tolerant read of the enabled flag.
    pub fn is_enabled(&self) -> bool {
        match &self.enabled {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s == "true",
            _ => false,
        }
    }
}

/// Font family token mapped to a fixed font stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFamily {
    Sans,
    Serif,
    Mono,
    Ubuntu,
}

impl FontFamily {
    /// Unrecognized or absent tokens fall back to sans.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("serif") => FontFamily::Serif,
            Some("mono") => FontFamily::Mono,
            Some("ubuntu") => FontFamily::Ubuntu,
            _ => FontFamily::Sans,
        }
    }
}

/// Strongly typed overlay used by the renderer.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub color: Rgba<u8>,
    pub font_family: FontFamily,
    pub preview_width: Option<f64>,
    pub preview_height: Option<f64>,
    /// Present only when the QR block is enabled
    pub qr: Option<QrOverlay>,
}

#[derive(Debug, Clone)]
pub struct QrOverlay {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl Overlay {
    /// Normalize a raw client config into the typed overlay.
    pub fn from_raw(raw: &RawOverlayConfig) -> Self {
        let qr = raw
            .qr_config
            .as_ref()
            .filter(|qr| qr.is_enabled())
            .map(|qr| QrOverlay {
                x: qr.x,
                y: qr.y,
                size: qr.size,
            });

        Overlay {
            x: raw.x,
            y: raw.y,
            font_size: raw.font_size,
            color: parse_color(&raw.color),
            font_family: FontFamily::from_token(raw.font_family.as_deref()),
            preview_width: raw.preview_width,
            preview_height: raw.preview_height,
            qr,
        }
    }
}

/// Parse a hex color spec. Unparseable values fall back to black.
pub fn parse_color(spec: &str) -> Rgba<u8> {
    let hex = spec.trim().trim_start_matches('#');
    // Slicing below is byte-indexed; non-ASCII input must not reach it
    let parsed = if !hex.is_ascii() {
        None
    } else {
        match hex.len() {
            3 => {
                let digit =
                    |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
                digit(0).and_then(|r| digit(1).and_then(|g| digit(2).map(|b| (r, g, b))))
            }
            6 => {
                let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                byte(0).and_then(|r| byte(2).and_then(|g| byte(4).map(|b| (r, g, b))))
            }
            _ => None,
        }
    };

    match parsed {
        Some((r, g, b)) => Rgba([r, g, b, 255]),
        None => {
            warn!(color = spec, "overlay_color_unparseable");
            Rgba([0, 0, 0, 255])
        }
    }
}

/// Resolved native-space placement of the text and QR elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub font_size: u32,
    pub qr: Option<QrPlacement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPlacement {
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

/// Minimum native font size, keeps text visible after extreme downscale.
const MIN_FONT_SIZE: u32 = 10;

/// Preview-to-native scale factor for one axis. A missing or non-positive
/// preview dimension means the coordinates are already native-space.
fn scale_factor(native: u32, preview: Option<f64>) -> f64 {
    match preview {
        Some(p) if p > 0.0 => f64::from(native) / p,
        _ => 1.0,
    }
}

/// Map the overlay's preview-space geometry into native image coordinates.
///
/// The font size scales with the X axis only; the QR block's x, y and size
/// use the same scale pair, size following X.
pub fn place(overlay: &Overlay, native_width: u32, native_height: u32) -> Placement {
    let scale_x = scale_factor(native_width, overlay.preview_width);
    let scale_y = scale_factor(native_height, overlay.preview_height);

    let font_size = (overlay.font_size * scale_x).round() as i64;
    let font_size = font_size.max(i64::from(MIN_FONT_SIZE)) as u32;

    let qr = overlay.qr.as_ref().map(|qr| QrPlacement {
        x: (qr.x * scale_x).round() as i64,
        y: (qr.y * scale_y).round() as i64,
        size: (qr.size * scale_x).round().max(0.0) as u32,
    });

    Placement {
        x: (overlay.x * scale_x).round() as i64,
        y: (overlay.y * scale_y).round() as i64,
        font_size,
        qr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(
        x: f64,
        y: f64,
        font_size: f64,
        preview: Option<(f64, f64)>,
        qr: Option<QrOverlay>,
    ) -> Overlay {
        Overlay {
            x,
            y,
            font_size,
            color: Rgba([255, 255, 255, 255]),
            font_family: FontFamily::Sans,
            preview_width: preview.map(|p| p.0),
            preview_height: preview.map(|p| p.1),
            qr,
        }
    }

    #[test]
    fn test_place_scales_from_preview_space() {
        // 1200x1600 native authored against a 500x500 preview
        let o = overlay(100.0, 100.0, 50.0, Some((500.0, 500.0)), None);
        let p = place(&o, 1200, 1600);
        assert_eq!(p.x, 240);
        assert_eq!(p.y, 320);
        assert_eq!(p.font_size, 120);
    }

    #[test]
    fn test_place_qr_uses_same_scale_pair() {
        let qr = QrOverlay { x: 10.0, y: 10.0, size: 100.0 };
        let o = overlay(0.0, 0.0, 20.0, Some((500.0, 500.0)), Some(qr));
        let p = place(&o, 1200, 1600);
        let qr = p.qr.unwrap();
        assert_eq!(qr.x, 24);
        assert_eq!(qr.y, 32);
        assert_eq!(qr.size, 240);
    }

    #[test]
    fn test_place_without_preview_is_identity() {
        let o = overlay(100.0, 150.0, 40.0, None, None);
        let p = place(&o, 1200, 1600);
        assert_eq!(p.x, 100);
        assert_eq!(p.y, 150);
        assert_eq!(p.font_size, 40);
    }

    #[test]
    fn test_place_non_positive_preview_is_identity() {
        let o = overlay(100.0, 150.0, 40.0, Some((0.0, -5.0)), None);
        let p = place(&o, 1200, 1600);
        assert_eq!(p.x, 100);
        assert_eq!(p.y, 150);
    }

    #[test]
    fn test_font_size_floor() {
        let o = overlay(0.0, 0.0, 50.0, Some((1000.0, 1000.0)), None);
        // Extreme downscale: 50 * (100/1000) = 5, floored to 10
        let p = place(&o, 100, 100);
        assert_eq!(p.font_size, 10);
    }

    #[test]
    fn test_enabled_flag_boolean() {
        let raw: RawQrConfig =
            serde_json::from_str(r#"{"enabled": true, "x": 1, "y": 2, "size": 3}"#).unwrap();
        assert!(raw.is_enabled());
    }

    #[test]
    fn test_enabled_flag_string_true() {
        let raw: RawQrConfig =
            serde_json::from_str(r#"{"enabled": "true", "x": 1, "y": 2, "size": 3}"#).unwrap();
        assert!(raw.is_enabled());
    }

    #[test]
    fn test_enabled_flag_anything_else_is_disabled() {
        for value in [r#""false""#, "0", "1", "null", r#""yes""#] {
            let json = format!(r#"{{"enabled": {value}, "x": 1, "y": 2, "size": 3}}"#);
            let raw: RawQrConfig = serde_json::from_str(&json).unwrap();
            assert!(!raw.is_enabled(), "{value} should be disabled");
        }
    }

    #[test]
    fn test_from_raw_drops_disabled_qr() {
        let raw: RawOverlayConfig = serde_json::from_str(
            r##"{"x": 1, "y": 2, "fontSize": 30, "color": "#ffffff",
                "qrConfig": {"enabled": false, "x": 1, "y": 2, "size": 3}}"##,
        )
        .unwrap();
        assert!(Overlay::from_raw(&raw).qr.is_none());
    }

    #[test]
    fn test_font_family_fallback() {
        assert_eq!(FontFamily::from_token(Some("serif")), FontFamily::Serif);
        assert_eq!(FontFamily::from_token(Some("comic")), FontFamily::Sans);
        assert_eq!(FontFamily::from_token(None), FontFamily::Sans);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff0040"), Rgba([255, 0, 64, 255]));
        assert_eq!(parse_color("ff0040"), Rgba([255, 0, 64, 255]));
        assert_eq!(parse_color("#fff"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_color("not-a-color"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_parse_color_multibyte_falls_back() {
        let black = Rgba([0, 0, 0, 255]);
        // 'é' is two bytes: these trim to 3 and 6 bytes respectively and
        // must fall back instead of slicing mid-character
        assert_eq!(parse_color("#\u{e9}1"), black);
        assert_eq!(parse_color("#\u{e9}\u{e9}\u{e9}"), black);
    }
}
