//! Flyer compositing: background + personalized text + optional QR block.
//!
//! Pure transformation from decoded background, normalized overlay and
//! per-recipient content to encoded PNG bytes. No state, no I/O beyond the
//! font lookup.

use std::io::Cursor;

use ab_glyph::PxScale;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, Blend};
use tracing::debug;

use crate::error::EngineError;
use crate::render::fonts::FontCatalog;
use crate::render::overlay::{place, Overlay};

/// Fixed drop-shadow: 50% black, drawn at these offsets below the text.
const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 128]);
const SHADOW_OFFSETS: &[(i64, i64)] = &[(0, 2), (1, 3)];

/// Fallback native dimension when image metadata is unreadable.
const FALLBACK_DIMENSION: u32 = 1000;

/// Decode an image and apply its EXIF orientation correction.
pub fn decode_normalized(bytes: &[u8]) -> Result<DynamicImage, EngineError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::Render(e.to_string()))?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Native dimensions of the background, defaulting a missing/zero dimension
/// to 1000 instead of failing.
pub fn native_dimensions(image: &DynamicImage) -> (u32, u32) {
    let width = image.width();
    let height = image.height();
    (
        if width == 0 { FALLBACK_DIMENSION } else { width },
        if height == 0 { FALLBACK_DIMENSION } else { height },
    )
}

/// Render a QR code for the given payload as a high-resolution square
/// (around 500 px, for clean downscaling), including the quiet zone.
pub fn generate_qr(data: &str) -> Result<RgbaImage, EngineError> {
    const QUIET_ZONE: usize = 4;
    const TARGET_SIZE: usize = 500;

    let code =
        qrcode::QrCode::new(data.as_bytes()).map_err(|e| EngineError::Render(e.to_string()))?;
    let modules = code.width();
    let colors = code.to_colors();

    let total = modules + 2 * QUIET_ZONE;
    let scale = (TARGET_SIZE / total).max(1);
    let dim = (total * scale) as u32;

    let white = Rgba([255, 255, 255, 255]);
    let black = Rgba([0, 0, 0, 255]);
    let mut image = RgbaImage::from_pixel(dim, dim, white);

    for (i, color) in colors.iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let module_x = (QUIET_ZONE + i % modules) * scale;
        let module_y = (QUIET_ZONE + i / modules) * scale;
        for dy in 0..scale {
            for dx in 0..scale {
                image.put_pixel((module_x + dx) as u32, (module_y + dy) as u32, black);
            }
        }
    }

    Ok(image)
}

/// Encode pixels as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EngineError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Composite one personalized flyer.
///
/// Draws the background at native size, the text with the fixed drop shadow
/// anchored top-baseline/left at the transformed position, and the QR image
/// (shadow-free) as an axis-aligned square. Output is a single flat PNG.
pub fn render(
    background: &DynamicImage,
    overlay: &Overlay,
    text: &str,
    qr: Option<&RgbaImage>,
    fonts: &FontCatalog,
) -> Result<Vec<u8>, EngineError> {
    let (width, height) = native_dimensions(background);
    let placement = place(overlay, width, height);

    debug!(
        width = width,
        height = height,
        x = placement.x,
        y = placement.y,
        font_size = placement.font_size,
        qr = placement.qr.is_some(),
        "flyer_placement"
    );

    let mut canvas = background.to_rgba8();

    if !text.is_empty() {
        let font = fonts.load(overlay.font_family).ok_or_else(|| {
            EngineError::Render("no usable overlay font installed".to_string())
        })?;
        let scale = PxScale::from(placement.font_size as f32);

        let mut shadowed = Blend(canvas);
        for (dx, dy) in SHADOW_OFFSETS {
            draw_text_mut(
                &mut shadowed,
                SHADOW_COLOR,
                (placement.x + dx) as i32,
                (placement.y + dy) as i32,
                scale,
                &font,
                text,
            );
        }
        canvas = shadowed.0;

        draw_text_mut(
            &mut canvas,
            overlay.color,
            placement.x as i32,
            placement.y as i32,
            scale,
            &font,
            text,
        );
    }

    if let (Some(qr_image), Some(qr_place)) = (qr, placement.qr.as_ref()) {
        if qr_place.size > 0 {
            let resized = image::imageops::resize(
                qr_image,
                qr_place.size,
                qr_place.size,
                image::imageops::FilterType::Nearest,
            );
            image::imageops::overlay(&mut canvas, &resized, qr_place.x, qr_place.y);
        }
    }

    encode_png(&canvas)
}
