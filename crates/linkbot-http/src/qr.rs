//! Rendering QR payloads as embeddable images.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::render::svg;
use qrcode::types::QrError;
use qrcode::QrCode;
use thiserror::Error;

/// Rendered edge length in pixels; big enough to scan from a laptop screen.
const MIN_DIMENSION: u32 = 256;

#[derive(Error, Debug)]
pub enum QrRenderError {
    #[error("QR payload is empty")]
    Empty,
    #[error("Cannot encode QR payload: {0}")]
    Encode(#[from] QrError),
}

/// Render `payload` as an SVG document.
pub fn render_svg(payload: &str) -> Result<String, QrRenderError> {
    if payload.is_empty() {
        return Err(QrRenderError::Empty);
    }
    let code = QrCode::new(payload.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .quiet_zone(true)
        .build())
}

/// Render `payload` as a `data:image/svg+xml;base64,...` URL for `<img src>`.
pub fn render_data_url(payload: &str) -> Result<String, QrRenderError> {
    let svg = render_svg(payload)?;
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
}
