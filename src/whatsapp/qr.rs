//! Pairing QR rendering.

use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::{GateError, Result};

fn encode(code: &str) -> Result<QrCode> {
    let payload = code.trim();
    if payload.is_empty() {
        return Err(GateError::InvalidRequest("QR payload is empty".to_string()));
    }
    QrCode::new(payload.as_bytes())
        .map_err(|e| GateError::InvalidRequest(format!("Failed to encode QR payload: {}", e)))
}

/// Render a pairing payload as a `data:image/png;base64,...` URI.
pub fn render_data_uri(code: &str) -> Result<String> {
    let qr = encode(code)?;
    let img = qr
        .render::<Luma<u8>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| GateError::WhatsApp(format!("Failed to encode QR PNG: {}", e)))?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Render a pairing payload as terminal-friendly text.
pub fn render_terminal(code: &str) -> Result<String> {
    let qr = encode(code)?;
    Ok(qr
        .render::<qrcode::render::unicode::Dense1x2>()
        .quiet_zone(true)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "2@Xk3vQ9aT,p5Qm0w8kZl/ZfXy1e2R+Q==,aGVsbG8=,d29ybGQ=";

    #[test]
    fn test_render_data_uri_is_png() {
        let uri = render_data_uri(PAYLOAD).unwrap();
        let b64 = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_render_rejects_empty_payload() {
        let err = render_data_uri("   ").unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(render_terminal("").is_err());
    }

    #[test]
    fn test_render_terminal_outputs_multiline_text() {
        let rendered = render_terminal(PAYLOAD).unwrap();
        assert!(rendered.lines().count() > 10);
    }
}
