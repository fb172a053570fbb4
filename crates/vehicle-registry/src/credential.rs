use anyhow::{Context, Result};
use common::vehicles::CredentialPayload;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Renders the registration credential as a QR code PNG
#[derive(Debug, Clone, Copy)]
pub struct CredentialEncoder {
    /// Pixels per QR module
    module_size: u32,
}

impl Default for CredentialEncoder {
    fn default() -> Self {
        Self { module_size: 10 }
    }
}

impl CredentialEncoder {
    pub fn new(module_size: u32) -> Self {
        Self {
            module_size: module_size.max(1),
        }
    }

    /// JSON text carried by the QR code
    pub fn payload_text(payload: &CredentialPayload) -> Result<String> {
        serde_json::to_string(payload).context("failed to serialize credential payload")
    }

    /// PNG bytes of the QR code for `payload`
    pub fn encode_png(&self, payload: &CredentialPayload) -> Result<Vec<u8>> {
        let text = Self::payload_text(payload)?;
        let code = QrCode::new(text.as_bytes()).context("failed to build QR code")?;
        let rendered = code
            .render::<Luma<u8>>()
            .module_dimensions(self.module_size, self.module_size)
            .quiet_zone(true)
            .build();

        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(rendered)
            .write_to(&mut png, ImageFormat::Png)
            .context("failed to encode QR code as PNG")?;
        Ok(png.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CredentialPayload {
        CredentialPayload {
            plate_number: "XYZ-999".to_string(),
            driver_name: "Jamie Doe".to_string(),
            car_color: Some("red".to_string()),
            car_type: None,
        }
    }

    #[test]
    fn test_payload_text_round_trips() {
        let text = CredentialEncoder::payload_text(&payload()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["plate_number"], "XYZ-999");
        assert_eq!(value["driver_name"], "Jamie Doe");
        assert_eq!(value["car_color"], "red");
        assert!(value["car_type"].is_null());
    }

    #[test]
    fn test_encode_png() {
        let png = CredentialEncoder::default().encode_png(&payload()).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_luma8();

        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % 10, 0);
        // Quiet zone is white, the finder pattern corner is dark
        assert_eq!(img.get_pixel(0, 0)[0], 255);
        assert_eq!(img.get_pixel(45, 45)[0], 0);
    }
}
