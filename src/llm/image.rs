//! Prepares stored image bytes for upload.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::llm::provider::ImagePayload;

/// Flattens transparency before upload: images with an alpha channel are
/// re-encoded as opaque RGB PNG. Everything else is sent as stored.
/// Bytes that fail to decode are sent as-is under their declared format
/// and left for the backend to reject.
pub fn normalize_for_upload(data: &[u8], extension: &str) -> ImagePayload {
    match image::load_from_memory(data) {
        Ok(decoded) if decoded.color().has_alpha() => {
            let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
            let mut out = Cursor::new(Vec::new());
            match rgb.write_to(&mut out, ImageFormat::Png) {
                Ok(()) => ImagePayload {
                    bytes: out.into_inner(),
                    mime_type: "image/png".to_string(),
                },
                Err(e) => {
                    warn!(error = %e, "alpha flatten failed, uploading original bytes");
                    declared(data, extension)
                }
            }
        }
        Ok(_) => declared(data, extension),
        Err(e) => {
            debug!(error = %e, format = extension, "undecodable image uploaded as declared format");
            declared(data, extension)
        }
    }
}

fn declared(data: &[u8], extension: &str) -> ImagePayload {
    ImagePayload {
        bytes: data.to_vec(),
        mime_type: mime_for_extension(extension),
    }
}

fn mime_for_extension(extension: &str) -> String {
    match extension {
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        "bmp" => "image/bmp".to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        "webp" => "image/webp".to_string(),
        _ => "image/png".to_string(),
    }
}
