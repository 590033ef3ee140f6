use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use tracing::debug;

use crate::{GeneratedImage, ImageBytes, ProviderError};

/// MIME type for the formats we are willing to embed, detected from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Validates provider output and turns it into a self-contained image.
///
/// The declared content type is advisory only; the embedded MIME type always
/// comes from the bytes themselves.
pub fn normalize(provider_id: &str, raw: ImageBytes) -> Result<GeneratedImage, ProviderError> {
    if raw.bytes.is_empty() {
        return Err(ProviderError::InvalidResponse("empty image body".to_string()));
    }
    let mime_type = sniff_mime(&raw.bytes).ok_or_else(|| {
        ProviderError::InvalidResponse(format!(
            "payload is not a supported image (declared {})",
            raw.mime_type.as_deref().unwrap_or("no content type")
        ))
    })?;
    if let Some(declared) = raw.mime_type.as_deref() {
        if !declared.eq_ignore_ascii_case(mime_type) {
            debug!("{provider_id} declared {declared} but payload is {mime_type}");
        }
    }

    let (width, height) = image::io::Reader::new(Cursor::new(&raw.bytes))
        .with_guessed_format()
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ProviderError::InvalidResponse(format!("unreadable image header: {e}")))?;

    Ok(GeneratedImage {
        provider_id: provider_id.to_string(),
        bytes: raw.bytes,
        mime_type: mime_type.to_string(),
        width,
        height,
    })
}

impl GeneratedImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}
