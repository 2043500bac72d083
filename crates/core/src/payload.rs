//! Decoding of image payloads carried inside push-channel frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;

/// Decode an image payload that is either raw base64 or a
/// `data:image/<kind>;base64,<data>` URI.
pub fn decode_image_payload(data: &str) -> Result<Vec<u8>, CoreError> {
    let encoded = if data.starts_with("data:") {
        let (header, body) = data
            .split_once(',')
            .ok_or_else(|| CoreError::InvalidFrame("data URI without payload".into()))?;
        if !header.starts_with("data:image/") {
            return Err(CoreError::InvalidFrame(format!(
                "unsupported data URI type: {header}"
            )));
        }
        body
    } else {
        data
    };

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CoreError::InvalidFrame(format!("invalid base64 image: {e}")))?;

    if bytes.is_empty() {
        return Err(CoreError::InvalidFrame("empty image payload".into()));
    }
    Ok(bytes)
}
