use base64::Engine;
use image::ImageFormat;

/// A validated reference image, stored as bare base64.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub base64: String,
    pub mime_type: &'static str,
    pub format: ImageFormat,
}

/// Decode a base64 image payload, accepting either bare base64 or a
/// `data:<mime>;base64,<payload>` URL, and check that it is a known image
/// format.
pub fn decode_reference_image(encoded: &str) -> Result<ReferenceImage, ImageError> {
    let payload = strip_data_url(encoded.trim())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| ImageError::InvalidBase64)?;

    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let format = image::guess_format(&bytes).map_err(|_| ImageError::UnsupportedFormat)?;

    Ok(ReferenceImage {
        base64: payload.to_string(),
        mime_type: format.to_mime_type(),
        format,
    })
}

/// Decode any stored image (data URL or bare base64) into raw bytes plus a
/// file extension suitable for writing it to disk.
pub fn decode_to_bytes(encoded: &str) -> Result<(Vec<u8>, &'static str), ImageError> {
    let payload = strip_data_url(encoded.trim())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| ImageError::InvalidBase64)?;
    let format = image::guess_format(&bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    Ok((bytes, extension))
}

pub fn to_data_url(mime_type: &str, base64: &str) -> String {
    format!("data:{mime_type};base64,{base64}")
}

fn strip_data_url(value: &str) -> Result<&str, ImageError> {
    if !value.starts_with("data:") {
        return Ok(value);
    }
    value
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or(ImageError::InvalidDataUrl)
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ImageError {
    #[error("Image is not valid base64")]
    InvalidBase64,

    #[error("Image data URL must be base64-encoded")]
    InvalidDataUrl,

    #[error("Image is empty")]
    Empty,

    #[error("Unsupported image format")]
    UnsupportedFormat,
}
