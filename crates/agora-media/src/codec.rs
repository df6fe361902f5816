use anyhow::{Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// 5 MB cap on a single embedded image
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Identify the format from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

/// A decoded, renderable image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Encode picked image bytes into the opaque payload stored in records.
pub fn encode(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        bail!("Empty image");
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        bail!("Image too large: {} bytes (max {})", bytes.len(), MAX_IMAGE_BYTES);
    }
    ImageFormat::sniff(bytes).ok_or_else(|| anyhow!("Unrecognised image format"))?;
    Ok(BASE64.encode(bytes))
}

/// Decode a stored payload. Line breaks inside the payload are tolerated,
/// since some platform encoders wrap base64 output every 76 characters.
pub fn decode(payload: &str) -> Result<Image> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        bail!("Empty image payload");
    }

    let bytes = BASE64.decode(compact.as_bytes())?;
    let format = ImageFormat::sniff(&bytes).ok_or_else(|| anyhow!("Payload is not an image"))?;
    Ok(Image { format, bytes })
}
