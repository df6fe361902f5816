/// Agora media utility
///
/// Images travel inside records as base64 text: the picked bytes are
/// validated and encoded on the way in, and decoded back for rendering.
/// No re-compression happens here; callers hand over already-compressed
/// JPEG/PNG/GIF/WebP bytes.

pub mod codec;

pub use codec::{Image, ImageFormat, MAX_IMAGE_BYTES, decode, encode};
