//! PNG to JPEG conversion of backend output.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use crate::error::CoreError;

/// JPEG quality used for delivered images.
pub const JPEG_QUALITY: u8 = 80;

/// Decode a PNG (or any supported format) and re-encode it as JPEG.
///
/// Alpha is dropped; JPEG has no transparency.
pub fn png_to_jpeg(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let img = image::load_from_memory(data)
        .map_err(|e| CoreError::Transcode(format!("decode: {e}")))?;
    let rgb = img.to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| CoreError::Transcode(format!("encode: {e}")))?;
    Ok(out.into_inner())
}
