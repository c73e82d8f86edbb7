//! Thumbnail derivation.
//!
//! Thumbnails are resized with a cover fit (crop to fill, centered) and
//! re-encoded as JPEG at the configured quality, regardless of the source
//! format.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use super::config::ThumbnailOptions;
use super::error::StorageError;
use super::provider::StorageFile;

/// Render thumbnail bytes from an image file.
///
/// # Errors
///
/// Returns an unsupported-operation error for non-image input and an
/// operation error if the bytes cannot be decoded or re-encoded.
pub(crate) fn render_thumbnail(
    file: &StorageFile,
    options: &ThumbnailOptions,
) -> Result<Vec<u8>, StorageError> {
    if !file.is_image() {
        return Err(StorageError::unsupported(format!(
            "thumbnail generation for '{}'",
            file.mime_type
        )));
    }

    let source = image::load_from_memory(&file.buffer).map_err(|e| {
        StorageError::operation(format!("decode {}: {e}", file.original_name))
    })?;

    let resized = source.resize_to_fill(options.width, options.height, FilterType::Lanczos3);

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, options.quality);
    resized.write_with_encoder(encoder).map_err(|e| {
        StorageError::operation(format!("encode thumbnail for {}: {e}", file.original_name))
    })?;

    Ok(encoded)
}

/// Derived file name for a thumbnail: the source stem with a `.jpg`
/// extension.
pub(crate) fn thumbnail_name(original_name: &str) -> String {
    let stem = match original_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original_name,
    };
    format!("{stem}.jpg")
}
