//! Pure validation of a candidate image before it enters the flow.

use crate::error::ImageRejection;
use crate::types::{CandidateImage, SelectedImage};

pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_CAPTURE_DIMENSION: u32 = 1920;

pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];
pub const ALLOWED_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

/// Check a candidate against the type and size rules. A declared media type
/// is trusted over the filename; the extension is only a fallback for
/// sources that provide no type at all.
pub fn check(candidate: &CandidateImage) -> Result<(), ImageRejection> {
    match candidate.media_type.as_deref() {
        Some(media_type) => {
            if !ALLOWED_MIME_TYPES.contains(&media_type) {
                return Err(ImageRejection::UnsupportedType);
            }
        }
        None => {
            let lower = candidate
                .file_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            if !ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                return Err(ImageRejection::UnsupportedType);
            }
        }
    }

    if candidate.byte_len() > MAX_FILE_BYTES {
        return Err(ImageRejection::TooLarge);
    }

    Ok(())
}

/// Promote a candidate to a selected image. This is the only constructor of
/// `SelectedImage`, so no unvalidated image can enter the flow.
pub fn admit(candidate: CandidateImage) -> Result<SelectedImage, ImageRejection> {
    check(&candidate)?;
    Ok(SelectedImage::new(candidate))
}

pub fn format_bytes(bytes: usize) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{:.0} KB", kb)
    } else {
        format!("{:.2} MB", kb / 1024.0)
    }
}
