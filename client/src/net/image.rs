//! Image attachments encoded as data URIs for the `image` message field.

#[cfg(test)]
#[path = "image_test.rs"]
mod image_test;

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Largest attachment accepted before encoding.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

/// Read `path` and encode it as `data:<mime>;base64,<payload>`.
///
/// # Errors
///
/// Returns [`ImageError`] when the file is unreadable, too large, or not a
/// recognized image extension.
pub async fn encode_data_uri(path: &Path) -> Result<String, ImageError> {
    let mime = mime_for(path)?;
    let read_err = |source| ImageError::Read { path: path.to_path_buf(), source };

    let size = tokio::fs::metadata(path).await.map_err(read_err)?.len();
    if size > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge { size, limit: MAX_IMAGE_BYTES });
    }

    let bytes = tokio::fs::read(path).await.map_err(read_err)?;
    Ok(data_uri(mime, &bytes))
}

#[must_use]
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn mime_for(path: &Path) -> Result<&'static str, ImageError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        _ => Err(ImageError::UnsupportedType(path.display().to_string())),
    }
}
