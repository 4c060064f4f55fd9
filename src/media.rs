//! Opaque image blobs stored under the media root.
//!
//! Clients send images as data URIs. They are written as-is to disk and only the relative path is
//! persisted; no decoding or resizing of the image itself takes place.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const AVATARS_DIR: &str = "avatars";
pub const RECIPE_IMAGES_DIR: &str = "recipes/images";
pub const MEDIA_URL_PREFIX: &str = "/media";

#[derive(Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Parse `data:image/<ext>;base64,<payload>`.
pub fn decode_data_uri(input: &str) -> AppResult<DecodedImage> {
    let invalid = || AppError::Validation("Image must be a base64 data URI".into());

    let rest = input.trim().strip_prefix("data:image/").ok_or_else(invalid)?;
    let (format, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;

    let extension = match format.to_ascii_lowercase().as_str() {
        "png" => "png",
        "jpg" | "jpeg" => "jpg",
        "gif" => "gif",
        "webp" => "webp",
        other => {
            return Err(AppError::Validation(format!(
                "Unsupported image format: {other}"
            )));
        }
    };

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Image is empty".into()));
    }

    Ok(DecodedImage { extension, bytes })
}

/// Decode `data_uri` and write it to `<media_root>/<subdir>/<uuid>.<ext>`.
/// Returns the path relative to the media root.
pub async fn save_image(media_root: &Path, subdir: &str, data_uri: &str) -> AppResult<String> {
    let image = decode_data_uri(data_uri)?;
    let relative = format!("{subdir}/{}.{}", Uuid::new_v4(), image.extension);

    let dir = media_root.join(subdir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    tokio::fs::write(media_root.join(&relative), &image.bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::debug!(path = %relative, size = image.bytes.len(), "image stored");
    Ok(relative)
}

pub async fn remove_image(media_root: &Path, relative: &str) {
    if let Err(err) = tokio::fs::remove_file(media_root.join(relative)).await {
        tracing::warn!(error = %err, path = %relative, "failed to remove image");
    }
}

pub fn media_url(relative: &str) -> String {
    format!("{MEDIA_URL_PREFIX}/{relative}")
}
