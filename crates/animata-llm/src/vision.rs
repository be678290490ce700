//! Image loading for vision messages.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::LlmError;

/// Read an image file and base64-encode it.
///
/// Returns the encoded bytes and the media type inferred from the file
/// extension.
///
/// # Errors
/// Returns [`LlmError::Image`] when the file cannot be read.
pub async fn read_and_encode_image(path: &str) -> Result<(String, &'static str), LlmError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LlmError::Image(format!("failed to read {path}: {e}")))?;

    Ok((BASE64.encode(bytes), detect_media_type(path)))
}

/// Media type from the file extension; JPEG when unrecognized.
#[must_use]
pub fn detect_media_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn media_type_follows_extension() {
        assert_eq!(detect_media_type("/tmp/photo.png"), "image/png");
        assert_eq!(detect_media_type("/tmp/photo.PNG"), "image/png");
        assert_eq!(detect_media_type("/tmp/photo.jpg"), "image/jpeg");
        assert_eq!(detect_media_type("/tmp/photo.jpeg"), "image/jpeg");
        assert_eq!(detect_media_type("/tmp/photo.gif"), "image/gif");
        assert_eq!(detect_media_type("/tmp/photo.webp"), "image/webp");
        assert_eq!(detect_media_type("/tmp/photo.bmp"), "image/jpeg");
        assert_eq!(detect_media_type("/tmp/no_extension"), "image/jpeg");
    }

    #[tokio::test]
    async fn encodes_file_contents() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"fake image bytes").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let (encoded, media_type) = read_and_encode_image(&path).await.unwrap();

        assert_eq!(media_type, "image/png");
        assert_eq!(encoded, BASE64.encode(b"fake image bytes"));
    }

    #[tokio::test]
    async fn missing_file_is_an_image_error() {
        let err = read_and_encode_image("/definitely/not/here.png")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Image(_)));
    }
}
