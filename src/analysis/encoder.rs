use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::validator::{ImageContent, RawImage};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image changed after validation (read {size} bytes, limit {limit} bytes)")]
    SizeChanged { size: u64, limit: u64 },

    #[error("Encoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Base64 image data ready to be inlined into a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    mime_type: String,
    data: String,
}

impl EncodedPayload {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEncoder;

impl ImageEncoder {
    /// Files are read through a `limit + 1` window, so a file that grew (or
    /// never ends) fails with [`EncodeError::SizeChanged`] without being
    /// buffered whole.
    pub async fn encode(&self, image: RawImage) -> Result<EncodedPayload, EncodeError> {
        let limit = image.limit();
        let name = image.name().to_string();
        let mime_type = image.mime_type().to_string();

        let bytes = match image.into_content() {
            ImageContent::File(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let mut bytes = Vec::new();
                file.take(limit + 1).read_to_end(&mut bytes).await?;
                bytes
            }
            ImageContent::Memory(bytes) => bytes,
        };

        let size = bytes.len() as u64;
        if size > limit {
            return Err(EncodeError::SizeChanged { size, limit });
        }

        let data = tokio::task::spawn_blocking(move || STANDARD.encode(&bytes)).await?;
        debug!("Encoded {} ({} bytes -> {} chars)", name, size, data.len());

        Ok(EncodedPayload { mime_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::validator::{ImageCandidate, ImageValidator};

    #[tokio::test]
    async fn test_encode_in_memory_image() {
        let image = ImageValidator::default()
            .validate(Some(ImageCandidate::from_bytes("a.png", "image/png", b"hello".to_vec())))
            .unwrap();

        let payload = ImageEncoder.encode(image).await.unwrap();
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.data(), "aGVsbG8=");
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_encode_file_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skin.jpg");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        std::fs::write(&path, &bytes).unwrap();

        let candidate = ImageCandidate::from_path(&path).await.unwrap();
        let image = ImageValidator::default().validate(Some(candidate)).unwrap();
        let payload = ImageEncoder.encode(image).await.unwrap();

        assert_eq!(payload.mime_type(), "image/jpeg");
        assert_eq!(payload.decode().unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let candidate = ImageCandidate::from_path(&path).await.unwrap();
        let image = ImageValidator::default().validate(Some(candidate)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(ImageEncoder.encode(image).await, Err(EncodeError::Io(_))));
    }

    #[tokio::test]
    async fn test_file_grown_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.jpg");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let candidate = ImageCandidate::from_path(&path).await.unwrap();
        let image = ImageValidator::new(16).validate(Some(candidate)).unwrap();
        std::fs::write(&path, [0u8; 4096]).unwrap();

        // Reading stops one byte past the limit
        assert!(matches!(
            ImageEncoder.encode(image).await,
            Err(EncodeError::SizeChanged { size: 17, limit: 16 })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unbounded_source_read_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.jpg");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let candidate = ImageCandidate::from_path(&path).await.unwrap();
        let image = ImageValidator::new(1024).validate(Some(candidate)).unwrap();

        // Swap the file for an endless device after validation
        std::fs::remove_file(&path).unwrap();
        std::os::unix::fs::symlink("/dev/zero", &path).unwrap();

        assert!(matches!(
            ImageEncoder.encode(image).await,
            Err(EncodeError::SizeChanged { size: 1025, limit: 1024 })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_encode_round_trips(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..4096)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let image = ImageValidator::default()
                .validate(Some(ImageCandidate::from_bytes("p.gif", "image/gif", bytes.clone())))
                .unwrap();
            let payload = runtime.block_on(ImageEncoder.encode(image)).unwrap();
            proptest::prop_assert_eq!(payload.decode().unwrap(), bytes);
        }
    }
}
