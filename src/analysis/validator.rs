use std::path::{Path, PathBuf};

use thiserror::Error;

/// Largest image the pipeline will accept (5 MiB).
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No image was supplied")]
    Empty,

    #[error("Image is too large ({size} bytes > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Where the bytes of a submitted image live until they are encoded.
#[derive(Debug, Clone)]
pub enum ImageContent {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// A file the user picked, before any checks have run.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub content: ImageContent,
}

impl ImageCandidate {
    /// Build a candidate from a file on disk. Size comes from the file metadata
    /// and the MIME type is guessed from the extension.
    ///
    /// Only regular files (after following symlinks) are accepted; pipes and
    /// devices report no meaningful size.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            name,
            mime_type,
            size_bytes: metadata.len(),
            content: ImageContent::File(path.to_path_buf()),
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: bytes.len() as u64,
            content: ImageContent::Memory(bytes),
        }
    }
}

/// An image that passed validation. Only [`ImageValidator::validate`] creates these.
#[derive(Debug, Clone)]
pub struct RawImage {
    name: String,
    mime_type: String,
    size_bytes: u64,
    limit: u64,
    content: ImageContent,
}

impl RawImage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// The size bound this image was validated against.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn content(&self) -> &ImageContent {
        &self.content
    }

    pub fn into_content(self) -> ImageContent {
        self.content
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    max_bytes: u64,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
        }
    }
}

impl ImageValidator {
    /// Limits above [`MAX_IMAGE_BYTES`] are clamped to it.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes: max_bytes.min(MAX_IMAGE_BYTES),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn validate(&self, candidate: Option<ImageCandidate>) -> Result<RawImage, ValidationError> {
        let candidate = candidate.ok_or(ValidationError::Empty)?;

        if candidate.size_bytes > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size: candidate.size_bytes,
                limit: self.max_bytes,
            });
        }

        let mime_type = candidate.mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(ValidationError::UnsupportedType(candidate.mime_type));
        }

        Ok(RawImage {
            name: candidate.name,
            mime_type,
            size_bytes: candidate.size_bytes,
            limit: self.max_bytes,
            content: candidate.content,
        })
    }
}
