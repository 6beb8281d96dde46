use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One end-to-end generation request: the user prompt plus an optional
/// reference image sent alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachedImage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: AttachedImage) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// An image attached to a request, held as base64 so the value serializes
/// cleanly and maps directly onto inline-data wire parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedImage {
    pub media_type: String,
    pub data: String,
}

impl AttachedImage {
    pub fn new(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Read a local file into an attachment, guessing the media type from the
    /// file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("could not read image {}", path.display()))?;
        let media_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_owned())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self::new(media_type, &bytes))
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Layout options for the downloadable composite grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridOptions {
    pub columns: u32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self { columns: 3 }
    }
}
