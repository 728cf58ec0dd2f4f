//! Output produced by a run.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Prefix marking standard-error text in the console.
pub const STDERR_PREFIX: &str = "Error: ";

/// One piece of streamed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stream", content = "text", rename_all = "snake_case")]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

impl OutputChunk {
    /// Console text for this chunk; stderr is tagged with `Error: `.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Stdout(s) => s.clone(),
            Self::Stderr(s) => format!("{STDERR_PREFIX}{s}"),
        }
    }

    #[must_use]
    pub const fn is_stderr(&self) -> bool {
        matches!(self, Self::Stderr(_))
    }

    fn len(&self) -> usize {
        match self {
            Self::Stdout(s) | Self::Stderr(s) => s.len(),
        }
    }
}

/// A rendered plot (PNG bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    data: Bytes,
}

impl ImageArtifact {
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Decode an artifact from base64 text.
    ///
    /// # Errors
    /// Returns error if the text is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded.trim()).map(Self::new)
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Data URL usable as an `<img>` source.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Rendered console lines in emission order.
    pub text: Vec<String>,
    /// Plots in creation order.
    pub images: Vec<ImageArtifact>,
}

/// Event recorded in the output store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Text(OutputChunk),
    Image(ImageArtifact),
    /// Previous output was discarded.
    Cleared,
    /// The run finished.
    Finished,
}

impl OutputEvent {
    /// Approximate memory footprint, used for history limits.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 8;
        match self {
            Self::Text(chunk) => chunk.len() + OVERHEAD,
            Self::Image(image) => image.len() + OVERHEAD,
            Self::Cleared | Self::Finished => OVERHEAD,
        }
    }
}
