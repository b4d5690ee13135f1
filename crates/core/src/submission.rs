//! Generation request validation.
//!
//! Requests are checked locally before they reach the submission
//! endpoint so that obviously invalid input never creates a job.

use crate::error::CoreError;
use crate::task::GenerationMode;

/// Minimum prompt length in characters.
pub const PROMPT_MIN_CHARS: usize = 1;

/// Maximum prompt length in characters.
pub const PROMPT_MAX_CHARS: usize = 1000;

/// An image uploaded alongside an image-to-video request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A generation job as the user asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub prompt: String,
    pub mode: GenerationMode,
    pub source_image: Option<SourceImage>,
}

impl SubmitRequest {
    pub fn new(prompt: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
            source_image: None,
        }
    }

    pub fn with_source_image(mut self, image: SourceImage) -> Self {
        self.source_image = Some(image);
        self
    }

    /// Reject empty or oversized prompts and image-to-video requests
    /// without a source image.
    pub fn validate(&self) -> Result<(), CoreError> {
        let chars = self.prompt.chars().count();
        if chars < PROMPT_MIN_CHARS {
            return Err(CoreError::Validation(format!(
                "prompt must be at least {PROMPT_MIN_CHARS} character"
            )));
        }
        if chars > PROMPT_MAX_CHARS {
            return Err(CoreError::Validation(format!(
                "prompt must be at most {PROMPT_MAX_CHARS} characters, got {chars}"
            )));
        }
        if self.mode.requires_source_image() && self.source_image.is_none() {
            return Err(CoreError::Validation(format!(
                "{} requires a source image",
                self.mode
            )));
        }
        if let Some(image) = &self.source_image {
            if image.bytes.is_empty() {
                return Err(CoreError::Validation("source image is empty".into()));
            }
        }
        Ok(())
    }
}
