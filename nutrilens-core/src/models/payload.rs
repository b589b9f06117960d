//! Analysis payload types.
//!
//! A payload is what the user captured locally: a free-text meal description
//! and, optionally, a photo. It is persisted inside job records, so it must
//! round-trip through JSON.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Photo attached to an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPhoto {
    /// MIME type (e.g. `image/jpeg`).
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data_base64: String,
}

/// The content to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Free-text meal description (e.g. "grilled chicken, 200g").
    pub description: String,
    /// Optional photo of the meal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<MealPhoto>,
}

impl AnalysisPayload {
    /// Creates a text-only payload.
    pub fn from_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            photo: None,
        }
    }

    /// Attaches an already-encoded photo.
    #[must_use]
    pub fn with_photo(mut self, photo: MealPhoto) -> Self {
        self.photo = Some(photo);
        self
    }

    /// Checks that there is something to analyze.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPayload`] when the description is blank and
    /// there is no photo, or when the photo has no data.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(photo) = &self.photo {
            if photo.data_base64.is_empty() {
                return Err(CoreError::InvalidPayload("photo has no data".to_string()));
            }
            if !photo.mime_type.starts_with("image/") {
                return Err(CoreError::InvalidPayload(format!(
                    "unsupported photo type: {}",
                    photo.mime_type
                )));
            }
            return Ok(());
        }

        if self.description.trim().is_empty() {
            return Err(CoreError::InvalidPayload(
                "meal description is empty".to_string(),
            ));
        }
        Ok(())
    }
}
