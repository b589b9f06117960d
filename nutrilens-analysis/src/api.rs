//! Upstream inference API request shape.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nutrilens_core::{AnalysisPayload, ErrorKind, Failure, MealPhoto};
use nutrilens_fetch::{HeaderName, HeaderValue, OutboundRequest, Url};
use nutrilens_jobs::RequestFactory;
use nutrilens_store::Settings;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::AnalysisError;
use crate::parser::parse_estimate;

// ============================================================================
// Constants
// ============================================================================

/// What the API is asked to return.
const RESPONSE_FORMAT: &str = "nutrition_estimate";

/// Photo extensions the API accepts, with their MIME types.
const PHOTO_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
];

// ============================================================================
// API Request Types
// ============================================================================

/// Body of an analysis request.
#[derive(Debug, Serialize)]
pub struct AnalyzeRequest<'a> {
    /// Meal description as typed by the user.
    pub description: &'a str,

    /// Attached photo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInput<'a>>,

    /// Requested response schema.
    pub response_format: &'static str,
}

/// Inline image in an analysis request.
#[derive(Debug, Serialize)]
pub struct ImageInput<'a> {
    /// MIME type.
    pub mime_type: &'a str,
    /// Base64 data.
    pub data: &'a str,
}

impl<'a> AnalyzeRequest<'a> {
    /// Builds the request body for a payload.
    pub fn from_payload(payload: &'a AnalysisPayload) -> Self {
        Self {
            description: payload.description.trim(),
            image: payload.photo.as_ref().map(|photo| ImageInput {
                mime_type: &photo.mime_type,
                data: &photo.data_base64,
            }),
            response_format: RESPONSE_FORMAT,
        }
    }
}

// ============================================================================
// Inference API
// ============================================================================

/// Turns analysis payloads into requests against the configured endpoint.
#[derive(Debug, Clone)]
pub struct InferenceApi {
    endpoint: Url,
}

impl InferenceApi {
    /// Creates an API for `endpoint`.
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Creates an API for the endpoint in `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an http(s) URL.
    pub fn from_settings(settings: &Settings) -> Result<Self, AnalysisError> {
        Ok(Self::new(settings.endpoint_url()?))
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl RequestFactory for InferenceApi {
    #[instrument(skip(self, payload), fields(url = %self.endpoint))]
    fn build_request(&self, payload: &AnalysisPayload) -> Result<OutboundRequest, Failure> {
        let body = AnalyzeRequest::from_payload(payload);
        debug!(has_image = body.image.is_some(), "Building analysis request");

        let request = OutboundRequest::post_json(self.endpoint.clone(), &body)
            .map_err(|e| Failure::from_error(ErrorKind::Validation, e))?;

        Ok(request.with_header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("application/json"),
        ))
    }

    /// A body without a usable estimate fails the job instead of being
    /// stored as its result.
    fn check_response(&self, body: &Value) -> Result<(), Failure> {
        parse_estimate(body.clone()).into_result().map(drop)
    }
}

// ============================================================================
// Photos
// ============================================================================

/// MIME type for a photo path, by extension.
pub fn photo_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    PHOTO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Encodes raw image bytes for a payload.
pub fn encode_photo(mime_type: &str, bytes: &[u8]) -> MealPhoto {
    MealPhoto {
        mime_type: mime_type.to_string(),
        data_base64: STANDARD.encode(bytes),
    }
}

/// Reads and encodes a photo file.
///
/// # Errors
///
/// Returns an error if the extension is not a supported image type or the
/// file cannot be read.
pub async fn load_photo(path: &Path) -> Result<MealPhoto, AnalysisError> {
    let mime_type = photo_mime_type(path)
        .ok_or_else(|| AnalysisError::UnsupportedPhoto(path.display().to_string()))?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AnalysisError::Photo {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), bytes = bytes.len(), "Photo loaded");
    Ok(encode_photo(mime_type, &bytes))
}
