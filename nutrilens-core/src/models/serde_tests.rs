//! Wire-format and validation tests for core models.
//!
//! These cover how the upstream JSON and the persisted job payloads are read,
//! including optional fields and malformed values.

use serde_json::json;

use crate::{AnalysisPayload, CoreError, ErrorKind, Failure, MealPhoto, NutritionEstimate, Outcome};

// ============================================================================
// NutritionEstimate
// ============================================================================

#[test]
fn test_estimate_minimal_body() {
    let estimate: NutritionEstimate = serde_json::from_value(json!({"calories": 450})).unwrap();

    assert_eq!(estimate, NutritionEstimate::with_calories(450.0));
    assert!(estimate.validate().is_ok());
}

#[test]
fn test_estimate_full_body() {
    let estimate: NutritionEstimate = serde_json::from_value(json!({
        "calories": 330.0,
        "protein_g": 62.0,
        "carbs_g": 0.0,
        "fat_g": 7.2,
        "items": [{"name": "grilled chicken", "grams": 200.0, "calories": 330.0}],
        "confidence": 0.82,
        "model": "ignored-extra-field"
    }))
    .unwrap();

    assert_eq!(estimate.items.len(), 1);
    assert_eq!(estimate.items[0].name, "grilled chicken");
    assert_eq!(estimate.protein_g, Some(62.0));
    assert!(estimate.validate().is_ok());
}

#[test]
fn test_estimate_missing_calories_is_rejected() {
    let result: Result<NutritionEstimate, _> = serde_json::from_value(json!({"protein_g": 10}));
    assert!(result.is_err());
}

#[test]
fn test_estimate_validation_rejects_bad_ranges() {
    let mut estimate = NutritionEstimate::with_calories(-5.0);
    assert!(matches!(estimate.validate(), Err(CoreError::InvalidData(_))));

    estimate.calories = 100.0;
    estimate.confidence = Some(1.5);
    assert!(matches!(estimate.validate(), Err(CoreError::InvalidData(_))));

    estimate.confidence = Some(0.5);
    estimate.fat_g = Some(f64::NAN);
    assert!(estimate.validate().is_err());
}

#[test]
fn test_estimate_skips_empty_optionals_when_serialized() {
    let json = serde_json::to_value(NutritionEstimate::with_calories(450.0)).unwrap();
    assert_eq!(json, json!({"calories": 450.0}));
}

// ============================================================================
// AnalysisPayload
// ============================================================================

#[test]
fn test_payload_without_photo_field() {
    let payload: AnalysisPayload =
        serde_json::from_value(json!({"description": "grilled chicken, 200g"})).unwrap();

    assert_eq!(payload, AnalysisPayload::from_description("grilled chicken, 200g"));
    assert!(payload.validate().is_ok());
}

#[test]
fn test_payload_validation() {
    assert!(AnalysisPayload::from_description("   ").validate().is_err());

    let photo_only = AnalysisPayload::from_description("").with_photo(MealPhoto {
        mime_type: "image/jpeg".to_string(),
        data_base64: "AAAA".to_string(),
    });
    assert!(photo_only.validate().is_ok());

    let bad_mime = AnalysisPayload::from_description("soup").with_photo(MealPhoto {
        mime_type: "text/plain".to_string(),
        data_base64: "AAAA".to_string(),
    });
    assert!(matches!(bad_mime.validate(), Err(CoreError::InvalidPayload(_))));
}

#[test]
fn test_core_error_kinds() {
    assert_eq!(CoreError::BlankCredential.kind(), ErrorKind::Validation);
    assert_eq!(
        CoreError::InvalidData("x".to_string()).kind(),
        ErrorKind::InvalidResponse
    );

    let failure: Failure = CoreError::BlankCredential.into();
    assert_eq!(failure.kind(), ErrorKind::Validation);
    assert!(failure.cause().is_some());
}

// ============================================================================
// Outcome
// ============================================================================

#[test]
fn test_outcome_wire_format() {
    let success: Outcome<NutritionEstimate> = Outcome::success(NutritionEstimate::with_calories(450.0));
    assert_eq!(
        serde_json::to_value(&success).unwrap(),
        json!({"status": "success", "value": {"calories": 450.0}})
    );

    let error: Outcome<NutritionEstimate> =
        Outcome::failure(Failure::new(ErrorKind::CredentialMissing, "no key"));
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({"status": "error", "value": {"kind": "credential_missing", "message": "no key"}})
    );
}
