//! Inference API response parser.

use nutrilens_core::{CoreError, ErrorKind, Failure, FoodItem, NutritionEstimate, Outcome};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Envelope keys some API versions wrap the estimate in.
const ENVELOPE_KEYS: &[&str] = &["estimate", "result", "data"];

/// Names accepted for the calorie total; keep in sync with `EstimateResponse`.
const CALORIE_KEYS: &[&str] = &["calories", "kcal", "energy_kcal", "total_calories"];

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    #[serde(alias = "kcal", alias = "energy_kcal", alias = "total_calories")]
    calories: Option<f64>,
    #[serde(default, alias = "protein")]
    protein_g: Option<f64>,
    #[serde(default, alias = "carbs", alias = "carbohydrates_g")]
    carbs_g: Option<f64>,
    #[serde(default, alias = "fat")]
    fat_g: Option<f64>,
    #[serde(default, alias = "foods")]
    items: Vec<ItemResponse>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(alias = "food")]
    name: String,
    #[serde(default, alias = "weight_g", alias = "portion_g")]
    grams: Option<f64>,
    #[serde(default, alias = "kcal")]
    calories: Option<f64>,
}

/// Parses a 2xx response body into a nutrition estimate.
///
/// Anything that does not describe a valid estimate is an
/// [`ErrorKind::InvalidResponse`] failure.
pub fn parse_estimate(body: Value) -> Outcome<NutritionEstimate> {
    parse(body).into()
}

fn parse(body: Value) -> Result<NutritionEstimate, Failure> {
    let body = unwrap_envelope(body);
    debug!(is_object = body.is_object(), "Parsing analysis response");

    let response: EstimateResponse = serde_json::from_value(body)
        .map_err(|e| invalid(format!("Invalid estimate: {e}")))?;

    let calories = response
        .calories
        .ok_or_else(|| invalid("Estimate has no calories".to_string()))?;

    let estimate = NutritionEstimate {
        calories,
        protein_g: response.protein_g,
        carbs_g: response.carbs_g,
        fat_g: response.fat_g,
        items: response
            .items
            .into_iter()
            .map(|item| FoodItem {
                name: item.name,
                grams: item.grams,
                calories: item.calories,
            })
            .collect(),
        confidence: response.confidence,
    };

    estimate
        .validate()
        .map_err(|e: CoreError| Failure::from_error(ErrorKind::InvalidResponse, e))?;
    Ok(estimate)
}

/// Returns the estimate object, looking inside a single known envelope key.
fn unwrap_envelope(mut body: Value) -> Value {
    let Some(object) = body.as_object_mut() else {
        return body;
    };
    if CALORIE_KEYS.iter().any(|key| object.contains_key(*key)) {
        return body;
    }
    for key in ENVELOPE_KEYS {
        if object.get(*key).is_some_and(Value::is_object) {
            if let Some(inner) = object.remove(*key) {
                return inner;
            }
        }
    }
    body
}

fn invalid(message: String) -> Failure {
    Failure::new(ErrorKind::InvalidResponse, message)
}
