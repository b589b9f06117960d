//! Nutrition estimate returned by the upstream inference API.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One recognised food item within a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Item name (e.g. "grilled chicken breast").
    pub name: String,
    /// Estimated portion in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grams: Option<f64>,
    /// Estimated energy for this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

/// Structured nutrition estimate for a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    /// Total energy in kcal.
    pub calories: f64,
    /// Protein in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    /// Carbohydrates in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    /// Fat in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
    /// Recognised items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<FoodItem>,
    /// Model confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl NutritionEstimate {
    /// Creates an estimate with only a calorie total.
    pub fn with_calories(calories: f64) -> Self {
        Self {
            calories,
            protein_g: None,
            carbs_g: None,
            fat_g: None,
            items: Vec::new(),
            confidence: None,
        }
    }

    /// Validates the estimate's ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidData`] for negative or non-finite amounts
    /// and for a confidence outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_amount("calories", Some(self.calories))?;
        check_amount("protein_g", self.protein_g)?;
        check_amount("carbs_g", self.carbs_g)?;
        check_amount("fat_g", self.fat_g)?;

        for item in &self.items {
            check_amount("items.grams", item.grams)?;
            check_amount("items.calories", item.calories)?;
        }

        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(CoreError::InvalidData(format!(
                    "confidence out of range: {confidence}"
                )));
            }
        }
        Ok(())
    }
}

fn check_amount(field: &str, value: Option<f64>) -> Result<(), CoreError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(CoreError::InvalidData(format!(
            "{field} must be a non-negative number, got {v}"
        ))),
        _ => Ok(()),
    }
}
