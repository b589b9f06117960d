//! Domain models for NutriLens.
//!
//! - [`payload`] - What the user captured (description, photo)
//! - [`estimate`] - What the upstream API returns (nutrition estimate)

mod estimate;
mod payload;

pub use estimate::{FoodItem, NutritionEstimate};
pub use payload::{AnalysisPayload, MealPhoto};
#[cfg(test)]
mod serde_tests;
