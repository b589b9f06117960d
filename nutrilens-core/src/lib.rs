// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `NutriLens` Core
//!
//! Core types shared by every `NutriLens` crate:
//!
//! - [`Outcome`] - The success/failure envelope returned from the data layer
//!   up to the presentation layer
//! - [`Failure`] and [`ErrorKind`] - The typed error side of an outcome
//! - [`Credential`] - The upstream API secret, redacted in all output
//! - Domain models ([`AnalysisPayload`], [`NutritionEstimate`])

pub mod credential;
pub mod error;
pub mod models;
pub mod outcome;

pub use credential::Credential;
pub use error::CoreError;
pub use models::{AnalysisPayload, FoodItem, MealPhoto, NutritionEstimate};
pub use outcome::{Cause, ErrorKind, Failure, Outcome};
