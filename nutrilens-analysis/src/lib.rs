// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # NutriLens Analysis
//!
//! The upstream inference API and the use cases built on it.
//!
//! - [`api::InferenceApi`] - Builds the JSON POST for a meal payload
//! - [`parser::parse_estimate`] - Turns a 2xx body into a [`NutritionEstimate`]
//! - [`use_case::AnalyzeMeal`] - Analyze now, or submit and poll
//! - [`use_case::ManageCredential`] - Set, clear and inspect the API key
//! - [`service::AnalysisService`] - Wires all of the above from [`Settings`]
//!
//! Every use-case operation returns an [`Outcome`]; a failure from any layer
//! below keeps its [`ErrorKind`] on the way up.
//!
//! ## Usage
//!
//! ```ignore
//! use nutrilens_analysis::AnalysisService;
//! use nutrilens_core::{AnalysisPayload, Outcome};
//!
//! let service = AnalysisService::open(&settings, credentials).await?;
//! service.queue().recover().await?;
//!
//! let payload = AnalysisPayload::from_description("grilled chicken, 200g");
//! match service.analyze_meal().analyze(payload).await {
//!     Outcome::Success(estimate) => println!("{} kcal", estimate.calories),
//!     Outcome::Error(failure) => eprintln!("{}", failure.user_message()),
//! }
//! ```
//!
//! [`NutritionEstimate`]: nutrilens_core::NutritionEstimate
//! [`Settings`]: nutrilens_store::Settings
//! [`Outcome`]: nutrilens_core::Outcome
//! [`ErrorKind`]: nutrilens_core::ErrorKind

pub mod api;
pub mod error;
pub mod parser;
pub mod service;
pub mod use_case;

pub use api::{encode_photo, load_photo, photo_mime_type, AnalyzeRequest, ImageInput, InferenceApi};
pub use error::AnalysisError;
pub use parser::parse_estimate;
pub use service::AnalysisService;
pub use use_case::{AnalyzeMeal, ManageCredential};
