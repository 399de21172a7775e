// src/lib.rs
pub mod features;
pub mod models;
pub mod prediction;
pub mod utils;

pub use features::{FeatureVector, SCHEMA_VERSION};
pub use models::{PredictionResult, RawContext, UserProfile, VisualPreferences};
pub use prediction::{PredictionError, PredictionOrchestrator};
