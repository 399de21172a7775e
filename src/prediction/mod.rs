// src/prediction/mod.rs
pub mod error;
pub mod model_manager;
pub mod orchestrator;
pub mod placeholder;
pub mod prediction_cache;
pub mod style_classifier;
pub mod style_regressor;

pub use error::PredictionError;
pub use model_manager::{
    ClassOutcome, ModelHealth, ModelManager, ModelSlot, ModelSnapshot, SlotHealth, ValueOutcome,
};
pub use orchestrator::PredictionOrchestrator;
pub use prediction_cache::{CacheOutcome, CacheStats, PredictionCache};
pub use style_classifier::{ClassModel, ClassifierArtifact, StyleClassifier};
pub use style_regressor::{RegressionHead, RegressorArtifact, StyleRegressor, ValueModel};
