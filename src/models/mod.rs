pub mod context;
pub mod prediction;

pub use context::{DataQualityIssue, IssueKind, RawContext, UserProfile, VisualPreferences};
pub use prediction::{
    ClassPrediction, ModelSource, PredictionMetadata, PredictionResult, ProfileMode,
    StyleVariable, ValuePrediction, STYLE_CLASSES, STYLE_VARIABLES,
};
