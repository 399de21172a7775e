// src/features/mod.rs
pub mod context_features;
pub mod fingerprint;
pub mod merger;
pub mod profile_features;
pub mod schema;
pub mod visual_features;

pub use context_features::{prepare_features, prepare_features_with_report};
pub use fingerprint::FeatureFingerprint;
pub use merger::{features_used, merge, profile_mode};
pub use profile_features::encode_profile;
pub use schema::{
    get_feature_metadata, AutomaticFeature, AutomaticFeatures, FeatureMetadata, FeatureSlot,
    FeatureVector, ProfileFeature, ProfileFeatures, VisualFeature, VisualFeatures,
    FEATURE_VECTOR_SIZE, SCHEMA_VERSION,
};
pub use visual_features::encode_visual;
