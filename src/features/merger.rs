// src/features/merger.rs
use super::schema::{
    AutomaticFeatures, FeatureVector, ProfileFeatures, VisualFeatures, AUTOMATIC_WIDTH,
    PROFILE_WIDTH, VISUAL_WIDTH,
};
use crate::models::ProfileMode;

/// Concatenates automatic, profile and visual blocks in that order. A missing
/// block is replaced by its anonymous defaults.
pub fn merge(
    automatic: &AutomaticFeatures,
    profile: Option<&ProfileFeatures>,
    visual: Option<&VisualFeatures>,
) -> FeatureVector {
    let anonymous_profile = ProfileFeatures::defaults();
    let anonymous_visual = VisualFeatures::defaults();
    FeatureVector::from_blocks(
        automatic,
        profile.unwrap_or(&anonymous_profile),
        visual.unwrap_or(&anonymous_visual),
    )
}

/// Number of vector positions backed by real caller signal.
pub fn features_used(has_profile: bool, has_visual: bool) -> usize {
    AUTOMATIC_WIDTH
        + if has_profile { PROFILE_WIDTH } else { 0 }
        + if has_visual { VISUAL_WIDTH } else { 0 }
}

pub fn profile_mode(has_profile: bool, has_visual: bool) -> ProfileMode {
    if has_profile || has_visual {
        ProfileMode::Personalized
    } else {
        ProfileMode::Generic
    }
}
