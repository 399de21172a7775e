// src/models/prediction.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Every style class either model may emit. Real classifier artifacts are
/// rejected at load time if they name anything outside this set.
pub const STYLE_CLASSES: [&str; 13] = [
    "layout-compact",
    "layout-comfortable",
    "layout-spacious",
    "theme-light",
    "theme-dark",
    "theme-dark-premium",
    "theme-high-contrast",
    "typography-sans",
    "typography-serif",
    "motion-reduced",
    "motion-standard",
    "cta-prominent",
    "cta-subtle",
];

pub fn is_known_style_class(label: &str) -> bool {
    STYLE_CLASSES.contains(&label)
}

/// A continuous style variable with its valid range and the value served
/// when no regressor is available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleVariable {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub placeholder: f64,
}

impl StyleVariable {
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

pub const STYLE_VARIABLES: [StyleVariable; 10] = [
    StyleVariable { name: "primary_hue", min: 0.0, max: 360.0, placeholder: 210.0 },
    StyleVariable { name: "primary_saturation", min: 0.0, max: 100.0, placeholder: 60.0 },
    StyleVariable { name: "primary_lightness", min: 0.0, max: 100.0, placeholder: 50.0 },
    StyleVariable { name: "background_lightness", min: 0.0, max: 100.0, placeholder: 97.0 },
    StyleVariable { name: "base_font_size_px", min: 12.0, max: 24.0, placeholder: 16.0 },
    StyleVariable { name: "line_height", min: 1.2, max: 2.0, placeholder: 1.5 },
    StyleVariable { name: "spacing_scale", min: 0.75, max: 1.5, placeholder: 1.0 },
    StyleVariable { name: "border_radius_px", min: 0.0, max: 24.0, placeholder: 8.0 },
    StyleVariable { name: "animation_duration_ms", min: 0.0, max: 600.0, placeholder: 200.0 },
    StyleVariable { name: "content_max_width_px", min: 640.0, max: 1440.0, placeholder: 1200.0 },
];

pub fn style_variable(name: &str) -> Option<&'static StyleVariable> {
    STYLE_VARIABLES.iter().find(|v| v.name == name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePrediction {
    pub value: f64,
    /// Half-width of the uncertainty band around `value`
    pub uncertainty: f64,
    pub min: f64,
    pub max: f64,
}

/// Where a model's part of the answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// The loaded model produced this output
    Real,
    /// No model is loaded for this slot
    Placeholder,
    /// A model is loaded but failed on this call
    Fallback,
}

impl ModelSource {
    pub fn is_placeholder(self) -> bool {
        !matches!(self, ModelSource::Real)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Generic,
    Personalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    pub request_id: Uuid,
    pub model_version: String,
    pub schema_version: String,
    pub features_used: usize,
    pub profile_mode: ProfileMode,
    pub classifier: ModelSource,
    pub regressor: ModelSource,
    pub placeholder_used: bool,
    pub cache_hit: bool,
    pub fingerprint: String,
    pub processing_ms: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub classes: Vec<ClassPrediction>,
    pub values: BTreeMap<String, ValuePrediction>,
    pub metadata: PredictionMetadata,
}
