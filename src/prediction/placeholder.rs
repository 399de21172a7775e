// src/prediction/placeholder.rs
use std::collections::BTreeMap;

use crate::models::{ClassPrediction, ValuePrediction, STYLE_VARIABLES};

/// Served when no classifier is usable.
const PLACEHOLDER_CLASSES: [(&str, f64); 3] = [
    ("layout-comfortable", 0.46),
    ("theme-light", 0.31),
    ("cta-subtle", 0.14),
];

/// Placeholder uncertainty as a share of each variable's range.
const PLACEHOLDER_UNCERTAINTY_FRACTION: f64 = 0.25;

pub fn placeholder_classes() -> Vec<ClassPrediction> {
    PLACEHOLDER_CLASSES
        .iter()
        .map(|(label, confidence)| ClassPrediction {
            label: label.to_string(),
            confidence: *confidence,
        })
        .collect()
}

pub fn placeholder_values() -> BTreeMap<String, ValuePrediction> {
    STYLE_VARIABLES
        .iter()
        .map(|var| {
            (
                var.name.to_string(),
                ValuePrediction {
                    value: var.placeholder,
                    uncertainty: var.width() * PLACEHOLDER_UNCERTAINTY_FRACTION,
                    min: var.min,
                    max: var.max,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::style_classifier::validate_classes;
    use crate::prediction::style_regressor::validate_values;

    #[test]
    fn test_placeholder_output_passes_schema_validation() {
        validate_classes(&placeholder_classes()).unwrap();
        validate_values(&placeholder_values()).unwrap();
    }

    #[test]
    fn test_placeholder_uncertainty_is_quarter_range() {
        let values = placeholder_values();
        assert_eq!(values["base_font_size_px"].uncertainty, 3.0);
        assert_eq!(values["content_max_width_px"].value, 1200.0);
        assert_eq!(placeholder_classes()[0].label, "layout-comfortable");
    }
}
