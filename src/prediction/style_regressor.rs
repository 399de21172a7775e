// src/prediction/style_regressor.rs
use anyhow::{bail, ensure, Context, Result};
use log::info;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::features::{FeatureVector, FEATURE_VECTOR_SIZE};
use crate::models::prediction::style_variable;
use crate::models::{ValuePrediction, STYLE_VARIABLES};

/// Anything that can produce the declared continuous style values.
pub trait ValueModel: Send + Sync {
    fn version(&self) -> &str;

    fn predict(&self, features: &FeatureVector) -> Result<BTreeMap<String, ValuePrediction>>;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegressionHead {
    pub variable: String,
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Standard deviation of training residuals, reported as uncertainty
    #[serde(default)]
    pub residual_std: f64,
}

/// On-disk form of the trained regressor: one linear head per style variable.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegressorArtifact {
    pub version: String,
    pub heads: Vec<RegressionHead>,
}

/// Multi-output linear regressor. Row `i` of `weights` belongs to
/// `STYLE_VARIABLES[i]` whatever order the artifact listed its heads in.
#[derive(Debug, Clone)]
pub struct StyleRegressor {
    version: String,
    weights: Array2<f64>,
    bias: Array1<f64>,
    residual_std: Vec<f64>,
}

impl StyleRegressor {
    pub fn from_artifact(artifact: RegressorArtifact) -> Result<Self> {
        let n_vars = STYLE_VARIABLES.len();
        let mut rows: Vec<Option<&RegressionHead>> = vec![None; n_vars];

        for head in &artifact.heads {
            let Some(slot) = STYLE_VARIABLES.iter().position(|v| v.name == head.variable) else {
                bail!("regressor head {:?} is not a declared style variable", head.variable);
            };
            ensure!(
                rows[slot].is_none(),
                "duplicate regressor head for {:?}",
                head.variable
            );
            ensure!(
                head.weights.len() == FEATURE_VECTOR_SIZE,
                "head {:?} has {} weights, expected {}",
                head.variable,
                head.weights.len(),
                FEATURE_VECTOR_SIZE
            );
            ensure!(
                head.weights.iter().all(|w| w.is_finite()) && head.bias.is_finite(),
                "head {:?} contains a non-finite parameter",
                head.variable
            );
            ensure!(
                head.residual_std.is_finite() && head.residual_std >= 0.0,
                "head {:?} has an invalid residual_std {}",
                head.variable,
                head.residual_std
            );
            rows[slot] = Some(head);
        }

        let mut flat = Vec::with_capacity(n_vars * FEATURE_VECTOR_SIZE);
        let mut bias = Vec::with_capacity(n_vars);
        let mut residual_std = Vec::with_capacity(n_vars);
        for (var, row) in STYLE_VARIABLES.iter().zip(&rows) {
            let Some(head) = row else {
                bail!("regressor has no head for style variable {:?}", var.name);
            };
            flat.extend_from_slice(&head.weights);
            bias.push(head.bias);
            residual_std.push(head.residual_std);
        }

        let weights = Array2::from_shape_vec((n_vars, FEATURE_VECTOR_SIZE), flat)
            .context("regressor weights do not form a matrix")?;

        Ok(Self {
            version: artifact.version,
            weights,
            bias: Array1::from(bias),
            residual_std,
        })
    }

    /// Reads and validates a regressor artifact.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read regressor artifact {}", path.display()))?;
        let artifact: RegressorArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse regressor artifact {}", path.display()))?;
        let regressor = Self::from_artifact(artifact)
            .with_context(|| format!("Invalid regressor artifact {}", path.display()))?;
        info!(
            "Loaded style regressor {} ({} heads) from {}",
            regressor.version,
            regressor.residual_std.len(),
            path.display()
        );
        Ok(regressor)
    }
}

impl ValueModel for StyleRegressor {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, features: &FeatureVector) -> Result<BTreeMap<String, ValuePrediction>> {
        let x = ArrayView1::from(features.as_slice());
        let outputs = self.weights.dot(&x) + &self.bias;

        let mut values = BTreeMap::new();
        for ((var, raw), residual) in STYLE_VARIABLES
            .iter()
            .zip(outputs.iter())
            .zip(&self.residual_std)
        {
            ensure!(raw.is_finite(), "regressor produced a non-finite {}", var.name);
            values.insert(
                var.name.to_string(),
                ValuePrediction {
                    value: var.clamp(*raw),
                    uncertainty: (*residual).clamp(0.0, var.width()),
                    min: var.min,
                    max: var.max,
                },
            );
        }
        Ok(values)
    }
}

#[cfg(test)]
impl RegressorArtifact {
    /// Heads that predict each variable's placeholder, except `primary_lightness`
    /// which darkens with the dark-scheme preference.
    pub(crate) fn sample(version: &str) -> Self {
        use crate::features::{FeatureSlot, VisualFeature};

        let heads = STYLE_VARIABLES
            .iter()
            .map(|var| {
                let mut weights = vec![0.0; FEATURE_VECTOR_SIZE];
                if var.name == "primary_lightness" {
                    weights[VisualFeature::SchemeOscuroPremium.global_index()] = -30.0;
                }
                RegressionHead {
                    variable: var.name.to_string(),
                    weights,
                    bias: var.placeholder,
                    residual_std: var.width() * 0.05,
                }
            })
            .collect();
        Self {
            version: version.to_string(),
            heads,
        }
    }
}

/// Checks that a value map covers exactly the declared variables with
/// finite, in-range values.
pub fn validate_values(values: &BTreeMap<String, ValuePrediction>) -> Result<()> {
    ensure!(
        values.len() == STYLE_VARIABLES.len(),
        "expected {} style values, found {}",
        STYLE_VARIABLES.len(),
        values.len()
    );
    for (name, prediction) in values {
        let Some(var) = style_variable(name) else {
            bail!("unknown style variable {:?}", name);
        };
        ensure!(
            var.contains(prediction.value),
            "{} = {} outside [{}, {}]",
            name,
            prediction.value,
            var.min,
            var.max
        );
        ensure!(
            prediction.uncertainty.is_finite() && prediction.uncertainty >= 0.0,
            "{} has invalid uncertainty {}",
            name,
            prediction.uncertainty
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{encode_visual, merge, AutomaticFeatures};
    use crate::models::VisualPreferences;

    #[test]
    fn test_heads_produce_every_declared_variable() {
        let regressor = StyleRegressor::from_artifact(RegressorArtifact::sample("r1")).unwrap();
        let vector = merge(&AutomaticFeatures::defaults(), None, None);
        let values = regressor.predict(&vector).unwrap();

        validate_values(&values).unwrap();
        assert_eq!(values["primary_hue"].value, 210.0);
        assert_eq!(values["primary_lightness"].value, 50.0);
        assert!((values["primary_hue"].uncertainty - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_outputs_are_clamped_to_declared_ranges() {
        let mut artifact = RegressorArtifact::sample("r1");
        for head in artifact.heads.iter_mut() {
            head.bias = 1e6;
            head.residual_std = 1e6;
        }
        let regressor = StyleRegressor::from_artifact(artifact).unwrap();
        let values = regressor
            .predict(&merge(&AutomaticFeatures::defaults(), None, None))
            .unwrap();
        for var in STYLE_VARIABLES.iter() {
            assert_eq!(values[var.name].value, var.max);
            assert_eq!(values[var.name].uncertainty, var.width());
        }
    }

    #[test]
    fn test_dark_scheme_lowers_lightness() {
        let regressor = StyleRegressor::from_artifact(RegressorArtifact::sample("r1")).unwrap();
        let visual = encode_visual(&VisualPreferences {
            color_scheme: Some("oscuro_premium".to_string()),
            ..Default::default()
        });
        let values = regressor
            .predict(&merge(&AutomaticFeatures::defaults(), None, Some(&visual)))
            .unwrap();
        assert_eq!(values["primary_lightness"].value, 20.0);
    }

    #[test]
    fn test_rejects_missing_duplicate_and_unknown_heads() {
        let mut missing = RegressorArtifact::sample("r1");
        missing.heads.pop();
        assert!(StyleRegressor::from_artifact(missing).is_err());

        let mut duplicate = RegressorArtifact::sample("r1");
        let first = duplicate.heads[0].clone();
        duplicate.heads[1] = first;
        assert!(StyleRegressor::from_artifact(duplicate).is_err());

        let mut unknown = RegressorArtifact::sample("r1");
        unknown.heads[0].variable = "font_color".to_string();
        assert!(StyleRegressor::from_artifact(unknown).is_err());
    }
}
