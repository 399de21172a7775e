// src/prediction/style_classifier.rs
use anyhow::{bail, ensure, Context, Result};
use log::info;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::features::{FeatureVector, FEATURE_VECTOR_SIZE};
use crate::models::prediction::is_known_style_class;
use crate::models::ClassPrediction;

/// Anything that can rank style classes for a feature vector.
pub trait ClassModel: Send + Sync {
    fn version(&self) -> &str;

    fn predict(&self, features: &FeatureVector) -> Result<Vec<ClassPrediction>>;
}

fn default_top_k() -> usize {
    3
}

/// On-disk form of the trained classifier: one linear logit per label.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClassifierArtifact {
    pub version: String,
    pub labels: Vec<String>,
    /// `weights[label][feature]`
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Softmax classifier over the 80-wide style vector, weights held in memory.
#[derive(Debug, Clone)]
pub struct StyleClassifier {
    version: String,
    labels: Vec<String>,
    weights: Array2<f64>,
    bias: Array1<f64>,
    top_k: usize,
}

impl StyleClassifier {
    pub fn from_artifact(artifact: ClassifierArtifact) -> Result<Self> {
        let n_labels = artifact.labels.len();
        ensure!(n_labels > 0, "classifier declares no labels");

        let mut seen = HashSet::new();
        for label in &artifact.labels {
            if !is_known_style_class(label) {
                bail!("classifier label {:?} is not a declared style class", label);
            }
            ensure!(seen.insert(label.as_str()), "duplicate classifier label {:?}", label);
        }

        ensure!(
            artifact.weights.len() == n_labels,
            "expected {} weight rows, found {}",
            n_labels,
            artifact.weights.len()
        );
        ensure!(
            artifact.bias.len() == n_labels,
            "expected {} bias terms, found {}",
            n_labels,
            artifact.bias.len()
        );

        let mut flat = Vec::with_capacity(n_labels * FEATURE_VECTOR_SIZE);
        for (label, row) in artifact.labels.iter().zip(&artifact.weights) {
            ensure!(
                row.len() == FEATURE_VECTOR_SIZE,
                "weight row for {:?} has {} entries, expected {}",
                label,
                row.len(),
                FEATURE_VECTOR_SIZE
            );
            ensure!(
                row.iter().all(|w| w.is_finite()),
                "weight row for {:?} contains a non-finite value",
                label
            );
            flat.extend_from_slice(row);
        }
        ensure!(
            artifact.bias.iter().all(|b| b.is_finite()),
            "classifier bias contains a non-finite value"
        );
        ensure!(artifact.top_k > 0, "top_k must be at least 1");

        let weights = Array2::from_shape_vec((n_labels, FEATURE_VECTOR_SIZE), flat)
            .context("classifier weights do not form a matrix")?;

        Ok(Self {
            version: artifact.version,
            top_k: artifact.top_k.min(n_labels),
            labels: artifact.labels,
            weights,
            bias: Array1::from(artifact.bias),
        })
    }

    /// Reads and validates a classifier artifact.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read classifier artifact {}", path.display()))?;
        let artifact: ClassifierArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse classifier artifact {}", path.display()))?;
        let classifier = Self::from_artifact(artifact)
            .with_context(|| format!("Invalid classifier artifact {}", path.display()))?;
        info!(
            "Loaded style classifier {} ({} labels, top_k={}) from {}",
            classifier.version,
            classifier.labels.len(),
            classifier.top_k,
            path.display()
        );
        Ok(classifier)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

impl ClassModel for StyleClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<ClassPrediction>> {
        let x = ArrayView1::from(features.as_slice());
        let logits = self.weights.dot(&x) + &self.bias;

        let max_logit = logits.fold(f64::NEG_INFINITY, |acc, &l| acc.max(l));
        ensure!(max_logit.is_finite(), "classifier produced non-finite logits");
        let exp = logits.mapv(|l| (l - max_logit).exp());
        let total = exp.sum();

        let mut ranked: Vec<ClassPrediction> = self
            .labels
            .iter()
            .zip(exp.iter())
            .map(|(label, e)| ClassPrediction {
                label: label.clone(),
                confidence: e / total,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.top_k);
        Ok(ranked)
    }
}

const CONFIDENCE_SUM_TOLERANCE: f64 = 1e-6;

/// Checks a ranked class list: declared labels, finite confidences in
/// [0, 1], and a total no greater than 1.
pub fn validate_classes(classes: &[ClassPrediction]) -> Result<()> {
    ensure!(!classes.is_empty(), "no classes returned");
    let mut total = 0.0;
    for class in classes {
        ensure!(
            is_known_style_class(&class.label),
            "undeclared style class {:?}",
            class.label
        );
        ensure!(
            class.confidence.is_finite() && (0.0..=1.0).contains(&class.confidence),
            "confidence {} for {:?} outside [0, 1]",
            class.confidence,
            class.label
        );
        total += class.confidence;
    }
    ensure!(
        total <= 1.0 + CONFIDENCE_SUM_TOLERANCE,
        "confidences sum to {}",
        total
    );
    Ok(())
}

#[cfg(test)]
impl ClassifierArtifact {
    /// Three-label artifact whose only signal is the dark-scheme preference.
    pub(crate) fn sample(version: &str) -> Self {
        use crate::features::{FeatureSlot, VisualFeature};

        let mut dark = vec![0.0; FEATURE_VECTOR_SIZE];
        dark[VisualFeature::SchemeOscuroPremium.global_index()] = 4.0;
        Self {
            version: version.to_string(),
            labels: vec![
                "theme-dark-premium".to_string(),
                "theme-light".to_string(),
                "layout-comfortable".to_string(),
            ],
            weights: vec![
                dark,
                vec![0.0; FEATURE_VECTOR_SIZE],
                vec![0.0; FEATURE_VECTOR_SIZE],
            ],
            bias: vec![0.0, 0.5, 0.2],
            top_k: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        encode_visual, merge, AutomaticFeatures, VisualFeatures,
    };
    use crate::models::VisualPreferences;

    fn anonymous_vector() -> FeatureVector {
        merge(&AutomaticFeatures::defaults(), None, None)
    }

    #[test]
    fn test_softmax_top_k_is_a_valid_distribution() {
        let classifier = StyleClassifier::from_artifact(ClassifierArtifact::sample("v1")).unwrap();
        let classes = classifier.predict(&anonymous_vector()).unwrap();

        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].label, "theme-light");
        assert!(classes[0].confidence >= classes[1].confidence);
        let sum: f64 = classes.iter().map(|c| c.confidence).sum();
        assert!(sum <= 1.0 + 1e-9);
        assert!(classes.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
    }

    #[test]
    fn test_dark_premium_preference_moves_ranking() {
        let classifier = StyleClassifier::from_artifact(ClassifierArtifact::sample("v1")).unwrap();
        let visual: VisualFeatures = encode_visual(&VisualPreferences {
            color_scheme: Some("oscuro premium".to_string()),
            ..Default::default()
        });
        let vector = merge(&AutomaticFeatures::defaults(), None, Some(&visual));
        let classes = classifier.predict(&vector).unwrap();
        assert_eq!(classes[0].label, "theme-dark-premium");
    }

    #[test]
    fn test_rejects_undeclared_label_and_bad_shapes() {
        let mut unknown = ClassifierArtifact::sample("v1");
        unknown.labels[0] = "theme-neon".to_string();
        assert!(StyleClassifier::from_artifact(unknown).is_err());

        let mut short_row = ClassifierArtifact::sample("v1");
        short_row.weights[1].pop();
        assert!(StyleClassifier::from_artifact(short_row).is_err());

        let mut missing_bias = ClassifierArtifact::sample("v1");
        missing_bias.bias.pop();
        assert!(StyleClassifier::from_artifact(missing_bias).is_err());
    }

    #[test]
    fn test_validate_classes() {
        let ok = vec![
            ClassPrediction { label: "theme-dark".to_string(), confidence: 0.6 },
            ClassPrediction { label: "cta-subtle".to_string(), confidence: 0.4 },
        ];
        assert!(validate_classes(&ok).is_ok());

        let overfull = vec![
            ClassPrediction { label: "theme-dark".to_string(), confidence: 0.9 },
            ClassPrediction { label: "cta-subtle".to_string(), confidence: 0.4 },
        ];
        assert!(validate_classes(&overfull).is_err());

        let unknown = vec![ClassPrediction { label: "blink".to_string(), confidence: 0.1 }];
        assert!(validate_classes(&unknown).is_err());

        let nan = vec![ClassPrediction { label: "theme-dark".to_string(), confidence: f64::NAN }];
        assert!(validate_classes(&nan).is_err());
        assert!(validate_classes(&[]).is_err());
    }

    #[test]
    fn test_top_k_capped_at_label_count() {
        let mut artifact = ClassifierArtifact::sample("v1");
        artifact.top_k = 10;
        let classifier = StyleClassifier::from_artifact(artifact).unwrap();
        assert_eq!(classifier.top_k(), 3);
    }
}
