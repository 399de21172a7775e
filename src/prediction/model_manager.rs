// src/prediction/model_manager.rs
//! Lifecycle of the classifier and regressor.
//!
//! Both models live in one immutable `ModelSnapshot`. A reload builds a whole
//! new snapshot off to the side and swaps the `Arc` under the write lock, so
//! a prediction that already took a snapshot keeps a consistent model pair
//! until it finishes. A slot that failed to load serves placeholder output;
//! a loaded model that errors or returns invalid output on a call is replaced
//! by the placeholder for that call only.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::placeholder::{placeholder_classes, placeholder_values};
use super::style_classifier::{validate_classes, ClassModel, StyleClassifier};
use super::style_regressor::{validate_values, StyleRegressor, ValueModel};
use crate::features::{FeatureVector, SCHEMA_VERSION};
use crate::models::{ClassPrediction, ModelSource, ValuePrediction};
use crate::utils::predictor_config::PredictorConfig;

const PLACEHOLDER_VERSION: &str = "placeholder";

pub enum ModelSlot<M: ?Sized> {
    Unloaded {
        reason: String,
    },
    Loaded {
        model: Arc<M>,
        version: String,
        loaded_at: DateTime<Utc>,
        source_path: Option<PathBuf>,
    },
}

impl<M: ?Sized> ModelSlot<M> {
    fn loaded(model: Arc<M>, version: String, source_path: Option<PathBuf>) -> Self {
        ModelSlot::Loaded {
            model,
            version,
            loaded_at: Utc::now(),
            source_path,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded { .. })
    }

    /// Model version, or `"placeholder"` for an empty slot.
    pub fn version(&self) -> &str {
        match self {
            ModelSlot::Loaded { version, .. } => version,
            ModelSlot::Unloaded { .. } => PLACEHOLDER_VERSION,
        }
    }

    fn health(&self) -> SlotHealth {
        match self {
            ModelSlot::Loaded {
                version,
                loaded_at,
                source_path,
                ..
            } => SlotHealth {
                status: ModelSource::Real,
                version: Some(version.clone()),
                loaded_at: Some(*loaded_at),
                source_path: source_path.clone(),
                reason: None,
            },
            ModelSlot::Unloaded { reason } => SlotHealth {
                status: ModelSource::Placeholder,
                version: None,
                loaded_at: None,
                source_path: None,
                reason: Some(reason.clone()),
            },
        }
    }
}

impl<M: ?Sized> Clone for ModelSlot<M> {
    fn clone(&self) -> Self {
        match self {
            ModelSlot::Unloaded { reason } => ModelSlot::Unloaded {
                reason: reason.clone(),
            },
            ModelSlot::Loaded {
                model,
                version,
                loaded_at,
                source_path,
            } => ModelSlot::Loaded {
                model: Arc::clone(model),
                version: version.clone(),
                loaded_at: *loaded_at,
                source_path: source_path.clone(),
            },
        }
    }
}

impl<M: ?Sized> fmt::Debug for ModelSlot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSlot::Unloaded { reason } => {
                f.debug_struct("Unloaded").field("reason", reason).finish()
            }
            ModelSlot::Loaded {
                version,
                loaded_at,
                source_path,
                ..
            } => f
                .debug_struct("Loaded")
                .field("version", version)
                .field("loaded_at", loaded_at)
                .field("source_path", source_path)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotHealth {
    /// `real` when a model is loaded, otherwise `placeholder`
    pub status: ModelSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelHealth {
    pub classifier: SlotHealth,
    pub regressor: SlotHealth,
    pub schema_version: String,
    pub checked_at: DateTime<Utc>,
    /// Always true: placeholder output can be served without any model.
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutcome {
    pub classes: Vec<ClassPrediction>,
    pub source: ModelSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueOutcome {
    pub values: BTreeMap<String, ValuePrediction>,
    pub source: ModelSource,
}

/// An immutable classifier/regressor pair.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub classifier: ModelSlot<dyn ClassModel>,
    pub regressor: ModelSlot<dyn ValueModel>,
}

impl ModelSnapshot {
    /// Builds a snapshot from in-memory models. An absent model leaves its
    /// slot unloaded.
    pub fn new(
        classifier: Option<Arc<dyn ClassModel>>,
        regressor: Option<Arc<dyn ValueModel>>,
    ) -> Self {
        let classifier = match classifier {
            Some(model) => {
                let version = model.version().to_string();
                ModelSlot::loaded(model, version, None)
            }
            None => ModelSlot::Unloaded {
                reason: "no classifier provided".to_string(),
            },
        };
        let regressor = match regressor {
            Some(model) => {
                let version = model.version().to_string();
                ModelSlot::loaded(model, version, None)
            }
            None => ModelSlot::Unloaded {
                reason: "no regressor provided".to_string(),
            },
        };
        Self {
            classifier,
            regressor,
        }
    }

    pub fn placeholder_only() -> Self {
        Self::new(None, None)
    }

    /// Identifies the model pair; hashed into every fingerprint.
    pub fn version_key(&self) -> String {
        format!(
            "classifier={};regressor={}",
            self.classifier.version(),
            self.regressor.version()
        )
    }

    pub fn predict_classes(&self, features: &FeatureVector) -> ClassOutcome {
        let (model, version) = match &self.classifier {
            ModelSlot::Unloaded { .. } => {
                return ClassOutcome {
                    classes: placeholder_classes(),
                    source: ModelSource::Placeholder,
                }
            }
            ModelSlot::Loaded { model, version, .. } => (model, version),
        };

        let attempt = catch_unwind(AssertUnwindSafe(|| model.predict(features)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("classifier panicked")))
            .and_then(|classes| validate_classes(&classes).map(|_| classes));

        match attempt {
            Ok(classes) => ClassOutcome {
                classes,
                source: ModelSource::Real,
            },
            Err(e) => {
                warn!(
                    "Style classifier {} failed: {:#}. Serving placeholder classes for this call.",
                    version, e
                );
                ClassOutcome {
                    classes: placeholder_classes(),
                    source: ModelSource::Fallback,
                }
            }
        }
    }

    pub fn predict_values(&self, features: &FeatureVector) -> ValueOutcome {
        let (model, version) = match &self.regressor {
            ModelSlot::Unloaded { .. } => {
                return ValueOutcome {
                    values: placeholder_values(),
                    source: ModelSource::Placeholder,
                }
            }
            ModelSlot::Loaded { model, version, .. } => (model, version),
        };

        let attempt = catch_unwind(AssertUnwindSafe(|| model.predict(features)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("regressor panicked")))
            .and_then(|values| validate_values(&values).map(|_| values));

        match attempt {
            Ok(values) => ValueOutcome {
                values,
                source: ModelSource::Real,
            },
            Err(e) => {
                warn!(
                    "Style regressor {} failed: {:#}. Serving placeholder values for this call.",
                    version, e
                );
                ValueOutcome {
                    values: placeholder_values(),
                    source: ModelSource::Fallback,
                }
            }
        }
    }

    pub fn health(&self) -> ModelHealth {
        ModelHealth {
            classifier: self.classifier.health(),
            regressor: self.regressor.health(),
            schema_version: SCHEMA_VERSION.to_string(),
            checked_at: Utc::now(),
            ready: true,
        }
    }
}

/// Owns the current model snapshot and knows where to reload it from.
pub struct ModelManager {
    classifier_path: PathBuf,
    regressor_path: PathBuf,
    current: RwLock<Arc<ModelSnapshot>>,
}

impl ModelManager {
    /// Loads both artifacts. Never fails: a missing or invalid artifact
    /// leaves its slot unloaded.
    pub async fn load(config: &PredictorConfig) -> Self {
        let classifier_path = config.classifier_path();
        let regressor_path = config.regressor_path();
        let snapshot = build_snapshot(&classifier_path, &regressor_path).await;
        log_snapshot(&snapshot);
        Self {
            classifier_path,
            regressor_path,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Starts from an in-memory snapshot; `reload` still reads from `config`.
    pub fn with_snapshot(config: &PredictorConfig, snapshot: ModelSnapshot) -> Self {
        Self {
            classifier_path: config.classifier_path(),
            regressor_path: config.regressor_path(),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn placeholder_only(config: &PredictorConfig) -> Self {
        Self::with_snapshot(config, ModelSnapshot::placeholder_only())
    }

    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn predict_classes(&self, features: &FeatureVector) -> ClassOutcome {
        self.snapshot().predict_classes(features)
    }

    pub fn predict_values(&self, features: &FeatureVector) -> ValueOutcome {
        self.snapshot().predict_values(features)
    }

    pub fn health(&self) -> ModelHealth {
        self.snapshot().health()
    }

    /// Rebuilds both slots from disk and swaps them in together.
    pub async fn reload(&self) -> ModelHealth {
        info!("Reloading style models");
        let snapshot = Arc::new(build_snapshot(&self.classifier_path, &self.regressor_path).await);
        log_snapshot(&snapshot);
        let health = snapshot.health();
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        health
    }
}

async fn build_snapshot(classifier_path: &Path, regressor_path: &Path) -> ModelSnapshot {
    let (classifier, regressor) = tokio::join!(
        StyleClassifier::load(classifier_path),
        StyleRegressor::load(regressor_path)
    );

    let classifier: ModelSlot<dyn ClassModel> = match classifier {
        Ok(model) => {
            let version = model.version().to_string();
            ModelSlot::loaded(
                Arc::new(model) as Arc<dyn ClassModel>,
                version,
                Some(classifier_path.to_path_buf()),
            )
        }
        Err(e) => {
            warn!("Style classifier unavailable, serving placeholder classes: {:#}", e);
            ModelSlot::Unloaded {
                reason: format!("{:#}", e),
            }
        }
    };

    let regressor: ModelSlot<dyn ValueModel> = match regressor {
        Ok(model) => {
            let version = model.version().to_string();
            ModelSlot::loaded(
                Arc::new(model) as Arc<dyn ValueModel>,
                version,
                Some(regressor_path.to_path_buf()),
            )
        }
        Err(e) => {
            warn!("Style regressor unavailable, serving placeholder values: {:#}", e);
            ModelSlot::Unloaded {
                reason: format!("{:#}", e),
            }
        }
    };

    ModelSnapshot {
        classifier,
        regressor,
    }
}

fn log_snapshot(snapshot: &ModelSnapshot) {
    info!(
        "Model snapshot ready - classifier: {} ({}), regressor: {} ({})",
        snapshot.classifier.version(),
        if snapshot.classifier.is_loaded() { "real" } else { "placeholder" },
        snapshot.regressor.version(),
        if snapshot.regressor.is_loaded() { "real" } else { "placeholder" },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{merge, AutomaticFeatures};
    use crate::prediction::style_classifier::ClassifierArtifact;
    use crate::prediction::style_regressor::RegressorArtifact;
    use anyhow::{bail, Result};
    use std::fs;
    use tempfile::TempDir;

    struct FailingClassifier;

    impl ClassModel for FailingClassifier {
        fn version(&self) -> &str {
            "broken-1"
        }

        fn predict(&self, _features: &FeatureVector) -> Result<Vec<ClassPrediction>> {
            bail!("weights corrupted")
        }
    }

    struct OffSchemaClassifier;

    impl ClassModel for OffSchemaClassifier {
        fn version(&self) -> &str {
            "off-schema-1"
        }

        fn predict(&self, _features: &FeatureVector) -> Result<Vec<ClassPrediction>> {
            Ok(vec![ClassPrediction {
                label: "theme-neon".to_string(),
                confidence: 0.9,
            }])
        }
    }

    fn config_for(dir: &TempDir) -> PredictorConfig {
        PredictorConfig {
            model_dir: dir.path().to_path_buf(),
            ..PredictorConfig::default()
        }
    }

    fn write_classifier(dir: &TempDir, version: &str) {
        let json = serde_json::to_string(&ClassifierArtifact::sample(version)).unwrap();
        fs::write(dir.path().join("style_classifier.json"), json).unwrap();
    }

    fn write_regressor(dir: &TempDir, version: &str) {
        let json = serde_json::to_string(&RegressorArtifact::sample(version)).unwrap();
        fs::write(dir.path().join("style_regressor.json"), json).unwrap();
    }

    fn anonymous_vector() -> FeatureVector {
        merge(&AutomaticFeatures::defaults(), None, None)
    }

    #[tokio::test]
    async fn test_missing_artifacts_serve_placeholders() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::load(&config_for(&dir)).await;

        let health = manager.health();
        assert!(health.ready);
        assert_eq!(health.classifier.status, ModelSource::Placeholder);
        assert_eq!(health.regressor.status, ModelSource::Placeholder);
        assert!(health.classifier.reason.as_deref().unwrap().contains("Failed to read"));
        assert_eq!(health.schema_version, SCHEMA_VERSION);

        let classes = manager.predict_classes(&anonymous_vector());
        assert_eq!(classes.source, ModelSource::Placeholder);
        assert_eq!(classes.classes, placeholder_classes());
        let values = manager.predict_values(&anonymous_vector());
        assert_eq!(values.values, placeholder_values());
    }

    #[tokio::test]
    async fn test_loads_both_artifacts() {
        let dir = TempDir::new().unwrap();
        write_classifier(&dir, "clf-2024.06");
        write_regressor(&dir, "reg-2024.06");
        let manager = ModelManager::load(&config_for(&dir)).await;

        let snapshot = manager.snapshot();
        assert_eq!(
            snapshot.version_key(),
            "classifier=clf-2024.06;regressor=reg-2024.06"
        );
        let health = snapshot.health();
        assert_eq!(health.classifier.status, ModelSource::Real);
        assert_eq!(health.classifier.version.as_deref(), Some("clf-2024.06"));
        assert!(health.classifier.loaded_at.is_some());
        assert_eq!(
            snapshot.predict_classes(&anonymous_vector()).source,
            ModelSource::Real
        );
        assert_eq!(
            snapshot.predict_values(&anonymous_vector()).source,
            ModelSource::Real
        );
    }

    #[tokio::test]
    async fn test_invalid_classifier_does_not_block_regressor() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("style_classifier.json"), "{ not json").unwrap();
        write_regressor(&dir, "reg-1");
        let manager = ModelManager::load(&config_for(&dir)).await;

        let health = manager.health();
        assert_eq!(health.classifier.status, ModelSource::Placeholder);
        assert!(health.classifier.reason.as_deref().unwrap().contains("parse"));
        assert_eq!(health.regressor.status, ModelSource::Real);
    }

    #[tokio::test]
    async fn test_reload_swaps_whole_snapshot() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::load(&config_for(&dir)).await;
        let before = manager.snapshot();

        write_classifier(&dir, "clf-new");
        write_regressor(&dir, "reg-new");
        let health = manager.reload().await;

        assert_eq!(health.classifier.status, ModelSource::Real);
        assert_eq!(health.regressor.status, ModelSource::Real);
        // Snapshots taken before the reload keep their original pair.
        assert!(!before.classifier.is_loaded());
        assert!(manager.snapshot().classifier.is_loaded());
    }

    #[test]
    fn test_failing_model_falls_back_for_the_call() {
        let snapshot = ModelSnapshot::new(Some(Arc::new(FailingClassifier)), None);
        let outcome = snapshot.predict_classes(&anonymous_vector());
        assert_eq!(outcome.source, ModelSource::Fallback);
        assert_eq!(outcome.classes, placeholder_classes());
        assert_eq!(
            snapshot.predict_values(&anonymous_vector()).source,
            ModelSource::Placeholder
        );
        assert_eq!(snapshot.health().classifier.status, ModelSource::Real);
    }

    #[test]
    fn test_off_schema_output_is_rejected() {
        let snapshot = ModelSnapshot::new(Some(Arc::new(OffSchemaClassifier)), None);
        let outcome = snapshot.predict_classes(&anonymous_vector());
        assert_eq!(outcome.source, ModelSource::Fallback);
        assert!(outcome.classes.iter().all(|c| c.label != "theme-neon"));
    }
}
