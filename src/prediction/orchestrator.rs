// src/prediction/orchestrator.rs
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::error::PredictionError;
use super::model_manager::{ModelHealth, ModelManager, ModelSnapshot};
use super::prediction_cache::PredictionCache;
use crate::features::{
    encode_profile, encode_visual, features_used, merge, prepare_features, profile_mode,
    AutomaticFeatures, FeatureFingerprint, FeatureVector, ProfileFeatures, VisualFeatures,
    SCHEMA_VERSION,
};
use crate::models::{
    PredictionMetadata, PredictionResult, RawContext, UserProfile, VisualPreferences,
};
use crate::utils::predictor_config::PredictorConfig;

/// Entry point for style predictions. Holds no per-request state; the model
/// manager and the cache are shared with whoever else needs them.
pub struct PredictionOrchestrator {
    models: Arc<ModelManager>,
    cache: Arc<PredictionCache>,
}

impl PredictionOrchestrator {
    pub fn new(models: Arc<ModelManager>, cache: Arc<PredictionCache>) -> Self {
        Self { models, cache }
    }

    /// Loads models and builds the cache from `config`, starting the
    /// background expiry sweep.
    pub async fn from_config(config: &PredictorConfig) -> Self {
        let models = Arc::new(ModelManager::load(config).await);
        let cache = Arc::new(PredictionCache::from_config(config));
        cache.spawn_sweeper(config.sweep_interval());
        Self::new(models, cache)
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    pub fn cache(&self) -> &Arc<PredictionCache> {
        &self.cache
    }

    /// Predicts style classes and values for one request. Profile and visual
    /// records are optional; only overload is reported as an error.
    pub async fn predict(
        &self,
        raw: &RawContext,
        profile: Option<&UserProfile>,
        visual: Option<&VisualPreferences>,
    ) -> Result<PredictionResult, PredictionError> {
        let automatic = prepare_features(raw);
        let profile = profile.map(encode_profile);
        let visual = visual.map(encode_visual);
        self.run(automatic, profile, visual).await
    }

    /// Same as `predict` for callers that already hold encoded blocks.
    pub async fn predict_with_blocks(
        &self,
        raw: &RawContext,
        profile: Option<ProfileFeatures>,
        visual: Option<VisualFeatures>,
    ) -> Result<PredictionResult, PredictionError> {
        let automatic = prepare_features(raw);
        self.run(automatic, profile, visual).await
    }

    pub fn health(&self) -> ModelHealth {
        self.models.health()
    }

    /// Reloads both models and drops every memoized prediction.
    pub async fn reload(&self) -> ModelHealth {
        let health = self.models.reload().await;
        self.cache.clear();
        info!(
            "Style models reloaded - classifier: {:?}, regressor: {:?}",
            health.classifier.status, health.regressor.status
        );
        health
    }

    async fn run(
        &self,
        automatic: AutomaticFeatures,
        profile: Option<ProfileFeatures>,
        visual: Option<VisualFeatures>,
    ) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        let has_profile = profile.is_some();
        let has_visual = visual.is_some();

        let vector = merge(&automatic, profile.as_ref(), visual.as_ref());
        let snapshot = self.models.snapshot();
        let fingerprint = FeatureFingerprint::compute(&vector, &snapshot.version_key());

        let compute = {
            let fingerprint = fingerprint.clone();
            move || assemble(&snapshot, &vector, &fingerprint)
        };
        let (mut result, outcome) = self.cache.get_or_compute(&fingerprint, compute).await?;

        // Per-call facts; the cached body may have been built for another caller.
        let metadata = &mut result.metadata;
        metadata.request_id = Uuid::new_v4();
        metadata.features_used = features_used(has_profile, has_visual);
        metadata.profile_mode = profile_mode(has_profile, has_visual);
        metadata.cache_hit = outcome.is_cache_hit();
        metadata.processing_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "Prediction {} - fingerprint {}, {:?}, classifier {:?}, regressor {:?}, features_used {}, {:.3}ms",
            metadata.request_id,
            &metadata.fingerprint[..12],
            outcome,
            metadata.classifier,
            metadata.regressor,
            metadata.features_used,
            metadata.processing_ms
        );
        Ok(result)
    }
}

/// Runs both models from one snapshot and builds the cacheable result body.
fn assemble(
    snapshot: &ModelSnapshot,
    vector: &FeatureVector,
    fingerprint: &FeatureFingerprint,
) -> PredictionResult {
    let classes = snapshot.predict_classes(vector);
    let values = snapshot.predict_values(vector);
    PredictionResult {
        classes: classes.classes,
        values: values.values,
        metadata: PredictionMetadata {
            request_id: Uuid::nil(),
            model_version: snapshot.version_key(),
            schema_version: SCHEMA_VERSION.to_string(),
            features_used: features_used(false, false),
            profile_mode: profile_mode(false, false),
            classifier: classes.source,
            regressor: values.source,
            placeholder_used: classes.source.is_placeholder() || values.source.is_placeholder(),
            cache_hit: false,
            fingerprint: fingerprint.to_string(),
            processing_ms: 0.0,
            generated_at: Utc::now(),
        },
    }
}
