// src/features/fingerprint.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::schema::{FeatureVector, SCHEMA_VERSION};

const QUANTIZATION_SCALE: f64 = 10_000.0;

/// Cache key for a merged vector under a specific model pair.
///
/// Values are quantized to 1e-4 before hashing so float noise below that
/// resolution maps to the same entry. The schema version and the model-pair
/// version key are hashed in as well, so a reload or a layout change never
/// serves a stale prediction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureFingerprint(String);

impl FeatureFingerprint {
    pub fn compute(vector: &FeatureVector, model_version_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SCHEMA_VERSION.as_bytes());
        hasher.update([0u8]);
        hasher.update(model_version_key.as_bytes());
        hasher.update([0u8]);
        for value in vector.as_slice() {
            hasher.update(quantize(*value).to_le_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn quantize(value: f64) -> i64 {
    // Block values are always finite and bounded; `as` saturates regardless.
    (value * QUANTIZATION_SCALE).round() as i64
}

impl fmt::Display for FeatureFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::merger::merge;
    use crate::features::schema::{AutomaticFeature, AutomaticFeatures};

    #[test]
    fn test_equal_vectors_share_a_fingerprint() {
        let vector = merge(&AutomaticFeatures::defaults(), None, None);
        let a = FeatureFingerprint::compute(&vector, "clf:v1|reg:v1");
        let b = FeatureFingerprint::compute(&vector, "clf:v1|reg:v1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_values_and_model_versions() {
        let base = merge(&AutomaticFeatures::defaults(), None, None);
        let mut changed_block = AutomaticFeatures::defaults();
        changed_block.set(AutomaticFeature::SaveData, 1.0);
        let changed = merge(&changed_block, None, None);

        let key = "clf:placeholder|reg:placeholder";
        assert_ne!(
            FeatureFingerprint::compute(&base, key),
            FeatureFingerprint::compute(&changed, key)
        );
        assert_ne!(
            FeatureFingerprint::compute(&base, key),
            FeatureFingerprint::compute(&base, "clf:v2|reg:placeholder")
        );
    }

    #[test]
    fn test_sub_resolution_noise_is_ignored() {
        let mut a = AutomaticFeatures::defaults();
        a.set(AutomaticFeature::RttNorm, 0.2);
        let mut b = AutomaticFeatures::defaults();
        b.set(AutomaticFeature::RttNorm, 0.2 + 1e-7);
        assert_eq!(
            FeatureFingerprint::compute(&merge(&a, None, None), "k"),
            FeatureFingerprint::compute(&merge(&b, None, None), "k")
        );
    }
}
