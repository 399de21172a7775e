// src/utils/predictor_config.rs

use log::info;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_CLASSIFIER_FILE: &str = "style_classifier.json";
const DEFAULT_REGRESSOR_FILE: &str = "style_regressor.json";
const DEFAULT_CACHE_SIZE: usize = 10_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_LATENCY_BUDGET_MS: u64 = 100;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const IN_FLIGHT_PER_CORE: usize = 64;

/// Runtime configuration for the prediction core
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Directory holding the trained artifacts
    pub model_dir: PathBuf,
    /// File name of the style-class artifact inside `model_dir`
    pub classifier_file: String,
    /// File name of the style-value artifact inside `model_dir`
    pub regressor_file: String,
    /// Maximum number of memoized predictions
    pub cache_size: usize,
    /// Lifetime of a memoized prediction
    pub cache_ttl_secs: u64,
    /// Upper bound on concurrently computing fingerprints
    pub max_in_flight: usize,
    /// Longest a caller may wait on another caller's computation
    pub latency_budget_ms: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            classifier_file: DEFAULT_CLASSIFIER_FILE.to_string(),
            regressor_file: DEFAULT_REGRESSOR_FILE.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_in_flight: default_max_in_flight(),
            latency_budget_ms: DEFAULT_LATENCY_BUDGET_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

fn default_max_in_flight() -> usize {
    num_cpus::get().max(1) * IN_FLIGHT_PER_CORE
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl PredictorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: env::var("STYLE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            classifier_file: env::var("STYLE_CLASSIFIER_FILE")
                .unwrap_or(defaults.classifier_file),
            regressor_file: env::var("STYLE_REGRESSOR_FILE").unwrap_or(defaults.regressor_file),
            // A zero-sized LRU is not constructible, so zero falls back to the default.
            cache_size: match parse_env("PREDICTION_CACHE_SIZE", defaults.cache_size) {
                0 => DEFAULT_CACHE_SIZE,
                n => n,
            },
            cache_ttl_secs: parse_env("PREDICTION_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            max_in_flight: match parse_env("PREDICTION_MAX_IN_FLIGHT", defaults.max_in_flight) {
                0 => default_max_in_flight(),
                n => n,
            },
            latency_budget_ms: parse_env(
                "PREDICTION_LATENCY_BUDGET_MS",
                defaults.latency_budget_ms,
            ),
            sweep_interval_secs: parse_env(
                "PREDICTION_CACHE_SWEEP_SECS",
                defaults.sweep_interval_secs,
            ),
        }
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.model_dir.join(&self.classifier_file)
    }

    pub fn regressor_path(&self) -> PathBuf {
        self.model_dir.join(&self.regressor_file)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Log the current configuration
    pub fn log_config(&self) {
        info!("🎨 Style predictor configuration");
        info!("   Classifier artifact: {}", self.classifier_path().display());
        info!("   Regressor artifact: {}", self.regressor_path().display());
        info!(
            "   Prediction cache: size={}, ttl={}s, sweep every {}s",
            self.cache_size, self.cache_ttl_secs, self.sweep_interval_secs
        );
        info!(
            "   Concurrency: max_in_flight={}, latency budget={}ms",
            self.max_in_flight, self.latency_budget_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = PredictorConfig::default();
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert_eq!(config.cache_size, 10_000);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.latency_budget_ms, 100);
        assert!(config.max_in_flight >= IN_FLIGHT_PER_CORE);
        assert_eq!(
            config.classifier_path(),
            PathBuf::from("models").join("style_classifier.json")
        );
    }

    #[test]
    fn test_env_config() {
        env::set_var("STYLE_MODEL_DIR", "/srv/style-models");
        env::set_var("PREDICTION_CACHE_SIZE", "512");
        env::set_var("PREDICTION_CACHE_TTL_SECS", "30");
        env::set_var("PREDICTION_MAX_IN_FLIGHT", "0");
        env::set_var("PREDICTION_LATENCY_BUDGET_MS", "not-a-number");

        let config = PredictorConfig::from_env();
        assert_eq!(config.model_dir, PathBuf::from("/srv/style-models"));
        assert_eq!(config.cache_size, 512);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.max_in_flight, default_max_in_flight());
        assert_eq!(config.latency_budget_ms, 100);

        // Clean up
        env::remove_var("STYLE_MODEL_DIR");
        env::remove_var("PREDICTION_CACHE_SIZE");
        env::remove_var("PREDICTION_CACHE_TTL_SECS");
        env::remove_var("PREDICTION_MAX_IN_FLIGHT");
        env::remove_var("PREDICTION_LATENCY_BUDGET_MS");
    }
}
