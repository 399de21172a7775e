// src/prediction/prediction_cache.rs
//! Single-flight LRU + TTL memo for predictions, keyed by fingerprint.
//!
//! One mutex guards both the LRU and the in-flight map, so a lookup, its TTL
//! check and the decision to lead or follow happen atomically. The leader's
//! computation runs in its own tokio task: it publishes the result and clears
//! its in-flight entry under a single lock, and it finishes even if every
//! caller waiting on it is cancelled. The cache is best effort; a poisoned
//! lock or a panicked leader falls through to computing directly.

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::error::PredictionError;
use crate::features::FeatureFingerprint;
use crate::models::PredictionResult;
use crate::utils::predictor_config::PredictorConfig;

const DEFAULT_CACHE_SIZE: usize = 10_000;

type Computation = Arc<dyn Fn() -> PredictionResult + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Option<PredictionResult>>>;

/// How a `get_or_compute` call obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A live entry was already stored
    Hit,
    /// Another caller was already computing the same fingerprint
    Coalesced,
    /// This caller led the computation
    Computed,
    /// The cache was unusable and the result was computed directly
    Bypassed,
}

impl CacheOutcome {
    /// True when this caller did not run the models itself.
    pub fn is_cache_hit(self) -> bool {
        matches!(self, CacheOutcome::Hit | CacheOutcome::Coalesced)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub expired: u64,
    pub direct_fallbacks: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses + self.coalesced;
        if lookups == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / lookups as f64
        }
    }
}

struct CacheEntry {
    result: PredictionResult,
    inserted_at: Instant,
}

struct CacheState {
    entries: LruCache<FeatureFingerprint, CacheEntry>,
    in_flight: HashMap<FeatureFingerprint, InFlight>,
    stats: CacheStats,
}

enum Lookup {
    Hit(PredictionResult),
    Follow(InFlight),
    Lead(InFlight),
}

pub struct PredictionCache {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
    max_in_flight: usize,
    latency_budget: Duration,
    // Counted outside the lock since a poisoned lock is one of the reasons.
    direct_fallbacks: AtomicU64,
}

impl PredictionCache {
    pub fn new(
        capacity: usize,
        ttl: Duration,
        max_in_flight: usize,
        latency_budget: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        info!(
            "Initializing PredictionCache with capacity {}, ttl {:?}, max in flight {}",
            capacity, ttl, max_in_flight
        );
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            })),
            ttl,
            max_in_flight: max_in_flight.max(1),
            latency_budget,
            direct_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &PredictorConfig) -> Self {
        Self::new(
            config.cache_size,
            config.cache_ttl(),
            config.max_in_flight,
            config.latency_budget(),
        )
    }

    /// Returns the memoized result for `fingerprint`, joining an in-flight
    /// computation or leading a new one as needed.
    pub async fn get_or_compute<F>(
        &self,
        fingerprint: &FeatureFingerprint,
        compute: F,
    ) -> Result<(PredictionResult, CacheOutcome), PredictionError>
    where
        F: Fn() -> PredictionResult + Send + Sync + 'static,
    {
        let compute: Computation = Arc::new(compute);

        let lookup = match self.state.lock() {
            Ok(mut state) => self.lookup(&mut state, fingerprint, &compute)?,
            Err(_) => {
                warn!("PredictionCache lock poisoned, computing prediction directly");
                return Ok(self.compute_directly(&compute));
            }
        };

        match lookup {
            Lookup::Hit(result) => Ok((result, CacheOutcome::Hit)),
            Lookup::Lead(computation) => match computation.await {
                Some(result) => Ok((result, CacheOutcome::Computed)),
                None => Ok(self.compute_directly(&compute)),
            },
            Lookup::Follow(computation) => {
                match tokio::time::timeout(self.latency_budget, computation).await {
                    Ok(Some(result)) => Ok((result, CacheOutcome::Coalesced)),
                    Ok(None) => Ok(self.compute_directly(&compute)),
                    Err(_) => Err(PredictionError::WaitTimedOut {
                        waited_ms: self.latency_budget.as_millis() as u64,
                    }),
                }
            }
        }
    }

    fn lookup(
        &self,
        state: &mut CacheState,
        fingerprint: &FeatureFingerprint,
        compute: &Computation,
    ) -> Result<Lookup, PredictionError> {
        let now = Instant::now();
        let fresh = state
            .entries
            .get(fingerprint)
            .map(|entry| (now.duration_since(entry.inserted_at) < self.ttl, entry));
        match fresh {
            Some((true, entry)) => {
                let result = entry.result.clone();
                state.stats.hits += 1;
                if state.stats.hits % 100 == 0 {
                    info!(
                        "PredictionCache stats - hits: {}, misses: {}, coalesced: {}, hit rate: {:.2}%",
                        state.stats.hits,
                        state.stats.misses,
                        state.stats.coalesced,
                        state.stats.hit_rate() * 100.0
                    );
                }
                return Ok(Lookup::Hit(result));
            }
            Some((false, _)) => {
                state.entries.pop(fingerprint);
                state.stats.expired += 1;
            }
            None => {}
        }

        if let Some(computation) = state.in_flight.get(fingerprint) {
            state.stats.coalesced += 1;
            return Ok(Lookup::Follow(computation.clone()));
        }

        if state.in_flight.len() >= self.max_in_flight {
            return Err(PredictionError::Overloaded {
                in_flight: state.in_flight.len(),
                limit: self.max_in_flight,
            });
        }

        state.stats.misses += 1;
        // Spawned while the lock is held, so the task cannot clear the
        // in-flight entry before it is published.
        let computation = self.spawn_leader(fingerprint.clone(), Arc::clone(compute));
        state.in_flight.insert(fingerprint.clone(), computation.clone());
        Ok(Lookup::Lead(computation))
    }

    fn spawn_leader(&self, fingerprint: FeatureFingerprint, compute: Computation) -> InFlight {
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let outcome = catch_unwind(AssertUnwindSafe(|| compute())).ok();
            match state.lock() {
                Ok(mut state) => {
                    if let Some(result) = &outcome {
                        state.entries.put(
                            fingerprint.clone(),
                            CacheEntry {
                                result: result.clone(),
                                inserted_at: Instant::now(),
                            },
                        );
                    }
                    state.in_flight.remove(&fingerprint);
                }
                Err(_) => warn!("PredictionCache lock poisoned, result for {} not stored", fingerprint),
            }
            if outcome.is_none() {
                warn!("Prediction for {} panicked; callers will compute directly", fingerprint);
            }
            outcome
        });
        async move { handle.await.ok().flatten() }.boxed().shared()
    }

    fn compute_directly(&self, compute: &Computation) -> (PredictionResult, CacheOutcome) {
        self.direct_fallbacks.fetch_add(1, Ordering::Relaxed);
        (compute(), CacheOutcome::Bypassed)
    }

    /// Evicts every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let now = Instant::now();
        let expired: Vec<FeatureFingerprint> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= self.ttl)
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();
        for fingerprint in &expired {
            state.entries.pop(fingerprint);
        }
        state.stats.expired += expired.len() as u64;
        expired.len()
    }

    /// Sweeps on a fixed interval until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!("PredictionCache sweep evicted {} expired entries", removed);
                }
            }
        })
    }

    /// Empties the cache and resets its counters. In-flight computations
    /// still publish their results when they finish.
    pub fn clear(&self) {
        match self.state.lock() {
            Ok(mut state) => {
                state.entries.clear();
                state.stats = CacheStats::default();
            }
            Err(_) => warn!("PredictionCache lock poisoned, clear skipped"),
        }
        self.direct_fallbacks.store(0, Ordering::Relaxed);
        info!("Prediction cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self
            .state
            .lock()
            .map(|state| state.stats)
            .unwrap_or_default();
        stats.direct_fallbacks = self.direct_fallbacks.load(Ordering::Relaxed);
        stats
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.in_flight.len())
            .unwrap_or(0)
    }
}
