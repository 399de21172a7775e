// src/prediction/error.rs

/// The only failures a prediction call surfaces. Both mean the service is
/// saturated; everything else degrades to placeholder output instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    /// Too many distinct fingerprints are already being computed
    Overloaded { in_flight: usize, limit: usize },
    /// Waiting on another caller's computation exceeded the latency budget
    WaitTimedOut { waited_ms: u64 },
}

impl PredictionError {
    pub fn is_overloaded(&self) -> bool {
        matches!(
            self,
            PredictionError::Overloaded { .. } | PredictionError::WaitTimedOut { .. }
        )
    }
}

impl std::fmt::Display for PredictionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionError::Overloaded { in_flight, limit } => write!(
                f,
                "Prediction service overloaded: {} computations in flight (limit {})",
                in_flight, limit
            ),
            PredictionError::WaitTimedOut { waited_ms } => write!(
                f,
                "Timed out after {}ms waiting for an in-flight prediction",
                waited_ms
            ),
        }
    }
}

impl std::error::Error for PredictionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_variants_signal_overload() {
        let overloaded = PredictionError::Overloaded { in_flight: 8, limit: 8 };
        let timed_out = PredictionError::WaitTimedOut { waited_ms: 100 };
        assert!(overloaded.is_overloaded());
        assert!(timed_out.is_overloaded());
        assert!(overloaded.to_string().contains("limit 8"));
        assert!(timed_out.to_string().contains("100ms"));
    }
}
