//! Fail-fast guard against silent degradation of the injection pipeline.
//!
//! Every proposal-building attempt at an injection height either obtains a
//! usable batch or it does not. The guard counts consecutive misses and
//! reports a fatal condition once the count reaches the threshold; the
//! node is expected to stop at that point rather than keep producing
//! blocks without attestations indefinitely.
//!
//! The counter lives in process memory only and starts from zero after a
//! restart.

/// Default number of consecutive failed rounds before halting.
pub const DEFAULT_LIVENESS_FAILURE_THRESHOLD: u64 = 500;

/// Raised on the failure that reaches the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessExceeded {
    pub failures: u64,
    pub threshold: u64,
}

/// Consecutive-failure counter owned by the proposal builder.
#[derive(Clone, Debug)]
pub struct LivenessGuard {
    consecutive_failures: u64,
    threshold: u64,
}

impl LivenessGuard {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u64) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Records a failed attempt.
    ///
    /// Returns the new count, or [`LivenessExceeded`] when this failure
    /// reaches the threshold.
    pub fn record_failure(&mut self) -> Result<u64, LivenessExceeded> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= self.threshold {
            return Err(LivenessExceeded {
                failures: self.consecutive_failures,
                threshold: self.threshold,
            });
        }

        tracing::warn!(
            consecutive_failures = self.consecutive_failures,
            threshold = self.threshold,
            "attestation round failed"
        );
        Ok(self.consecutive_failures)
    }

    /// Records a successful attempt, resetting the counter.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::info!(
                previous_failures = self.consecutive_failures,
                "attestation pipeline recovered"
            );
        }
        self.consecutive_failures = 0;
    }
}

impl Default for LivenessGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_FAILURE_THRESHOLD)
    }
}
