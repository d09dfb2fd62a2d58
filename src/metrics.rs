use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity since startup.
#[derive(Default)]
pub struct PipelineMetrics {
    files_processed: AtomicU64,
    degraded_extractions: AtomicU64,
    provider_calls: AtomicU64,
    provider_failures: AtomicU64,
    voice_turns_saved: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file that reached the `reported` state.
    pub fn record_file(&self, degraded: bool) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_extractions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one language-model call and whether it succeeded.
    pub fn record_provider_call(&self, succeeded: bool) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.provider_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a voice exchange persisted to its session.
    pub fn record_voice_exchange(&self) {
        self.voice_turns_saved.fetch_add(2, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            degraded_extractions: self.degraded_extractions.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            voice_turns_saved: self.voice_turns_saved.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files that completed the batch pipeline.
    pub files_processed: u64,
    /// Image or video extractions replaced by a failure sentinel.
    pub degraded_extractions: u64,
    /// Language-model calls attempted.
    pub provider_calls: u64,
    /// Language-model calls that returned an error.
    pub provider_failures: u64,
    /// Chat turns appended by the voice pipeline.
    pub voice_turns_saved: u64,
}
