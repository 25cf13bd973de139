//! Progress callbacks and throttled progress tracking

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Receives `(processed, total)` segment counts during a build.
///
/// `processed` counts segments folded into a batch or skipped. The last call
/// of a successful build is always `(total, total)`.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, processed: usize, total: usize);
}

impl<F> ProgressCallback for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// Callback that ignores progress
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _processed: usize, _total: usize) {}
}

/// Build phases as shown to the operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Probing,
    Complete,
    Failed,
    Cancelled,
}

/// Snapshot of build progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub phase: ProgressPhase,
    /// Whole percent, 0 to 100
    pub percent: u32,
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

type Listener = Box<dyn Fn(&ProgressInfo) + Send + Sync>;

/// Throttles raw progress into at most one update per interval and logs it
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressTrackerInner>>,
    listener: Arc<Option<Listener>>,
}

struct ProgressTrackerInner {
    info: ProgressInfo,
    start_time: Instant,
    last_update: Option<Instant>,
    update_interval: Duration,
}

impl ProgressTracker {
    /// Tracker emitting at most ten updates per second
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(100))
    }

    pub fn with_interval(update_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressTrackerInner {
                info: ProgressInfo {
                    phase: ProgressPhase::Probing,
                    percent: 0,
                    processed: 0,
                    total: 0,
                    elapsed: Duration::ZERO,
                    eta: None,
                },
                start_time: Instant::now(),
                last_update: None,
                update_interval,
            })),
            listener: Arc::new(None),
        }
    }

    /// Forward every emitted update to `listener`
    pub fn with_listener(mut self, listener: impl Fn(&ProgressInfo) + Send + Sync + 'static) -> Self {
        self.listener = Arc::new(Some(Box::new(listener)));
        self
    }

    pub fn info(&self) -> ProgressInfo {
        self.inner.lock().info.clone()
    }

    /// Record a terminal phase and emit it unconditionally
    pub fn finish(&self, phase: ProgressPhase) {
        let info = {
            let mut inner = self.inner.lock();
            inner.info.phase = phase;
            inner.info.elapsed = inner.start_time.elapsed();
            inner.info.eta = None;
            inner.info.clone()
        };
        self.emit(&info);
    }

    fn emit(&self, info: &ProgressInfo) {
        info!(
            phase = ?info.phase,
            processed = info.processed,
            total = info.total,
            percent = info.percent,
            eta_ms = info.eta.map(|eta| eta.as_millis() as u64),
            "build progress"
        );
        if let Some(listener) = self.listener.as_ref() {
            listener(info);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for ProgressTracker {
    fn on_progress(&self, processed: usize, total: usize) {
        let emitted = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let elapsed = now.duration_since(inner.start_time);

            inner.info.processed = processed;
            inner.info.total = total;
            inner.info.percent = crate::utils::percent(processed, total);
            inner.info.elapsed = elapsed;
            inner.info.eta = if processed > 0 && processed < total {
                let per_segment = elapsed / processed as u32;
                Some(per_segment * (total - processed) as u32)
            } else {
                None
            };
            if processed >= total {
                inner.info.phase = ProgressPhase::Complete;
            }

            let due = inner
                .last_update
                .map_or(true, |last| now.duration_since(last) >= inner.update_interval);
            if due || processed >= total {
                inner.last_update = Some(now);
                Some(inner.info.clone())
            } else {
                None
            }
        };

        if let Some(info) = emitted {
            self.emit(&info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_is_a_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |processed: usize, total: usize| sink.lock().push((processed, total));

        callback.on_progress(1, 3);
        callback.on_progress(3, 3);

        assert_eq!(*seen.lock(), vec![(1, 3), (3, 3)]);
    }

    #[test]
    fn test_tracker_throttles_but_always_emits_completion() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&emitted);
        let tracker = ProgressTracker::with_interval(Duration::from_secs(3600))
            .with_listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        for processed in 1..10 {
            tracker.on_progress(processed, 10);
        }
        assert_eq!(emitted.load(Ordering::SeqCst), 1);

        tracker.on_progress(10, 10);
        assert_eq!(emitted.load(Ordering::SeqCst), 2);
        let info = tracker.info();
        assert_eq!(info.percent, 100);
        assert_eq!(info.phase, ProgressPhase::Complete);
    }

    #[test]
    fn test_finish_records_phase() {
        let tracker = ProgressTracker::new();
        tracker.on_progress(2, 5);
        tracker.finish(ProgressPhase::Cancelled);
        assert_eq!(tracker.info().phase, ProgressPhase::Cancelled);
        assert_eq!(tracker.info().eta, None);
    }
}
