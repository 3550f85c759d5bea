// Path: crates/fraud-telemetry/src/time.rs
use crate::sinks::WorkerMetricsSink;
use std::time::Instant;

/// RAII timer that records its elapsed lifetime to a `WorkerMetricsSink` on drop.
/// Used to time one evaluation-worker main-loop iteration regardless of the
/// exit path (early return, `?`, or normal fall-through).
pub struct Timer<'a> {
    sink: &'a dyn WorkerMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(sink: &'a dyn WorkerMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_batch_duration(self.start.elapsed().as_secs_f64());
    }
}
