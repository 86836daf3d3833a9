use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use study_extract::TaskError;

/// Process-wide counters. Write-only from handlers, so no locking.
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    invalid_requests: AtomicUsize,
    transport_errors: AtomicUsize,
    extraction_errors: AtomicUsize,
    validation_errors: AtomicUsize,

    // Timing (in microseconds)
    total_task_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            invalid_requests: AtomicUsize::new(0),
            transport_errors: AtomicUsize::new(0),
            extraction_errors: AtomicUsize::new(0),
            validation_errors: AtomicUsize::new(0),
            total_task_time_us: AtomicU64::new(0),
        })
    }

    pub fn record<T>(&self, result: &Result<T, TaskError>, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_task_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let counter = match result {
            Ok(_) => &self.successful_requests,
            Err(TaskError::InvalidRequest(_)) => &self.invalid_requests,
            Err(TaskError::Transport(_)) => &self.transport_errors,
            Err(TaskError::Extraction(_)) => &self.extraction_errors,
            Err(TaskError::Validation { .. }) => &self.validation_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            extraction_errors: self.extraction_errors.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            avg_task_time_ms: self.avg_task_time_ms(),
        }
    }

    fn avg_task_time_ms(&self) -> f64 {
        match self.total_requests.load(Ordering::Relaxed) {
            0 => 0.0,
            count => self.total_task_time_us.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub invalid_requests: usize,
    pub transport_errors: usize,
    pub extraction_errors: usize,
    pub validation_errors: usize,
    pub avg_task_time_ms: f64,
}
