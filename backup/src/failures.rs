//! Cross-thread collection of worker panics.
//!
//! Workers never unwind past their thread boundary; panics are captured
//! here, the pipeline flips to abort, and the first failure is re-raised on
//! the main thread once every pool has been joined.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One captured worker failure.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    /// Name of the queue whose worker failed.
    pub queue: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct FailureCollector {
    flagged: AtomicBool,
    failures: Mutex<Vec<WorkerFailure>>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap check, safe to call from every worker iteration.
    pub fn any(&self) -> bool {
        self.flagged.load(Ordering::SeqCst)
    }

    pub fn record(&self, queue: &'static str, message: String) {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        failures.push(WorkerFailure { queue, message });
        self.flagged.store(true, Ordering::SeqCst);
    }

    /// Capture a panic payload, keeping the panic message when it is a
    /// string.
    pub fn record_panic(&self, queue: &'static str, payload: Box<dyn Any + Send>) {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        self.record(queue, message);
    }

    /// The failure that will be re-raised.
    pub fn first(&self) -> Option<WorkerFailure> {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        failures.first().cloned()
    }

    /// Multi-line description of everything captured, or `None` when the run
    /// was clean.
    pub fn summary(&self) -> Option<String> {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if failures.is_empty() {
            return None;
        }

        let mut text = format!("Found {} failures thrown from worker threads:", failures.len());
        for (index, failure) in failures.iter().enumerate() {
            text.push_str(&format!(
                "\n\t#{index}: [{}] \"{}\"",
                failure.queue, failure.message
            ));
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let collector = FailureCollector::new();
        assert!(!collector.any());
        assert!(collector.summary().is_none());
        assert!(collector.first().is_none());
    }

    #[test]
    fn records_in_order() {
        let collector = FailureCollector::new();
        collector.record("copy", "first".to_string());
        collector.record("remove", "second".to_string());

        assert!(collector.any());
        let first = collector.first().unwrap();
        assert_eq!(first.queue, "copy");
        assert_eq!(first.message, "first");

        let summary = collector.summary().unwrap();
        assert!(summary.contains("2 failures"));
        assert!(summary.contains("first"));
        assert!(summary.contains("second"));
    }

    #[test]
    fn captures_panic_payloads() {
        let collector = FailureCollector::new();
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        collector.record_panic("file-compare", payload);

        let first = collector.first().unwrap();
        assert_eq!(first.message, "boom");
    }
}
