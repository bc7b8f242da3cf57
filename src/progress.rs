use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

const DEFAULT_LOG_EVERY: usize = 1000;

/// Advisory progress counter shared between concurrent tasks.
///
/// Nothing in the pipeline depends on its values; it only logs.
#[derive(Debug)]
pub struct Progress {
    label: Mutex<String>,
    total: AtomicUsize,
    done: AtomicUsize,
    log_every: usize,
}

impl Progress {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_LOG_EVERY)
    }

    pub fn with_interval(log_every: usize) -> Self {
        Self {
            label: Mutex::new(String::new()),
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            log_every: log_every.max(1),
        }
    }

    pub fn reset(&self, label: &str, total: usize) {
        if let Ok(mut guard) = self.label.lock() {
            *guard = label.to_string();
        }
        self.total.store(total, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
        info!(total, "{}", label);
    }

    pub fn increment(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        if done % self.log_every == 0 || done == total {
            let label = self.label.lock().map(|l| l.clone()).unwrap_or_default();
            info!(done, total, "{}", label);
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
