//! Progress notification interface.
//!
//! Workers report every chunk they write through a [`ProgressObserver`]. The
//! coordinator wraps the caller's observer in a [`SerializedObserver`], so
//! listeners never see two callbacks at once even though many workers report
//! concurrently.
use indicatif::ProgressBar;
use std::sync::{Arc, Mutex, PoisonError};

pub trait ProgressObserver: Send + Sync {
    /// Called once per chunk written to disk with the chunk's byte count.
    fn inc(&self, bytes: u64);

    /// Bytes found on disk from a previous attempt, reported once per run.
    fn resumed(&self, _bytes: u64) {}

    fn message(&self, _msg: String) {}

    fn finish(&self) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn inc(&self, _bytes: u64) {}
}

/// Drives an `indicatif` progress bar.
pub struct ConsoleObserver {
    pub pb: ProgressBar,
}

impl ProgressObserver for ConsoleObserver {
    fn inc(&self, bytes: u64) {
        self.pb.inc(bytes);
    }

    fn resumed(&self, bytes: u64) {
        self.pb.set_position(bytes);
        self.pb.reset_eta();
    }

    fn message(&self, msg: String) {
        self.pb.set_message(msg);
    }

    fn finish(&self) {
        self.pb.finish();
    }
}

/// Allows at most one in-flight callback on the wrapped observer.
pub struct SerializedObserver {
    inner: Arc<dyn ProgressObserver>,
    gate: Mutex<()>,
}

impl SerializedObserver {
    pub fn new(inner: Arc<dyn ProgressObserver>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    fn with_gate(&self, f: impl FnOnce(&dyn ProgressObserver)) {
        // A listener that panicked does not stop the transfer.
        let _held = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        f(self.inner.as_ref());
    }
}

impl ProgressObserver for SerializedObserver {
    fn inc(&self, bytes: u64) {
        self.with_gate(|o| o.inc(bytes));
    }

    fn resumed(&self, bytes: u64) {
        self.with_gate(|o| o.resumed(bytes));
    }

    fn message(&self, msg: String) {
        self.with_gate(|o| o.message(msg));
    }

    fn finish(&self) {
        self.with_gate(|o| o.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    /// Fails if a second callback enters while one is still running.
    #[derive(Default)]
    struct ReentrancyCheck {
        busy: AtomicBool,
        total: AtomicU64,
    }

    impl ProgressObserver for ReentrancyCheck {
        fn inc(&self, bytes: u64) {
            assert!(
                !self.busy.swap(true, Ordering::SeqCst),
                "observer entered concurrently"
            );
            std::thread::sleep(Duration::from_micros(50));
            self.total.fetch_add(bytes, Ordering::SeqCst);
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_serialized_delivery() {
        let check = Arc::new(ReentrancyCheck::default());
        let observer = Arc::new(SerializedObserver::new(check.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let observer = observer.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        observer.inc(10);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("no re-entrant callback");
        }
        assert_eq!(check.total.load(Ordering::SeqCst), 8 * 50 * 10);
    }

    #[test]
    fn test_console_observer_tracks_position() {
        let observer = ConsoleObserver {
            pb: ProgressBar::hidden(),
        };
        observer.resumed(100);
        observer.inc(50);
        assert_eq!(observer.pb.position(), 150);
    }
}
