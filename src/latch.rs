//! Countdown barriers used to track worker exits.
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// A one-shot countdown latch that async tasks can wait on.
#[derive(Debug)]
pub struct CountdownLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    /// Decrements the count, waking all waiters when it reaches zero.
    /// Counting down an open latch does nothing.
    pub fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Resolves once the count has reached zero.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent final count_down is not missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// The two barriers of a run.
///
/// `stop` is decremented by every worker exactly once, however it exits.
/// `done` is decremented only by workers that read their range to the end.
#[derive(Debug)]
pub struct Barriers {
    pub stop: CountdownLatch,
    pub done: CountdownLatch,
}

impl Barriers {
    pub fn new(count: usize) -> Self {
        Self {
            stop: CountdownLatch::new(count),
            done: CountdownLatch::new(count),
        }
    }

    /// Accounts for a segment that needs no worker.
    pub fn skip(&self) {
        self.done.count_down();
        self.stop.count_down();
    }

    pub fn unfinished(&self) -> usize {
        self.done.count()
    }
}

/// Counts down the stop barrier when dropped, so every exit path of a
/// worker is accounted for.
pub struct StopGuard<'a>(pub &'a CountdownLatch);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.count_down();
    }
}
