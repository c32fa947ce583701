//! Debounce timer that coalesces bursts of file-system events.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tracing::debug;

/// Debounce timer that triggers a callback after a period of inactivity.
///
/// Each call to `trigger()` resets the timer. When the timer expires
/// (no triggers for the specified duration), the callback is executed.
/// `trigger()` is synchronous so it can be called from watcher threads
/// that live outside the tokio runtime.
pub struct Debouncer {
    reset_tx: mpsc::Sender<()>,
    cancel: Arc<Notify>,
}

impl Debouncer {
    /// Create a new debouncer. Must be called inside a tokio runtime.
    pub fn new<F>(duration: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (reset_tx, mut reset_rx) = mpsc::channel::<()>(16);
        let cancel = Arc::new(Notify::new());
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_clone.notified() => break,
                    result = reset_rx.recv() => {
                        if result.is_none() {
                            break;
                        }

                        // Keep resetting while triggers come in
                        loop {
                            tokio::select! {
                                biased;

                                _ = cancel_clone.notified() => return,
                                result = reset_rx.recv() => {
                                    if result.is_none() {
                                        return;
                                    }
                                }
                                _ = sleep(duration) => {
                                    callback();
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { reset_tx, cancel }
    }

    /// Start or restart the timer.
    ///
    /// A full channel already guarantees a pending fire, so the extra
    /// signal is dropped.
    pub fn trigger(&self) {
        if let Err(e) = self.reset_tx.try_send(()) {
            debug!("Debounce trigger dropped: {e}");
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(duration_ms: u64) -> (Debouncer, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let debouncer = Debouncer::new(Duration::from_millis(duration_ms), move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, counter)
    }

    #[tokio::test]
    async fn test_fires_once_after_quiet_period() {
        let (debouncer, counter) = counting(50);

        debouncer.trigger();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_burst_coalesces() {
        let (debouncer, counter) = counting(50);

        for _ in 0..5 {
            debouncer.trigger();
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_from_plain_thread() {
        let (debouncer, counter) = counting(30);
        let debouncer = Arc::new(debouncer);

        let d = debouncer.clone();
        std::thread::spawn(move || d.trigger()).join().unwrap();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (debouncer, counter) = counting(50);

        debouncer.trigger();
        drop(debouncer);

        sleep(Duration::from_millis(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
