//! Deferred, cancellable jobs.
//!
//! The session owns one [`TimerSlot`] for the power-off confirmation and
//! one per zone for post-power-on priming. Scheduling a slot supersedes
//! whatever it held; cancelling is idempotent.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A slot holding at most one pending deferred job.
#[derive(Default)]
pub struct TimerSlot {
    name: &'static str,
    pending: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        TimerSlot {
            name,
            pending: Mutex::new(None),
        }
    }

    /// Run `job` after `delay`, cancelling any job already in the slot.
    ///
    /// The job receives the slot's cancellation token so it can abort its
    /// own sleeps when superseded. A superseded job that is already running
    /// is not aborted; it observes the cancelled token at its next pause.
    pub fn schedule<F, Fut>(&self, delay: Duration, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let job_token = token.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = job_token.cancelled() => {
                    trace!(timer = name, "timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    trace!(timer = name, "timer fired");
                    job(job_token).await;
                }
            }
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((token, handle));
        if let Some((old, _)) = previous {
            old.cancel();
        }
        trace!(timer = name, delay_ms = delay.as_millis() as u64, "timer scheduled");
    }

    /// Cancel the pending job, if any.
    pub fn cancel(&self) {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, _)) = previous {
            if !token.is_cancelled() {
                trace!(timer = self.name, "timer cancelled");
            }
            token.cancel();
        }
    }

    /// Whether a job is scheduled and has neither been cancelled nor
    /// finished.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(token, handle)| !token.is_cancelled() && !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce(CancellationToken) -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let slot = TimerSlot::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(Duration::from_millis(2000), counting_job(&fired));
        assert!(slot.is_pending());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing_and_is_idempotent() {
        let slot = TimerSlot::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(Duration::from_millis(100), counting_job(&fired));
        slot.cancel();
        slot.cancel();
        assert!(!slot.is_pending());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelling an empty slot is fine too.
        TimerSlot::new("empty").cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_supersedes_previous_job() {
        let slot = TimerSlot::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        slot.schedule(Duration::from_millis(100), counting_job(&first));
        tokio::time::sleep(Duration::from_millis(50)).await;
        slot.schedule(Duration::from_millis(100), counting_job(&second));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_sees_cancellation() {
        let slot = TimerSlot::new("test");
        let aborted = Arc::new(AtomicUsize::new(0));
        let flag = aborted.clone();
        slot.schedule(Duration::from_millis(10), move |token| async move {
            tokio::select! {
                _ = token.cancelled() => { flag.fetch_add(1, Ordering::SeqCst); }
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(aborted.load(Ordering::SeqCst), 1);
    }
}
