//! Reconnect supervisor.
//!
//! One periodic task per client. The first tick connects; after that the
//! supervisor only acts when the transport reports disconnected, and then
//! only once per polling interval. A configuration error ends it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::{ReconnectOutcome, Session};

/// Delay before the first connection attempt.
pub const FIRST_TICK: Duration = Duration::from_secs(1);

/// Default interval between connection checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to a running supervisor task.
pub struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Start supervising `session`.
    pub fn spawn(session: Arc<Session>, poll_interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(session, poll_interval, cancel.clone()));
        Supervisor { cancel, task }
    }

    /// Whether the task has ended, by cancellation or a configuration error.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to end. An attempt in progress is
    /// abandoned at its next await point.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn run(session: Arc<Session>, poll_interval: Duration, cancel: CancellationToken) {
    let period = poll_interval.max(Duration::from_millis(1));
    let mut ticks = tokio::time::interval_at(Instant::now() + FIRST_TICK, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }
        if !first && session.is_connected() {
            continue;
        }
        first = false;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = session.reconnect() => outcome,
        };
        match outcome {
            ReconnectOutcome::Online => info!(model = session.model().name, "connected"),
            ReconnectOutcome::Failed => {
                debug!(retry_in_ms = period.as_millis() as u64, "reconnection failed");
            }
            ReconnectOutcome::ConfigError => {
                info!("configuration error, reconnect supervisor stopped");
                break;
            }
        }
    }
    debug!("reconnect supervisor ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::error::Error;
    use rotel_core::types::{ConnectionStatus, Dialect};
    use rotel_test_harness::{MockHandle, MockTransport};

    use crate::models;
    use crate::session::SessionOptions;

    fn session(mock: MockTransport) -> (Arc<Session>, MockHandle) {
        let handle = mock.handle();
        let session = Session::start(
            Arc::new(models::ra_1572()),
            Dialect::AsciiV2,
            Box::new(mock),
            SessionOptions::default(),
        );
        (session, handle)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_connects_after_one_second() {
        let (session, handle) = session(MockTransport::lenient());
        let supervisor = Supervisor::spawn(session.clone(), Duration::from_secs(60));

        advance(900).await;
        assert_eq!(handle.open_count(), 0);
        advance(200).await;
        assert_eq!(handle.open_count(), 1);
        assert_eq!(session.status(), ConnectionStatus::Online);
        assert_eq!(handle.sent_text(), vec!["power?"]);

        // Connected: later ticks leave the transport alone.
        advance(120_000).await;
        assert_eq!(handle.open_count(), 1);

        supervisor.stop().await;
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_is_retried_on_the_poll_cadence() {
        let (session, handle) = session(MockTransport::closed());
        handle.fail_next_open(Error::Transport("port busy".into()));
        let supervisor = Supervisor::spawn(session.clone(), Duration::from_secs(10));

        advance(1_100).await;
        assert_eq!(handle.open_count(), 1);
        assert_eq!(session.status(), ConnectionStatus::OfflineCommError);

        // No retry storm between polls.
        advance(5_000).await;
        assert_eq!(handle.open_count(), 1);

        advance(5_000).await;
        assert_eq!(handle.open_count(), 2);
        assert_eq!(session.status(), ConnectionStatus::Online);

        supervisor.stop().await;
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn config_error_stops_supervision() {
        let (session, handle) = session(MockTransport::closed());
        handle.fail_next_open(Error::Config("no such port".into()));
        let supervisor = Supervisor::spawn(session.clone(), Duration::from_secs(10));

        advance(1_100).await;
        assert_eq!(session.status(), ConnectionStatus::OfflineConfigError);
        assert!(supervisor.is_finished());

        advance(60_000).await;
        assert_eq!(handle.open_count(), 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_never_connects() {
        let (session, handle) = session(MockTransport::lenient());
        let supervisor = Supervisor::spawn(session.clone(), DEFAULT_POLL_INTERVAL);
        advance(500).await;
        supervisor.stop().await;
        advance(5_000).await;
        assert_eq!(handle.open_count(), 0);
        session.shutdown().await;
    }
}
