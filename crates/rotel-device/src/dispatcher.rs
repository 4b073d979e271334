//! Event dispatcher.
//!
//! A single task drains the IO task's inbound channel and hands every item
//! to a [`FeedbackHandler`], awaiting each call before taking the next, so
//! events are interpreted strictly in arrival order and never concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rotel_core::error::Error;
use rotel_core::events::FeedbackEvent;
use rotel_protocol::io::Inbound;

/// Consumer of decoded feedback.
///
/// The device session implements this. Implementations must not wait on
/// the command sequencer inside these calls; follow-up commands are spawned.
#[async_trait]
pub trait FeedbackHandler: Send + Sync + 'static {
    async fn on_feedback(&self, event: FeedbackEvent);

    /// The reader lost the connection. The transport is already closed.
    async fn on_read_failure(&self, error: Error);
}

/// Spawn the dispatcher task. It ends when `cancel` fires or the inbound
/// channel closes.
pub fn spawn_dispatcher(
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    handler: Arc<dyn FeedbackHandler>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = inbound.recv() => item,
            };
            match item {
                Some(Inbound::Feedback(event)) => {
                    debug!(%event, "dispatching feedback");
                    handler.on_feedback(event).await;
                }
                Some(Inbound::Failed(error)) => handler.on_read_failure(error).await,
                None => break,
            }
        }
        debug!("dispatcher stopped");
    })
}
