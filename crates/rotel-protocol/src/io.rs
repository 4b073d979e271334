//! IO task owning the transport.
//!
//! One tokio task owns the transport exclusively. It serves open, write and
//! close requests from the device session and, while connected, reads the
//! device's unsolicited byte stream, feeds it to the wire codec and forwards
//! every decoded feedback event, in order, to the event dispatcher.
//!
//! The task never reconnects on its own. When a read fails it closes the
//! transport, reports [`Inbound::Failed`] and idles until the next
//! [`DeviceIo::open`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use rotel_core::error::{Error, Result};
use rotel_core::events::FeedbackEvent;
use rotel_core::transport::Transport;

use crate::codec::WireCodec;

/// How long a single read waits before giving requests a turn.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

/// Item delivered from the IO task to the dispatcher.
#[derive(Debug)]
pub enum Inbound {
    Feedback(FeedbackEvent),
    /// The connection broke while reading. The transport has been closed.
    Failed(Error),
}

/// A request sent from the session to the IO task.
pub enum Request {
    Open {
        reply: oneshot::Sender<Result<()>>,
    },
    Write {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    /// Stop the task; returns the transport for recovery.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Handle to the IO task.
pub struct DeviceIo {
    tx: mpsc::Sender<Request>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceIo {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::StreamClosed)?;
        reply_rx.await.map_err(|_| Error::StreamClosed)
    }

    /// Open the transport. A no-op for transports that are already open.
    pub async fn open(&self) -> Result<()> {
        self.request(|reply| Request::Open { reply }).await?
    }

    /// Write one encoded frame.
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.request(|reply| Request::Write { data, reply }).await?
    }

    /// Close the transport. Reading stops until the next open.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Request::Close { reply }).await
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the transport and stop the IO task without giving up the
    /// handle. Later requests fail with [`Error::StreamClosed`].
    pub async fn stop(&self) {
        let _ = self.close().await;
        self.cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Shut down the IO task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let transport = self
            .request(|reply| Request::Shutdown { reply })
            .await;
        self.cancel.cancel();
        let _ = self.task.await;
        transport
    }
}

/// Spawn the IO task.
///
/// `codec` is used for decoding only; encoding happens on the caller side.
/// Events and failures are delivered on `inbound`.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    codec: Box<dyn WireCodec>,
    inbound: mpsc::UnboundedSender<Inbound>,
) -> DeviceIo {
    let (tx, rx) = mpsc::channel::<Request>(32);
    let connected = Arc::new(AtomicBool::new(transport.is_connected()));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        transport,
        codec,
        inbound,
        rx,
        connected.clone(),
        cancel.clone(),
    ));

    DeviceIo {
        tx,
        connected,
        cancel,
        task,
    }
}

async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut codec: Box<dyn WireCodec>,
    inbound: mpsc::UnboundedSender<Inbound>,
    mut rx: mpsc::Receiver<Request>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut reading = transport.is_connected();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Shutdown { reply }) => {
                        debug!("IO task shutdown requested");
                        let _ = transport.close().await;
                        connected.store(false, Ordering::SeqCst);
                        let _ = reply.send(transport);
                        return;
                    }
                    Some(req) => {
                        handle_request(req, &mut transport, &mut *codec).await;
                        reading = transport.is_connected();
                        connected.store(reading, Ordering::SeqCst);
                    }
                    None => {
                        debug!("request channel closed, exiting IO task");
                        break;
                    }
                }
            }

            (result, buf) = async {
                let mut buf = [0u8; READ_CHUNK];
                let result = transport.receive(&mut buf, READ_TIMEOUT).await;
                (result, buf)
            }, if reading => {
                let failure = match result {
                    Ok(0) => None,
                    Ok(n) => {
                        trace!(bytes = ?&buf[..n], "received");
                        for event in codec.decode(&buf[..n]) {
                            let _ = inbound.send(Inbound::Feedback(event));
                        }
                        codec
                            .framing_failed()
                            .then(|| Error::Protocol("persistent framing failure".into()))
                    }
                    Err(Error::Timeout) => {
                        (!transport.is_connected()).then_some(Error::ConnectionLost)
                    }
                    Err(e) => Some(e),
                };
                if let Some(err) = failure {
                    warn!(%err, "read failed, closing transport");
                    let _ = transport.close().await;
                    codec.reset();
                    reading = false;
                    connected.store(false, Ordering::SeqCst);
                    let _ = inbound.send(Inbound::Failed(err));
                }
            }
        }
    }
}

async fn handle_request(req: Request, transport: &mut Box<dyn Transport>, codec: &mut dyn WireCodec) {
    match req {
        Request::Open { reply } => {
            let result = if transport.is_connected() {
                Ok(())
            } else {
                codec.reset();
                transport.open().await
            };
            match &result {
                Ok(()) => info!("transport open"),
                Err(e) => debug!(err = %e, "transport open failed"),
            }
            let _ = reply.send(result);
        }
        Request::Write { data, reply } => {
            trace!(bytes = ?data, "sending");
            let result = if transport.is_connected() {
                transport.send(&data).await
            } else {
                Err(Error::NotConnected)
            };
            let _ = reply.send(result);
        }
        Request::Close { reply } => {
            if transport.is_connected() {
                let _ = transport.close().await;
                info!("transport closed");
            }
            codec.reset();
            let _ = reply.send(());
        }
        Request::Shutdown { .. } => unreachable!("Shutdown handled in io_loop"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::codec_for;
    use rotel_core::model::DeviceModel;
    use rotel_core::types::Dialect;
    use rotel_test_harness::MockTransport;

    fn v2_codec() -> Box<dyn WireCodec> {
        codec_for(Dialect::AsciiV2, Arc::new(DeviceModel::default()))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Inbound>) -> Inbound {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no inbound item")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn forwards_unsolicited_feedback_in_order() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);
        assert!(io.is_connected());

        handle.push_inbound(b"power=on$volume=");
        handle.push_inbound(b"30$");

        match next(&mut rx).await {
            Inbound::Feedback(e) => assert_eq!(e, FeedbackEvent::new("power", "on")),
            other => panic!("unexpected {other:?}"),
        }
        match next(&mut rx).await {
            Inbound::Feedback(e) => assert_eq!(e, FeedbackEvent::new("volume", "30")),
            other => panic!("unexpected {other:?}"),
        }

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn write_reaches_transport_and_reply_is_read() {
        let mut mock = MockTransport::new();
        mock.expect(b"power?", b"power=standby$");
        let handle = mock.handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);

        io.write(b"power?".to_vec()).await.unwrap();
        match next(&mut rx).await {
            Inbound::Feedback(e) => assert_eq!(e.value, "standby"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(handle.sent_data(), vec![b"power?".to_vec()]);

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn write_when_closed_is_not_connected() {
        let mock = MockTransport::closed();
        let (tx, _rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);
        assert!(!io.is_connected());
        assert!(matches!(
            io.write(b"power_on!".to_vec()).await,
            Err(Error::NotConnected)
        ));
        io.open().await.unwrap();
        assert!(io.is_connected());
        io.write(b"power_on!".to_vec()).await.unwrap();
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let mock = MockTransport::closed();
        let handle = mock.handle();
        handle.fail_next_open(Error::Transport("no such port".into()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);
        assert!(matches!(io.open().await, Err(Error::Transport(_))));
        assert!(!io.is_connected());
        io.open().await.unwrap();
        assert_eq!(handle.open_count(), 2);
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_reports_failure_and_stops_reading() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);

        handle.set_connected(false);
        assert!(matches!(next(&mut rx).await, Inbound::Failed(_)));
        assert!(!io.is_connected());
        assert_eq!(handle.close_count(), 1);

        // Nothing more is read until the next open.
        handle.push_inbound(b"power=on$");
        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err()
        );

        io.open().await.unwrap();
        match next(&mut rx).await {
            Inbound::Feedback(e) => assert_eq!(e.key, "power"),
            other => panic!("unexpected {other:?}"),
        }
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn stop_closes_and_refuses_further_requests() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);
        io.stop().await;
        assert!(!io.is_connected());
        assert_eq!(handle.close_count(), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            io.write(b"power?".to_vec()).await,
            Err(Error::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn close_then_shutdown_recovers_transport() {
        let mock = MockTransport::lenient();
        let handle = mock.handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(Box::new(mock), v2_codec(), tx);
        io.close().await.unwrap();
        assert!(!io.is_connected());
        assert!(!handle.is_connected());
        let transport = io.shutdown().await.unwrap();
        assert!(!transport.is_connected());
    }
}
