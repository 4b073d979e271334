//! RotelClient -- the integration-facing handle to one receiver.
//!
//! Built by [`RotelBuilder`](crate::builder::RotelBuilder). Owns the device
//! session and its reconnect supervisor; dropping the client without
//! calling [`shutdown`](RotelClient::shutdown) leaves the background tasks
//! running until the runtime stops.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::info;

use rotel_core::command::LogicalCommand;
use rotel_core::error::Result;
use rotel_core::events::DeviceEvent;
use rotel_core::model::DeviceModel;
use rotel_core::types::{ConnectionStatus, Dialect, Zone};

use crate::sequencer::SubmitOutcome;
use crate::session::Session;
use crate::state::SessionState;
use crate::supervisor::Supervisor;

/// Client for one Rotel device.
pub struct RotelClient {
    session: Arc<Session>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl RotelClient {
    pub(crate) fn new(session: Arc<Session>, supervisor: Supervisor) -> Self {
        RotelClient {
            session,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    /// Execute a logical command.
    ///
    /// Commands the model cannot express in the active dialect return
    /// [`SubmitOutcome::Unsupported`]; only I/O failures and an offline
    /// device are errors.
    pub async fn submit(
        &self,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        self.session.submit(zone, cmd, value).await
    }

    /// Receive state change and connection status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.session.subscribe()
    }

    /// Capability descriptor of the connected model.
    pub fn describe_model(&self) -> &DeviceModel {
        self.session.model()
    }

    pub fn dialect(&self) -> Dialect {
        self.session.dialect()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Copy of the current session state.
    pub async fn snapshot(&self) -> SessionState {
        self.session.snapshot().await
    }

    /// Volume level for `percent` (0-100) of the known volume range, or
    /// `None` when the model has no volume control.
    pub async fn volume_from_percent(&self, percent: f64) -> Option<i32> {
        let range = self.session.volume_range().await?;
        Some(range.from_percent(percent))
    }

    /// Dimmer level for `percent` (0-100) of the model's dimmer range.
    pub fn dimmer_from_percent(&self, percent: f64) -> Option<i32> {
        let range = self.describe_model().dimmer?;
        Some(range.from_percent(percent))
    }

    /// Stop the supervisor, every timer and task, and close the transport.
    /// Calling it again does nothing.
    pub async fn shutdown(&self) {
        let Some(supervisor) = self.supervisor.lock().await.take() else {
            return;
        };
        supervisor.stop().await;
        self.session.shutdown().await;
        info!(model = self.describe_model().name, "client shut down");
    }
}
