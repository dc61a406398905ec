//! Mastership driver.
//!
//! Translates role-change events of the cluster into lifecycle calls on one
//! manager. Events are handled strictly in arrival order, so a drain started
//! by `BecameSlave` is finished before the next event is looked at.

use crate::domain::DeviceId;
use crate::ports::inbound::MastershipControl;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// Role change for one device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MastershipEvent {
    /// This node became master of the device
    BecameMaster(DeviceId),
    /// Another node took over mastership
    BecameSlave(DeviceId),
    /// Device connection is gone for good
    Disconnected(DeviceId),
}

impl MastershipEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::BecameMaster(id) | Self::BecameSlave(id) | Self::Disconnected(id) => id,
        }
    }
}

/// Driver configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MastershipDriverConfig {
    /// Enable submission and flush right after a successful activation.
    /// When off, the orchestrator calls `enable_submit` itself.
    pub submit_on_activate: bool,
}

impl Default for MastershipDriverConfig {
    fn default() -> Self {
        Self {
            submit_on_activate: true,
        }
    }
}

/// Whether the driver keeps listening after an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStep {
    Continue,
    Stop,
}

/// Drives one manager from a stream of [`MastershipEvent`]s
pub struct MastershipDriver<M: MastershipControl> {
    control: M,
    config: MastershipDriverConfig,
}

impl<M: MastershipControl> MastershipDriver<M> {
    pub fn new(control: M, config: MastershipDriverConfig) -> Self {
        Self { control, config }
    }

    pub fn control(&self) -> &M {
        &self.control
    }

    /// Apply one event. Events for other devices are skipped.
    pub async fn handle_event(&self, event: &MastershipEvent) -> DriverStep {
        let device_id = self.control.device_id();
        if event.device_id() != device_id {
            return DriverStep::Continue;
        }

        match event {
            MastershipEvent::BecameMaster(_) => {
                let outcome = if self.config.submit_on_activate {
                    self.control.activate_then_submit().map(|_| ())
                } else {
                    self.control.activate()
                };
                match outcome {
                    Ok(()) => info!(device_id = %device_id, "Mastership gained, transaction chain active"),
                    Err(e) => warn!(device_id = %device_id, error = %e, "Activation on mastership gain failed"),
                }
                DriverStep::Continue
            }
            MastershipEvent::BecameSlave(_) => {
                if let Err(e) = self.control.deactivate().await {
                    warn!(device_id = %device_id, error = %e, "Final commit before losing mastership failed");
                }
                info!(device_id = %device_id, "Mastership lost, transaction chain released");
                DriverStep::Continue
            }
            MastershipEvent::Disconnected(_) => {
                if let Err(e) = self.control.begin_shutdown().await {
                    warn!(device_id = %device_id, error = %e, "Final commit before shutdown failed");
                }
                if let Err(e) = self.control.finalize_close() {
                    error!(device_id = %device_id, error = %e, "Closing transaction chain manager failed");
                }
                info!(device_id = %device_id, "Transaction chain manager closed");
                DriverStep::Stop
            }
        }
    }

    /// Consume events until the device disconnects or the channel closes
    pub async fn run(self, mut events: broadcast::Receiver<MastershipEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if self.handle_event(&event).await == DriverStep::Stop {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        device_id = %self.control.device_id(),
                        skipped,
                        "Mastership driver lagged behind role changes"
                    );
                }
                Err(RecvError::Closed) => {
                    debug!(device_id = %self.control.device_id(), "Mastership channel closed");
                    break;
                }
            }
        }
    }
}
