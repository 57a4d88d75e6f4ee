//! Reconciliation: applies control actions reported by the remote service
//! (including ones other users sent) to local shocker state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::control::ControlType;
use crate::feedback::{remote_notice, Feedback};
use crate::registry::ShockerRegistry;
use crate::shocker::ShockerId;

/// A control action reported by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    /// Connection that issued the action
    pub sender_connection_id: String,
    /// Display name of the user that issued the action
    pub sender_name: String,
    pub shocker_id: ShockerId,
    /// Control type as sent by the service (`Shock`, `Vibrate`, ...)
    #[serde(rename = "type")]
    pub control_type: String,
    /// Intensity (0-100)
    pub intensity: u8,
    /// Duration in milliseconds
    pub duration: u32,
    pub executed_at: DateTime<Utc>,
}

/// Applies remote control events to the registry.
pub struct Reconciler {
    connection_id: Option<String>,
    registry: Arc<ShockerRegistry>,
    clock: Arc<dyn Clock>,
    feedback: Feedback,
}

impl Reconciler {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<ShockerRegistry>,
        clock: Arc<dyn Clock>,
        feedback: Feedback,
    ) -> Self {
        Self {
            connection_id: config.openshock.connection_id.clone(),
            registry,
            clock,
            feedback,
        }
    }

    /// Apply events until the sending side closes.
    pub async fn run(self, mut events: mpsc::Receiver<ControlEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        info!("Control event stream closed");
    }

    /// Apply one event.
    pub fn handle(&self, event: &ControlEvent) {
        if self.connection_id.as_deref() == Some(event.sender_connection_id.as_str()) {
            return;
        }

        let Some(name) = self.registry.name_for_id(event.shocker_id) else {
            debug!(shocker = %event.shocker_id, "Control event for unknown shocker");
            return;
        };

        let control_type = match event.control_type.parse::<ControlType>() {
            Ok(control_type) => control_type,
            Err(e) => {
                error!(shocker = %name, error = %e, "Unrecognized control event type");
                return;
            }
        };

        self.feedback.remote_notice(&remote_notice(
            &event.sender_name,
            &name,
            control_type,
            event.intensity,
            event.duration,
        ));

        let executed_at = self.clock.monotonic_at(event.executed_at);
        let Some(mut state) = self.registry.get_mut(&name) else {
            return;
        };

        match control_type {
            ControlType::Shock => {
                // A local trigger may have just stored its own intensity
                if state.last_intensity() == 0.0 {
                    state.set_last_intensity(f32::from(event.intensity) / 100.0);
                }
                state.last_duration = event.duration;
                state.last_executed_at = Some(executed_at);
                drop(state);

                self.feedback.request_broadcast();
                self.feedback.force_unmute();
            }
            ControlType::Vibrate => {
                state.last_vibration_at = Some(executed_at);
            }
            ControlType::Stop => {
                state.last_duration = 0;
                drop(state);

                self.feedback.request_broadcast();
            }
            ControlType::Sound => {}
        }

        debug!(
            shocker = %name,
            sender = %event.sender_name,
            control_type = %control_type,
            "Applied remote control event"
        );
    }
}
