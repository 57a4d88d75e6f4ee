//! Outbound ports: control commands to the remote service and parameters back
//! to the platform.
//!
//! Control commands are fire-and-forget. They go through a bounded queue that a
//! single sender task drains; when the queue is full the command is dropped,
//! since a delayed shock is worse than a missing one.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::shocker::ShockerId;

/// Kind of remote control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    Stop,
    Shock,
    Vibrate,
    Sound,
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlType::Stop => "Stop",
            ControlType::Shock => "Shock",
            ControlType::Vibrate => "Vibrate",
            ControlType::Sound => "Sound",
        };
        f.write_str(name)
    }
}

impl FromStr for ControlType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stop" => Ok(ControlType::Stop),
            "Shock" => Ok(ControlType::Shock),
            "Vibrate" => Ok(ControlType::Vibrate),
            "Sound" => Ok(ControlType::Sound),
            other => anyhow::bail!("unknown control type: {other}"),
        }
    }
}

/// A single command for the remote control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub shocker_id: ShockerId,
    /// Intensity (0-100)
    pub intensity: u8,
    /// Duration in milliseconds
    pub duration: u32,
    pub control_type: ControlType,
}

impl ControlCommand {
    pub fn shock(shocker_id: ShockerId, intensity: u8, duration: u32) -> Self {
        Self {
            shocker_id,
            intensity,
            duration,
            control_type: ControlType::Shock,
        }
    }

    pub fn vibrate(shocker_id: ShockerId, intensity: u8, duration: u32) -> Self {
        Self {
            shocker_id,
            intensity,
            duration,
            control_type: ControlType::Vibrate,
        }
    }

    pub fn stop(shocker_id: ShockerId) -> Self {
        Self {
            shocker_id,
            intensity: 0,
            duration: 0,
            control_type: ControlType::Stop,
        }
    }
}

/// Bounded, non-blocking queue of outbound control commands.
#[derive(Debug, Clone)]
pub struct ControlQueue {
    tx: mpsc::Sender<ControlCommand>,
}

impl ControlQueue {
    /// Create a queue and the receiver its sender task drains.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ControlCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a command without waiting. Returns whether it was accepted.
    pub fn dispatch(&self, command: ControlCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!(
                    shocker = %command.shocker_id,
                    control_type = %command.control_type,
                    "Control queue full, dropping command"
                );
                false
            }
            Err(TrySendError::Closed(command)) => {
                warn!(
                    shocker = %command.shocker_id,
                    control_type = %command.control_type,
                    "Control sender stopped, dropping command"
                );
                false
            }
        }
    }
}

/// Remote service that executes control commands.
pub trait ControlSink: Send + Sync {
    fn send(&self, command: &ControlCommand) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Drain the control queue into `sink` until every queue handle is dropped.
///
/// Failed dispatches are logged and not retried.
pub async fn run_control_sender<S: ControlSink>(mut commands: mpsc::Receiver<ControlCommand>, sink: S) {
    while let Some(command) = commands.recv().await {
        match sink.send(&command).await {
            Ok(()) => debug!(
                shocker = %command.shocker_id,
                control_type = %command.control_type,
                intensity = command.intensity,
                duration = command.duration,
                "Control command sent"
            ),
            Err(e) => warn!(
                shocker = %command.shocker_id,
                control_type = %command.control_type,
                error = %e,
                "Control command failed"
            ),
        }
    }
    info!("Control queue closed, sender stopping");
}

/// Value of an outbound platform parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Float(f32),
}

/// Sink for messages sent back to the platform.
///
/// Sends must not block; transports that can fail report it and the caller
/// logs and moves on.
pub trait ParameterSink: Send + Sync {
    /// Set an avatar or input parameter.
    fn send_parameter(&self, address: &str, value: ParameterValue) -> anyhow::Result<()>;

    /// Post a chatbox message.
    fn send_chatbox(&self, text: &str) -> anyhow::Result<()>;
}
