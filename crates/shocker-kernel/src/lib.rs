//! Shocker Kernel: turns a live VR parameter stream into rate-limited shocker
//! control commands.
//!
//! Three loops share one registry of per-shocker state:
//! - the listener routes inbound parameters into the trigger state machine
//! - the evaluator fires pending triggers, enforcing hold time and cooldown
//! - the broadcaster publishes Active/Cooldown/Intensity feedback
//!
//! A reconciliation handler folds remote control events back into the same
//! registry.

pub mod broadcaster;
pub mod clock;
pub mod config;
pub mod control;
pub mod evaluator;
pub mod feedback;
pub mod kernel;
pub mod listener;
pub mod messages;
pub mod reconciliation;
pub mod registry;
pub mod router;
pub mod shocker;
pub mod testing;
pub mod trigger;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::BridgeConfig;
pub use control::{
    run_control_sender, ControlCommand, ControlQueue, ControlSink, ControlType, ParameterSink,
    ParameterValue,
};
pub use kernel::{Kernel, KernelBuilder, KernelChannels};
pub use listener::{AvatarConfigSource, ParameterDescriptor, ParameterSource};
pub use messages::{InboundMessage, InputValue};
pub use reconciliation::ControlEvent;
pub use registry::{GlobalFlags, ShockerRegistry};
pub use shocker::{Capabilities, ShockerId, ShockerState, TriggerMethod};
