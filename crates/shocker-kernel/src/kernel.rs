//! The bridge kernel: wires the shared registry into the control loops.
//!
//! ## Usage
//!
//! ```ignore
//! use shocker_kernel::{BridgeConfig, KernelBuilder};
//!
//! let (kernel, channels) = KernelBuilder::new(config, sink, avatar_configs).build();
//!
//! // Drain channels.commands into the remote service in a sender task,
//! // and feed remote control events into channels.events.
//! tokio::spawn(send_commands(channels.commands));
//!
//! // Runs until the transport fails
//! kernel.run(transport).await?;
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Notify};
use tracing::info;

use crate::broadcaster::Broadcaster;
use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::control::{ControlCommand, ControlQueue, ParameterSink};
use crate::evaluator::Evaluator;
use crate::feedback::Feedback;
use crate::listener::{AvatarConfigSource, Listener, ParameterSource};
use crate::reconciliation::{ControlEvent, Reconciler};
use crate::registry::{GlobalFlags, ShockerRegistry};
use crate::trigger::TriggerMachine;

/// Capacity of the inbound control event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Channel ends the kernel exposes to its collaborators.
#[derive(Debug)]
pub struct KernelChannels {
    /// Outbound control commands, to be drained by a single sender task
    pub commands: mpsc::Receiver<ControlCommand>,
    /// Remote control events for reconciliation
    pub events: mpsc::Sender<ControlEvent>,
}

/// Builder for the kernel and its loops.
pub struct KernelBuilder {
    config: BridgeConfig,
    sink: Arc<dyn ParameterSink>,
    avatar_configs: Arc<dyn AvatarConfigSource>,
    clock: Option<Arc<dyn Clock>>,
}

impl KernelBuilder {
    /// Create a builder from config and the platform-facing collaborators.
    pub fn new(
        config: BridgeConfig,
        sink: Arc<dyn ParameterSink>,
        avatar_configs: Arc<dyn AvatarConfigSource>,
    ) -> Self {
        Self {
            config,
            sink,
            avatar_configs,
            clock: None,
        }
    }

    /// Use a specific clock instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Construct the shared state and every loop.
    pub fn build(self) -> (Kernel, KernelChannels) {
        let config = self.config;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);

        let registry = Arc::new(ShockerRegistry::new());
        let flags = Arc::new(GlobalFlags::new());
        let broadcast_requests = Arc::new(Notify::new());
        let (control, commands) = ControlQueue::bounded(config.control_queue_capacity);
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let feedback = Feedback::new(
            &config,
            self.sink.clone(),
            flags.clone(),
            broadcast_requests.clone(),
        );

        let machine =
            TriggerMachine::new(&config, registry.clone(), clock.clone(), control.clone());
        let listener = Listener::new(
            &config,
            machine,
            registry.clone(),
            flags.clone(),
            self.avatar_configs,
        );
        let evaluator = Evaluator::new(
            &config,
            registry.clone(),
            flags,
            clock.clone(),
            control,
            feedback.clone(),
        );
        let broadcaster = Broadcaster::new(
            &config,
            registry.clone(),
            clock.clone(),
            self.sink,
            broadcast_requests,
        );
        let reconciler = Reconciler::new(&config, registry.clone(), clock, feedback);

        let kernel = Kernel {
            registry,
            listener,
            evaluator,
            broadcaster,
            reconciler,
            events: events_rx,
        };
        (kernel, KernelChannels { commands, events })
    }
}

/// A fully wired kernel, ready to run.
pub struct Kernel {
    registry: Arc<ShockerRegistry>,
    listener: Listener,
    evaluator: Evaluator,
    broadcaster: Broadcaster,
    reconciler: Reconciler,
    events: mpsc::Receiver<ControlEvent>,
}

impl Kernel {
    /// Shared registry handle.
    pub fn registry(&self) -> Arc<ShockerRegistry> {
        self.registry.clone()
    }

    /// Spawn the periodic loops and reconciliation, then listen on `source`.
    ///
    /// Returns only when the transport fails; that error is fatal.
    pub async fn run<S: ParameterSource>(self, source: S) -> Result<()> {
        let Kernel {
            listener,
            evaluator,
            broadcaster,
            reconciler,
            events,
            ..
        } = self;

        let tasks = [
            tokio::spawn(evaluator.run()),
            tokio::spawn(broadcaster.run()),
            tokio::spawn(reconciler.run(events)),
        ];
        info!("Kernel loops started");

        let result = listener.run(source).await;

        for task in &tasks {
            task.abort();
        }
        result
    }
}
