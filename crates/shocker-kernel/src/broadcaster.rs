//! Broadcaster loop: publishes each shocker's Active/Cooldown/Intensity
//! feedback parameters back to the avatar.
//!
//! Runs on a fixed tick and additionally whenever a broadcast is requested
//! (a local fire or a remote action), so feedback does not wait a full tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{trace, warn};

use crate::clock::{Clock, Millis};
use crate::config::BridgeConfig;
use crate::control::{ParameterSink, ParameterValue};
use crate::registry::ShockerRegistry;
use crate::router::{Action, AddressRouter};

/// Periodic feedback publisher.
pub struct Broadcaster {
    cooldown_time: u64,
    tick_ms: u64,
    router: AddressRouter,
    registry: Arc<ShockerRegistry>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ParameterSink>,
    requests: Arc<Notify>,
}

impl Broadcaster {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<ShockerRegistry>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ParameterSink>,
        requests: Arc<Notify>,
    ) -> Self {
        Self {
            cooldown_time: config.behaviour.cooldown_time,
            tick_ms: config.behaviour.broadcaster_tick_ms,
            router: AddressRouter::new(&config.osc.parameter_prefix),
            registry,
            clock,
            sink,
            requests,
        }
    }

    /// Publish every shocker's feedback parameters once.
    pub fn broadcast(&self) {
        let now = self.clock.now_ms();
        for name in self.registry.names() {
            self.publish(&name, now);
        }
    }

    /// Broadcast forever on the tick and on request.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.tick_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.requests.notified() => {
                    trace!("Out-of-band broadcast");
                }
            }
            self.broadcast();
        }
    }

    fn publish(&self, name: &str, now: Millis) {
        let Some(mut state) = self.registry.get_mut(name) else {
            return;
        };

        let is_active = state.is_active(now);
        let is_cooling_down = state.is_cooling_down(now, self.cooldown_time);

        if !is_active && !is_cooling_down && state.last_intensity() > 0.0 {
            state.set_last_intensity(0.0);
        }

        let capabilities = state.capabilities;
        let intensity = state.last_intensity();
        drop(state);

        if capabilities.has_active {
            self.send(name, Action::Active, ParameterValue::Bool(is_active));
        }
        if capabilities.has_cooldown {
            self.send(name, Action::Cooldown, ParameterValue::Bool(is_cooling_down));
        }
        if capabilities.has_intensity {
            self.send(name, Action::Intensity, ParameterValue::Float(intensity));
        }
    }

    fn send(&self, name: &str, action: Action, value: ParameterValue) {
        let address = self.router.address_for(name, action);
        if let Err(e) = self.sink.send_parameter(&address, value) {
            warn!(address = %address, error = %e, "Failed to send feedback parameter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::shocker::Capabilities;
    use crate::testing::RecordingSink;
    use uuid::Uuid;

    const ACTIVE: &str = "/avatar/parameters/ShockOsc/Arm_Active";
    const COOLDOWN: &str = "/avatar/parameters/ShockOsc/Arm_Cooldown";
    const INTENSITY: &str = "/avatar/parameters/ShockOsc/Arm_Intensity";

    fn setup(
        capabilities: Capabilities,
    ) -> (
        Broadcaster,
        Arc<ShockerRegistry>,
        Arc<ManualClock>,
        Arc<RecordingSink>,
    ) {
        let mut config = BridgeConfig::default();
        config.behaviour.cooldown_time = 5_000;
        let registry = Arc::new(ShockerRegistry::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let sink = Arc::new(RecordingSink::default());
        let broadcaster = Broadcaster::new(
            &config,
            registry.clone(),
            clock.clone(),
            sink.clone(),
            Arc::new(Notify::new()),
        );

        {
            let mut state = registry.get_or_create("Arm", Uuid::new_v4());
            state.capabilities = capabilities;
            state.last_executed_at = Some(10_000);
            state.last_duration = 1_000;
            state.set_last_intensity(0.6);
        }

        (broadcaster, registry, clock, sink)
    }

    fn all() -> Capabilities {
        Capabilities {
            has_active: true,
            has_cooldown: true,
            has_intensity: true,
        }
    }

    #[test]
    fn test_active_then_cooldown_then_idle() {
        let (broadcaster, _registry, clock, sink) = setup(all());

        broadcaster.broadcast();
        assert_eq!(sink.values_for(ACTIVE), vec![ParameterValue::Bool(true)]);
        assert_eq!(sink.values_for(COOLDOWN), vec![ParameterValue::Bool(false)]);
        assert_eq!(sink.values_for(INTENSITY), vec![ParameterValue::Float(0.6)]);

        sink.clear();
        clock.advance(2_000);
        broadcaster.broadcast();
        assert_eq!(sink.values_for(ACTIVE), vec![ParameterValue::Bool(false)]);
        assert_eq!(sink.values_for(COOLDOWN), vec![ParameterValue::Bool(true)]);
        assert_eq!(sink.values_for(INTENSITY), vec![ParameterValue::Float(0.6)]);

        sink.clear();
        clock.advance(5_000);
        broadcaster.broadcast();
        assert_eq!(sink.values_for(COOLDOWN), vec![ParameterValue::Bool(false)]);
        assert_eq!(sink.values_for(INTENSITY), vec![ParameterValue::Float(0.0)]);
    }

    #[test]
    fn test_self_clear_is_idempotent() {
        let (broadcaster, registry, clock, _sink) = setup(Capabilities::default());

        clock.advance(10_000);
        broadcaster.broadcast();
        assert_eq!(registry.snapshot("Arm").unwrap().last_intensity(), 0.0);

        broadcaster.broadcast();
        assert_eq!(registry.snapshot("Arm").unwrap().last_intensity(), 0.0);
    }

    #[test]
    fn test_capabilities_gate_outputs() {
        let (broadcaster, _registry, _clock, sink) = setup(Capabilities {
            has_active: false,
            has_cooldown: true,
            has_intensity: false,
        });

        broadcaster.broadcast();

        let addresses: Vec<String> = sink.parameters().into_iter().map(|(a, _)| a).collect();
        assert_eq!(addresses, vec![COOLDOWN.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_triggers_immediate_broadcast() {
        let mut config = BridgeConfig::default();
        config.behaviour.broadcaster_tick_ms = 60_000;
        let registry = Arc::new(ShockerRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let requests = Arc::new(Notify::new());
        registry.get_or_create("Arm", Uuid::new_v4()).capabilities = all();

        let broadcaster = Broadcaster::new(
            &config,
            registry,
            Arc::new(ManualClock::new(0)),
            sink.clone(),
            requests.clone(),
        );
        let handle = tokio::spawn(broadcaster.run());

        // First interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.values_for(ACTIVE).len(), 1);

        requests.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.values_for(ACTIVE).len(), 2);

        handle.abort();
    }
}
