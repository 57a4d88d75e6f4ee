//! Trigger state machine: turns routed inbound parameters into pending
//! triggers on a shocker.
//!
//! ```text
//! None ──flag true──▶ Manual ──fired / flag false / skipped──▶ None
//! None ──released with stretch──▶ PhysBoneRelease ──fired / skipped──▶ None
//! ```
//!
//! Firing itself happens in the evaluator; this layer only arms and cancels.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::control::{ControlCommand, ControlQueue};
use crate::messages::InputValue;
use crate::registry::ShockerRegistry;
use crate::router::{Action, Route};
use crate::shocker::{ShockerId, TriggerMethod};

/// Applies routed parameter updates to the registry.
#[derive(Clone)]
pub struct TriggerMachine {
    shockers: Arc<HashMap<String, ShockerId>>,
    vibrate_while_bone_held: bool,
    registry: Arc<ShockerRegistry>,
    clock: Arc<dyn Clock>,
    control: ControlQueue,
}

impl TriggerMachine {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<ShockerRegistry>,
        clock: Arc<dyn Clock>,
        control: ControlQueue,
    ) -> Self {
        Self {
            shockers: Arc::new(config.shockers.clone()),
            vibrate_while_bone_held: config.behaviour.vibrate_while_bone_held,
            registry,
            clock,
            control,
        }
    }

    /// Apply one routed update.
    ///
    /// Unknown shocker names are logged and dropped without creating state.
    pub fn handle(&self, route: &Route, value: &InputValue) {
        let Some(&id) = self.shockers.get(&route.shocker) else {
            warn!(shocker = %route.shocker, action = %route.action, "Unknown shocker, ignoring");
            return;
        };

        let now = self.clock.now_ms();
        let mut state = self.registry.get_or_create(&route.shocker, id);

        match route.action {
            Action::Trigger => {
                if value.is_true() {
                    // A flag that keeps reporting true must not push the hold window out
                    if state.trigger_method == TriggerMethod::None {
                        state.trigger_method = TriggerMethod::Manual;
                        state.last_active_at = Some(now);
                        debug!(shocker = %route.shocker, "Manual trigger armed");
                    }
                } else if state.trigger_method != TriggerMethod::None {
                    state.trigger_method = TriggerMethod::None;
                    debug!(shocker = %route.shocker, "Pending trigger reset");
                }
            }
            Action::IsGrabbed => {
                let grabbed = value.is_true();
                let was_grabbed = state.is_grabbed;
                state.is_grabbed = grabbed;

                if !was_grabbed || grabbed {
                    return;
                }

                if state.last_stretch != 0.0 {
                    if state.trigger_method == TriggerMethod::None {
                        state.trigger_method = TriggerMethod::PhysBoneRelease;
                        state.last_active_at = Some(now);
                        debug!(
                            shocker = %route.shocker,
                            stretch = state.last_stretch,
                            "PhysBone release armed"
                        );
                    }
                } else if self.vibrate_while_bone_held {
                    let id = state.id();
                    drop(state);
                    debug!(shocker = %route.shocker, "PhysBone released without stretch, stopping");
                    self.control.dispatch(ControlCommand::stop(id));
                }
            }
            Action::Stretch => match value.as_f32() {
                Some(stretch) => state.last_stretch = stretch,
                None => trace!(shocker = %route.shocker, ?value, "Non-numeric stretch ignored"),
            },
            Action::IsPosed
            | Action::Angle
            | Action::Squish
            | Action::Cooldown
            | Action::Active
            | Action::Intensity => {}
        }
    }
}
