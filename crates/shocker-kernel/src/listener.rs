//! Listener loop: receives platform messages and routes them.
//!
//! System addresses (avatar change, AFK, mute) are handled here directly;
//! shocker parameters go through the [`AddressRouter`] into the
//! [`TriggerMachine`]. Anything else is ignored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::messages::{InboundMessage, AFK, AVATAR_CHANGE, MUTE_SELF};
use crate::registry::{GlobalFlags, ShockerRegistry};
use crate::router::{split_suffix, Action, AddressRouter};
use crate::shocker::{Capabilities, ShockerId};
use crate::trigger::TriggerMachine;

/// A parameter declared by an avatar's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name, e.g. `ShockOsc/Arm_Active`
    pub name: String,
    /// Declared type, e.g. `Bool` or `Float`
    pub declared_type: String,
}

/// Source of avatar parameter declarations.
///
/// Lookups may block on file I/O; the listener runs them on the blocking pool.
pub trait AvatarConfigSource: Send + Sync + 'static {
    /// Parameters declared by the avatar with the given id.
    fn lookup(&self, avatar_id: &str) -> Result<Vec<ParameterDescriptor>>;
}

/// Inbound side of the platform transport.
pub trait ParameterSource: Send {
    /// Wait for the next datagram's messages.
    ///
    /// An error means the transport is unusable and ends the listener.
    /// Datagrams that fail to decode yield an empty batch instead.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<InboundMessage>>> + Send;
}

/// Inbound message router.
pub struct Listener {
    router: AddressRouter,
    parameter_prefix: String,
    shockers: Arc<HashMap<String, ShockerId>>,
    machine: TriggerMachine,
    registry: Arc<ShockerRegistry>,
    flags: Arc<GlobalFlags>,
    avatar_configs: Arc<dyn AvatarConfigSource>,
}

impl Listener {
    pub fn new(
        config: &BridgeConfig,
        machine: TriggerMachine,
        registry: Arc<ShockerRegistry>,
        flags: Arc<GlobalFlags>,
        avatar_configs: Arc<dyn AvatarConfigSource>,
    ) -> Self {
        Self {
            router: AddressRouter::new(&config.osc.parameter_prefix),
            parameter_prefix: format!("{}/", config.osc.parameter_prefix),
            shockers: Arc::new(config.shockers.clone()),
            machine,
            registry,
            flags,
            avatar_configs,
        }
    }

    /// Receive and handle messages until the transport fails.
    pub async fn run<S: ParameterSource>(self, mut source: S) -> Result<()> {
        loop {
            let messages = source.recv().await.context("Parameter transport failed")?;
            for message in &messages {
                self.handle(message).await;
            }
        }
    }

    /// Handle a single inbound message.
    pub async fn handle(&self, message: &InboundMessage) {
        match message.address.as_str() {
            AVATAR_CHANGE => match message.value.as_str() {
                Some(avatar_id) => self.on_avatar_change(avatar_id).await,
                None => warn!(value = ?message.value, "Avatar change without an avatar id"),
            },
            AFK => {
                let afk = message.value.is_true();
                self.flags.set_afk(afk);
                debug!(afk, "AFK changed");
            }
            MUTE_SELF => {
                let muted = message.value.is_true();
                self.flags.set_muted(muted);
                debug!(muted, "Mute changed");
            }
            address => match self.router.route(address) {
                Some(route) => self.machine.handle(&route, &message.value),
                None => trace!(address, "Ignoring unrelated address"),
            },
        }
    }

    /// Reset the registry for a new avatar and rediscover capabilities.
    pub async fn on_avatar_change(&self, avatar_id: &str) {
        info!(avatar = avatar_id, "Avatar changed");
        self.registry.clear();

        let source = self.avatar_configs.clone();
        let id = avatar_id.to_string();
        let lookup = tokio::task::spawn_blocking(move || source.lookup(&id)).await;

        let parameters = match lookup {
            Ok(Ok(parameters)) => parameters,
            Ok(Err(e)) => {
                warn!(avatar = avatar_id, error = %e, "Failed to load avatar config");
                return;
            }
            Err(e) => {
                warn!(avatar = avatar_id, error = %e, "Avatar config lookup aborted");
                return;
            }
        };

        let discovered = self.apply_capabilities(&parameters);
        info!(
            avatar = avatar_id,
            parameters = parameters.len(),
            shockers = discovered,
            "Avatar config loaded"
        );
    }

    /// Set capability flags from declared parameters. Returns the number of
    /// shockers touched.
    pub fn apply_capabilities(&self, parameters: &[ParameterDescriptor]) -> usize {
        let mut touched = 0;
        for parameter in parameters {
            let Some(suffix) = parameter.name.strip_prefix(&self.parameter_prefix) else {
                continue;
            };
            let route = split_suffix(suffix);
            let mark: fn(&mut Capabilities) = match route.action {
                Action::Active => |c: &mut Capabilities| c.has_active = true,
                Action::Cooldown => |c: &mut Capabilities| c.has_cooldown = true,
                Action::Intensity => |c: &mut Capabilities| c.has_intensity = true,
                _ => continue,
            };
            let Some(&id) = self.shockers.get(&route.shocker) else {
                continue;
            };

            let mut state = self.registry.get_or_create(&route.shocker, id);
            if state.capabilities == Capabilities::default() {
                touched += 1;
            }
            mark(&mut state.capabilities);
            drop(state);

            trace!(
                shocker = %route.shocker,
                action = %route.action,
                declared_type = %parameter.declared_type,
                "Capability discovered"
            );
        }
        touched
    }
}
