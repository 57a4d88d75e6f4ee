//! Configuration types for the bridge.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use uuid::Uuid;

/// Top-level bridge configuration.
///
/// This defines the OSC endpoints, the trigger behaviour, feedback options and
/// the set of shockers the bridge is allowed to route to.
/// Loaded from JSON at runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// OSC endpoint and address configuration
    pub osc: OscConfig,

    /// Trigger, cooldown and intensity behaviour
    pub behaviour: BehaviourConfig,

    /// Chatbox feedback
    pub chatbox: ChatboxConfig,

    /// Remote control service connection
    pub openshock: OpenShockConfig,

    /// Known shockers: routing name -> remote identifier
    pub shockers: HashMap<String, Uuid>,

    /// Capacity of the outbound control command queue
    pub control_queue_capacity: usize,

    /// Random seed for reproducible intensity/duration sampling (None for random)
    pub seed: Option<u64>,
}

/// OSC endpoints and the parameter prefix shockers live under.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    /// Local address the listener binds to
    pub listen_addr: String,

    /// Address outbound parameters are sent to
    pub send_addr: String,

    /// Parameter prefix, e.g. "ShockOsc" for `/avatar/parameters/ShockOsc/<Name>`
    pub parameter_prefix: String,
}

/// Inclusive-exclusive range used for random sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

/// Behaviour configuration: how inbound parameters turn into control commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviourConfig {
    /// Sample intensity from `intensity_range` for manual triggers
    pub random_intensity: bool,

    /// Sample duration from `duration_range` in `random_duration_step` increments
    pub random_duration: bool,

    /// Intensity bounds (0-100); also the lerp bounds for physbone release
    pub intensity_range: Range<u8>,

    /// Duration bounds (milliseconds)
    pub duration_range: Range<u32>,

    /// Step for random duration sampling (milliseconds)
    pub random_duration_step: u32,

    /// Intensity used when random intensity is off (0-100)
    pub fixed_intensity: u8,

    /// Duration used when random duration is off (milliseconds)
    pub fixed_duration: u32,

    /// Idle window after an action ends before another may fire (milliseconds)
    pub cooldown_time: u64,

    /// How long a manual trigger must be held before it fires (milliseconds)
    pub hold_time: u64,

    /// Cancel pending triggers while the platform reports AFK
    pub disable_while_afk: bool,

    /// Pulse the voice toggle when a shock fires while muted
    pub force_unmute: bool,

    /// Vibrate while a physbone is held, scaled by stretch
    pub vibrate_while_bone_held: bool,

    /// Evaluator tick interval (milliseconds)
    pub evaluator_tick_ms: u64,

    /// Broadcaster tick interval (milliseconds)
    pub broadcaster_tick_ms: u64,
}

/// Chatbox feedback configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatboxConfig {
    /// Post a notice when a local trigger fires
    pub enabled: bool,

    /// Post a notice when another user controls one of our shockers
    pub remote_notices: bool,
}

/// Remote control service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenShockConfig {
    /// Base URL of the API
    pub api_url: String,

    /// API token sent with every request
    pub api_token: String,

    /// Our own hub connection id, used to suppress echoed control events
    pub connection_id: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            osc: OscConfig::default(),
            behaviour: BehaviourConfig::default(),
            chatbox: ChatboxConfig::default(),
            openshock: OpenShockConfig::default(),
            shockers: HashMap::new(),
            control_queue_capacity: 64,
            seed: None,
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9001".to_string(),
            send_addr: "127.0.0.1:9000".to_string(),
            parameter_prefix: "ShockOsc".to_string(),
        }
    }
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            random_intensity: false,
            random_duration: false,
            intensity_range: Range { min: 1, max: 30 },
            duration_range: Range {
                min: 1_000,
                max: 5_000,
            },
            random_duration_step: 1_000,
            fixed_intensity: 50,
            fixed_duration: 2_000,
            cooldown_time: 5_000,
            hold_time: 250,
            disable_while_afk: true,
            force_unmute: false,
            vibrate_while_bone_held: true,
            evaluator_tick_ms: 20,
            broadcaster_tick_ms: 300,
        }
    }
}

impl Default for ChatboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_notices: true,
        }
    }
}

impl Default for OpenShockConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openshock.app".to_string(),
            api_token: String::new(),
            connection_id: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{
            "shockers": { "Arm": "2f1e4b0c-8f57-4a4b-9d3c-6a3f5b9e1c01" },
            "behaviour": { "cooldown_time": 1000 }
        }"#;
        let config: BridgeConfig = serde_json::from_str(raw).unwrap();

        assert!(config.shockers.contains_key("Arm"));
        assert_eq!(config.behaviour.cooldown_time, 1000);
        assert_eq!(config.behaviour.hold_time, 250);
        assert_eq!(config.osc.parameter_prefix, "ShockOsc");
        assert_eq!(config.control_queue_capacity, 64);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = BridgeConfig::load(Path::new("/nonexistent/shockosc.json")).unwrap();
        assert_eq!(config.behaviour.evaluator_tick_ms, 20);
        assert_eq!(config.behaviour.broadcaster_tick_ms, 300);
    }
}
