//! Shocker types: the per-actuator state every loop reads and writes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Millis;

/// Remote identifier of a shocker.
pub type ShockerId = Uuid;

/// Why a control action is pending for a shocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMethod {
    /// Nothing pending
    #[default]
    None,
    /// The generic trigger flag was raised
    Manual,
    /// A held physbone was let go with nonzero stretch
    PhysBoneRelease,
}

/// Feedback parameters the current avatar declares for a shocker.
///
/// Populated from the avatar config when the avatar changes; never inferred
/// from inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_active: bool,
    pub has_cooldown: bool,
    pub has_intensity: bool,
}

/// Live state for a single shocker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShockerState {
    id: ShockerId,
    name: String,
    /// Pending trigger, if any
    pub trigger_method: TriggerMethod,
    /// Whether the physbone is currently grabbed
    pub is_grabbed: bool,
    /// Most recent physbone stretch (platform does not bound it, clamp on use)
    pub last_stretch: f32,
    last_intensity: f32,
    /// Duration of the most recent action (milliseconds)
    pub last_duration: u32,
    /// When the most recent action started
    pub last_executed_at: Option<Millis>,
    /// When the most recent held-bone vibration was sent
    pub last_vibration_at: Option<Millis>,
    /// When the current trigger was armed
    pub last_active_at: Option<Millis>,
    /// Discovered feedback parameters
    pub capabilities: Capabilities,
}

impl ShockerState {
    /// Create fresh state for a shocker.
    pub fn new(id: ShockerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            trigger_method: TriggerMethod::None,
            is_grabbed: false,
            last_stretch: 0.0,
            last_intensity: 0.0,
            last_duration: 0,
            last_executed_at: None,
            last_vibration_at: None,
            last_active_at: None,
            capabilities: Capabilities::default(),
        }
    }

    pub fn id(&self) -> ShockerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Intensity of the most recent action, in [0, 1].
    pub fn last_intensity(&self) -> f32 {
        self.last_intensity
    }

    /// Store the most recent intensity, clamped to [0, 1].
    pub fn set_last_intensity(&mut self, intensity: f32) {
        self.last_intensity = if intensity.is_nan() {
            0.0
        } else {
            intensity.clamp(0.0, 1.0)
        };
    }

    /// Stretch clamped to [0, 1].
    pub fn stretch(&self) -> f32 {
        if self.last_stretch.is_nan() {
            0.0
        } else {
            self.last_stretch.clamp(0.0, 1.0)
        }
    }

    /// Check if the most recent action is still running.
    pub fn is_active(&self, now: Millis) -> bool {
        self.last_executed_at
            .is_some_and(|at| now < at + u64::from(self.last_duration))
    }

    /// Check if the most recent action is running or still cooling down.
    pub fn is_active_or_cooldown(&self, now: Millis, cooldown_time: u64) -> bool {
        self.last_executed_at
            .is_some_and(|at| now < at + u64::from(self.last_duration) + cooldown_time)
    }

    /// Check if the shocker is idle but still inside its cooldown window.
    pub fn is_cooling_down(&self, now: Millis, cooldown_time: u64) -> bool {
        !self.is_active(now) && self.is_active_or_cooldown(now, cooldown_time)
    }
}
