//! Side-channel feedback to the platform: chatbox notices, the force-unmute
//! voice pulse, and out-of-band broadcast requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::control::{ControlType, ParameterSink, ParameterValue};
use crate::registry::GlobalFlags;

/// Voice toggle input address.
pub const VOICE_INPUT: &str = "/input/Voice";

/// Gap between the edges of the unmute pulse.
pub const UNMUTE_PULSE_GAP: Duration = Duration::from_millis(50);

/// Chatbox text for a locally fired shock, e.g. `"Arm" 50%:1s`.
pub fn shock_notice(name: &str, intensity: f32, duration_ms: u32) -> String {
    format!(
        "\"{}\" {}%:{}s",
        name,
        (intensity * 100.0).round() as u32,
        duration_ms as f32 / 1000.0
    )
}

/// Chatbox text attributing a remote action to its sender.
pub fn remote_notice(
    sender: &str,
    name: &str,
    control_type: ControlType,
    intensity: u8,
    duration_ms: u32,
) -> String {
    format!(
        "{} -> \"{}\" {} {}%:{}s",
        sender,
        name,
        control_type,
        intensity,
        duration_ms as f32 / 1000.0
    )
}

/// Feedback channel shared by the evaluator and the reconciliation handler.
#[derive(Clone)]
pub struct Feedback {
    sink: Arc<dyn ParameterSink>,
    flags: Arc<GlobalFlags>,
    broadcast: Arc<Notify>,
    force_unmute: bool,
    chatbox: bool,
    remote_notices: bool,
}

impl std::fmt::Debug for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedback")
            .field("force_unmute", &self.force_unmute)
            .field("chatbox", &self.chatbox)
            .field("remote_notices", &self.remote_notices)
            .finish()
    }
}

impl Feedback {
    pub fn new(
        config: &BridgeConfig,
        sink: Arc<dyn ParameterSink>,
        flags: Arc<GlobalFlags>,
        broadcast: Arc<Notify>,
    ) -> Self {
        Self {
            sink,
            flags,
            broadcast,
            force_unmute: config.behaviour.force_unmute,
            chatbox: config.chatbox.enabled,
            remote_notices: config.chatbox.remote_notices,
        }
    }

    /// Ask the broadcaster to publish state now instead of at its next tick.
    pub fn request_broadcast(&self) {
        self.broadcast.notify_one();
    }

    /// Post a notice for a locally fired action, if chatbox feedback is on.
    pub fn local_notice(&self, text: &str) {
        if self.chatbox {
            self.post(text);
        }
    }

    /// Post a notice for an action another user sent, if enabled.
    pub fn remote_notice(&self, text: &str) {
        if self.chatbox && self.remote_notices {
            self.post(text);
        }
    }

    fn post(&self, text: &str) {
        if let Err(e) = self.sink.send_chatbox(text) {
            warn!(error = %e, "Failed to send chatbox message");
        }
    }

    /// Toggle voice off-on-off in the background if enabled and muted.
    ///
    /// Returns whether a pulse was started.
    pub fn force_unmute(&self) -> bool {
        if !self.force_unmute || !self.flags.is_muted() {
            return false;
        }

        debug!("Force unmuting");
        let sink = self.sink.clone();
        tokio::spawn(async move {
            for (i, value) in [false, true, false].into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(UNMUTE_PULSE_GAP).await;
                }
                if let Err(e) = sink.send_parameter(VOICE_INPUT, ParameterValue::Bool(value)) {
                    warn!(error = %e, "Failed to send voice toggle");
                }
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_shock_notice_format() {
        assert_eq!(shock_notice("Arm", 0.5, 1_000), "\"Arm\" 50%:1s");
        assert_eq!(shock_notice("Leg", 0.256, 1_500), "\"Leg\" 26%:1.5s");
    }

    #[test]
    fn test_remote_notice_format() {
        assert_eq!(
            remote_notice("Alice", "Arm", ControlType::Vibrate, 40, 2_000),
            "Alice -> \"Arm\" Vibrate 40%:2s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_unmute_pulses_only_when_muted() {
        let sink = Arc::new(RecordingSink::default());
        let flags = Arc::new(GlobalFlags::new());
        let mut config = BridgeConfig::default();
        config.behaviour.force_unmute = true;
        let feedback = Feedback::new(&config, sink.clone(), flags.clone(), Arc::new(Notify::new()));

        assert!(!feedback.force_unmute());

        flags.set_muted(true);
        assert!(feedback.force_unmute());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            sink.values_for(VOICE_INPUT),
            vec![
                ParameterValue::Bool(false),
                ParameterValue::Bool(true),
                ParameterValue::Bool(false),
            ]
        );
    }

    #[test]
    fn test_chatbox_respects_config() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = BridgeConfig::default();
        config.chatbox.remote_notices = false;
        let feedback = Feedback::new(
            &config,
            sink.clone(),
            Arc::new(GlobalFlags::new()),
            Arc::new(Notify::new()),
        );

        feedback.local_notice("local");
        feedback.remote_notice("remote");

        assert_eq!(sink.chatbox(), vec!["local".to_string()]);
    }
}
