//! Evaluator loop: decides, every tick, whether pending triggers fire.
//!
//! Per shocker and tick:
//! 1. Held-bone vibration pulse (independent of any pending trigger)
//! 2. Manual triggers wait out the hold time
//! 3. Pending triggers are cancelled while active/cooling down or AFK
//! 4. Otherwise the trigger fires: duration and intensity are chosen, state is
//!    stamped, and a shock is queued

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{Clock, Millis};
use crate::config::{BehaviourConfig, BridgeConfig, Range};
use crate::control::{ControlCommand, ControlQueue};
use crate::feedback::{shock_notice, Feedback};
use crate::registry::{GlobalFlags, ShockerRegistry};
use crate::shocker::TriggerMethod;

/// Minimum gap between held-bone vibration pulses.
pub const HELD_VIBRATION_INTERVAL_MS: Millis = 300;

/// Duration of each held-bone vibration pulse.
pub const HELD_VIBRATION_DURATION_MS: u32 = 1_000;

/// Lowest reported intensity for a physbone release that fired with any stretch.
pub const MIN_RELEASE_INTENSITY: f32 = 0.01;

/// Sample a duration that is a multiple of `step` inside `[min, max)`.
///
/// When no step multiple fits inside the range, `min` is used as is.
pub fn sample_duration(rng: &mut impl Rng, range: Range<u32>, step: u32) -> u32 {
    let step = u64::from(step.max(1));
    let low = u64::from(range.min).div_ceil(step);
    let high = u64::from(range.max) / step;
    if low >= high {
        return range.min;
    }
    // (high - 1) * step < max, so the product always fits
    let sampled = rng.random_range(low..high) * step;
    u32::try_from(sampled).unwrap_or(range.min)
}

/// Intensity for a manual trigger: (command intensity, reported fraction).
pub fn manual_intensity(rng: &mut impl Rng, behaviour: &BehaviourConfig) -> (u8, f32) {
    if behaviour.random_intensity {
        let Range { min, max } = behaviour.intensity_range;
        let sampled = if min < max {
            rng.random_range(min..max)
        } else {
            min
        };
        let fraction = if max == 0 {
            0.0
        } else {
            f32::from(sampled) / f32::from(max)
        };
        (sampled, fraction.clamp(0.0, 1.0))
    } else {
        let fixed = behaviour.fixed_intensity;
        (fixed, (f32::from(fixed) / 100.0).clamp(0.0, 1.0))
    }
}

/// Intensity for a physbone release, interpolated by stretch.
pub fn release_intensity(range: Range<u8>, stretch: f32) -> (u8, f32) {
    let t = if stretch.is_nan() {
        0.0
    } else {
        stretch.clamp(0.0, 1.0)
    };
    let min = f32::from(range.min);
    let max = f32::from(range.max);
    let intensity = (min + (max - min) * t).round().clamp(0.0, 255.0) as u8;

    let fraction = if t > 0.0 && t < MIN_RELEASE_INTENSITY {
        MIN_RELEASE_INTENSITY
    } else {
        t
    };
    (intensity, fraction)
}

/// Periodic trigger evaluator.
pub struct Evaluator {
    behaviour: BehaviourConfig,
    registry: Arc<ShockerRegistry>,
    flags: Arc<GlobalFlags>,
    clock: Arc<dyn Clock>,
    control: ControlQueue,
    feedback: Feedback,
    rng: Mutex<StdRng>,
}

impl Evaluator {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<ShockerRegistry>,
        flags: Arc<GlobalFlags>,
        clock: Arc<dyn Clock>,
        control: ControlQueue,
        feedback: Feedback,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            behaviour: config.behaviour.clone(),
            registry,
            flags,
            clock,
            control,
            feedback,
            rng: Mutex::new(rng),
        }
    }

    /// Run one evaluation pass over every shocker.
    pub fn tick(&self) {
        let now = self.clock.now_ms();
        for name in self.registry.names() {
            self.evaluate(&name, now);
        }
    }

    /// Tick forever at the configured interval.
    pub async fn run(self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.behaviour.evaluator_tick_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick();
        }
    }

    fn evaluate(&self, name: &str, now: Millis) {
        // Entry may have been cleared by an avatar change since names() ran
        let Some(mut state) = self.registry.get_mut(name) else {
            return;
        };
        let behaviour = &self.behaviour;
        let active_or_cooldown = state.is_active_or_cooldown(now, behaviour.cooldown_time);

        if state.trigger_method == TriggerMethod::None
            && behaviour.vibrate_while_bone_held
            && !active_or_cooldown
            && state.is_grabbed
            && state
                .last_vibration_at
                .map_or(true, |at| now.saturating_sub(at) >= HELD_VIBRATION_INTERVAL_MS)
        {
            let intensity = (state.stretch() * 100.0).max(1.0) as u8;
            state.last_vibration_at = Some(now);
            self.control.dispatch(ControlCommand::vibrate(
                state.id(),
                intensity,
                HELD_VIBRATION_DURATION_MS,
            ));
        }

        match state.trigger_method {
            TriggerMethod::None => return,
            TriggerMethod::Manual
                if state
                    .last_active_at
                    .is_some_and(|at| now.saturating_sub(at) < behaviour.hold_time) =>
            {
                return;
            }
            _ => {}
        }

        if active_or_cooldown {
            state.trigger_method = TriggerMethod::None;
            info!(shocker = name, "Skipping trigger, shocker is active or on cooldown");
            return;
        }

        if behaviour.disable_while_afk && self.flags.is_afk() {
            state.trigger_method = TriggerMethod::None;
            info!(shocker = name, "Skipping trigger, user is AFK");
            return;
        }

        let method = state.trigger_method;

        let Ok(mut rng) = self.rng.lock() else {
            warn!(shocker = name, "Random source poisoned, dropping trigger");
            state.trigger_method = TriggerMethod::None;
            return;
        };

        let duration = if behaviour.random_duration {
            sample_duration(
                &mut *rng,
                behaviour.duration_range,
                behaviour.random_duration_step,
            )
        } else {
            behaviour.fixed_duration
        };

        let (intensity, fraction) = match method {
            TriggerMethod::Manual => manual_intensity(&mut *rng, behaviour),
            TriggerMethod::PhysBoneRelease => {
                let result = release_intensity(behaviour.intensity_range, state.last_stretch);
                state.last_stretch = 0.0;
                result
            }
            TriggerMethod::None => return,
        };
        drop(rng);

        state.last_executed_at = Some(now);
        state.last_duration = duration;
        state.set_last_intensity(fraction);
        state.trigger_method = TriggerMethod::None;
        let id = state.id();
        drop(state);

        self.feedback.force_unmute();
        self.feedback.request_broadcast();

        info!(
            shocker = name,
            trigger = ?method,
            intensity,
            duration,
            "Firing shock"
        );
        self.control
            .dispatch(ControlCommand::shock(id, intensity, duration));
        debug!(shocker = name, "Shock queued");

        self.feedback
            .local_notice(&shock_notice(name, fraction, duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::control::{ControlType, ParameterValue};
    use crate::feedback::VOICE_INPUT;
    use crate::testing::RecordingSink;
    use tokio::sync::{mpsc, Notify};
    use uuid::Uuid;

    struct Harness {
        evaluator: Evaluator,
        registry: Arc<ShockerRegistry>,
        flags: Arc<GlobalFlags>,
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
        notify: Arc<Notify>,
        rx: mpsc::Receiver<ControlCommand>,
        id: Uuid,
    }

    fn harness(configure: impl FnOnce(&mut BridgeConfig)) -> Harness {
        let id = Uuid::new_v4();
        let mut config = BridgeConfig::default();
        config.shockers.insert("Arm".to_string(), id);
        config.seed = Some(7);
        configure(&mut config);

        let registry = Arc::new(ShockerRegistry::new());
        let flags = Arc::new(GlobalFlags::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let sink = Arc::new(RecordingSink::default());
        let notify = Arc::new(Notify::new());
        let (queue, rx) = ControlQueue::bounded(16);
        let feedback = Feedback::new(&config, sink.clone(), flags.clone(), notify.clone());
        let evaluator = Evaluator::new(
            &config,
            registry.clone(),
            flags.clone(),
            clock.clone(),
            queue,
            feedback,
        );

        Harness {
            evaluator,
            registry,
            flags,
            clock,
            sink,
            notify,
            rx,
            id,
        }
    }

    fn arm_manual(h: &Harness) {
        let mut state = h.registry.get_or_create("Arm", h.id);
        state.trigger_method = TriggerMethod::Manual;
        state.last_active_at = Some(h.clock.now_ms());
    }

    #[test]
    fn test_sample_duration_is_step_multiple_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let range = Range {
            min: 1_000,
            max: 5_000,
        };
        for _ in 0..500 {
            let d = sample_duration(&mut rng, range, 500);
            assert_eq!(d % 500, 0);
            assert!((1_000..5_000).contains(&d), "duration {} out of bounds", d);
        }
    }

    #[test]
    fn test_sample_duration_unaligned_min() {
        let mut rng = StdRng::seed_from_u64(1);
        let range = Range {
            min: 1_500,
            max: 4_000,
        };
        for _ in 0..200 {
            let d = sample_duration(&mut rng, range, 1_000);
            assert!(d == 2_000 || d == 3_000, "unexpected {}", d);
        }
    }

    #[test]
    fn test_sample_duration_range_narrower_than_step() {
        let mut rng = StdRng::seed_from_u64(5);
        let range = Range {
            min: 1_200,
            max: 1_400,
        };
        for _ in 0..50 {
            let d = sample_duration(&mut rng, range, 1_000);
            assert!((1_200..1_400).contains(&d), "duration {} out of bounds", d);
        }
    }

    #[test]
    fn test_sample_duration_near_u32_max_does_not_overflow() {
        let mut rng = StdRng::seed_from_u64(9);
        let range = Range {
            min: u32::MAX - 1,
            max: u32::MAX,
        };
        assert_eq!(sample_duration(&mut rng, range, 1_000), u32::MAX - 1);

        let wide = Range {
            min: u32::MAX - 5_000,
            max: u32::MAX,
        };
        for _ in 0..50 {
            let d = sample_duration(&mut rng, wide, 1_000);
            assert_eq!(d % 1_000, 0);
            assert!(d >= wide.min && d < wide.max);
        }
    }

    #[test]
    fn test_release_intensity_floor_and_lerp() {
        let range = Range { min: 10, max: 60 };
        assert_eq!(release_intensity(range, 0.5), (35, 0.5));
        assert_eq!(release_intensity(range, 0.004).1, MIN_RELEASE_INTENSITY);
        assert_eq!(release_intensity(range, 1.8), (60, 1.0));
        assert_eq!(release_intensity(range, 0.0), (10, 0.0));
    }

    #[test]
    fn test_manual_random_intensity_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let behaviour = BehaviourConfig {
            random_intensity: true,
            intensity_range: Range { min: 5, max: 40 },
            ..Default::default()
        };
        for _ in 0..200 {
            let (byte, fraction) = manual_intensity(&mut rng, &behaviour);
            assert!((5..40).contains(&byte));
            assert!((0.0..=1.0).contains(&fraction));
            assert!((fraction - f32::from(byte) / 40.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_manual_waits_for_hold_time() {
        let mut h = harness(|c| c.behaviour.hold_time = 250);
        arm_manual(&h);

        h.clock.advance(100);
        h.evaluator.tick();
        assert!(h.rx.try_recv().is_err());
        assert_eq!(
            h.registry.snapshot("Arm").unwrap().trigger_method,
            TriggerMethod::Manual
        );

        h.clock.advance(150);
        h.evaluator.tick();
        let command = h.rx.try_recv().unwrap();
        assert_eq!(command.control_type, ControlType::Shock);

        // Fires once; nothing more on later ticks
        h.clock.advance(20);
        h.evaluator.tick();
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_fixed_manual_fire() {
        let mut h = harness(|c| {
            c.behaviour.hold_time = 0;
            c.behaviour.fixed_intensity = 50;
            c.behaviour.fixed_duration = 1_000;
        });
        arm_manual(&h);

        h.evaluator.tick();

        let command = h.rx.try_recv().unwrap();
        assert_eq!(command, ControlCommand::shock(h.id, 50, 1_000));

        let state = h.registry.snapshot("Arm").unwrap();
        assert_eq!(state.trigger_method, TriggerMethod::None);
        assert_eq!(state.last_executed_at, Some(10_000));
        assert_eq!(state.last_duration, 1_000);
        assert_eq!(state.last_intensity(), 0.5);
        assert_eq!(h.sink.chatbox(), vec!["\"Arm\" 50%:1s".to_string()]);
    }

    #[tokio::test]
    async fn test_fire_requests_broadcast() {
        let h = harness(|c| c.behaviour.hold_time = 0);
        arm_manual(&h);

        h.evaluator.tick();

        // The stored permit completes immediately
        tokio::time::timeout(Duration::from_millis(50), h.notify.notified())
            .await
            .expect("broadcast was not requested");
    }

    #[test]
    fn test_cooldown_cancels_pending_trigger() {
        let mut h = harness(|c| {
            c.behaviour.hold_time = 0;
            c.behaviour.cooldown_time = 5_000;
        });
        {
            let mut state = h.registry.get_or_create("Arm", h.id);
            state.last_executed_at = Some(9_000);
            state.last_duration = 2_000;
            state.trigger_method = TriggerMethod::PhysBoneRelease;
            state.last_stretch = 0.8;
        }

        h.evaluator.tick();

        assert!(h.rx.try_recv().is_err());
        let state = h.registry.snapshot("Arm").unwrap();
        assert_eq!(state.trigger_method, TriggerMethod::None);
        assert_eq!(state.last_executed_at, Some(9_000));
    }

    #[test]
    fn test_afk_cancels_pending_trigger() {
        let mut h = harness(|c| c.behaviour.hold_time = 0);
        h.flags.set_afk(true);
        arm_manual(&h);

        h.evaluator.tick();

        assert!(h.rx.try_recv().is_err());
        assert_eq!(
            h.registry.snapshot("Arm").unwrap().trigger_method,
            TriggerMethod::None
        );
    }

    #[test]
    fn test_physbone_release_consumes_stretch() {
        let mut h = harness(|c| {
            c.behaviour.intensity_range = Range { min: 0, max: 100 };
            c.behaviour.fixed_duration = 1_000;
        });
        {
            let mut state = h.registry.get_or_create("Arm", h.id);
            state.trigger_method = TriggerMethod::PhysBoneRelease;
            state.last_active_at = Some(10_000);
            state.last_stretch = 0.5;
        }

        h.evaluator.tick();

        let command = h.rx.try_recv().unwrap();
        assert_eq!(command.intensity, 50);
        let state = h.registry.snapshot("Arm").unwrap();
        assert_eq!(state.last_stretch, 0.0);
        assert_eq!(state.last_intensity(), 0.5);
    }

    #[test]
    fn test_held_bone_vibrates_at_interval() {
        let mut h = harness(|_| {});
        {
            let mut state = h.registry.get_or_create("Arm", h.id);
            state.is_grabbed = true;
            state.last_stretch = 0.5;
        }

        h.evaluator.tick();
        let command = h.rx.try_recv().unwrap();
        assert_eq!(command, ControlCommand::vibrate(h.id, 50, 1_000));

        h.clock.advance(100);
        h.evaluator.tick();
        assert!(h.rx.try_recv().is_err());

        h.clock.advance(200);
        h.evaluator.tick();
        assert_eq!(h.rx.try_recv().unwrap().control_type, ControlType::Vibrate);
        assert_eq!(
            h.registry.snapshot("Arm").unwrap().trigger_method,
            TriggerMethod::None
        );
    }

    #[test]
    fn test_held_bone_vibration_has_floor_of_one() {
        let mut h = harness(|_| {});
        h.registry.get_or_create("Arm", h.id).is_grabbed = true;

        h.evaluator.tick();

        assert_eq!(h.rx.try_recv().unwrap().intensity, 1);
    }

    #[test]
    fn test_held_bone_silent_while_active_or_cooling_down() {
        let mut h = harness(|c| c.behaviour.cooldown_time = 5_000);
        {
            let mut state = h.registry.get_or_create("Arm", h.id);
            state.is_grabbed = true;
            state.last_stretch = 0.5;
            state.last_executed_at = Some(9_500);
            state.last_duration = 1_000;
        }

        // Active
        h.evaluator.tick();
        assert!(h.rx.try_recv().is_err());

        // Cooling down
        h.clock.advance(2_000);
        h.evaluator.tick();
        assert!(h.rx.try_recv().is_err());
        assert_eq!(h.registry.snapshot("Arm").unwrap().last_vibration_at, None);

        // Window over
        h.clock.advance(5_000);
        h.evaluator.tick();
        assert_eq!(h.rx.try_recv().unwrap().control_type, ControlType::Vibrate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_while_muted_pulses_voice() {
        let mut h = harness(|c| {
            c.behaviour.hold_time = 0;
            c.behaviour.force_unmute = true;
        });
        h.flags.set_muted(true);
        arm_manual(&h);

        h.evaluator.tick();
        assert_eq!(h.rx.try_recv().unwrap().control_type, ControlType::Shock);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            h.sink.values_for(VOICE_INPUT),
            vec![
                ParameterValue::Bool(false),
                ParameterValue::Bool(true),
                ParameterValue::Bool(false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_while_unmuted_leaves_voice_alone() {
        let mut h = harness(|c| {
            c.behaviour.hold_time = 0;
            c.behaviour.force_unmute = true;
        });
        arm_manual(&h);

        h.evaluator.tick();
        assert!(h.rx.try_recv().is_ok());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.sink.values_for(VOICE_INPUT).is_empty());
    }
}
