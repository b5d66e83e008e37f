use std::collections::HashSet;

use glam::Vec3;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{validate_scenario, DriftRule, PhaseDef, ScenarioDef, TransferDef};
use crate::error::{ConfigError, EngineError};
use crate::math::{lerp, smoothstep};
use crate::particle::Classification;
use crate::pool::{PoolId, PoolRegistry};

/// Upper bound for the playback speed multiplier.
pub const MAX_SPEED: f32 = 10.0;

/// Drift rule with its pool name resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Drift {
    pub classification: Option<Classification>,
    pub pool: Option<PoolId>,
    pub acceleration: Vec3,
}

impl Drift {
    pub(crate) fn resolve(rule: &DriftRule, pools: &PoolRegistry) -> Result<Self, ConfigError> {
        let pool = match &rule.pool {
            Some(name) => Some(
                pools
                    .id(name)
                    .ok_or_else(|| ConfigError::UnknownPool(name.clone()))?,
            ),
            None => None,
        };
        Ok(Self {
            classification: rule.classification,
            pool,
            acceleration: rule.acceleration,
        })
    }

    #[inline]
    pub fn applies_to(&self, classification: Classification, pool: PoolId) -> bool {
        self.classification.map_or(true, |c| c == classification)
            && self.pool.map_or(true, |p| p == pool)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transfer {
    pub from: PoolId,
    pub to: PoolId,
    pub per_second: f32,
}

impl Transfer {
    fn resolve(def: &TransferDef, pools: &PoolRegistry) -> Result<Self, ConfigError> {
        let lookup = |name: &str| {
            pools
                .id(name)
                .ok_or_else(|| ConfigError::UnknownPool(name.to_string()))
        };
        Ok(Self {
            from: lookup(&def.from)?,
            to: lookup(&def.to)?,
            per_second: def.per_second,
        })
    }
}

/// One progress interval of a scenario and the rules active inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase {
    pub name: String,
    pub start: f32,
    pub end: f32,
    pub blend: f32,
    pub drift: Vec<Drift>,
    pub collisions: bool,
    pub jitter_scale: f32,
    pub transfer: Option<Transfer>,
}

impl Phase {
    fn compile(def: &PhaseDef, pools: &PoolRegistry) -> Result<Self, ConfigError> {
        Ok(Self {
            name: def.name.clone(),
            start: def.start,
            end: def.end,
            blend: def.blend,
            drift: def
                .drift
                .iter()
                .map(|d| Drift::resolve(d, pools))
                .collect::<Result<_, _>>()?,
            collisions: def.collisions,
            jitter_scale: def.jitter_scale,
            transfer: def
                .transfer
                .as_ref()
                .map(|t| Transfer::resolve(t, pools))
                .transpose()?,
        })
    }

    /// Position of `progress` inside this phase, in [0, 1].
    pub fn local_t(&self, progress: f32) -> f32 {
        ((progress - self.start) / (self.end - self.start)).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub looping: bool,
    pub duration_secs: f32,
    pub phases: Vec<Phase>,
}

impl Scenario {
    /// Validate phase ordering/coverage and resolve pool references.
    pub fn compile(def: &ScenarioDef, pools: &PoolRegistry) -> Result<Self, ConfigError> {
        let names: HashSet<&str> = pools.iter().map(|(_, p)| p.name.as_str()).collect();
        validate_scenario(def, &names)?;
        Ok(Self {
            name: def.name.clone(),
            looping: def.looping,
            duration_secs: def.duration_secs,
            phases: def
                .phases
                .iter()
                .map(|p| Phase::compile(p, pools))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Bring an arbitrary progress value into range: wrap when looping,
    /// clamp otherwise.
    pub fn normalize_progress(&self, progress: f32) -> f32 {
        if self.looping {
            let wrapped = progress.rem_euclid(1.0);
            // rem_euclid of a tiny negative rounds up to exactly 1.0
            if wrapped >= 1.0 {
                0.0
            } else {
                wrapped
            }
        } else {
            progress.clamp(0.0, 1.0)
        }
    }

    /// Index of the phase whose `[start, end)` holds `progress`; the last
    /// phase also owns 1.0.
    pub fn phase_index_at(&self, progress: f32) -> usize {
        let after = self.phases.partition_point(|p| p.start <= progress);
        after.saturating_sub(1).min(self.phases.len() - 1)
    }

    fn next_phase(&self, index: usize) -> Option<&Phase> {
        if index + 1 < self.phases.len() {
            self.phases.get(index + 1)
        } else if self.looping {
            self.phases.first()
        } else {
            None
        }
    }
}

/// A phase change reported by the controller.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhaseTransition {
    pub from: String,
    pub to: String,
}

/// Phase rules in effect for one tick, with blending applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameBehavior {
    pub drift: Vec<Drift>,
    pub collisions: bool,
    pub jitter_scale: f32,
}

/// Drives the active scenario's progress and resolves its phase.
#[derive(Clone, Debug)]
pub struct ScenarioController {
    scenarios: Vec<Scenario>,
    active: usize,
    progress: f32,
    playing: bool,
    speed: f32,
    phase_index: usize,
    /// Fractional particles owed by the active phase's transfer.
    transfer_carry: f32,
}

impl ScenarioController {
    /// `scenarios` must be non-empty; `initial` is clamped into range.
    pub fn new(scenarios: Vec<Scenario>, initial: usize) -> Self {
        let active = initial.min(scenarios.len().saturating_sub(1));
        Self {
            scenarios,
            active,
            progress: 0.0,
            playing: false,
            speed: 1.0,
            phase_index: 0,
            transfer_carry: 0.0,
        }
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenarios[self.active]
    }

    pub fn phase(&self) -> &Phase {
        &self.scenario().phases[self.phase_index]
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Playback multiplier, clamped to [0, MAX_SPEED]. Non-finite input is
    /// ignored.
    pub fn set_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!("ignoring non-finite playback speed");
            return;
        }
        self.speed = speed.clamp(0.0, MAX_SPEED);
    }

    /// Switch scenarios by name and rewind to progress 0.
    pub fn set_scenario(&mut self, name: &str) -> Result<(), EngineError> {
        let index = self
            .scenarios
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| EngineError::UnknownScenario(name.to_string()))?;
        self.active = index;
        self.rewind();
        info!("scenario set to `{}`", name);
        Ok(())
    }

    /// Progress back to 0 in the active scenario.
    pub fn rewind(&mut self) {
        self.progress = 0.0;
        self.transfer_carry = 0.0;
        self.phase_index = self.scenario().phase_index_at(0.0);
    }

    /// Scrub to `progress` (clamped or wrapped per the scenario).
    pub fn set_progress(&mut self, progress: f32) -> Option<PhaseTransition> {
        if progress.is_nan() {
            warn!("ignoring NaN progress");
            return None;
        }
        self.progress = self.scenario().normalize_progress(progress);
        self.sync_phase()
    }

    /// Advance the clock by `dt` seconds when playing.
    pub fn advance(&mut self, dt: f32) -> Option<PhaseTransition> {
        if !self.playing || dt <= 0.0 {
            return None;
        }
        let scenario = self.scenario();
        let next = self.progress + dt * self.speed / scenario.duration_secs;
        self.progress = scenario.normalize_progress(next);
        self.sync_phase()
    }

    fn sync_phase(&mut self) -> Option<PhaseTransition> {
        let index = self.scenario().phase_index_at(self.progress);
        if index == self.phase_index {
            return None;
        }
        let phases = &self.scenario().phases;
        let transition = PhaseTransition {
            from: phases[self.phase_index].name.clone(),
            to: phases[index].name.clone(),
        };
        debug!(
            "phase `{}` -> `{}` at progress {:.3}",
            transition.from, transition.to, self.progress
        );
        self.phase_index = index;
        self.transfer_carry = 0.0;
        Some(transition)
    }

    /// Weight of the next phase in the blend, 0 outside the blend window.
    pub fn blend_weight(&self) -> f32 {
        let phase = self.phase();
        if phase.blend <= 0.0 || self.scenario().next_phase(self.phase_index).is_none() {
            return 0.0;
        }
        smoothstep(1.0 - phase.blend, 1.0, phase.local_t(self.progress))
    }

    /// Current rules: drift and jitter blended toward the next phase inside
    /// the blend window; collisions and transfers switch discretely.
    pub fn frame_behavior(&self) -> FrameBehavior {
        let phase = self.phase();
        let w = self.blend_weight();
        let mut drift: Vec<Drift> = phase
            .drift
            .iter()
            .map(|d| Drift {
                acceleration: d.acceleration * (1.0 - w),
                ..d.clone()
            })
            .collect();
        let mut jitter_scale = phase.jitter_scale;
        if w > 0.0 {
            if let Some(next) = self.scenario().next_phase(self.phase_index) {
                drift.extend(next.drift.iter().map(|d| Drift {
                    acceleration: d.acceleration * w,
                    ..d.clone()
                }));
                jitter_scale = lerp(phase.jitter_scale, next.jitter_scale, w);
            }
        }
        FrameBehavior {
            drift,
            collisions: phase.collisions,
            jitter_scale,
        }
    }

    /// Whole particles the active transfer should move this tick. Fractions
    /// carry over to later ticks. Nothing moves while paused.
    pub fn take_transfer(&mut self, dt: f32) -> Option<(Transfer, usize)> {
        if !self.playing {
            return None;
        }
        let transfer = self.phase().transfer?;
        self.transfer_carry += transfer.per_second * dt * self.speed;
        let whole = self.transfer_carry.floor();
        self.transfer_carry -= whole;
        Some((transfer, whole as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolDef;

    fn pools() -> PoolRegistry {
        PoolRegistry::from_defs(&[
            PoolDef::boxed("supply", Vec3::new(0.0, 1.0, 0.0), Vec3::ONE),
            PoolDef::boxed("demand", Vec3::new(0.0, -1.0, 0.0), Vec3::ONE),
        ])
    }

    fn two_phase(looping: bool) -> ScenarioDef {
        let mut a = PhaseDef::new("A", 0.0, 0.4);
        a.blend = 0.5;
        a.jitter_scale = 1.0;
        a.drift = vec![DriftRule::for_class(Classification::Seller, Vec3::Y)];
        let mut b = PhaseDef::new("B", 0.4, 1.0);
        b.jitter_scale = 3.0;
        b.collisions = false;
        b.transfer = Some(TransferDef {
            from: "demand".into(),
            to: "supply".into(),
            per_second: 2.5,
        });
        ScenarioDef {
            name: "two".into(),
            looping,
            duration_secs: 10.0,
            phases: vec![a, b],
        }
    }

    fn controller(looping: bool) -> ScenarioController {
        let scenario = Scenario::compile(&two_phase(looping), &pools()).unwrap();
        ScenarioController::new(vec![scenario], 0)
    }

    #[test]
    fn test_one_shot_clamps_and_holds_final_phase() {
        let mut c = controller(false);
        c.set_playing(true);
        for _ in 0..200 {
            c.advance(0.1);
        }
        assert_eq!(c.progress(), 1.0);
        assert_eq!(c.phase().name, "B");
    }

    #[test]
    fn test_looping_wraps_to_first_phase() {
        let mut c = controller(true);
        c.set_progress(0.95);
        c.set_playing(true);
        let t = c.advance(1.0).expect("wrapping should change phase");
        assert_eq!(t.from, "B");
        assert_eq!(t.to, "A");
        assert!((c.progress() - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_paused_clock_does_not_move() {
        let mut c = controller(false);
        assert!(c.advance(1.0).is_none());
        assert_eq!(c.progress(), 0.0);
    }

    #[test]
    fn test_blend_reaches_next_phase_values() {
        let mut c = controller(false);
        c.set_progress(0.1);
        assert_eq!(c.blend_weight(), 0.0);
        assert_eq!(c.frame_behavior().jitter_scale, 1.0);
        c.set_progress(0.3999);
        let fb = c.frame_behavior();
        assert!(fb.jitter_scale > 2.9, "jitter near end of blend: {}", fb.jitter_scale);
        assert!(fb.drift[0].acceleration.y < 0.01);
        // collisions stay discrete
        assert!(fb.collisions);
    }

    #[test]
    fn test_transfer_carries_fractions() {
        let mut c = controller(false);
        c.set_progress(0.5);
        c.set_playing(true);
        let (_, first) = c.take_transfer(0.5).unwrap();
        let (_, second) = c.take_transfer(0.5).unwrap();
        assert_eq!(first + second, 2);
        assert_eq!(first, 1);
    }

    #[test]
    fn test_unknown_scenario_is_an_error() {
        let mut c = controller(false);
        assert_eq!(
            c.set_scenario("missing"),
            Err(EngineError::UnknownScenario("missing".into()))
        );
    }

    #[test]
    fn test_gap_rejected() {
        let mut def = two_phase(false);
        def.phases[1].start = 0.5;
        assert!(matches!(
            Scenario::compile(&def, &pools()),
            Err(ConfigError::PhaseGap { .. })
        ));
    }

    #[test]
    fn test_speed_clamped() {
        let mut c = controller(false);
        c.set_speed(50.0);
        assert_eq!(c.speed(), MAX_SPEED);
        c.set_speed(f32::NAN);
        assert_eq!(c.speed(), MAX_SPEED);
        c.set_speed(-1.0);
        assert_eq!(c.speed(), 0.0);
    }
}
