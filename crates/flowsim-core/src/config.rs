use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::particle::Classification;

/// Volume of a pool around its center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolShape {
    /// Axis-aligned box. A zero z half extent gives a flat 2D zone.
    Box { half_extent: Vec3 },
    Sphere { radius: f32 },
}

impl Default for PoolShape {
    fn default() -> Self {
        PoolShape::Box {
            half_extent: Vec3::new(1.0, 1.0, 0.0),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolDef {
    pub name: String,
    pub center: Vec3,
    pub shape: PoolShape,
    /// How strongly the pool's extent follows its membership ratio
    /// (0 = fixed size).
    pub growth: f32,
    /// Classification given to particles placed here at initialization.
    /// `None` draws from the global classification split.
    pub classification: Option<Classification>,
}

impl PoolDef {
    pub fn boxed(name: &str, center: Vec3, half_extent: Vec3) -> Self {
        Self {
            name: name.to_string(),
            center,
            shape: PoolShape::Box { half_extent },
            ..Default::default()
        }
    }

    pub fn sphere(name: &str, center: Vec3, radius: f32) -> Self {
        Self {
            name: name.to_string(),
            center,
            shape: PoolShape::Sphere { radius },
            ..Default::default()
        }
    }

    pub fn with_growth(mut self, growth: f32) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }
}

/// Constant acceleration applied to matching particles.
///
/// Unset filters match everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftRule {
    pub classification: Option<Classification>,
    pub pool: Option<String>,
    pub acceleration: Vec3,
}

impl DriftRule {
    pub fn for_class(classification: Classification, acceleration: Vec3) -> Self {
        Self {
            classification: Some(classification),
            pool: None,
            acceleration,
        }
    }

    pub fn for_pool(pool: &str, acceleration: Vec3) -> Self {
        Self {
            classification: None,
            pool: Some(pool.to_string()),
            acceleration,
        }
    }
}

/// What happens when a particle reaches its pool boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentMode {
    /// Clamp position and drop the outward velocity component.
    Clamp,
    /// Clamp position and reflect the outward velocity component.
    #[default]
    Bounce,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Magnitude of the random acceleration applied every tick.
    pub brownian: f32,
    /// Velocity multiplier applied once per tick, in (0, 1].
    pub damping: f32,
    pub max_speed: f32,
    /// Spring strength toward the idle wander target.
    pub home_pull: f32,
    /// Exponential approach rate (per second) for transitioning particles.
    pub flow_speed: f32,
    /// Distance under which a transit or wander target counts as reached.
    pub arrive_epsilon: f32,
    /// Upper bound for a single tick's `dt`, in seconds.
    pub max_dt: f32,
    pub containment: ContainmentMode,
    /// Fraction of outward speed kept by a bounce.
    pub restitution: f32,
    /// Rate (per second) at which pool extents follow their membership.
    pub resize_rate: f32,
    /// Drift applied in every phase, on top of phase-specific drift.
    pub drift: Vec<DriftRule>,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            brownian: 0.6,
            damping: 0.96,
            max_speed: 1.5,
            home_pull: 0.4,
            flow_speed: 2.5,
            arrive_epsilon: 0.01,
            max_dt: 0.1,
            containment: ContainmentMode::Bounce,
            restitution: 0.6,
            resize_rate: 3.0,
            drift: Vec::new(),
        }
    }
}

/// Effect of an interaction rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionEffect {
    /// `b` becomes `into` and absorbs `a`, which starts dissolving.
    Convert { into: Classification },
    /// Both particles recoil along the pair normal.
    Bounce { impulse: f32 },
}

/// A rule for an unordered pair of classifications.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub a: Classification,
    pub b: Classification,
    pub effect: InteractionEffect,
}

impl InteractionRule {
    pub fn convert(a: Classification, b: Classification, into: Classification) -> Self {
        Self {
            a,
            b,
            effect: InteractionEffect::Convert { into },
        }
    }

    pub fn bounce(a: Classification, b: Classification, impulse: f32) -> Self {
        Self {
            a,
            b,
            effect: InteractionEffect::Bounce { impulse },
        }
    }
}

/// What a finished dissolve does with its particle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DissolvePolicy {
    /// Respawn into `pool` as `classification`; total count is conserved.
    Recycle {
        pool: String,
        classification: Classification,
    },
    /// Drop from the population; total count shrinks.
    #[default]
    Remove,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Pair distance under which rules fire.
    pub distance: f32,
    pub rules: Vec<InteractionRule>,
    /// Seconds a dissolving particle takes to fade out.
    pub dissolve_secs: f32,
    pub dissolve_policy: DissolvePolicy,
    /// Only pair particles that share a pool.
    pub same_pool_only: bool,
    /// Bag size grows as `bag_count ^ exponent`.
    pub bag_size_exponent: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            distance: 0.15,
            rules: Vec::new(),
            dissolve_secs: 0.6,
            dissolve_policy: DissolvePolicy::Remove,
            same_pool_only: false,
            bag_size_exponent: 1.0 / 3.0,
        }
    }
}

/// Continuous reassignment while a phase is active.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferDef {
    pub from: String,
    pub to: String,
    /// Particles moved per second of simulated time.
    pub per_second: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDef {
    pub name: String,
    pub start: f32,
    pub end: f32,
    /// Fraction of this phase's span, at its end, spent blending drift and
    /// jitter toward the next phase.
    pub blend: f32,
    pub drift: Vec<DriftRule>,
    pub collisions: bool,
    pub jitter_scale: f32,
    pub transfer: Option<TransferDef>,
}

impl Default for PhaseDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            start: 0.0,
            end: 1.0,
            blend: 0.0,
            drift: Vec::new(),
            collisions: true,
            jitter_scale: 1.0,
            transfer: None,
        }
    }
}

impl PhaseDef {
    pub fn new(name: &str, start: f32, end: f32) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioDef {
    pub name: String,
    /// Wrap progress at 1.0 instead of holding the final phase.
    pub looping: bool,
    /// Seconds of play time for progress to go from 0 to 1.
    pub duration_secs: f32,
    pub phases: Vec<PhaseDef>,
}

impl Default for ScenarioDef {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            looping: false,
            duration_secs: 10.0,
            phases: vec![PhaseDef::new("idle", 0.0, 1.0)],
        }
    }
}

/// A named phase-independent command moving particles between two pools.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchActionDef {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl BatchActionDef {
    pub fn new(name: &str, from: &str, to: &str) -> Self {
        Self {
            name: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassWeight {
    pub classification: Classification,
    pub weight: f32,
}

/// Everything needed to build an [`Engine`](crate::engine::Engine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub particle_count: usize,
    pub pools: Vec<PoolDef>,
    /// Share of particles per pool, parallel to `pools`. Empty = equal split.
    pub pool_weights: Vec<f32>,
    /// Classification split for pools without a default classification.
    /// Empty = all neutral.
    pub classification_split: Vec<ClassWeight>,
    /// Fixed seed for reproducible runs; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// `[min, max]` base size.
    pub size_range: [f32; 2],
    pub physics: PhysicsConfig,
    pub interaction: InteractionConfig,
    /// Empty = a single one-shot scenario with one "idle" phase.
    pub scenarios: Vec<ScenarioDef>,
    /// Scenario active after initialization; defaults to the first.
    pub initial_scenario: Option<String>,
    pub actions: Vec<BatchActionDef>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            particle_count: 200,
            pools: vec![PoolDef::boxed(
                "main",
                Vec3::ZERO,
                Vec3::new(1.0, 1.0, 0.0),
            )],
            pool_weights: Vec::new(),
            classification_split: Vec::new(),
            seed: None,
            size_range: [0.02, 0.04],
            physics: PhysicsConfig::default(),
            interaction: InteractionConfig::default(),
            scenarios: Vec::new(),
            initial_scenario: None,
            actions: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub const MAX_PARTICLES: usize = 200_000;

    /// Parse a JSON configuration. Validation happens in `Engine::new`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Scenarios to run, with the implicit default when none are configured.
    pub fn effective_scenarios(&self) -> Vec<ScenarioDef> {
        if self.scenarios.is_empty() {
            vec![ScenarioDef::default()]
        } else {
            self.scenarios.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_particles()?;
        let pool_names = self.validate_pools()?;
        self.validate_split()?;
        self.validate_physics(&pool_names)?;
        self.validate_interaction(&pool_names)?;
        self.validate_scenarios(&pool_names)?;
        self.validate_actions(&pool_names)?;
        Ok(())
    }

    fn validate_particles(&self) -> Result<(), ConfigError> {
        if self.particle_count == 0 {
            return Err(ConfigError::NoParticles);
        }
        if self.particle_count > Self::MAX_PARTICLES {
            return Err(ConfigError::TooManyParticles {
                max: Self::MAX_PARTICLES,
                actual: self.particle_count,
            });
        }
        let [min, max] = self.size_range;
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return Err(ConfigError::InvalidSizeRange);
        }
        Ok(())
    }

    fn validate_pools(&self) -> Result<HashSet<&str>, ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }
        let mut names = HashSet::new();
        for (i, pool) in self.pools.iter().enumerate() {
            if pool.name.is_empty() {
                return Err(ConfigError::EmptyPoolName(i));
            }
            if !names.insert(pool.name.as_str()) {
                return Err(ConfigError::DuplicatePool(pool.name.clone()));
            }
            if !crate::math::is_finite_vec(pool.center) {
                return Err(ConfigError::InvalidPoolCenter(pool.name.clone()));
            }
            let extent_ok = match pool.shape {
                PoolShape::Box { half_extent } => {
                    crate::math::is_finite_vec(half_extent)
                        && half_extent.min_element() >= 0.0
                        && half_extent.max_element() > 0.0
                }
                PoolShape::Sphere { radius } => radius.is_finite() && radius > 0.0,
            };
            if !extent_ok {
                return Err(ConfigError::InvalidPoolExtent(pool.name.clone()));
            }
            if !(pool.growth.is_finite() && pool.growth >= 0.0) {
                return Err(ConfigError::InvalidPoolGrowth(pool.name.clone()));
            }
        }
        if !self.pool_weights.is_empty() {
            if self.pool_weights.len() != self.pools.len() {
                return Err(ConfigError::PoolWeightMismatch {
                    pools: self.pools.len(),
                    weights: self.pool_weights.len(),
                });
            }
            if !weights_ok(self.pool_weights.iter().copied()) {
                return Err(ConfigError::InvalidPoolWeights);
            }
        }
        Ok(names)
    }

    fn validate_split(&self) -> Result<(), ConfigError> {
        if !self.classification_split.is_empty()
            && !weights_ok(self.classification_split.iter().map(|c| c.weight))
        {
            return Err(ConfigError::InvalidClassificationSplit);
        }
        Ok(())
    }

    fn validate_physics(&self, pools: &HashSet<&str>) -> Result<(), ConfigError> {
        let p = &self.physics;
        if !(p.brownian.is_finite() && p.brownian >= 0.0) {
            return Err(ConfigError::InvalidPhysics("brownian"));
        }
        if !(p.damping.is_finite() && p.damping > 0.0 && p.damping <= 1.0) {
            return Err(ConfigError::InvalidPhysics("damping"));
        }
        if !(p.max_speed.is_finite() && p.max_speed > 0.0) {
            return Err(ConfigError::InvalidPhysics("max_speed"));
        }
        if !(p.home_pull.is_finite() && p.home_pull >= 0.0) {
            return Err(ConfigError::InvalidPhysics("home_pull"));
        }
        if !(p.flow_speed.is_finite() && p.flow_speed > 0.0) {
            return Err(ConfigError::InvalidPhysics("flow_speed"));
        }
        if !(p.arrive_epsilon.is_finite() && p.arrive_epsilon > 0.0) {
            return Err(ConfigError::InvalidPhysics("arrive_epsilon"));
        }
        if !(p.max_dt.is_finite() && p.max_dt > 0.0 && p.max_dt <= 1.0) {
            return Err(ConfigError::InvalidPhysics("max_dt"));
        }
        if !(p.restitution.is_finite() && (0.0..=1.0).contains(&p.restitution)) {
            return Err(ConfigError::InvalidPhysics("restitution"));
        }
        if !(p.resize_rate.is_finite() && p.resize_rate >= 0.0) {
            return Err(ConfigError::InvalidPhysics("resize_rate"));
        }
        for rule in &p.drift {
            if !crate::math::is_finite_vec(rule.acceleration) {
                return Err(ConfigError::InvalidPhysics("drift"));
            }
            check_pool(pools, rule.pool.as_deref())?;
        }
        Ok(())
    }

    fn validate_interaction(&self, pools: &HashSet<&str>) -> Result<(), ConfigError> {
        let it = &self.interaction;
        if !(it.distance.is_finite() && it.distance > 0.0) {
            return Err(ConfigError::InvalidInteraction("distance"));
        }
        if !(it.dissolve_secs.is_finite() && it.dissolve_secs > 0.0) {
            return Err(ConfigError::InvalidInteraction("dissolve_secs"));
        }
        if !(it.bag_size_exponent.is_finite() && it.bag_size_exponent >= 0.0) {
            return Err(ConfigError::InvalidInteraction("bag_size_exponent"));
        }
        for rule in &it.rules {
            if rule.a == rule.b {
                return Err(ConfigError::SelfInteraction(rule.a));
            }
            if let InteractionEffect::Bounce { impulse } = rule.effect {
                if !(impulse.is_finite() && impulse >= 0.0) {
                    return Err(ConfigError::InvalidInteraction("rules.impulse"));
                }
            }
        }
        if let DissolvePolicy::Recycle { pool, .. } = &it.dissolve_policy {
            check_pool(pools, Some(pool))?;
        }
        Ok(())
    }

    fn validate_scenarios(&self, pools: &HashSet<&str>) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(ConfigError::DuplicateScenario(scenario.name.clone()));
            }
            validate_scenario(scenario, pools)?;
        }
        if let Some(initial) = &self.initial_scenario {
            let known = if self.scenarios.is_empty() {
                initial == &ScenarioDef::default().name
            } else {
                names.contains(initial.as_str())
            };
            if !known {
                return Err(ConfigError::UnknownInitialScenario(initial.clone()));
            }
        }
        Ok(())
    }

    fn validate_actions(&self, pools: &HashSet<&str>) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for action in &self.actions {
            if !names.insert(action.name.as_str()) {
                return Err(ConfigError::DuplicateAction(action.name.clone()));
            }
            check_pool(pools, Some(&action.from))?;
            check_pool(pools, Some(&action.to))?;
        }
        Ok(())
    }
}

/// Phases must be ordered, contiguous and cover [0, 1].
pub(crate) fn validate_scenario(
    scenario: &ScenarioDef,
    pools: &HashSet<&str>,
) -> Result<(), ConfigError> {
    if scenario.phases.is_empty() {
        return Err(ConfigError::EmptyScenario(scenario.name.clone()));
    }
    if !(scenario.duration_secs.is_finite() && scenario.duration_secs > 0.0) {
        return Err(ConfigError::InvalidScenarioDuration(scenario.name.clone()));
    }
    let mut expected_start = 0.0_f32;
    for phase in &scenario.phases {
        let phase_err = |field| ConfigError::InvalidPhaseBehavior {
            scenario: scenario.name.clone(),
            phase: phase.name.clone(),
            field,
        };
        if !(phase.start.is_finite() && phase.end.is_finite() && phase.start < phase.end) {
            return Err(ConfigError::PhaseInterval {
                scenario: scenario.name.clone(),
                phase: phase.name.clone(),
            });
        }
        if (phase.start - expected_start).abs() > 1.0e-6 {
            return Err(ConfigError::PhaseGap {
                scenario: scenario.name.clone(),
                phase: phase.name.clone(),
            });
        }
        expected_start = phase.end;
        if !(phase.blend.is_finite() && (0.0..=1.0).contains(&phase.blend)) {
            return Err(phase_err("blend"));
        }
        if !(phase.jitter_scale.is_finite() && phase.jitter_scale >= 0.0) {
            return Err(phase_err("jitter_scale"));
        }
        for rule in &phase.drift {
            if !crate::math::is_finite_vec(rule.acceleration) {
                return Err(phase_err("drift"));
            }
            check_pool(pools, rule.pool.as_deref())?;
        }
        if let Some(transfer) = &phase.transfer {
            if !(transfer.per_second.is_finite() && transfer.per_second >= 0.0) {
                return Err(phase_err("transfer.per_second"));
            }
            check_pool(pools, Some(&transfer.from))?;
            check_pool(pools, Some(&transfer.to))?;
        }
    }
    if (expected_start - 1.0).abs() > 1.0e-6 {
        return Err(ConfigError::PhaseCoverage(scenario.name.clone()));
    }
    Ok(())
}

fn check_pool(pools: &HashSet<&str>, name: Option<&str>) -> Result<(), ConfigError> {
    match name {
        Some(name) if !pools.contains(name) => Err(ConfigError::UnknownPool(name.to_string())),
        _ => Ok(()),
    }
}

fn weights_ok(weights: impl Iterator<Item = f32>) -> bool {
    let mut sum = 0.0;
    for w in weights {
        if !(w.is_finite() && w >= 0.0) {
            return false;
        }
        sum += w;
    }
    sum > 0.0
}
