use glam::Vec3;
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError};
use crate::interaction::{CollisionEvent, InteractionEngine};
use crate::math::is_finite_vec;
use crate::physics::{integrate, IntegrationContext};
use crate::pool::{PoolId, PoolRegistry};
use crate::rng::{RandomSource, SeededRandom};
use crate::scenario::{Drift, PhaseTransition, Scenario, ScenarioController};
use crate::snapshot::{write_render_buffer, PoolView, RenderParticle, Snapshot};
use crate::store::{shuffle, ParticleStore};

/// Counters from the most recent tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub alive: usize,
    pub transitioning: usize,
    pub dissolving: usize,
    /// Collisions resolved this tick.
    pub collisions: usize,
    /// Dissolves that finished this tick.
    pub dissolves_completed: usize,
    /// Particles repaired after a numeric blow-up.
    pub repaired: usize,
    /// Particles moved by the active phase's transfer.
    pub transferred: usize,
}

/// A batch action with its pools resolved.
#[derive(Clone, Debug, PartialEq)]
struct BatchAction {
    name: String,
    from: PoolId,
    to: PoolId,
}

/// Config-derived state rebuilt on every (re)configuration.
struct Assembly {
    pools: PoolRegistry,
    controller: ScenarioController,
    interactions: InteractionEngine,
    base_drift: Vec<Drift>,
    actions: Vec<BatchAction>,
}

impl Assembly {
    fn build(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pools = PoolRegistry::from_defs(&config.pools);

        let scenario_defs = config.effective_scenarios();
        let scenarios = scenario_defs
            .iter()
            .map(|s| Scenario::compile(s, &pools))
            .collect::<Result<Vec<_>, _>>()?;
        let initial = match &config.initial_scenario {
            Some(name) => scenarios
                .iter()
                .position(|s| &s.name == name)
                .ok_or_else(|| ConfigError::UnknownInitialScenario(name.clone()))?,
            None => 0,
        };

        let base_drift = config
            .physics
            .drift
            .iter()
            .map(|d| Drift::resolve(d, &pools))
            .collect::<Result<Vec<_>, _>>()?;

        let resolve = |name: &str| {
            pools
                .id(name)
                .ok_or_else(|| ConfigError::UnknownPool(name.to_string()))
        };
        let actions = config
            .actions
            .iter()
            .map(|a| {
                Ok(BatchAction {
                    name: a.name.clone(),
                    from: resolve(&a.from)?,
                    to: resolve(&a.to)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let interactions =
            InteractionEngine::new(&config.interaction, &pools, config.particle_count)?;

        Ok(Self {
            controller: ScenarioController::new(scenarios, initial),
            pools,
            interactions,
            base_drift,
            actions,
        })
    }
}

/// One independent simulation instance, owned by its host.
///
/// The host calls [`tick`](Engine::tick) once per frame, reads
/// [`snapshot`](Engine::snapshot), and changes configuration between ticks
/// through the setters.
pub struct Engine {
    config: EngineConfig,
    pools: PoolRegistry,
    store: ParticleStore,
    controller: ScenarioController,
    interactions: InteractionEngine,
    base_drift: Vec<Drift>,
    actions: Vec<BatchAction>,
    rng: Box<dyn RandomSource>,
    /// Seed of an engine-owned random source; reset replays from it.
    seed: Option<u64>,
    events: Vec<CollisionEvent>,
    stats: TickStats,
    /// Phase change caused by the last tick or scrub.
    transition: Option<PhaseTransition>,
}

impl Engine {
    /// Build an engine seeded from `config.seed`, or from entropy when unset.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let seed = config.seed.unwrap_or_else(SeededRandom::entropy_seed);
        let mut engine = Self::with_random_source(config, Box::new(SeededRandom::new(seed)))?;
        engine.seed = Some(seed);
        Ok(engine)
    }

    /// Build an engine around a caller-supplied random source.
    pub fn with_random_source(
        config: EngineConfig,
        mut rng: Box<dyn RandomSource>,
    ) -> Result<Self, EngineError> {
        let Assembly {
            mut pools,
            controller,
            interactions,
            base_drift,
            actions,
        } = Assembly::build(&config)?;

        let mut store = ParticleStore::new();
        store.initialize(
            config.particle_count,
            &config.pool_weights,
            &config.classification_split,
            config.size_range,
            &mut pools,
            rng.as_mut(),
        );
        info!(
            "engine initialized: {} particles across {} pools, scenario `{}`",
            store.len(),
            pools.len(),
            controller.scenario().name
        );

        Ok(Self {
            config,
            pools,
            store,
            controller,
            interactions,
            base_drift,
            actions,
            rng,
            seed: None,
            events: Vec::new(),
            stats: TickStats::default(),
            transition: None,
        })
    }

    /// Replace the configuration and start over. Playback state (playing,
    /// speed) carries across. A config with a seed also reseeds the random
    /// source. On error the engine is left unchanged.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        let assembly = Assembly::build(&config)?;
        let playing = self.controller.is_playing();
        let speed = self.controller.speed();

        self.pools = assembly.pools;
        self.controller = assembly.controller;
        self.interactions = assembly.interactions;
        self.base_drift = assembly.base_drift;
        self.actions = assembly.actions;
        self.config = config;
        if let Some(seed) = self.config.seed {
            self.seed = Some(seed);
        }

        self.controller.set_playing(playing);
        self.controller.set_speed(speed);
        self.reset();
        Ok(())
    }

    /// Reinitialize the particle population and rewind progress to 0.
    pub fn reset(&mut self) {
        if let Some(seed) = self.seed {
            self.rng = Box::new(SeededRandom::new(seed));
        }
        self.store.initialize(
            self.config.particle_count,
            &self.config.pool_weights,
            &self.config.classification_split,
            self.config.size_range,
            &mut self.pools,
            self.rng.as_mut(),
        );
        self.interactions.reset_counters();
        self.controller.rewind();
        self.events.clear();
        self.stats = TickStats::default();
        self.transition = None;
        info!("engine reset: {} particles", self.store.len());
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// `dt` is clamped to `[0, physics.max_dt]` so a frame after the host was
    /// suspended cannot take one huge step; non-finite values count as 0.
    pub fn tick(&mut self, dt: f32) {
        let dt = self.sanitize_dt(dt);
        self.events.clear();
        let mut stats = TickStats::default();

        self.transition = self.controller.advance(dt);
        if let Some((transfer, n)) = self.controller.take_transfer(dt) {
            stats.transferred = self.move_particles(transfer.from, transfer.to, n);
        }
        self.pools
            .update_extents(dt, self.config.physics.resize_rate);

        let behavior = self.controller.frame_behavior();
        let ctx = IntegrationContext {
            config: &self.config.physics,
            base_drift: &self.base_drift,
            behavior: &behavior,
            pools: &self.pools,
            dt,
        };
        let integration = integrate(&mut self.store, &ctx, self.rng.as_mut());
        stats.transitioning = integration.transitioning;
        stats.repaired = integration.repaired;

        if behavior.collisions {
            stats.collisions = self.interactions.resolve(
                &mut self.store,
                &mut self.pools,
                self.rng.as_mut(),
                &mut self.events,
            );
        }
        stats.dissolves_completed = self.interactions.advance_dissolves(
            &mut self.store,
            &mut self.pools,
            dt,
            self.rng.as_mut(),
        );

        for p in self.store.particles() {
            if p.alive {
                stats.alive += 1;
                if p.dissolving {
                    stats.dissolving += 1;
                }
            }
        }
        self.stats = stats;
    }

    fn sanitize_dt(&self, dt: f32) -> f32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0.0;
        }
        let max_dt = self.config.physics.max_dt;
        if dt > max_dt {
            debug!("dt {:.3}s clamped to {:.3}s", dt, max_dt);
        }
        dt.min(max_dt)
    }

    /// Reassign up to `count` random active members of `from` to `to`.
    fn move_particles(&mut self, from: PoolId, to: PoolId, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut candidates = self.store.members(from);
        let n = count.min(candidates.len());
        if n == 0 {
            return 0;
        }
        shuffle(&mut candidates, self.rng.as_mut());
        for &id in &candidates[..n] {
            self.store
                .reassign(id, to, &mut self.pools, self.rng.as_mut());
        }
        n
    }

    /// Run a named batch action, moving up to `count` particles from its
    /// source pool to its destination. Requests beyond the source population
    /// are clamped; an empty source moves nothing. Returns the number moved.
    pub fn trigger_batch_action(&mut self, name: &str, count: usize) -> Result<usize, EngineError> {
        let action = self
            .actions
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAction(name.to_string()))?;
        let moved = self.move_particles(action.from, action.to, count);
        if moved < count {
            debug!(
                "batch action `{}` requested {} but moved {}",
                action.name, count, moved
            );
        } else {
            debug!("batch action `{}` moved {}", action.name, moved);
        }
        Ok(moved)
    }

    /// Switch scenario by name; progress rewinds to 0.
    pub fn set_scenario(&mut self, name: &str) -> Result<(), EngineError> {
        self.controller.set_scenario(name)?;
        self.transition = None;
        Ok(())
    }

    /// Scrub to `progress`: clamped to [0, 1], or wrapped for looping
    /// scenarios. NaN is ignored.
    pub fn set_progress(&mut self, progress: f32) {
        if let Some(transition) = self.controller.set_progress(progress) {
            self.transition = Some(transition);
        }
    }

    /// Phase change caused by the last tick, or by a scrub since then.
    pub fn last_transition(&self) -> Option<&PhaseTransition> {
        self.transition.as_ref()
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.controller.set_playing(playing);
    }

    /// Playback multiplier, clamped to [0, 10].
    pub fn set_speed(&mut self, speed: f32) {
        self.controller.set_speed(speed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            particles: self.store.snapshot(),
            pools: self.pools.iter().map(|(_, p)| PoolView::from_pool(p)).collect(),
            collision_count: self.interactions.collision_count(),
            dissolved_count: self.interactions.dissolved_count(),
            scenario: self.controller.scenario().name.clone(),
            active_phase: self.controller.phase().name.clone(),
            progress: self.controller.progress(),
            playing: self.controller.is_playing(),
            events: self.events.clone(),
            phase_transition: self.transition.clone(),
        }
    }

    /// Packed per-slot render records; see [`RenderParticle`].
    pub fn write_render_buffer(&self, out: &mut Vec<RenderParticle>) {
        write_render_buffer(self.store.particles(), out);
    }

    /// Hand over the last tick's collision events.
    pub fn drain_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pool_member_count(&self, name: &str) -> Result<usize, EngineError> {
        self.pools
            .by_name(name)
            .map(|p| p.member_count())
            .ok_or_else(|| EngineError::UnknownPool(name.to_string()))
    }

    pub fn collision_count(&self) -> u64 {
        self.interactions.collision_count()
    }

    pub fn dissolved_count(&self) -> usize {
        self.interactions.dissolved_count()
    }

    pub fn active_phase_name(&self) -> &str {
        &self.controller.phase().name
    }

    pub fn scenario_name(&self) -> &str {
        &self.controller.scenario().name
    }

    pub fn scenario_names(&self) -> Vec<String> {
        self.controller
            .scenarios()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn progress(&self) -> f32 {
        self.controller.progress()
    }

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    pub fn last_stats(&self) -> TickStats {
        self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    /// Put a particle at `position` at rest, with its wander target there.
    /// Pool membership is untouched; use [`reassign`](Engine::reassign) or a
    /// batch action to change pools. Returns false for unknown or removed
    /// particles.
    pub fn place(&mut self, id: usize, position: Vec3) -> bool {
        match self.store.get_mut(id) {
            Some(p) if p.alive && is_finite_vec(position) => {
                p.position = position;
                p.target = position;
                p.velocity = Vec3::ZERO;
                true
            }
            _ => false,
        }
    }

    /// Move one particle to a named pool, easing it there.
    pub fn reassign(&mut self, id: usize, pool: &str) -> Result<bool, EngineError> {
        let pool = self
            .pools
            .id(pool)
            .ok_or_else(|| EngineError::UnknownPool(pool.to_string()))?;
        let moved = self
            .store
            .reassign(id, pool, &mut self.pools, self.rng.as_mut());
        if !moved {
            warn!("particle {} cannot be reassigned", id);
        }
        Ok(moved)
    }
}
