use glam::Vec3;
use log::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::PhysicsConfig;
use crate::math::{approach_factor, clamp_length, is_finite_vec, signed_unit, EPSILON};
use crate::particle::Particle;
use crate::pool::PoolRegistry;
use crate::rng::RandomSource;
use crate::scenario::{Drift, FrameBehavior};
use crate::store::ParticleStore;

/// Everything the per-particle update reads. Shared across threads under
/// the `parallel` feature, so it only holds shared references.
pub struct IntegrationContext<'a> {
    pub config: &'a PhysicsConfig,
    pub base_drift: &'a [Drift],
    pub behavior: &'a FrameBehavior,
    pub pools: &'a PoolRegistry,
    pub dt: f32,
}

/// Follow-up work for one particle that needs the random source.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StepFlags {
    /// Reached its transit or wander target; needs a new idle target.
    pub needs_target: bool,
    /// Produced a non-finite position or velocity.
    pub non_finite: bool,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IntegrationStats {
    pub transitioning: usize,
    pub repaired: usize,
}

/// Advance every live particle by `ctx.dt`.
///
/// Random jitter is drawn up front in id order and targets/repairs are
/// resolved afterwards in id order, so the result does not depend on
/// whether the middle pass runs in parallel.
pub fn integrate(
    store: &mut ParticleStore,
    ctx: &IntegrationContext,
    rng: &mut dyn RandomSource,
) -> IntegrationStats {
    if ctx.dt <= 0.0 {
        return IntegrationStats::default();
    }

    let jitter: Vec<Vec3> = store
        .particles()
        .iter()
        .map(|p| {
            if p.alive {
                Vec3::new(signed_unit(rng), signed_unit(rng), signed_unit(rng))
            } else {
                Vec3::ZERO
            }
        })
        .collect();

    let particles = store.particles_mut();

    #[cfg(feature = "parallel")]
    let flags: Vec<StepFlags> = particles
        .par_iter_mut()
        .zip(jitter.par_iter())
        .map(|(p, j)| step_particle(p, *j, ctx))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let flags: Vec<StepFlags> = particles
        .iter_mut()
        .zip(jitter.iter())
        .map(|(p, j)| step_particle(p, *j, ctx))
        .collect();

    let mut stats = IntegrationStats::default();
    for (i, (p, f)) in particles.iter_mut().zip(flags).enumerate() {
        let pool = ctx.pools.get(p.pool);
        if f.non_finite {
            warn!("particle {} went non-finite; respawning inside `{}`", i, pool.name);
            p.position = pool.sample_point(rng);
            p.velocity = Vec3::ZERO;
            p.transitioning = false;
            p.transition_progress = 1.0;
            stats.repaired += 1;
        }
        if f.needs_target || f.non_finite {
            p.target = pool.sample_point(rng);
        }
        if p.alive && p.transitioning {
            stats.transitioning += 1;
        }
    }
    stats
}

/// Update one particle in place. Pure apart from `p`.
pub fn step_particle(p: &mut Particle, jitter: Vec3, ctx: &IntegrationContext) -> StepFlags {
    let mut flags = StepFlags::default();
    if !p.alive {
        return flags;
    }
    let cfg = ctx.config;
    let dt = ctx.dt;
    let pool = ctx.pools.get(p.pool);

    if p.transitioning {
        // exponential approach: fast when far, slowing near arrival
        p.position += (p.target - p.position) * approach_factor(cfg.flow_speed, dt);
        p.velocity *= cfg.damping;
        let remaining = (p.target - p.position).length();
        p.transition_progress = if p.transition_span > EPSILON {
            (1.0 - remaining / p.transition_span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        if remaining < cfg.arrive_epsilon {
            p.position = p.target;
            p.velocity = Vec3::ZERO;
            p.transitioning = false;
            p.transition_progress = 1.0;
            pool.contain(&mut p.position, &mut p.velocity, cfg.containment, cfg.restitution);
            flags.needs_target = true;
        }
    } else {
        let mut acc = jitter * cfg.brownian * ctx.behavior.jitter_scale;
        for drift in ctx.base_drift.iter().chain(ctx.behavior.drift.iter()) {
            if drift.applies_to(p.classification, p.pool) {
                acc += drift.acceleration;
            }
        }
        acc += (p.target - p.position) * cfg.home_pull;

        p.velocity += acc * dt;
        p.velocity *= cfg.damping;
        p.velocity = clamp_length(p.velocity, cfg.max_speed);
        p.position += p.velocity * dt;
        pool.contain(&mut p.position, &mut p.velocity, cfg.containment, cfg.restitution);

        let reached = (p.target - p.position).length() < cfg.arrive_epsilon;
        flags.needs_target = reached || !pool.contains(p.target, EPSILON);
    }

    flags.non_finite = !(is_finite_vec(p.position) && is_finite_vec(p.velocity));
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolDef;
    use crate::particle::Classification;
    use crate::pool::PoolId;
    use crate::rng::SequenceRandom;

    fn setup() -> (ParticleStore, PoolRegistry) {
        let mut pools = PoolRegistry::from_defs(&[
            PoolDef::boxed("left", Vec3::new(-2.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.0)),
            PoolDef::boxed("right", Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.0)),
        ]);
        let mut store = ParticleStore::new();
        let mut rng = SequenceRandom::constant(0.5);
        store.initialize(4, &[1.0, 0.0], &[], [0.02, 0.02], &mut pools, &mut rng);
        (store, pools)
    }

    #[test]
    fn test_transition_is_exponential_and_arrives() {
        let (mut store, mut pools) = setup();
        let mut rng = SequenceRandom::constant(0.5);
        assert!(store.reassign(0, PoolId(1), &mut pools, &mut rng));
        let cfg = PhysicsConfig::default();
        let behavior = FrameBehavior {
            jitter_scale: 1.0,
            ..Default::default()
        };
        let ctx = IntegrationContext {
            config: &cfg,
            base_drift: &[],
            behavior: &behavior,
            pools: &pools,
            dt: 0.016,
        };

        let start = (store.get(0).unwrap().target - store.get(0).unwrap().position).length();
        integrate(&mut store, &ctx, &mut rng);
        let first = (store.get(0).unwrap().target - store.get(0).unwrap().position).length();
        integrate(&mut store, &ctx, &mut rng);
        let second = (store.get(0).unwrap().target - store.get(0).unwrap().position).length();
        assert!(start - first > first - second, "step sizes should shrink");

        for _ in 0..600 {
            integrate(&mut store, &ctx, &mut rng);
        }
        let p = store.get(0).unwrap();
        assert!(!p.transitioning, "particle should have arrived");
        assert!(pools.get(PoolId(1)).contains(p.position, 1e-5));
    }

    #[test]
    fn test_drift_respects_filters() {
        let (mut store, pools) = setup();
        store.get_mut(0).unwrap().classification = Classification::Seller;
        let cfg = PhysicsConfig {
            brownian: 0.0,
            home_pull: 0.0,
            ..Default::default()
        };
        let behavior = FrameBehavior {
            drift: vec![Drift {
                classification: Some(Classification::Seller),
                pool: None,
                acceleration: Vec3::new(0.0, -5.0, 0.0),
            }],
            collisions: false,
            jitter_scale: 1.0,
        };
        let ctx = IntegrationContext {
            config: &cfg,
            base_drift: &[],
            behavior: &behavior,
            pools: &pools,
            dt: 0.016,
        };
        let mut rng = SequenceRandom::constant(0.5);
        integrate(&mut store, &ctx, &mut rng);
        assert!(store.get(0).unwrap().velocity.y < 0.0);
        assert_eq!(store.get(1).unwrap().velocity.y, 0.0);
    }

    #[test]
    fn test_non_finite_is_repaired() {
        let (mut store, pools) = setup();
        store.get_mut(2).unwrap().velocity = Vec3::splat(f32::NAN);
        let cfg = PhysicsConfig::default();
        let behavior = FrameBehavior::default();
        let ctx = IntegrationContext {
            config: &cfg,
            base_drift: &[],
            behavior: &behavior,
            pools: &pools,
            dt: 0.016,
        };
        let mut rng = SequenceRandom::new(vec![0.2, 0.7, 0.4]);
        let stats = integrate(&mut store, &ctx, &mut rng);
        assert_eq!(stats.repaired, 1);
        let p = store.get(2).unwrap();
        assert!(is_finite_vec(p.position) && is_finite_vec(p.velocity));
        assert!(pools.get(p.pool).contains(p.position, 1e-5));
    }
}
