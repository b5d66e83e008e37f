use log::debug;
use serde::Serialize;

use crate::config::{DissolvePolicy, InteractionConfig, InteractionEffect, InteractionRule};
use crate::error::ConfigError;
use crate::grid::SpatialHashGrid;
use crate::math::{random_unit_vector, try_normalize};
use crate::particle::Classification;
use crate::pool::{PoolId, PoolRegistry};
use crate::rng::RandomSource;
use crate::store::ParticleStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionKind {
    /// A bag took in another particle.
    Absorb,
    Bounce,
    /// A particle changed classification by absorbing another.
    Convert,
}

/// One resolved collision, kept only for the tick that produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CollisionEvent {
    /// Midpoint of the pair.
    pub position: [f32; 3],
    pub participants: [u32; 2],
    pub kind: CollisionKind,
}

/// Dissolve policy with its pool resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dissolve {
    Recycle {
        pool: PoolId,
        classification: Classification,
    },
    Remove,
}

impl Dissolve {
    pub fn resolve(policy: &DissolvePolicy, pools: &PoolRegistry) -> Result<Self, ConfigError> {
        Ok(match policy {
            DissolvePolicy::Recycle {
                pool,
                classification,
            } => Dissolve::Recycle {
                pool: pools
                    .id(pool)
                    .ok_or_else(|| ConfigError::UnknownPool(pool.clone()))?,
                classification: *classification,
            },
            DissolvePolicy::Remove => Dissolve::Remove,
        })
    }
}

/// Proximity-triggered reactions between differently classified particles,
/// plus the dissolve lifecycle of consumed particles.
pub struct InteractionEngine {
    config: InteractionConfig,
    dissolve: Dissolve,
    grid: SpatialHashGrid,
    /// Particles already used up by a conversion this tick.
    consumed: Vec<bool>,
    pairs: Vec<(u32, u32)>,
    collision_count: u64,
    dissolved_count: usize,
}

impl InteractionEngine {
    pub fn new(
        config: &InteractionConfig,
        pools: &PoolRegistry,
        particle_count: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            dissolve: Dissolve::resolve(&config.dissolve_policy, pools)?,
            grid: SpatialHashGrid::new(
                config.distance,
                SpatialHashGrid::table_size_for(particle_count),
            ),
            config: config.clone(),
            consumed: Vec::with_capacity(particle_count),
            pairs: Vec::new(),
            collision_count: 0,
            dissolved_count: 0,
        })
    }

    /// Total collisions resolved since construction or the last reset.
    pub fn collision_count(&self) -> u64 {
        self.collision_count
    }

    /// Particles permanently removed by the `Remove` dissolve policy.
    pub fn dissolved_count(&self) -> usize {
        self.dissolved_count
    }

    pub fn dissolve_policy(&self) -> Dissolve {
        self.dissolve
    }

    pub fn reset_counters(&mut self) {
        self.collision_count = 0;
        self.dissolved_count = 0;
    }

    fn rule_for(&self, a: Classification, b: Classification) -> Option<(InteractionRule, bool)> {
        self.config.rules.iter().find_map(|r| {
            if r.a == a && r.b == b {
                Some((*r, false))
            } else if r.a == b && r.b == a {
                Some((*r, true))
            } else {
                None
            }
        })
    }

    /// Detect pairs closer than the interaction distance and apply the first
    /// matching rule to each. Every pair is handled at most once per call and
    /// a particle consumed by a conversion takes no further part in it.
    /// Returns the number of collisions resolved.
    pub fn resolve(
        &mut self,
        store: &mut ParticleStore,
        pools: &mut PoolRegistry,
        rng: &mut dyn RandomSource,
        events: &mut Vec<CollisionEvent>,
    ) -> usize {
        if self.config.rules.is_empty() {
            return 0;
        }

        let distance = self.config.distance;
        let dist_sq = distance * distance;
        self.grid.set_cell_size(distance);
        self.grid.build(
            store
                .particles()
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_active())
                .map(|(i, p)| (i as u32, p.position)),
        );

        self.pairs.clear();
        let particles = store.particles();
        for (i, p) in particles.iter().enumerate() {
            if !p.is_active() {
                continue;
            }
            let pairs = &mut self.pairs;
            let same_pool_only = self.config.same_pool_only;
            self.grid.query_neighbors(p.position, |j| {
                if j as usize <= i {
                    return;
                }
                let q = &particles[j as usize];
                if q.classification == p.classification {
                    return;
                }
                if same_pool_only && q.pool != p.pool {
                    return;
                }
                if (q.position - p.position).length_squared() < dist_sq {
                    pairs.push((i as u32, j));
                }
            });
        }
        // grid order depends on the hash layout; sort for a stable pass
        self.pairs.sort_unstable();

        self.consumed.clear();
        self.consumed.resize(store.len(), false);
        let mut resolved = 0;

        for k in 0..self.pairs.len() {
            let (i, j) = self.pairs[k];
            let (i, j) = (i as usize, j as usize);
            if self.consumed[i] || self.consumed[j] {
                continue;
            }
            let particles = store.particles();
            let (ci, cj) = (particles[i].classification, particles[j].classification);
            if ci == cj || !particles[i].is_active() || !particles[j].is_active() {
                continue;
            }
            let Some((rule, swapped)) = self.rule_for(ci, cj) else {
                continue;
            };
            let (a, b) = if swapped { (j, i) } else { (i, j) };
            let midpoint = (particles[a].position + particles[b].position) * 0.5;

            let kind = match rule.effect {
                InteractionEffect::Convert { into } => {
                    self.convert(store, pools, a, b, into)
                }
                InteractionEffect::Bounce { impulse } => {
                    let ps = store.particles_mut();
                    let normal = try_normalize(ps[b].position - ps[a].position)
                        .unwrap_or_else(|| random_unit_vector(rng));
                    ps[a].velocity -= normal * impulse;
                    ps[b].velocity += normal * impulse;
                    CollisionKind::Bounce
                }
            };

            self.collision_count += 1;
            resolved += 1;
            events.push(CollisionEvent {
                position: midpoint.to_array(),
                participants: [a as u32, b as u32],
                kind,
            });
        }
        resolved
    }

    /// `b` absorbs `a`: `b` takes classification `into` and `a`'s units,
    /// `a` starts dissolving.
    fn convert(
        &mut self,
        store: &mut ParticleStore,
        pools: &mut PoolRegistry,
        a: usize,
        b: usize,
        into: Classification,
    ) -> CollisionKind {
        let exponent = self.config.bag_size_exponent;
        let ps = store.particles_mut();

        let absorbed = ps[a].bag_count;
        let was = ps[b].classification;
        ps[b].classification = into;
        ps[b].bag_count = ps[b].bag_count.saturating_add(absorbed);
        ps[b].refresh_size(exponent);

        ps[a].dissolving = true;
        ps[a].dissolve_progress = 0.0;
        ps[a].transitioning = false;
        if self.dissolve == Dissolve::Remove {
            // leaves the logical population now; the fade is visual only
            pools.leave(ps[a].pool);
            self.dissolved_count += 1;
        }

        self.consumed[a] = true;
        self.consumed[b] = true;
        if was == into {
            CollisionKind::Absorb
        } else {
            CollisionKind::Convert
        }
    }

    /// Fade dissolving particles and finish the ones that are fully gone.
    /// Returns the number of dissolves completed.
    pub fn advance_dissolves(
        &mut self,
        store: &mut ParticleStore,
        pools: &mut PoolRegistry,
        dt: f32,
        rng: &mut dyn RandomSource,
    ) -> usize {
        if dt <= 0.0 {
            return 0;
        }
        let step = dt / self.config.dissolve_secs;
        let exponent = self.config.bag_size_exponent;
        let mut finished = 0;
        for id in 0..store.len() {
            let Some(p) = store.get_mut(id) else {
                continue;
            };
            if !(p.alive && p.dissolving) {
                continue;
            }
            p.dissolve_progress = (p.dissolve_progress + step).min(1.0);
            p.opacity = 1.0 - p.dissolve_progress;
            p.refresh_size(exponent);
            if p.dissolve_progress < 1.0 {
                continue;
            }
            finished += 1;
            match self.dissolve {
                Dissolve::Recycle {
                    pool,
                    classification,
                } => store.respawn(id, pool, classification, pools, rng),
                Dissolve::Remove => {
                    p.alive = false;
                    p.dissolving = false;
                    p.size = 0.0;
                    p.opacity = 0.0;
                    p.velocity = glam::Vec3::ZERO;
                }
            }
        }
        if finished > 0 {
            debug!("{} dissolve(s) completed", finished);
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolDef;
    use crate::rng::SequenceRandom;
    use glam::Vec3;

    fn world(policy: DissolvePolicy) -> (ParticleStore, PoolRegistry, InteractionEngine) {
        let mut pools = PoolRegistry::from_defs(&[
            PoolDef::boxed("market", Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)),
            PoolDef::boxed("reserve", Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.0)),
        ]);
        let mut store = ParticleStore::new();
        let mut rng = SequenceRandom::constant(0.5);
        store.initialize(3, &[1.0, 0.0], &[], [0.03, 0.03], &mut pools, &mut rng);
        let cfg = InteractionConfig {
            rules: vec![
                InteractionRule::convert(Classification::Seller, Classification::Buyer, Classification::Bag),
                InteractionRule::convert(Classification::Seller, Classification::Bag, Classification::Bag),
            ],
            dissolve_policy: policy,
            ..Default::default()
        };
        let engine = InteractionEngine::new(&cfg, &pools, 3).unwrap();
        (store, pools, engine)
    }

    fn place(store: &mut ParticleStore, id: usize, class: Classification, x: f32) {
        let p = store.get_mut(id).unwrap();
        p.classification = class;
        p.position = Vec3::new(x, 0.0, 0.0);
    }

    #[test]
    fn test_one_conversion_per_particle_per_pass() {
        let (mut store, mut pools, mut engine) = world(DissolvePolicy::Remove);
        // two sellers both within reach of one buyer
        place(&mut store, 0, Classification::Seller, -0.05);
        place(&mut store, 1, Classification::Buyer, 0.0);
        place(&mut store, 2, Classification::Seller, 0.05);
        let mut rng = SequenceRandom::constant(0.5);
        let mut events = Vec::new();
        let n = engine.resolve(&mut store, &mut pools, &mut rng, &mut events);
        assert_eq!(n, 1);
        assert_eq!(events[0].kind, CollisionKind::Convert);
        assert_eq!(events[0].participants, [0, 1]);
        assert!(!store.get(2).unwrap().dissolving);

        // the next pass lets the new bag absorb the second seller
        events.clear();
        engine.resolve(&mut store, &mut pools, &mut rng, &mut events);
        assert_eq!(events[0].kind, CollisionKind::Absorb);
        assert_eq!(store.get(1).unwrap().bag_count, 3);
        assert_eq!(engine.collision_count(), 2);
        assert_eq!(pools.total_members() + engine.dissolved_count(), 3);
    }

    #[test]
    fn test_recycle_respawns_and_conserves() {
        let (mut store, mut pools, mut engine) = world(DissolvePolicy::Recycle {
            pool: "reserve".into(),
            classification: Classification::Neutral,
        });
        place(&mut store, 0, Classification::Seller, 0.0);
        place(&mut store, 1, Classification::Buyer, 0.1);
        let mut rng = SequenceRandom::constant(0.5);
        let mut events = Vec::new();
        engine.resolve(&mut store, &mut pools, &mut rng, &mut events);
        assert_eq!(pools.total_members(), 3);

        let mut done = 0;
        for _ in 0..100 {
            done += engine.advance_dissolves(&mut store, &mut pools, 0.016, &mut rng);
            assert_eq!(pools.total_members(), 3);
        }
        assert_eq!(done, 1);
        let p = store.get(0).unwrap();
        assert!(p.alive && !p.dissolving);
        assert_eq!(p.classification, Classification::Neutral);
        assert_eq!(p.pool, PoolId(1));
        assert_eq!(pools.get(PoolId(1)).member_count(), 1);
        assert_eq!(engine.dissolved_count(), 0);
    }

    #[test]
    fn test_dissolve_fades_size_and_opacity() {
        let (mut store, mut pools, mut engine) = world(DissolvePolicy::Remove);
        place(&mut store, 0, Classification::Seller, 0.0);
        place(&mut store, 1, Classification::Buyer, 0.1);
        let mut rng = SequenceRandom::constant(0.5);
        engine.resolve(&mut store, &mut pools, &mut rng, &mut Vec::new());
        engine.advance_dissolves(&mut store, &mut pools, 0.3, &mut rng);
        let p = store.get(0).unwrap();
        assert!((p.opacity - 0.5).abs() < 1e-5);
        assert!((p.size - 0.015).abs() < 1e-5);
        engine.advance_dissolves(&mut store, &mut pools, 0.3, &mut rng);
        assert!(!store.get(0).unwrap().alive);
        assert_eq!(store.alive_count(), 2);
    }

    #[test]
    fn test_bounce_pushes_apart_without_reclassifying() {
        let mut pools = PoolRegistry::from_defs(&[PoolDef::boxed(
            "box",
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
        )]);
        let mut store = ParticleStore::new();
        let mut rng = SequenceRandom::constant(0.5);
        store.initialize(2, &[], &[], [0.03, 0.03], &mut pools, &mut rng);
        place(&mut store, 0, Classification::Buyer, 0.0);
        place(&mut store, 1, Classification::Seller, 0.1);
        let cfg = InteractionConfig {
            rules: vec![InteractionRule::bounce(Classification::Seller, Classification::Buyer, 0.5)],
            ..Default::default()
        };
        let mut engine = InteractionEngine::new(&cfg, &pools, 2).unwrap();
        let mut events = Vec::new();
        engine.resolve(&mut store, &mut pools, &mut rng, &mut events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, CollisionKind::Bounce);
        // rule a = Seller, so particle 1 is `a` and is pushed away from 0
        assert!(store.get(1).unwrap().velocity.x > 0.0);
        assert!(store.get(0).unwrap().velocity.x < 0.0);
        assert_eq!(store.get(0).unwrap().classification, Classification::Buyer);
    }
}
