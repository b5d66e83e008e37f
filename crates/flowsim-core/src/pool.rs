use std::collections::HashMap;

use glam::Vec3;

use crate::config::{ContainmentMode, PoolDef, PoolShape};
use crate::math::{random_in_box, random_in_sphere, try_normalize, EPSILON};
use crate::particle::Classification;
use crate::rng::RandomSource;

/// Extent scale limits for pools that grow with membership.
const MIN_SCALE: f32 = 0.25;
const MAX_SCALE: f32 = 3.0;

/// Index of a pool inside its [`PoolRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct PoolId(pub usize);

/// A named zone: spatial boundary plus membership bookkeeping.
#[derive(Clone, Debug)]
pub struct Pool {
    pub name: String,
    pub center: Vec3,
    pub shape: PoolShape,
    pub growth: f32,
    pub classification: Option<Classification>,
    member_count: usize,
    initial_ratio: f32,
    scale: f32,
    target_scale: f32,
}

impl Pool {
    fn from_def(def: &PoolDef) -> Self {
        Self {
            name: def.name.clone(),
            center: def.center,
            shape: def.shape.clone(),
            growth: def.growth,
            classification: def.classification,
            member_count: 0,
            initial_ratio: 0.0,
            scale: 1.0,
            target_scale: 1.0,
        }
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }

    /// Current extent multiplier (1.0 for fixed-size pools).
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Half extent along each axis at the current scale. Spheres report
    /// their radius on every axis.
    pub fn current_half_extent(&self) -> Vec3 {
        let base = match self.shape {
            PoolShape::Box { half_extent } => half_extent,
            PoolShape::Sphere { radius } => Vec3::splat(radius),
        };
        base * self.scale
    }

    /// Uniform random point inside the current volume.
    pub fn sample_point(&self, rng: &mut dyn RandomSource) -> Vec3 {
        let offset = match self.shape {
            PoolShape::Box { half_extent } => random_in_box(rng, half_extent * self.scale),
            PoolShape::Sphere { radius } => random_in_sphere(rng, radius * self.scale),
        };
        self.center + offset
    }

    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        let rel = point - self.center;
        match self.shape {
            PoolShape::Box { half_extent } => {
                let h = half_extent * self.scale + Vec3::splat(tolerance);
                rel.abs().cmple(h).all()
            }
            PoolShape::Sphere { radius } => rel.length() <= radius * self.scale + tolerance,
        }
    }

    /// Clamp `position` into the pool, adjusting the outward velocity
    /// component per `mode`. Returns true when the position was moved.
    pub fn contain(
        &self,
        position: &mut Vec3,
        velocity: &mut Vec3,
        mode: ContainmentMode,
        restitution: f32,
    ) -> bool {
        match self.shape {
            PoolShape::Box { half_extent } => {
                let h = half_extent * self.scale;
                let mut moved = false;
                for axis in 0..3 {
                    let lo = self.center[axis] - h[axis];
                    let hi = self.center[axis] + h[axis];
                    let p = position[axis];
                    if p >= lo && p <= hi {
                        continue;
                    }
                    moved = true;
                    position[axis] = p.clamp(lo, hi);
                    let outward = if p > hi { 1.0 } else { -1.0 };
                    if h[axis] < EPSILON {
                        velocity[axis] = 0.0;
                    } else if velocity[axis] * outward > 0.0 {
                        velocity[axis] = match mode {
                            ContainmentMode::Clamp => 0.0,
                            ContainmentMode::Bounce => -velocity[axis] * restitution,
                        };
                    }
                }
                moved
            }
            PoolShape::Sphere { radius } => {
                let r = radius * self.scale;
                let rel = *position - self.center;
                let dist = rel.length();
                if dist <= r {
                    return false;
                }
                // dist > r > 0 here, so the direction exists unless rel is non-finite
                let normal = try_normalize(rel).unwrap_or(Vec3::X);
                *position = self.center + normal * r;
                let vn = velocity.dot(normal);
                if vn > 0.0 {
                    let keep = match mode {
                        ContainmentMode::Clamp => 1.0,
                        ContainmentMode::Bounce => 1.0 + restitution,
                    };
                    *velocity -= normal * vn * keep;
                }
                true
            }
        }
    }
}

/// All pools of one engine instance, addressable by id or name.
#[derive(Clone, Debug, Default)]
pub struct PoolRegistry {
    pools: Vec<Pool>,
    by_name: HashMap<String, PoolId>,
}

impl PoolRegistry {
    pub fn from_defs(defs: &[PoolDef]) -> Self {
        let pools: Vec<Pool> = defs.iter().map(Pool::from_def).collect();
        let by_name = pools
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), PoolId(i)))
            .collect();
        Self { pools, by_name }
    }

    pub fn id(&self, name: &str) -> Option<PoolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: PoolId) -> &Pool {
        &self.pools[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&Pool> {
        self.id(name).map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().enumerate().map(|(i, p)| (PoolId(i), p))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Sum of member counts across pools.
    pub fn total_members(&self) -> usize {
        self.pools.iter().map(|p| p.member_count).sum()
    }

    pub(crate) fn join(&mut self, id: PoolId) {
        self.pools[id.0].member_count += 1;
    }

    pub(crate) fn leave(&mut self, id: PoolId) {
        let pool = &mut self.pools[id.0];
        pool.member_count = pool.member_count.saturating_sub(1);
    }

    pub(crate) fn transfer(&mut self, from: PoolId, to: PoolId) {
        if from != to {
            self.leave(from);
            self.join(to);
        }
    }

    /// Clear membership and sizing; used before a store (re)initialization.
    pub(crate) fn clear(&mut self) {
        for pool in &mut self.pools {
            pool.member_count = 0;
            pool.initial_ratio = 0.0;
            pool.scale = 1.0;
            pool.target_scale = 1.0;
        }
    }

    /// Record current membership ratios as the reference for growth.
    pub(crate) fn mark_initial(&mut self) {
        let total = self.total_members();
        for pool in &mut self.pools {
            pool.initial_ratio = ratio(pool.member_count, total);
        }
    }

    /// Ease each growing pool's extent toward the size its membership ratio
    /// calls for.
    pub fn update_extents(&mut self, dt: f32, resize_rate: f32) {
        let total = self.total_members();
        let blend = crate::math::approach_factor(resize_rate, dt);
        for pool in &mut self.pools {
            if pool.growth <= 0.0 {
                continue;
            }
            let delta = ratio(pool.member_count, total) - pool.initial_ratio;
            pool.target_scale = (1.0 + pool.growth * delta).clamp(MIN_SCALE, MAX_SCALE);
            pool.scale += (pool.target_scale - pool.scale) * blend;
        }
    }
}

fn ratio(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRandom;

    fn registry() -> PoolRegistry {
        PoolRegistry::from_defs(&[
            PoolDef::boxed("float", Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.0))
                .with_growth(1.0),
            PoolDef::sphere("treasury", Vec3::new(1.0, 0.0, 0.0), 0.4),
        ])
    }

    #[test]
    fn test_lookup_by_name() {
        let reg = registry();
        assert_eq!(reg.id("float"), Some(PoolId(0)));
        assert_eq!(reg.id("treasury"), Some(PoolId(1)));
        assert_eq!(reg.id("shelf"), None);
    }

    #[test]
    fn test_box_contain_bounces_and_flattens() {
        let reg = registry();
        let pool = reg.get(PoolId(0));
        let mut pos = Vec3::new(0.0, 0.2, 0.3);
        let mut vel = Vec3::new(1.0, 0.0, 0.5);
        let moved = pool.contain(&mut pos, &mut vel, ContainmentMode::Bounce, 0.5);
        assert!(moved);
        assert_eq!(pos, Vec3::new(-0.5, 0.2, 0.0));
        assert_eq!(vel.x, -0.5);
        assert_eq!(vel.z, 0.0);
        assert!(pool.contains(pos, 1e-6));
    }

    #[test]
    fn test_sphere_contain_clamp_removes_outward_speed() {
        let reg = registry();
        let pool = reg.get(PoolId(1));
        let mut pos = Vec3::new(2.0, 0.0, 0.0);
        let mut vel = Vec3::new(1.0, 1.0, 0.0);
        pool.contain(&mut pos, &mut vel, ContainmentMode::Clamp, 0.5);
        assert!((pos - Vec3::new(1.4, 0.0, 0.0)).length() < 1e-5);
        assert!(vel.x.abs() < 1e-6);
        assert_eq!(vel.y, 1.0);
    }

    #[test]
    fn test_growth_follows_membership() {
        let mut reg = registry();
        for _ in 0..5 {
            reg.join(PoolId(0));
            reg.join(PoolId(1));
        }
        reg.mark_initial();
        for _ in 0..4 {
            reg.transfer(PoolId(1), PoolId(0));
        }
        for _ in 0..200 {
            reg.update_extents(0.05, 3.0);
        }
        let grown = reg.get(PoolId(0)).scale();
        assert!((grown - 1.4).abs() < 1e-3, "float scale: {}", grown);
        // fixed-size pools never resize
        assert_eq!(reg.get(PoolId(1)).scale(), 1.0);
        assert_eq!(reg.total_members(), 10);
    }

    #[test]
    fn test_samples_stay_inside() {
        let reg = registry();
        let mut rng = SeededRandom::new(11);
        for (_, pool) in reg.iter() {
            for _ in 0..200 {
                let p = pool.sample_point(&mut rng);
                assert!(pool.contains(p, 1e-5), "{} sample outside: {:?}", pool.name, p);
            }
        }
    }
}
