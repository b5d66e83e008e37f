use crate::config::ClassWeight;
use crate::math::{lerp, EPSILON};
use crate::particle::{Classification, Particle};
use crate::pool::{PoolId, PoolRegistry};
use crate::rng::RandomSource;
use crate::snapshot::ParticleView;

/// Owns every particle record. Ids are indices and stay stable: removed
/// particles keep their slot with `alive == false`.
#[derive(Clone, Debug, Default)]
pub struct ParticleStore {
    particles: Vec<Particle>,
}

impl ParticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `count` particles across `pools`.
    ///
    /// Pool shares follow `weights` (equal when empty) using largest-remainder
    /// apportionment, so the counts are exact. Particles in pools without a
    /// default classification draw from `split`, also apportioned exactly and
    /// then shuffled.
    pub fn initialize(
        &mut self,
        count: usize,
        weights: &[f32],
        split: &[ClassWeight],
        size_range: [f32; 2],
        pools: &mut PoolRegistry,
        rng: &mut dyn RandomSource,
    ) {
        pools.clear();
        self.particles.clear();
        self.particles.reserve(count);

        let weights: Vec<f32> = if weights.is_empty() {
            vec![1.0; pools.len()]
        } else {
            weights.to_vec()
        };
        let per_pool = apportion(count, &weights);

        for (pool_index, &n) in per_pool.iter().enumerate() {
            let id = PoolId(pool_index);
            for _ in 0..n {
                let pool = pools.get(id);
                let position = pool.sample_point(rng);
                let target = pool.sample_point(rng);
                let size = lerp(size_range[0], size_range[1], rng.next_f32());
                let classification = pool.classification.unwrap_or_default();
                let mut particle = Particle::new(position, id, classification, size);
                particle.target = target;
                self.particles.push(particle);
                pools.join(id);
            }
        }

        let open: Vec<usize> = self
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| pools.get(p.pool).classification.is_none())
            .map(|(i, _)| i)
            .collect();
        if !split.is_empty() && !open.is_empty() {
            let split_weights: Vec<f32> = split.iter().map(|c| c.weight).collect();
            let mut classes: Vec<Classification> = apportion(open.len(), &split_weights)
                .into_iter()
                .zip(split)
                .flat_map(|(n, c)| std::iter::repeat(c.classification).take(n))
                .collect();
            shuffle(&mut classes, rng);
            for (&i, class) in open.iter().zip(classes) {
                self.particles[i].classification = class;
            }
        }

        pools.mark_initial();
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Particles still part of the population (including ones fading out
    /// under the recycle policy).
    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    pub fn get(&self, id: usize) -> Option<&Particle> {
        self.particles.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Particle> {
        self.particles.get_mut(id)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub(crate) fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Ids of active (alive, not dissolving) members of `pool`.
    pub fn members(&self, pool: PoolId) -> Vec<usize> {
        self.particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active() && p.pool == pool)
            .map(|(i, _)| i)
            .collect()
    }

    /// Move `id` into `new_pool` and send it flowing toward a fresh point
    /// inside the destination. Returns false for removed or dissolving
    /// particles, which cannot change pools.
    pub fn reassign(
        &mut self,
        id: usize,
        new_pool: PoolId,
        pools: &mut PoolRegistry,
        rng: &mut dyn RandomSource,
    ) -> bool {
        let Some(particle) = self.particles.get_mut(id) else {
            return false;
        };
        if !particle.is_active() {
            return false;
        }
        pools.transfer(particle.pool, new_pool);
        particle.pool = new_pool;
        particle.target = pools.get(new_pool).sample_point(rng);
        particle.transition_span = (particle.target - particle.position).length();
        particle.transition_progress = 0.0;
        particle.transitioning = true;
        true
    }

    /// Put a finished dissolve back into the population as a fresh particle.
    pub(crate) fn respawn(
        &mut self,
        id: usize,
        pool: PoolId,
        classification: Classification,
        pools: &mut PoolRegistry,
        rng: &mut dyn RandomSource,
    ) {
        let Some(particle) = self.particles.get_mut(id) else {
            return;
        };
        pools.transfer(particle.pool, pool);
        let destination = pools.get(pool);
        let base_size = particle.base_size;
        *particle = Particle::new(destination.sample_point(rng), pool, classification, base_size);
        particle.target = destination.sample_point(rng);
    }

    /// Owned per-particle views of the live population.
    pub fn snapshot(&self) -> Vec<ParticleView> {
        self.particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.alive)
            .map(|(i, p)| ParticleView::from_particle(i as u32, p))
            .collect()
    }
}

/// Split `total` into integer shares proportional to `weights` with the
/// largest-remainder method. Shares always sum to `total`.
pub fn apportion(total: usize, weights: &[f32]) -> Vec<usize> {
    let sum: f32 = weights.iter().map(|w| w.max(0.0)).sum();
    if weights.is_empty() || sum <= EPSILON {
        return vec![0; weights.len()];
    }
    let quotas: Vec<f64> = weights
        .iter()
        .map(|w| total as f64 * w.max(0.0) as f64 / sum as f64)
        .collect();
    let mut shares: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let assigned: usize = shares.iter().sum();

    let mut order: Vec<usize> = (0..weights.len()).collect();
    // stable on ties so earlier pools win
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra)
    });
    for &i in order.iter().cycle().take(total.saturating_sub(assigned)) {
        shares[i] += 1;
    }
    shares
}

/// Fisher-Yates shuffle driven by the injectable random source.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apportion_exact_split() {
        assert_eq!(apportion(1000, &[0.5, 0.3, 0.2]), vec![500, 300, 200]);
        assert_eq!(apportion(1000, &[50.0, 30.0, 20.0]), vec![500, 300, 200]);
    }

    #[test]
    fn test_apportion_remainders_sum_to_total() {
        let shares = apportion(10, &[1.0, 1.0, 1.0]);
        assert_eq!(shares.iter().sum::<usize>(), 10);
        assert_eq!(shares, vec![4, 3, 3]);
    }

    #[test]
    fn test_apportion_zero_weights() {
        assert_eq!(apportion(10, &[0.0, 0.0]), vec![0, 0]);
        assert_eq!(apportion(7, &[0.0, 2.0]), vec![0, 7]);
    }
}
