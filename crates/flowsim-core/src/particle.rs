use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::pool::PoolId;

/// Classification tag. Drives interaction rules, drift and render color.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    #[default]
    Neutral = 0,
    Seller = 1,
    Buyer = 2,
    /// A buyer that has absorbed one or more sellers.
    Bag = 3,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Neutral,
        Classification::Seller,
        Classification::Buyer,
        Classification::Bag,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One simulated point entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Transit destination while `transitioning`, idle wander target otherwise.
    pub target: Vec3,
    pub classification: Classification,
    pub pool: PoolId,
    /// Size before dissolve fade and bag growth.
    pub base_size: f32,
    pub size: f32,
    pub opacity: f32,
    /// Units this particle stands for (grows as a bag absorbs).
    pub bag_count: u32,
    pub transitioning: bool,
    /// 0 at reassignment, 1 on arrival.
    pub transition_progress: f32,
    /// Distance to the transit target when the transit began.
    pub transition_span: f32,
    pub dissolving: bool,
    pub dissolve_progress: f32,
    /// False once a particle has been removed from the population.
    pub alive: bool,
}

impl Particle {
    pub fn new(position: Vec3, pool: PoolId, classification: Classification, size: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            target: position,
            classification,
            pool,
            base_size: size,
            size,
            opacity: 1.0,
            bag_count: 1,
            transitioning: false,
            transition_progress: 1.0,
            transition_span: 0.0,
            dissolving: false,
            dissolve_progress: 0.0,
            alive: true,
        }
    }

    /// Alive and not fading out.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.alive && !self.dissolving
    }

    /// Recompute `size` from base size, bag growth and dissolve fade.
    pub fn refresh_size(&mut self, bag_size_exponent: f32) {
        let growth = (self.bag_count.max(1) as f32).powf(bag_size_exponent);
        let fade = if self.dissolving {
            1.0 - self.dissolve_progress
        } else {
            1.0
        };
        self.size = self.base_size * growth * fade;
    }
}
