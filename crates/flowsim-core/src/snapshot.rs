use serde::Serialize;

use crate::interaction::CollisionEvent;
use crate::particle::{Classification, Particle};
use crate::pool::Pool;
use crate::scenario::PhaseTransition;

/// Read-only copy of one particle's render attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParticleView {
    pub id: u32,
    pub position: [f32; 3],
    pub classification: Classification,
    pub size: f32,
    pub opacity: f32,
    pub bag_count: u32,
    pub transitioning: bool,
    pub dissolving: bool,
}

impl ParticleView {
    pub fn from_particle(id: u32, p: &Particle) -> Self {
        Self {
            id,
            position: p.position.to_array(),
            classification: p.classification,
            size: p.size,
            opacity: p.opacity,
            bag_count: p.bag_count,
            transitioning: p.transitioning,
            dissolving: p.dissolving,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolView {
    pub name: String,
    pub member_count: usize,
    pub center: [f32; 3],
    /// Half extent per axis at the pool's current size.
    pub current_extent: [f32; 3],
}

impl PoolView {
    pub fn from_pool(pool: &Pool) -> Self {
        Self {
            name: pool.name.clone(),
            member_count: pool.member_count(),
            center: pool.center.to_array(),
            current_extent: pool.current_half_extent().to_array(),
        }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub particles: Vec<ParticleView>,
    pub pools: Vec<PoolView>,
    pub collision_count: u64,
    pub dissolved_count: usize,
    pub scenario: String,
    pub active_phase: String,
    pub progress: f32,
    pub playing: bool,
    /// Collisions resolved during the last tick, for one-shot effects.
    pub events: Vec<CollisionEvent>,
    /// Set on the frame the active phase changed.
    pub phase_transition: Option<PhaseTransition>,
}

/// Packed render record, 32 bytes, laid out for a GPU vertex/storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderParticle {
    pub position: [f32; 3], // 12 bytes
    pub size: f32,          //  4 bytes
    pub opacity: f32,       //  4 bytes
    pub classification: u32,
    pub bag_count: u32,
    /// 1 while alive, 0 for removed slots (draw with zero size).
    pub alive: u32,
}

impl RenderParticle {
    pub fn from_particle(p: &Particle) -> Self {
        Self {
            position: p.position.to_array(),
            size: if p.alive { p.size } else { 0.0 },
            opacity: if p.alive { p.opacity } else { 0.0 },
            classification: p.classification.as_u8() as u32,
            bag_count: p.bag_count,
            alive: p.alive as u32,
        }
    }
}

/// Fill `out` with one packed record per particle slot (ids are indices).
pub fn write_render_buffer(particles: &[Particle], out: &mut Vec<RenderParticle>) {
    out.clear();
    out.extend(particles.iter().map(RenderParticle::from_particle));
}
