//! Real-time particle simulation driven by phased scenarios.
//!
//! Particles live in named pools, drift and jitter inside them, flow between
//! them on reassignment, and interact on contact according to classification
//! rules. A scenario timeline switches the active rules as progress advances.
//! The host owns an [`Engine`], ticks it once per frame and reads a
//! [`Snapshot`] or the packed render buffer.

pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod interaction;
pub mod math;
pub mod particle;
pub mod physics;
pub mod pool;
pub mod presets;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod store;

pub use config::EngineConfig;
pub use engine::{Engine, TickStats};
pub use error::{ConfigError, EngineError};
pub use interaction::{CollisionEvent, CollisionKind};
pub use particle::{Classification, Particle};
pub use rng::{RandomSource, SeededRandom};
pub use scenario::PhaseTransition;
pub use snapshot::{RenderParticle, Snapshot};
