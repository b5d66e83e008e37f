use thiserror::Error;

use crate::particle::Classification;

/// Problems found while validating an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("particle_count must be greater than zero")]
    NoParticles,
    #[error("particle_count {actual} exceeds the maximum of {max}")]
    TooManyParticles { max: usize, actual: usize },
    #[error("at least one pool must be defined")]
    NoPools,
    #[error("pool name `{0}` is defined more than once")]
    DuplicatePool(String),
    #[error("pool #{0} has an empty name")]
    EmptyPoolName(usize),
    #[error("pool `{0}` needs a finite, non-negative extent with at least one positive axis")]
    InvalidPoolExtent(String),
    #[error("pool `{0}` needs a finite center")]
    InvalidPoolCenter(String),
    #[error("pool `{0}` needs a finite, non-negative growth coefficient")]
    InvalidPoolGrowth(String),
    #[error("{weights} pool weights given for {pools} pools")]
    PoolWeightMismatch { pools: usize, weights: usize },
    #[error("pool weights must be finite, non-negative and sum to a positive value")]
    InvalidPoolWeights,
    #[error("classification split must be finite, non-negative and sum to a positive value")]
    InvalidClassificationSplit,
    #[error("size_range must satisfy 0 < min <= max")]
    InvalidSizeRange,
    #[error("physics.{0} is out of range")]
    InvalidPhysics(&'static str),
    #[error("interaction.{0} is out of range")]
    InvalidInteraction(&'static str),
    #[error("interaction rule pairs {0:?} with itself")]
    SelfInteraction(Classification),
    #[error("unknown pool `{0}` referenced by configuration")]
    UnknownPool(String),
    #[error("scenario name `{0}` is defined more than once")]
    DuplicateScenario(String),
    #[error("scenario `{0}` has no phases")]
    EmptyScenario(String),
    #[error("scenario `{0}` needs a positive, finite duration")]
    InvalidScenarioDuration(String),
    #[error("scenario `{scenario}`: phase `{phase}` does not start where the previous phase ends")]
    PhaseGap { scenario: String, phase: String },
    #[error("scenario `{scenario}`: phase `{phase}` has an empty or inverted interval")]
    PhaseInterval { scenario: String, phase: String },
    #[error("scenario `{0}`: phases must cover progress 0 through 1")]
    PhaseCoverage(String),
    #[error("scenario `{scenario}`: phase `{phase}` has an invalid behavior ({field})")]
    InvalidPhaseBehavior {
        scenario: String,
        phase: String,
        field: &'static str,
    },
    #[error("batch action `{0}` is defined more than once")]
    DuplicateAction(String),
    #[error("unknown initial scenario `{0}`")]
    UnknownInitialScenario(String),
}

/// Errors surfaced to the host by [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),
    #[error("unknown batch action `{0}`")]
    UnknownAction(String),
    #[error("unknown pool `{0}`")]
    UnknownPool(String),
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
}
