use flowsim_core::config::{
    BatchActionDef, DissolvePolicy, EngineConfig, InteractionRule, PhaseDef, PoolDef, PoolShape,
    ScenarioDef,
};
use flowsim_core::{Classification, ConfigError, Engine, EngineError};
use glam::Vec3;

fn config_error(config: EngineConfig) -> ConfigError {
    match Engine::new(config) {
        Err(EngineError::Config(err)) => err,
        Err(other) => panic!("expected a config error, got {:?}", other),
        Ok(_) => panic!("expected a config error, engine was built"),
    }
}

#[test]
fn test_default_config_is_valid() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    assert_eq!(engine.store().len(), 200);
    assert_eq!(engine.scenario_name(), "default");
    assert_eq!(engine.active_phase_name(), "idle");
}

#[test]
fn test_parse_json_config() {
    let json = r#"{
        "particle_count": 120,
        "seed": 3,
        "pools": [
            { "name": "supply", "center": [0.0, 0.5, 0.0],
              "shape": { "kind": "box", "half_extent": [1.0, 0.4, 0.0] },
              "classification": "seller" },
            { "name": "demand", "center": [0.0, -0.5, 0.0],
              "shape": { "kind": "sphere", "radius": 0.5 },
              "growth": 0.5 }
        ],
        "pool_weights": [2.0, 1.0],
        "classification_split": [ { "classification": "buyer", "weight": 1.0 } ],
        "physics": { "containment": "clamp", "brownian": 0.2 },
        "interaction": {
            "rules": [ { "a": "seller", "b": "buyer", "effect": { "kind": "convert", "into": "bag" } } ],
            "dissolve_policy": { "kind": "recycle", "pool": "demand", "classification": "buyer" }
        },
        "scenarios": [
            { "name": "run", "duration_secs": 4.0, "phases": [
                { "name": "calm", "start": 0.0, "end": 0.5, "blend": 0.2 },
                { "name": "rush", "start": 0.5, "end": 1.0,
                  "transfer": { "from": "supply", "to": "demand", "per_second": 3.0 } }
            ] }
        ],
        "actions": [ { "name": "buy", "from": "supply", "to": "demand" } ]
    }"#;
    let config = EngineConfig::from_json(json).unwrap();
    assert_eq!(config.pools[1].shape, PoolShape::Sphere { radius: 0.5 });
    assert_eq!(
        config.interaction.dissolve_policy,
        DissolvePolicy::Recycle {
            pool: "demand".into(),
            classification: Classification::Buyer,
        }
    );
    // unspecified fields fall back to defaults
    assert_eq!(config.physics.damping, 0.96);
    assert!(config.scenarios[0].phases[0].collisions);

    let engine = Engine::new(config).unwrap();
    assert_eq!(engine.pool_member_count("supply").unwrap(), 80);
    assert_eq!(engine.pool_member_count("demand").unwrap(), 40);
    let sellers = engine
        .store()
        .particles()
        .iter()
        .filter(|p| p.classification == Classification::Seller)
        .count();
    assert_eq!(sellers, 80, "supply's default classification applies");
}

#[test]
fn test_malformed_json_is_rejected() {
    assert!(EngineConfig::from_json("{ \"particle_count\": -4 }").is_err());
    assert!(EngineConfig::from_json("not json").is_err());
}

#[test]
fn test_particle_count_limits() {
    let zero = EngineConfig {
        particle_count: 0,
        ..Default::default()
    };
    assert_eq!(config_error(zero), ConfigError::NoParticles);

    let huge = EngineConfig {
        particle_count: EngineConfig::MAX_PARTICLES + 1,
        ..Default::default()
    };
    assert!(matches!(config_error(huge), ConfigError::TooManyParticles { .. }));
}

#[test]
fn test_pool_errors() {
    let none = EngineConfig {
        pools: vec![],
        ..Default::default()
    };
    assert_eq!(config_error(none), ConfigError::NoPools);

    let duplicate = EngineConfig {
        pools: vec![
            PoolDef::boxed("a", Vec3::ZERO, Vec3::ONE),
            PoolDef::boxed("a", Vec3::X, Vec3::ONE),
        ],
        ..Default::default()
    };
    assert_eq!(config_error(duplicate), ConfigError::DuplicatePool("a".into()));

    let flat = EngineConfig {
        pools: vec![PoolDef::boxed("flat", Vec3::ZERO, Vec3::ZERO)],
        ..Default::default()
    };
    assert_eq!(config_error(flat), ConfigError::InvalidPoolExtent("flat".into()));

    let weights = EngineConfig {
        pool_weights: vec![1.0, 1.0],
        ..Default::default()
    };
    assert_eq!(
        config_error(weights),
        ConfigError::PoolWeightMismatch { pools: 1, weights: 2 }
    );

    let zero_weights = EngineConfig {
        pool_weights: vec![0.0],
        ..Default::default()
    };
    assert_eq!(config_error(zero_weights), ConfigError::InvalidPoolWeights);
}

#[test]
fn test_physics_errors() {
    let mut config = EngineConfig::default();
    config.physics.damping = 1.5;
    assert_eq!(config_error(config), ConfigError::InvalidPhysics("damping"));

    let mut config = EngineConfig::default();
    config.physics.max_speed = f32::NAN;
    assert_eq!(config_error(config), ConfigError::InvalidPhysics("max_speed"));
}

#[test]
fn test_interaction_errors() {
    let mut config = EngineConfig::default();
    config.interaction.rules = vec![InteractionRule::convert(
        Classification::Buyer,
        Classification::Buyer,
        Classification::Bag,
    )];
    assert_eq!(
        config_error(config),
        ConfigError::SelfInteraction(Classification::Buyer)
    );

    let mut config = EngineConfig::default();
    config.interaction.dissolve_policy = DissolvePolicy::Recycle {
        pool: "elsewhere".into(),
        classification: Classification::Seller,
    };
    assert_eq!(config_error(config), ConfigError::UnknownPool("elsewhere".into()));
}

#[test]
fn test_scenario_errors() {
    let scenario = |phases: Vec<PhaseDef>| ScenarioDef {
        name: "s".into(),
        phases,
        ..Default::default()
    };

    let gap = EngineConfig {
        scenarios: vec![scenario(vec![
            PhaseDef::new("a", 0.0, 0.4),
            PhaseDef::new("b", 0.5, 1.0),
        ])],
        ..Default::default()
    };
    assert!(matches!(config_error(gap), ConfigError::PhaseGap { .. }));

    let overlap = EngineConfig {
        scenarios: vec![scenario(vec![
            PhaseDef::new("a", 0.0, 0.6),
            PhaseDef::new("b", 0.5, 1.0),
        ])],
        ..Default::default()
    };
    assert!(matches!(config_error(overlap), ConfigError::PhaseGap { .. }));

    let short = EngineConfig {
        scenarios: vec![scenario(vec![PhaseDef::new("a", 0.0, 0.8)])],
        ..Default::default()
    };
    assert_eq!(config_error(short), ConfigError::PhaseCoverage("s".into()));

    let reversed = EngineConfig {
        scenarios: vec![scenario(vec![PhaseDef::new("a", 0.5, 0.0)])],
        ..Default::default()
    };
    assert!(matches!(config_error(reversed), ConfigError::PhaseInterval { .. }));

    let empty = EngineConfig {
        scenarios: vec![scenario(vec![])],
        ..Default::default()
    };
    assert_eq!(config_error(empty), ConfigError::EmptyScenario("s".into()));

    let twice = EngineConfig {
        scenarios: vec![
            scenario(vec![PhaseDef::new("a", 0.0, 1.0)]),
            scenario(vec![PhaseDef::new("a", 0.0, 1.0)]),
        ],
        ..Default::default()
    };
    assert_eq!(config_error(twice), ConfigError::DuplicateScenario("s".into()));

    let initial = EngineConfig {
        initial_scenario: Some("missing".into()),
        ..Default::default()
    };
    assert_eq!(
        config_error(initial),
        ConfigError::UnknownInitialScenario("missing".into())
    );
}

#[test]
fn test_action_errors() {
    let unknown = EngineConfig {
        actions: vec![BatchActionDef::new("move", "main", "vault")],
        ..Default::default()
    };
    assert_eq!(config_error(unknown), ConfigError::UnknownPool("vault".into()));

    let twice = EngineConfig {
        actions: vec![
            BatchActionDef::new("move", "main", "main"),
            BatchActionDef::new("move", "main", "main"),
        ],
        ..Default::default()
    };
    assert_eq!(config_error(twice), ConfigError::DuplicateAction("move".into()));
}
