//! Ready-made configurations for the stock visualizations.

use glam::Vec3;

use crate::config::{
    BatchActionDef, ClassWeight, DriftRule, EngineConfig, InteractionConfig, InteractionRule,
    PhaseDef, PhysicsConfig, PoolDef, ScenarioDef, TransferDef,
};
use crate::error::EngineError;
use crate::particle::Classification;

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 4] = ["dilution", "energy_collision", "catalyst", "spread"];

pub fn by_name(name: &str) -> Result<EngineConfig, EngineError> {
    match name {
        "dilution" => Ok(dilution()),
        "energy_collision" => Ok(energy_collision()),
        "catalyst" => Ok(catalyst()),
        "spread" => Ok(spread()),
        _ => Err(EngineError::UnknownPreset(name.to_string())),
    }
}

fn flat(x: f32, y: f32) -> Vec3 {
    Vec3::new(x, y, 0.0)
}

fn transfer(from: &str, to: &str, per_second: f32) -> Option<TransferDef> {
    Some(TransferDef {
        from: from.to_string(),
        to: to.to_string(),
        per_second,
    })
}

/// Share float, shelf and treasury pools. `dilute` issues shelf shares into
/// the float, `buyback` retires float shares into treasury. The float grows
/// with its share of the total.
pub fn dilution() -> EngineConfig {
    EngineConfig {
        particle_count: 1000,
        pools: vec![
            PoolDef::boxed("float", flat(0.0, 0.0), flat(0.9, 0.6)).with_growth(1.0),
            PoolDef::boxed("shelf", flat(-1.6, 0.0), flat(0.4, 0.6)),
            PoolDef::boxed("treasury", flat(1.6, 0.0), flat(0.4, 0.6)),
        ],
        pool_weights: vec![0.5, 0.3, 0.2],
        size_range: [0.015, 0.025],
        physics: PhysicsConfig {
            brownian: 0.4,
            ..Default::default()
        },
        actions: vec![
            BatchActionDef::new("dilute", "shelf", "float"),
            BatchActionDef::new("buyback", "float", "treasury"),
        ],
        ..Default::default()
    }
}

/// Sellers and buyers sharing one arena. Contact turns a buyer into a bag
/// that keeps absorbing sellers.
pub fn energy_collision() -> EngineConfig {
    let mut build_up = PhaseDef::new("Build-Up", 0.0, 0.25);
    build_up.collisions = false;
    build_up.blend = 0.4;
    build_up.drift = vec![
        DriftRule::for_class(Classification::Seller, flat(0.0, -0.3)),
        DriftRule::for_class(Classification::Buyer, flat(0.0, 0.3)),
    ];
    let mut impact = PhaseDef::new("Impact", 0.25, 1.0);
    impact.jitter_scale = 1.5;

    EngineConfig {
        particle_count: 300,
        pools: vec![PoolDef::boxed("arena", Vec3::ZERO, flat(1.2, 0.8))],
        classification_split: vec![
            ClassWeight {
                classification: Classification::Seller,
                weight: 0.5,
            },
            ClassWeight {
                classification: Classification::Buyer,
                weight: 0.5,
            },
        ],
        size_range: [0.02, 0.03],
        interaction: InteractionConfig {
            distance: 0.06,
            rules: vec![
                InteractionRule::convert(
                    Classification::Seller,
                    Classification::Buyer,
                    Classification::Bag,
                ),
                InteractionRule::convert(
                    Classification::Seller,
                    Classification::Bag,
                    Classification::Bag,
                ),
                InteractionRule::bounce(Classification::Buyer, Classification::Bag, 0.3),
            ],
            ..Default::default()
        },
        scenarios: vec![ScenarioDef {
            name: "Collision".to_string(),
            looping: false,
            duration_secs: 12.0,
            phases: vec![build_up, impact],
        }],
        ..Default::default()
    }
}

/// A news catalyst hitting a book of sellers and buyers, in a slow and a
/// fast variant.
pub fn catalyst() -> EngineConfig {
    EngineConfig {
        particle_count: 600,
        pools: vec![
            PoolDef::boxed("supply", flat(0.0, 0.7), flat(1.2, 0.45))
                .with_classification(Classification::Seller)
                .with_growth(0.8),
            PoolDef::boxed("demand", flat(0.0, -0.7), flat(1.2, 0.45))
                .with_classification(Classification::Buyer)
                .with_growth(0.8),
        ],
        size_range: [0.015, 0.03],
        interaction: InteractionConfig {
            distance: 0.05,
            rules: vec![InteractionRule::bounce(
                Classification::Seller,
                Classification::Buyer,
                0.4,
            )],
            ..Default::default()
        },
        scenarios: vec![news_play_long(), pop_and_drop_short()],
        initial_scenario: Some("News Play (Long)".to_string()),
        ..Default::default()
    }
}

fn news_play_long() -> ScenarioDef {
    let mut pre_market = PhaseDef::new("Pre-Market", 0.0, 0.2);
    pre_market.jitter_scale = 0.5;
    pre_market.collisions = false;
    pre_market.blend = 0.3;

    let mut news_drop = PhaseDef::new("News-Drop", 0.2, 0.35);
    news_drop.jitter_scale = 2.5;
    news_drop.blend = 0.5;
    news_drop.drift = vec![DriftRule::for_class(Classification::Buyer, flat(0.0, 0.8))];
    news_drop.transfer = transfer("supply", "demand", 20.0);

    let mut reaction = PhaseDef::new("Reaction", 0.35, 0.75);
    reaction.jitter_scale = 1.5;
    reaction.blend = 0.3;
    reaction.drift = vec![DriftRule::for_class(Classification::Buyer, flat(0.0, 0.3))];
    reaction.transfer = transfer("supply", "demand", 6.0);

    let mut resolution = PhaseDef::new("Resolution", 0.75, 1.0);
    resolution.jitter_scale = 0.8;

    ScenarioDef {
        name: "News Play (Long)".to_string(),
        looping: false,
        duration_secs: 24.0,
        phases: vec![pre_market, news_drop, reaction, resolution],
    }
}

fn pop_and_drop_short() -> ScenarioDef {
    let mut pop = PhaseDef::new("Pop", 0.0, 0.3);
    pop.jitter_scale = 2.0;
    pop.blend = 0.3;
    pop.drift = vec![DriftRule::for_class(Classification::Buyer, flat(0.0, 1.0))];
    pop.transfer = transfer("supply", "demand", 30.0);

    let mut peak = PhaseDef::new("Peak", 0.3, 0.5);
    peak.jitter_scale = 1.2;
    peak.blend = 0.4;

    let mut drop = PhaseDef::new("Drop", 0.5, 0.8);
    drop.jitter_scale = 2.5;
    drop.blend = 0.3;
    drop.drift = vec![DriftRule::for_class(Classification::Seller, flat(0.0, -1.0))];
    drop.transfer = transfer("demand", "supply", 40.0);

    let mut settle = PhaseDef::new("Settle", 0.8, 1.0);
    settle.jitter_scale = 0.7;
    settle.collisions = false;

    ScenarioDef {
        name: "Pop and Drop (Short)".to_string(),
        looping: false,
        duration_secs: 10.0,
        phases: vec![pop, peak, drop, settle],
    }
}

/// Asks and bids pulsing apart and together in a loop.
pub fn spread() -> EngineConfig {
    let mut wide = PhaseDef::new("Wide", 0.0, 0.5);
    wide.blend = 0.25;
    wide.collisions = false;
    wide.drift = vec![
        DriftRule::for_pool("asks", flat(0.0, 0.4)),
        DriftRule::for_pool("bids", flat(0.0, -0.4)),
    ];
    let mut tight = PhaseDef::new("Tight", 0.5, 1.0);
    tight.blend = 0.25;
    tight.drift = vec![
        DriftRule::for_pool("asks", flat(0.0, -0.4)),
        DriftRule::for_pool("bids", flat(0.0, 0.4)),
    ];

    EngineConfig {
        particle_count: 400,
        pools: vec![
            PoolDef::boxed("asks", flat(0.0, 0.45), flat(1.4, 0.4))
                .with_classification(Classification::Seller),
            PoolDef::boxed("bids", flat(0.0, -0.45), flat(1.4, 0.4))
                .with_classification(Classification::Buyer),
        ],
        size_range: [0.015, 0.025],
        interaction: InteractionConfig {
            distance: 0.05,
            rules: vec![InteractionRule::bounce(
                Classification::Seller,
                Classification::Buyer,
                0.5,
            )],
            ..Default::default()
        },
        scenarios: vec![ScenarioDef {
            name: "Spread Cycle".to_string(),
            looping: true,
            duration_secs: 8.0,
            phases: vec![wide, tight],
        }],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_validates() {
        for name in NAMES {
            let config = by_name(name).unwrap();
            assert_eq!(config.validate(), Ok(()), "preset `{}` should validate", name);
        }
    }

    #[test]
    fn test_unknown_preset() {
        assert_eq!(
            by_name("nope"),
            Err(EngineError::UnknownPreset("nope".into()))
        );
    }

    #[test]
    fn test_catalyst_scenarios() {
        let config = catalyst();
        let names: Vec<&str> = config.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["News Play (Long)", "Pop and Drop (Short)"]);
        let phases: Vec<&str> = config.scenarios[0]
            .phases
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(phases, ["Pre-Market", "News-Drop", "Reaction", "Resolution"]);
    }
}
