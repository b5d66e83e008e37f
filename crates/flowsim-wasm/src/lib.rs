use std::sync::Once;

use flowsim_core::config::EngineConfig;
use flowsim_core::presets;
use flowsim_core::snapshot::RenderParticle;
use flowsim_core::Engine;
use wasm_bindgen::prelude::*;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        console_error_panic_hook::set_once();
        let _ = console_log::init_with_level(log::Level::Debug);
    });
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Browser handle to one simulation. Each widget owns its own world.
#[wasm_bindgen]
pub struct SimulationWorld {
    engine: Engine,
    render_buffer: Vec<RenderParticle>,
}

#[wasm_bindgen]
impl SimulationWorld {
    /// Build from a JSON configuration; invalid configs throw.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<SimulationWorld, JsValue> {
        init_logging();
        let config = EngineConfig::from_json(config_json).map_err(js_err)?;
        Self::with_config(config)
    }

    /// Build from one of the built-in presets.
    #[wasm_bindgen]
    pub fn from_preset(name: &str) -> Result<SimulationWorld, JsValue> {
        init_logging();
        let config = presets::by_name(name).map_err(js_err)?;
        Self::with_config(config)
    }

    #[wasm_bindgen]
    pub fn preset_names() -> Vec<JsValue> {
        presets::NAMES.iter().map(|n| JsValue::from_str(n)).collect()
    }

    /// Advance by `dt` seconds; returns the time spent in milliseconds.
    #[wasm_bindgen]
    pub fn tick(&mut self, dt: f32) -> f32 {
        let start = js_sys::Date::now();
        self.engine.tick(dt);
        self.engine.write_render_buffer(&mut self.render_buffer);
        let elapsed = js_sys::Date::now() - start;
        elapsed as f32
    }

    #[wasm_bindgen]
    pub fn get_render_buffer_ptr(&self) -> *const f32 {
        self.render_buffer.as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn get_render_buffer_byte_length(&self) -> usize {
        self.render_buffer.len() * std::mem::size_of::<RenderParticle>()
    }

    /// Copy of the render buffer for hosts that cannot read wasm memory.
    #[wasm_bindgen]
    pub fn render_buffer(&self) -> js_sys::Float32Array {
        let floats: &[f32] = bytemuck::cast_slice(&self.render_buffer);
        js_sys::Float32Array::from(floats)
    }

    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.engine.snapshot()).map_err(js_err)
    }

    /// Collision events of the last tick as JSON; clears them.
    #[wasm_bindgen]
    pub fn drain_events_json(&mut self) -> Result<String, JsValue> {
        serde_json::to_string(&self.engine.drain_events()).map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn reconfigure(&mut self, config_json: &str) -> Result<(), JsValue> {
        let config = EngineConfig::from_json(config_json).map_err(js_err)?;
        self.engine.reconfigure(config).map_err(js_err)?;
        self.engine.write_render_buffer(&mut self.render_buffer);
        Ok(())
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.engine.reset();
        self.engine.write_render_buffer(&mut self.render_buffer);
    }

    #[wasm_bindgen]
    pub fn set_scenario(&mut self, name: &str) -> Result<(), JsValue> {
        self.engine.set_scenario(name).map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn set_progress(&mut self, progress: f32) {
        self.engine.set_progress(progress);
    }

    #[wasm_bindgen]
    pub fn set_playing(&mut self, playing: bool) {
        self.engine.set_playing(playing);
    }

    #[wasm_bindgen]
    pub fn set_speed(&mut self, speed: f32) {
        self.engine.set_speed(speed);
    }

    /// Negative or non-finite counts move nothing.
    #[wasm_bindgen]
    pub fn trigger_batch_action(&mut self, name: &str, count: f64) -> Result<u32, JsValue> {
        let count = if count.is_finite() && count > 0.0 {
            count.floor() as usize
        } else {
            0
        };
        let moved = self
            .engine
            .trigger_batch_action(name, count)
            .map_err(js_err)?;
        Ok(moved as u32)
    }

    /// Send one particle to `pool`. False when it is dead or dissolving.
    #[wasm_bindgen]
    pub fn reassign(&mut self, id: u32, pool: &str) -> Result<bool, JsValue> {
        self.engine.reassign(id as usize, pool).map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn pool_member_count(&self, name: &str) -> Result<u32, JsValue> {
        self.engine
            .pool_member_count(name)
            .map(|n| n as u32)
            .map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn particle_count(&self) -> usize {
        self.engine.store().len()
    }

    #[wasm_bindgen]
    pub fn alive_count(&self) -> usize {
        self.engine.store().alive_count()
    }

    #[wasm_bindgen]
    pub fn collision_count(&self) -> f64 {
        self.engine.collision_count() as f64
    }

    #[wasm_bindgen]
    pub fn dissolved_count(&self) -> usize {
        self.engine.dissolved_count()
    }

    #[wasm_bindgen]
    pub fn active_phase(&self) -> String {
        self.engine.active_phase_name().to_string()
    }

    #[wasm_bindgen]
    pub fn scenario(&self) -> String {
        self.engine.scenario_name().to_string()
    }

    #[wasm_bindgen]
    pub fn scenario_names(&self) -> Vec<JsValue> {
        self.engine
            .scenario_names()
            .iter()
            .map(|n| JsValue::from_str(n))
            .collect()
    }

    #[wasm_bindgen]
    pub fn progress(&self) -> f32 {
        self.engine.progress()
    }

    #[wasm_bindgen]
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }
}

impl SimulationWorld {
    fn with_config(config: EngineConfig) -> Result<SimulationWorld, JsValue> {
        let engine = Engine::new(config).map_err(js_err)?;
        log::info!(
            "SimulationWorld created: {} particles",
            engine.store().len()
        );
        let mut world = SimulationWorld {
            engine,
            render_buffer: Vec::new(),
        };
        world.engine.write_render_buffer(&mut world.render_buffer);
        Ok(world)
    }
}
