use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Default location of the navigation tuning file, relative to the working directory.
pub const NAV_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Static navigation tuning loaded once at startup.
///
/// Every constant the planners and the learning agent depend on lives here so
/// embedders can tune behaviour from a RON file without recompiling. Values
/// are plain floats; they are copied into the subsystems when the
/// [`Navigator`](super::Navigator) is built.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    // Chunk abstraction
    pub chunk_size: i32,
    pub min_chunk_size: i32,
    pub max_chunk_size: i32,
    pub chunk_shrink_factor: f32,
    pub chunk_grow_factor: f32,
    pub max_chunk_samples: usize,
    pub passability_epsilon: f32,
    pub min_chunk_passability: f32,
    pub density_threshold: f32,
    pub complexity_threshold: f32,
    /// Units in one chunk that count as full density.
    pub crowd_saturation: f32,

    // Hierarchical search
    pub macro_max_expansions: usize,
    pub micro_passability_threshold: f32,

    // World adaptation
    pub exploration_step: f32,
    pub exploration_max_iterations: usize,
    pub avoidance_margin: f32,
    pub avoidance_offset: f32,
    pub trial_count: usize,
    pub discovery_log_cap: usize,
    pub blockage_area_size: f32,
    pub route_sample_step: f32,

    // Reinforcement learning
    pub learning_rate: f32,
    pub discount_factor: f32,
    pub initial_exploration_rate: f32,
    pub exploration_decay: f32,
    pub min_exploration_rate: f32,
    pub replay_capacity: usize,
    pub q_table_capacity: Option<usize>,
    pub position_bucket: f32,
    pub distance_bucket: f32,

    // Navigation memory
    pub successful_route_cap: usize,
    pub failed_route_cap: usize,
    pub obstacle_encounter_cap: usize,
    pub route_match_threshold: f32,
    pub arrival_distance: f32,
    pub obstacle_precedent_radius: f32,
    pub learned_route_max_age_ms: u64,

    // Orchestration
    pub agent_speed: f32,
    pub obstacle_scan_radius: f32,
    pub seed: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            min_chunk_size: 16,
            max_chunk_size: 64,
            chunk_shrink_factor: 0.75,
            chunk_grow_factor: 1.25,
            max_chunk_samples: 100,
            passability_epsilon: 0.001,
            min_chunk_passability: 0.1,
            density_threshold: 0.7,
            complexity_threshold: 0.7,
            crowd_saturation: 20.0,
            macro_max_expansions: 100,
            micro_passability_threshold: 0.3,
            exploration_step: 5.0,
            exploration_max_iterations: 100,
            avoidance_margin: 2.0,
            avoidance_offset: 5.0,
            trial_count: 5,
            discovery_log_cap: 10,
            blockage_area_size: 16.0,
            route_sample_step: 5.0,
            learning_rate: 0.1,
            discount_factor: 0.95,
            initial_exploration_rate: 0.3,
            exploration_decay: 0.995,
            min_exploration_rate: 0.01,
            replay_capacity: 1000,
            q_table_capacity: None,
            position_bucket: 5.0,
            distance_bucket: 10.0,
            successful_route_cap: 50,
            failed_route_cap: 50,
            obstacle_encounter_cap: 100,
            route_match_threshold: 0.3,
            arrival_distance: 2.0,
            obstacle_precedent_radius: 5.0,
            learned_route_max_age_ms: 600_000,
            agent_speed: 4.0,
            obstacle_scan_radius: 10.0,
            seed: 0x5EED,
        }
    }
}

impl NavConfig {
    pub fn from_ron_str(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str::<NavConfig>(contents)
    }

    /// Read the config at `path`, falling back to defaults on any failure.
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_ron_str(&contents) {
                Ok(config) => {
                    info!("Loaded navigation config from {}", path);
                    config
                }
                Err(e) => {
                    error!("Failed to parse navigation config: {}", e);
                    error!("Using default NavConfig");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}", path, e);
                warn!("Using default NavConfig");
                Self::default()
            }
        }
    }
}

/// Inserts [`NavConfig`] unless the app already provides one.
pub struct NavConfigPlugin;

impl Plugin for NavConfigPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<NavConfig>() {
            app.insert_resource(NavConfig::load_or_default(NAV_CONFIG_PATH));
        }
    }
}
