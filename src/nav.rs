use bevy::prelude::*;

pub mod config;
pub mod spatial;
pub mod pathfinding;
pub mod adaptation;
pub mod learning;
pub mod orchestrator;
pub mod systems;

use config::{NavConfig, NavConfigPlugin};
use spatial::{NavWorld, UnitRegistry};
use systems::{
    advance_nav_clock, apply_world_commands, expire_world_changes, process_navigation_requests,
    record_trip_outcomes, DynamicObstacleUpdate, NavClock, NavSet, NavigationResponse, TripReport,
    WorldChangeCommand,
};

pub use orchestrator::{
    AgentId, NavigationConstraints, NavigationRequest, NavigationResult, NavigationStrategy, Navigator,
};

/// Registers the navigation resources, messages and `FixedUpdate` systems.
///
/// Each fixed tick runs, in order: clock, world changes and obstacle updates,
/// expiry, navigation requests, trip outcomes. Embedders replace
/// [`NavWorld`] with their own spatial index and keep [`UnitRegistry`] fresh.
pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(NavConfigPlugin);

        let config = app
            .world()
            .get_resource::<NavConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(Navigator::from_config(&config));
        app.init_resource::<NavWorld>();
        app.init_resource::<UnitRegistry>();
        app.init_resource::<NavClock>();

        app.add_message::<NavigationRequest>();
        app.add_message::<NavigationResponse>();
        app.add_message::<TripReport>();
        app.add_message::<WorldChangeCommand>();
        app.add_message::<DynamicObstacleUpdate>();

        app.configure_sets(FixedUpdate, (
            NavSet::Clock,
            NavSet::WorldUpdates,
            NavSet::Requests,
            NavSet::Feedback,
        ).chain());

        app.add_systems(FixedUpdate, (
            advance_nav_clock.in_set(NavSet::Clock),
            (apply_world_commands, expire_world_changes).chain().in_set(NavSet::WorldUpdates),
            process_navigation_requests.in_set(NavSet::Requests),
            record_trip_outcomes.in_set(NavSet::Feedback),
        ));

        info!("[NAV] Navigation plugin ready (chunk size {}, seed {:#x})", config.chunk_size, config.seed);
    }
}
