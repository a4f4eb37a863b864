use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use crate::nav::adaptation::{WorldChange, WorldChangeId};
use crate::nav::learning::TripOutcome;
use crate::nav::orchestrator::{AgentId, NavigationRequest, NavigationResult, Navigator};
use crate::nav::spatial::NavWorld;

// ============================================================================
// Messages
// ============================================================================

/// Answer to a [`NavigationRequest`], written in the same tick.
#[derive(Message, Clone, Debug, Serialize, Deserialize)]
pub struct NavigationResponse {
    pub agent_id: AgentId,
    pub start: Vec2,
    pub destination: Vec2,
    pub result: NavigationResult,
}

/// End of a trip, reported once per completed or abandoned trip.
#[derive(Message, Clone, Debug, Serialize, Deserialize)]
pub struct TripReport {
    pub agent_id: AgentId,
    pub start: Vec2,
    pub end: Vec2,
    /// Waypoints actually travelled.
    pub path: Vec<Vec2>,
    pub outcome: TripOutcome,
}

#[derive(Message, Clone, Debug, Serialize, Deserialize)]
pub enum WorldChangeCommand {
    Register(WorldChange),
    Remove(WorldChangeId),
}

#[derive(Message, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DynamicObstacleUpdate {
    pub position: Vec2,
    pub blocked: bool,
}

// ============================================================================
// Resources
// ============================================================================

/// Navigation time in milliseconds, advanced by the fixed timestep.
///
/// Expiry and route-memory ages are measured against this clock, never the
/// wall clock, so replays are deterministic.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct NavClock {
    pub tick: u64,
    pub now_ms: u64,
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum NavSet {
    Clock,
    WorldUpdates,
    Requests,
    Feedback,
}

// ============================================================================
// Systems
// ============================================================================

pub fn advance_nav_clock(mut clock: ResMut<NavClock>, time: Res<Time<Fixed>>) {
    clock.tick += 1;
    clock.now_ms += time.timestep().as_millis() as u64;
}

pub fn apply_world_commands(
    mut commands: MessageReader<WorldChangeCommand>,
    mut obstacles: MessageReader<DynamicObstacleUpdate>,
    mut navigator: ResMut<Navigator>,
    clock: Res<NavClock>,
) {
    for command in commands.read() {
        match command {
            WorldChangeCommand::Register(change) => {
                navigator.register_world_change(change.clone(), clock.now_ms);
            }
            WorldChangeCommand::Remove(id) => {
                if navigator.remove_world_change(*id).is_none() {
                    warn!("[NAV] Remove for unknown world change {:?}", id);
                }
            }
        }
    }

    for update in obstacles.read() {
        navigator.register_dynamic_obstacle(update.position, update.blocked);
    }
}

pub fn expire_world_changes(mut navigator: ResMut<Navigator>, clock: Res<NavClock>) {
    navigator.adaptation.expire(clock.now_ms);
}

pub fn process_navigation_requests(
    mut requests: MessageReader<NavigationRequest>,
    mut responses: MessageWriter<NavigationResponse>,
    mut navigator: ResMut<Navigator>,
    world: Res<NavWorld>,
    clock: Res<NavClock>,
) {
    if requests.is_empty() {
        return;
    }

    let request_count = requests.len();
    if request_count > 32 {
        warn!("[NAV] High navigation request count: {} pending requests", request_count);
    }

    let start_time = std::time::Instant::now();
    for request in requests.read() {
        let result = navigator.navigate(world.0.as_ref(), request, clock.now_ms);
        responses.write(NavigationResponse {
            agent_id: request.agent_id,
            start: request.start,
            destination: request.destination,
            result,
        });
    }

    let elapsed = start_time.elapsed();
    if elapsed.as_millis() > 5 {
        debug!("[NAV] {} requests took {:?}", request_count, elapsed);
    }
}

pub fn record_trip_outcomes(
    mut reports: MessageReader<TripReport>,
    mut navigator: ResMut<Navigator>,
    clock: Res<NavClock>,
) {
    for report in reports.read() {
        navigator.record_navigation_outcome(
            report.agent_id,
            report.start,
            report.end,
            &report.path,
            &report.outcome,
            clock.now_ms,
        );
    }
}
