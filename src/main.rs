use bevy::prelude::*;

use wayfarer::nav::adaptation::{ChangeKind, WorldChange};
use wayfarer::nav::config::NavConfig;
use wayfarer::nav::learning::{PathStatus, TripOutcome};
use wayfarer::nav::pathfinding::{polyline_length, Urgency};
use wayfarer::nav::spatial::{NavWorld, TileGrid, UnitRegistry, UnitSnapshot};
use wayfarer::nav::systems::{
    DynamicObstacleUpdate, NavClock, NavSet, NavigationResponse, TripReport, WorldChangeCommand,
};
use wayfarer::nav::{NavigationPlugin, NavigationRequest, NavigationStrategy, Navigator};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::fs;
use std::path::{Path, PathBuf};

const DEMO_TICKS: u64 = 400;
const TRIP_INTERVAL: u64 = 20;

fn setup_file_logging() -> std::io::Result<String> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep only the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("wayfarer_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=warn,bevy_app=warn,wayfarer=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(log_path_str)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|s| s.starts_with("wayfarer") && s.ends_with(".log"))
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

// ============================================================================
// Demo scenario
// ============================================================================

/// A commuter shuttling between two points.
#[derive(Clone, Debug)]
struct Commuter {
    agent_id: u64,
    home: Vec2,
    work: Vec2,
    outbound: bool,
    urgency: Urgency,
}

#[derive(Resource, Default)]
struct DemoRoster {
    commuters: Vec<Commuter>,
    trips: u64,
    arrivals: u64,
}

fn setup_demo_world(mut commands: Commands) {
    // 192x192 meadow split by a river with a ford in the north, plus a marsh.
    let mut grid = TileGrid::new(192, 192, 1.0);
    grid.fill_rect(IVec2::new(94, 0), IVec2::new(97, 159), 0.0);
    grid.fill_rect(IVec2::new(40, 120), IVec2::new(70, 150), 0.2);
    commands.insert_resource(NavWorld::new(grid));

    commands.insert_resource(UnitRegistry {
        units: (0..30)
            .map(|i| UnitSnapshot {
                id: i,
                position: Vec2::new(20.0 + (i % 6) as f32 * 2.0, 20.0 + (i / 6) as f32 * 2.0),
                owner: (i % 2) as u32,
                health: 100.0,
            })
            .collect(),
    });

    commands.insert_resource(DemoRoster {
        commuters: vec![
            Commuter { agent_id: 1, home: Vec2::new(10.0, 10.0), work: Vec2::new(180.0, 20.0), outbound: true, urgency: Urgency::Normal },
            Commuter { agent_id: 2, home: Vec2::new(30.0, 170.0), work: Vec2::new(170.0, 170.0), outbound: true, urgency: Urgency::Leisure },
            Commuter { agent_id: 3, home: Vec2::new(120.0, 40.0), work: Vec2::new(170.0, 100.0), outbound: true, urgency: Urgency::Critical },
        ],
        ..default()
    });
}

fn dispatch_trips(
    clock: Res<NavClock>,
    roster: Res<DemoRoster>,
    mut requests: MessageWriter<NavigationRequest>,
    mut world_commands: MessageWriter<WorldChangeCommand>,
    mut obstacles: MessageWriter<DynamicObstacleUpdate>,
) {
    if clock.tick == 100 {
        let roadworks = WorldChange::new(1, ChangeKind::Construction, Vec2::new(145.0, 70.0), 12.0)
            .with_duration(2_000);
        world_commands.write(WorldChangeCommand::Register(roadworks));
        for y in 60..66 {
            obstacles.write(DynamicObstacleUpdate { position: Vec2::new(150.0, y as f32), blocked: true });
        }
    }

    if clock.tick % TRIP_INTERVAL != 1 {
        return;
    }
    for commuter in &roster.commuters {
        let (start, destination) = if commuter.outbound {
            (commuter.home, commuter.work)
        } else {
            (commuter.work, commuter.home)
        };
        requests.write(
            NavigationRequest::new(commuter.agent_id, start, destination)
                .with_urgency(commuter.urgency)
                .with_purpose("commute"),
        );
    }
}

/// Pretend every trip is travelled instantly and report how it went.
fn complete_trips(
    mut responses: MessageReader<NavigationResponse>,
    mut reports: MessageWriter<TripReport>,
    mut roster: ResMut<DemoRoster>,
) {
    for response in responses.read() {
        let result = &response.result;
        let travelled = matches!(
            result.strategy,
            NavigationStrategy::Adapted
                | NavigationStrategy::Learned
                | NavigationStrategy::Hierarchical
                | NavigationStrategy::DirectFallback
        ) && !result.path.is_empty();
        let reached = travelled
            && result.path.last().is_some_and(|last| last.distance(response.destination) < 1.0)
            && result.strategy != NavigationStrategy::DirectFallback;

        let straight = response.start.distance(response.destination);
        let length = polyline_length(&result.path);
        let outcome = TripOutcome {
            reached_destination: reached,
            distance_remaining: if reached { 0.0 } else { straight },
            estimated_max_distance: straight,
            time_taken: result.estimated_time,
            energy_used: result.estimated_cost * 0.5,
            obstacles_encountered: u32::from(result.status == PathStatus::Blocked),
            path_efficiency: if length > 0.0 { (straight / length).min(1.0) } else { 0.0 },
        };

        reports.write(TripReport {
            agent_id: response.agent_id,
            start: response.start,
            end: response.destination,
            path: if travelled { result.path.clone() } else { vec![response.start] },
            outcome,
        });

        roster.trips += 1;
        if reached {
            roster.arrivals += 1;
        }
        if let Some(commuter) = roster.commuters.iter_mut().find(|c| c.agent_id == response.agent_id) {
            if reached {
                commuter.outbound = !commuter.outbound;
            }
        }
    }
}

fn finish_demo(
    clock: Res<NavClock>,
    roster: Res<DemoRoster>,
    world: Res<NavWorld>,
    units: Res<UnitRegistry>,
    mut navigator: ResMut<Navigator>,
    mut exit: MessageWriter<AppExit>,
) {
    if clock.tick < DEMO_TICKS {
        return;
    }

    info!("[DEMO] {} trips, {} arrivals in {}ms of navigation time",
        roster.trips, roster.arrivals, clock.now_ms);
    for commuter in &roster.commuters {
        if let Some(agent) = navigator.agent(commuter.agent_id) {
            info!("[DEMO] Agent {}: {:?}", commuter.agent_id, agent.stats());
        }
    }

    let crowded = navigator.pathfinder.graph.chunk_of(Vec2::new(25.0, 25.0));
    let size = navigator.adapt_chunk_size(world.0.as_ref(), &units, crowded);
    info!("[DEMO] Chunk size after crowding check: {}", size);
    info!("[DEMO] Graph: {:?}", navigator.pathfinder.graph.stats());

    exit.write(AppExit::Success);
}

fn main() {
    match setup_file_logging() {
        Ok(log_file) => {
            println!("╔══════════════════════════════════════════════════════════╗");
            println!("║  Wayfarer navigation demo - Logging to file              ║");
            println!("╠══════════════════════════════════════════════════════════╣");
            println!("║  Log file: {:<45} ║", log_file);
            println!("╚══════════════════════════════════════════════════════════╝");
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("wayfarer=info"))
                .init();
            warn!("File logging unavailable ({}), logging to stdout only", e);
        }
    }

    App::new()
        .add_plugins(MinimalPlugins)
        .insert_resource(NavConfig::load_or_default(wayfarer::nav::config::NAV_CONFIG_PATH))
        .add_plugins(NavigationPlugin)
        .add_systems(Startup, setup_demo_world)
        .add_systems(FixedUpdate, (
            dispatch_trips.after(NavSet::Clock).before(NavSet::WorldUpdates),
            complete_trips.after(NavSet::Requests).before(NavSet::Feedback),
            finish_demo.after(NavSet::Feedback),
        ))
        .run();
}
