//! Tests for the chunk graph and the two-phase planner.

use super::*;
use bevy::prelude::*;
use std::collections::VecDeque;
use rustc_hash::FxHashSet;
use crate::nav::config::NavConfig;
use crate::nav::spatial::{SpatialIndex, TileGrid, TileInfo};

/// Square world of uniform terrain without a backing allocation.
struct UniformWorld {
    extent: i32,
    passability: f32,
}

impl SpatialIndex for UniformWorld {
    fn tile(&self, x: i32, y: i32) -> Option<TileInfo> {
        if x < 0 || y < 0 || x >= self.extent || y >= self.extent {
            return None;
        }
        Some(TileInfo::with_passability(self.passability))
    }
}

/// World where whole chunks are either open or solid.
struct ChunkMaskWorld {
    chunk_size: i32,
    chunks_per_side: i32,
    open: Vec<bool>,
}

impl ChunkMaskWorld {
    fn is_open(&self, chunk: ChunkCoord) -> bool {
        if chunk.x < 0 || chunk.y < 0 || chunk.x >= self.chunks_per_side || chunk.y >= self.chunks_per_side {
            return false;
        }
        self.open[(chunk.y * self.chunks_per_side + chunk.x) as usize]
    }
}

impl SpatialIndex for ChunkMaskWorld {
    fn tile(&self, x: i32, y: i32) -> Option<TileInfo> {
        let chunk = ChunkCoord::new(x.div_euclid(self.chunk_size), y.div_euclid(self.chunk_size));
        if chunk.x < 0 || chunk.y < 0 || chunk.x >= self.chunks_per_side || chunk.y >= self.chunks_per_side {
            return None;
        }
        Some(TileInfo::with_passability(if self.is_open(chunk) { 1.0 } else { 0.0 }))
    }
}

fn bfs_hops(world: &ChunkMaskWorld, start: ChunkCoord, goal: ChunkCoord) -> Option<usize> {
    let mut queue = VecDeque::from([(start, 0usize)]);
    let mut seen = FxHashSet::default();
    seen.insert(start);
    while let Some((chunk, hops)) = queue.pop_front() {
        if chunk == goal {
            return Some(hops);
        }
        for next in chunk.neighbors() {
            if world.is_open(next) && seen.insert(next) {
                queue.push_back((next, hops + 1));
            }
        }
    }
    None
}

fn pathfinder_with_cap(max_expansions: usize) -> HierarchicalPathfinder {
    let config = NavConfig {
        macro_max_expansions: max_expansions,
        ..NavConfig::default()
    };
    HierarchicalPathfinder::from_config(&config)
}

// ============================================================================
// Chunk Abstraction Graph
// ============================================================================

#[test]
fn test_chunk_of_floors_negative_coordinates() {
    let graph = ChunkGraph::default();
    assert_eq!(graph.chunk_of(Vec2::new(-1.0, -1.0)), ChunkCoord::new(-1, -1));
    assert_eq!(graph.chunk_of(Vec2::new(31.9, 0.0)), ChunkCoord::new(0, 0));
    assert_eq!(graph.chunk_of(Vec2::new(32.0, 64.0)), ChunkCoord::new(1, 2));
    assert_eq!(graph.chunk_of(Vec2::new(-33.0, 5.0)), ChunkCoord::new(-2, 0));

    assert!(ChunkCoord::new(-1, -1).contains_tile(IVec2::new(-1, -32), 32));
    assert!(!ChunkCoord::new(-1, -1).contains_tile(IVec2::new(0, -1), 32));
    assert!(ChunkCoord::new(1, 2).contains_tile(IVec2::new(63, 64), 32));
}

#[test]
fn test_ensure_node_is_idempotent_and_unloaded_chunks_are_impassable() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut graph = ChunkGraph::default();

    let p = graph.ensure_node(&world, ChunkCoord::new(0, 0)).passability;
    assert_eq!(p, Some(1.0));
    graph.ensure_node(&world, ChunkCoord::new(0, 0));
    assert_eq!(graph.stats().cached_nodes, 1, "Redundant ensure_node must not duplicate nodes");

    assert_eq!(graph.passability(&world, ChunkCoord::new(5, 5)), 0.0,
        "Chunk outside the loaded world should sample as impassable");
}

#[test]
fn test_missing_tile_passability_defaults_to_one() {
    let mut world = TileGrid::new(32, 32, 0.0);
    for y in 0..32 {
        for x in 0..32 {
            world.set_tile(x, y, TileInfo::default());
        }
    }
    let mut graph = ChunkGraph::default();
    assert!((graph.passability(&world, ChunkCoord::new(0, 0)) - 1.0).abs() < 1e-6);
}

#[test]
fn test_node_center_is_chunk_midpoint() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut graph = ChunkGraph::default();
    let node = graph.ensure_node(&world, ChunkCoord::new(1, 0));
    assert_eq!(node.center, Vec2::new(48.0, 16.0));
    assert_eq!(node.neighbors[1], ChunkCoord::new(2, 0), "Second neighbour is east");
}

#[test]
fn test_edge_cost_formula_and_urgency_scaling() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut graph = ChunkGraph::default();
    let a = ChunkCoord::new(0, 0);
    let b = ChunkCoord::new(1, 0);

    let normal = graph.edge_cost(&world, a, b, Urgency::Normal);
    let expected = 2.0 / (1.0 + 0.001);
    assert!((normal - expected).abs() < 1e-4, "Expected {}, got {}", expected, normal);

    let critical = graph.edge_cost(&world, a, b, Urgency::Critical);
    assert!((critical - expected * 0.5).abs() < 1e-4);

    let low = graph.edge_cost(&world, a, b, Urgency::Low);
    assert!((low - expected * 1.2).abs() < 1e-4);
}

#[test]
fn test_edge_cost_is_finite_for_impassable_chunks() {
    let world = TileGrid::new(32, 32, 1.0);
    let mut graph = ChunkGraph::default();
    let cost = graph.edge_cost(&world, ChunkCoord::new(0, 0), ChunkCoord::new(1, 0), Urgency::Normal);
    assert!(cost.is_finite());
    assert!(cost > 900.0, "Impassable neighbour should dominate the cost, got {}", cost);
}

#[test]
fn test_connection_boundary_points() {
    let world = TileGrid::new(128, 128, 1.0);
    let mut graph = ChunkGraph::default();
    let c = |x, y| ChunkCoord::new(x, y);

    let east = graph.connection(&world, c(0, 0), c(1, 0)).expect("east");
    assert_eq!((east.exit, east.entry), (IVec2::new(31, 16), IVec2::new(32, 16)));

    let west = graph.connection(&world, c(1, 0), c(0, 0)).expect("west");
    assert_eq!((west.exit, west.entry), (IVec2::new(32, 16), IVec2::new(31, 16)));

    let north = graph.connection(&world, c(0, 0), c(0, 1)).expect("north");
    assert_eq!((north.exit, north.entry), (IVec2::new(16, 31), IVec2::new(16, 32)));

    let south = graph.connection(&world, c(0, 1), c(0, 0)).expect("south");
    assert_eq!((south.exit, south.entry), (IVec2::new(16, 32), IVec2::new(16, 31)));

    assert!(graph.connection(&world, c(0, 0), c(1, 1)).is_none(), "No diagonal connections");
}

#[test]
fn test_dynamic_obstacle_invalidates_and_resamples_chunk() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut graph = ChunkGraph::default();
    let chunk = ChunkCoord::new(0, 0);
    assert_eq!(graph.passability(&world, chunk), 1.0);

    // (1, 1) is the first sample point of a 32-tile chunk with 10 samples per axis.
    graph.register_dynamic_obstacle(Vec2::new(1.5, 1.5), true);
    assert_eq!(graph.node(chunk).and_then(|n| n.passability), None, "Cache must be cleared");
    assert!((graph.passability(&world, chunk) - 0.99).abs() < 1e-5);
    assert!(graph.is_tile_blocked(IVec2::new(1, 1)));

    graph.register_dynamic_obstacle(Vec2::new(1.5, 1.5), false);
    assert_eq!(graph.passability(&world, chunk), 1.0);
    assert_eq!(graph.stats().blocked_tiles, 0);
}

// ============================================================================
// Hierarchical Pathfinder
// ============================================================================

#[test]
fn test_find_path_to_self_is_single_waypoint() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut pf = HierarchicalPathfinder::default();
    let p = Vec2::new(10.0, 10.0);

    let path = pf.find_path(&world, p, p, Urgency::Normal).expect("trivial path");
    assert_eq!(path.waypoints, vec![p]);
    assert_eq!(path.cost, 0.0);
    assert!(path.complete);
    assert_eq!(pf.phase(), SearchPhase::Done);
}

#[test]
fn test_open_world_path_reaches_destination() {
    let world = UniformWorld { extent: 64 * 32, passability: 1.0 };
    let mut pf = HierarchicalPathfinder::default();
    let goal = Vec2::new(100.0, 100.0);

    let path = pf.find_path(&world, Vec2::ZERO, goal, Urgency::Normal).expect("path should exist");

    println!("Chunks: {:?}", path.chunks);
    assert!(path.chunks.len() >= 3, "Expected at least 3 chunks, got {}", path.chunks.len());
    assert_eq!(path.destination(), Some(goal));
    assert_eq!(path.waypoints[0], Vec2::ZERO);
    assert!(path.complete);

    for pair in path.waypoints.windows(2) {
        assert!(pair[0].distance(pair[1]) <= 1.0 + 1e-5, "Waypoints should be unit steps: {:?}", pair);
    }
    // Uniform terrain with passability 1: cost equals length.
    assert!((path.cost - path.length()).abs() < 1e-3);
    assert!(path.length() >= 200.0 - 1e-3, "A 4-connected walk is at least the Manhattan distance");
}

#[test]
fn test_path_detours_through_gap_in_chunk_wall() {
    let mut world = TileGrid::new(128, 128, 1.0);
    // Solid chunk column x=1 except the top chunk (1, 3).
    world.fill_rect(IVec2::new(32, 0), IVec2::new(63, 95), 0.0);
    let mut pf = HierarchicalPathfinder::default();

    let path = pf
        .find_path(&world, Vec2::new(5.0, 5.0), Vec2::new(120.0, 5.0), Urgency::Normal)
        .expect("path through gap");

    assert!(path.chunks.contains(&ChunkCoord::new(1, 3)), "Route must use the gap: {:?}", path.chunks);
    assert!(path.complete);
    for w in &path.waypoints {
        let t = world.tile(w.x.floor() as i32, w.y.floor() as i32).expect("inside world");
        assert!(t.effective_passability() > 0.3, "Waypoint {:?} is on impassable terrain", w);
    }
}

#[test]
fn test_disconnected_world_returns_none() {
    let mut world = TileGrid::new(128, 128, 1.0);
    world.fill_rect(IVec2::new(32, 0), IVec2::new(63, 127), 0.0);
    let mut pf = HierarchicalPathfinder::default();

    let path = pf.find_path(&world, Vec2::new(5.0, 5.0), Vec2::new(120.0, 5.0), Urgency::Normal);
    assert!(path.is_none());
    assert_eq!(pf.phase(), SearchPhase::Failed);
}

#[test]
fn test_micro_walk_steps_around_dynamic_obstacle() {
    let world = TileGrid::new(32, 32, 1.0);
    let mut pf = HierarchicalPathfinder::default();
    pf.register_dynamic_obstacle(Vec2::new(5.0, 5.0), true);

    let path = pf
        .find_path(&world, Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0), Urgency::Normal)
        .expect("path");
    assert!(path.complete);
    assert!(!path.waypoints.contains(&Vec2::new(5.0, 5.0)), "Blocked tile must be avoided");
}

#[test]
fn test_stalled_refinement_returns_partial_path() {
    let mut world = TileGrid::new(32, 32, 1.0);
    world.fill_rect(IVec2::new(10, 0), IVec2::new(10, 31), 0.0);
    let mut pf = HierarchicalPathfinder::default();

    let path = pf
        .find_path(&world, Vec2::new(2.0, 10.0), Vec2::new(20.0, 10.0), Urgency::Normal)
        .expect("partial path");
    assert!(!path.complete);
    assert!(path.waypoints.len() > 1);
    assert!(path.waypoints.len() <= 2 * 32 + 1, "Walk must respect its step budget");
}

#[test]
fn test_macro_path_is_never_longer_than_bfs() {
    let mut rng = fastrand::Rng::with_seed(7);
    let side = 8;

    for trial in 0..40 {
        let mut open: Vec<bool> = (0..side * side).map(|_| rng.f32() > 0.3).collect();
        let start = ChunkCoord::new(0, 0);
        let goal = ChunkCoord::new(rng.i32(0..side), rng.i32(0..side));
        open[0] = true;
        open[(goal.y * side + goal.x) as usize] = true;

        let world = ChunkMaskWorld { chunk_size: 32, chunks_per_side: side, open };
        let mut pf = pathfinder_with_cap(10_000);

        let expected = bfs_hops(&world, start, goal);
        let found = pf.macro_search(&world, Vec2::new(16.0, 16.0), goal.origin(32).as_vec2() + Vec2::splat(16.0), Urgency::Normal);

        match (expected, found) {
            (Some(hops), Some(macro_path)) => assert!(
                macro_path.chunks.len() - 1 <= hops,
                "Trial {}: A* used {} hops, BFS {}", trial, macro_path.chunks.len() - 1, hops
            ),
            (None, None) => {}
            (e, f) => panic!("Trial {}: BFS {:?} vs A* {:?}", trial, e, f.map(|m| m.chunks)),
        }
    }
}

#[test]
fn test_optimize_chunk_sizes_shrinks_and_grows_within_bounds() {
    let world = TileGrid::new(64, 64, 1.0);
    let mut pf = HierarchicalPathfinder::default();
    let region = ChunkCoord::new(0, 0);
    pf.graph.ensure_node(&world, region);

    assert_eq!(pf.optimize_chunk_sizes(region, 0.9, 0.0), 24);
    assert_eq!(pf.graph.stats().cached_nodes, 0, "Resizing flushes the node cache");
    assert_eq!(pf.optimize_chunk_sizes(region, 0.0, 0.9), 18);
    assert_eq!(pf.optimize_chunk_sizes(region, 0.9, 0.9), 16, "Floor at 16");
    assert_eq!(pf.optimize_chunk_sizes(region, 0.9, 0.9), 16);

    let mut size = 16;
    for _ in 0..10 {
        size = pf.optimize_chunk_sizes(region, 0.1, 0.1);
    }
    assert_eq!(size, 64, "Ceiling at 64");
}

#[test]
fn test_dynamic_obstacles_survive_chunk_resize() {
    let mut pf = HierarchicalPathfinder::default();
    pf.register_dynamic_obstacle(Vec2::new(40.0, 3.0), true);
    pf.optimize_chunk_sizes(ChunkCoord::new(0, 0), 1.0, 1.0);
    assert!(pf.graph.is_tile_blocked(IVec2::new(40, 3)));
    assert_eq!(pf.graph.chunk_of_tile(IVec2::new(40, 3)), ChunkCoord::new(1, 0));
}
