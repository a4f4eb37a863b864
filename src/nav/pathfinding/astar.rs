use bevy::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BinaryHeap;
use crate::nav::spatial::SpatialIndex;
use super::graph::ChunkGraph;
use super::types::{ChunkCoord, State, Urgency};

/// Manhattan distance in chunks. Admissible while every edge costs at least 1.
#[inline]
pub(super) fn heuristic(from: ChunkCoord, to: ChunkCoord) -> f32 {
    from.manhattan(to) as f32
}

fn reconstruct_path(came_from: &FxHashMap<ChunkCoord, ChunkCoord>, mut current: ChunkCoord) -> Vec<ChunkCoord> {
    let mut path = vec![current];
    while let Some(prev) = came_from.get(&current) {
        current = *prev;
        path.push(current);
    }
    path.reverse();
    path
}

/// Parameters for one macro search.
#[derive(Clone, Copy, Debug)]
pub(super) struct MacroSearch {
    pub urgency: Urgency,
    pub max_expansions: usize,
    pub min_passability: f32,
}

/// A* over the chunk graph from `start` to `goal`.
///
/// Chunks whose sampled passability falls below `min_passability` are never
/// entered. Returns `None` when the open set empties or the expansion cap is
/// hit; both are ordinary outcomes for disconnected or unloaded worlds.
pub(super) fn find_chunk_path(
    graph: &mut ChunkGraph,
    world: &dyn SpatialIndex,
    start: ChunkCoord,
    goal: ChunkCoord,
    search: MacroSearch,
) -> Option<(Vec<ChunkCoord>, f32)> {
    let mut open_set = BinaryHeap::new();
    let mut closed: FxHashSet<ChunkCoord> = FxHashSet::default();
    let mut came_from: FxHashMap<ChunkCoord, ChunkCoord> = FxHashMap::default();
    let mut g_score: FxHashMap<ChunkCoord, f32> = FxHashMap::default();

    g_score.insert(start, 0.0);
    open_set.push(State { cost: heuristic(start, goal), chunk: start });

    let mut expansions = 0;

    while let Some(State { cost: _, chunk: current }) = open_set.pop() {
        if !closed.insert(current) {
            continue;
        }

        if current == goal {
            let cost = g_score.get(&current).copied().unwrap_or(0.0);
            return Some((reconstruct_path(&came_from, current), cost));
        }

        expansions += 1;
        if expansions > search.max_expansions {
            warn!("[HPA] Macro A* exceeded {} expansions from {:?} to {:?}",
                search.max_expansions, start, goal);
            return None;
        }

        let current_g = g_score.get(&current).copied().unwrap_or(f32::MAX);

        for neighbor in graph.neighbors(current) {
            if closed.contains(&neighbor) {
                continue;
            }
            if graph.passability(world, neighbor) < search.min_passability {
                continue;
            }

            let tentative_g = current_g + graph.edge_cost(world, current, neighbor, search.urgency);
            if tentative_g < g_score.get(&neighbor).copied().unwrap_or(f32::MAX) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative_g);
                open_set.push(State {
                    cost: tentative_g + heuristic(neighbor, goal),
                    chunk: neighbor,
                });
            }
        }
    }

    None
}
