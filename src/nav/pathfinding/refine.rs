//! Micro refinement: a greedy tile walk inside one chunk of the macro path.
//!
//! The walk steps one tile at a time toward its target along the dominant
//! axis. When that tile is blocked it tries the remaining axis-aligned moves
//! in a fixed order, never revisiting a tile. The step budget bounds the
//! walk regardless of terrain.

use bevy::prelude::*;
use rustc_hash::FxHashSet;
use crate::nav::spatial::{SpatialIndex, tile_passability};
use super::graph::ChunkGraph;

pub(super) struct ChunkWalk {
    /// Tiles visited after the starting tile, in order.
    pub tiles: Vec<IVec2>,
    pub reached: bool,
}

#[inline]
pub(super) fn is_walkable(
    world: &dyn SpatialIndex,
    graph: &ChunkGraph,
    tile: IVec2,
    threshold: f32,
) -> bool {
    !graph.is_tile_blocked(tile) && tile_passability(world, tile) > threshold
}

/// Candidate moves from `from` toward `target`, best first.
///
/// With a horizontal primary axis the order is: horizontal toward, vertical
/// toward, vertical away, horizontal away. A vertical primary axis swaps the
/// roles. When the target is level on an axis, "toward" on that axis is +1.
fn candidate_steps(from: IVec2, target: IVec2) -> [IVec2; 4] {
    let delta = target - from;
    let sx = if delta.x < 0 { -1 } else { 1 };
    let sy = if delta.y < 0 { -1 } else { 1 };
    let horizontal = IVec2::new(sx, 0);
    let vertical = IVec2::new(0, sy);

    if delta.x.abs() >= delta.y.abs() {
        [horizontal, vertical, -vertical, -horizontal]
    } else {
        [vertical, horizontal, -horizontal, -vertical]
    }
}

pub(super) fn walk_toward(
    world: &dyn SpatialIndex,
    graph: &ChunkGraph,
    from: IVec2,
    target: IVec2,
    max_steps: usize,
    threshold: f32,
) -> ChunkWalk {
    let mut tiles = Vec::new();
    let mut visited: FxHashSet<IVec2> = FxHashSet::default();
    visited.insert(from);

    let mut current = from;
    for _ in 0..max_steps {
        if current == target {
            break;
        }

        let next = candidate_steps(current, target)
            .into_iter()
            .map(|step| current + step)
            .find(|&tile| !visited.contains(&tile) && is_walkable(world, graph, tile, threshold));

        match next {
            Some(tile) => {
                visited.insert(tile);
                tiles.push(tile);
                current = tile;
            }
            None => {
                debug!("[HPA] Micro walk stalled at {:?} toward {:?}", current, target);
                break;
            }
        }
    }

    ChunkWalk {
        reached: current == target,
        tiles,
    }
}
