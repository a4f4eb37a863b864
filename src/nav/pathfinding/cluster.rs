use bevy::prelude::*;
use rustc_hash::FxHashSet;
use crate::nav::spatial::{SpatialIndex, tile_passability};
use super::types::{AbstractNode, ChunkCoord, ClusterConnection};

impl AbstractNode {
    pub fn new(chunk: ChunkCoord, chunk_size: i32) -> Self {
        let origin = chunk.origin(chunk_size).as_vec2();
        let half = chunk_size as f32 / 2.0;
        Self {
            chunk,
            center: origin + Vec2::splat(half),
            passability: None,
            neighbors: chunk.neighbors(),
        }
    }

    pub fn invalidate(&mut self) {
        self.passability = None;
    }
}

/// Evenly spaced grid of at most `max_samples` tiles covering `chunk`.
fn sample_tiles(chunk: ChunkCoord, chunk_size: i32, max_samples: usize) -> impl Iterator<Item = IVec2> {
    let per_axis = ((max_samples as f32).sqrt().floor() as i32).clamp(1, chunk_size.max(1));
    let step = chunk_size as f32 / per_axis as f32;
    let origin = chunk.origin(chunk_size);

    (0..per_axis).flat_map(move |j| {
        (0..per_axis).map(move |i| {
            origin + IVec2::new(
                ((i as f32 + 0.5) * step) as i32,
                ((j as f32 + 0.5) * step) as i32,
            )
        })
    })
}

/// Mean passability over the chunk's sample grid.
///
/// Unloaded tiles and tiles on the dynamic blocklist contribute 0.
pub(super) fn sample_chunk_passability(
    world: &dyn SpatialIndex,
    chunk: ChunkCoord,
    chunk_size: i32,
    max_samples: usize,
    blocked: Option<&FxHashSet<IVec2>>,
) -> f32 {
    let mut total = 0.0;
    let mut count = 0;
    for tile in sample_tiles(chunk, chunk_size, max_samples) {
        let is_blocked = blocked.is_some_and(|set| set.contains(&tile));
        if !is_blocked {
            total += tile_passability(world, tile);
        }
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

/// Fraction of sampled tiles that are rough: below `rough_below`
/// passability, or marked as chokepoints.
pub(super) fn sample_chunk_complexity(
    world: &dyn SpatialIndex,
    chunk: ChunkCoord,
    chunk_size: i32,
    max_samples: usize,
    rough_below: f32,
) -> f32 {
    let mut rough = 0;
    let mut count = 0;
    for tile in sample_tiles(chunk, chunk_size, max_samples) {
        let is_rough = match world.tile(tile.x, tile.y) {
            Some(info) => info.is_chokepoint || info.effective_passability() < rough_below,
            None => true,
        };
        if is_rough {
            rough += 1;
        }
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        rough as f32 / count as f32
    }
}

/// Boundary crossing from `from` into the axis-adjacent chunk `to`.
///
/// Moving along x uses the facing columns at the vertical midpoint; moving
/// along y uses the facing rows at the horizontal midpoint. Returns `None`
/// for chunks that are not 4-adjacent.
pub(super) fn boundary_connection(
    from: ChunkCoord,
    to: ChunkCoord,
    chunk_size: i32,
    cost: f32,
) -> Option<ClusterConnection> {
    if from.manhattan(to) != 1 {
        return None;
    }

    let last = chunk_size - 1;
    let mid = chunk_size / 2;
    let from_origin = from.origin(chunk_size);
    let to_origin = to.origin(chunk_size);

    let (exit, entry) = match ((to.x - from.x).signum(), (to.y - from.y).signum()) {
        (1, 0) => (
            from_origin + IVec2::new(last, mid),
            to_origin + IVec2::new(0, mid),
        ),
        (-1, 0) => (
            from_origin + IVec2::new(0, mid),
            to_origin + IVec2::new(last, mid),
        ),
        (0, 1) => (
            from_origin + IVec2::new(mid, last),
            to_origin + IVec2::new(mid, 0),
        ),
        (0, -1) => (
            from_origin + IVec2::new(mid, 0),
            to_origin + IVec2::new(mid, last),
        ),
        _ => return None,
    };

    Some(ClusterConnection { from, to, exit, entry, cost })
}
