//! Read-only world queries consumed by the navigation core.
//!
//! The terrain store and the unit registry belong to the embedding
//! simulation. The core only needs passability lookups and a snapshot of
//! active units, expressed here as the [`SpatialIndex`] trait and the
//! [`UnitRegistry`] resource.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Terrain data for a single tile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    /// Ease of traversal in [0, 1]. `None` means the terrain source has no
    /// opinion and the tile counts as fully passable.
    pub passability: Option<f32>,
    pub elevation: f32,
    pub resource: Option<String>,
    pub is_chokepoint: bool,
}

impl TileInfo {
    pub fn with_passability(passability: f32) -> Self {
        Self {
            passability: Some(passability),
            ..Default::default()
        }
    }

    #[inline]
    pub fn effective_passability(&self) -> f32 {
        self.passability.unwrap_or(1.0).clamp(0.0, 1.0)
    }
}

/// Tile lookup interface backed by the world-streaming layer.
///
/// Returning `None` means the tile is not loaded or lies outside the world;
/// callers treat that as impassable terrain.
pub trait SpatialIndex: Send + Sync {
    fn tile(&self, x: i32, y: i32) -> Option<TileInfo>;

    /// The four axis-aligned neighbours that exist.
    fn adjacent_tiles(&self, x: i32, y: i32) -> SmallVec<[(IVec2, TileInfo); 4]> {
        [IVec2::X, IVec2::NEG_X, IVec2::Y, IVec2::NEG_Y]
            .into_iter()
            .filter_map(|offset| {
                let pos = IVec2::new(x, y) + offset;
                self.tile(pos.x, pos.y).map(|tile| (pos, tile))
            })
            .collect()
    }

    /// All loaded tiles within a Chebyshev radius of `center`.
    fn tiles_in_range(&self, center: IVec2, radius: i32) -> Vec<(IVec2, TileInfo)> {
        let mut tiles = Vec::new();
        for y in (center.y - radius)..=(center.y + radius) {
            for x in (center.x - radius)..=(center.x + radius) {
                if let Some(tile) = self.tile(x, y) {
                    tiles.push((IVec2::new(x, y), tile));
                }
            }
        }
        tiles
    }
}

/// Passability of a tile, with unloaded tiles reported as 0.
#[inline]
pub fn tile_passability(world: &dyn SpatialIndex, tile: IVec2) -> f32 {
    world
        .tile(tile.x, tile.y)
        .map(|t| t.effective_passability())
        .unwrap_or(0.0)
}

/// World position to the tile containing it.
#[inline]
pub fn world_to_tile(pos: Vec2) -> IVec2 {
    IVec2::new(pos.x.floor() as i32, pos.y.floor() as i32)
}

/// Dense, bounded tile store.
///
/// Used by the demo binary and tests; production worlds implement
/// [`SpatialIndex`] over their own chunk storage.
#[derive(Clone, Debug, Default)]
pub struct TileGrid {
    pub width: usize,
    pub height: usize,
    tiles: Vec<TileInfo>,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, passability: f32) -> Self {
        Self {
            width,
            height,
            tiles: vec![TileInfo::with_passability(passability); width * height],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: TileInfo) {
        if let Some(idx) = self.index(x, y) {
            self.tiles[idx] = tile;
        }
    }

    pub fn set_passability(&mut self, x: i32, y: i32, passability: f32) {
        if let Some(idx) = self.index(x, y) {
            self.tiles[idx].passability = Some(passability);
        }
    }

    /// Set passability for every tile in the inclusive rectangle `min..=max`.
    pub fn fill_rect(&mut self, min: IVec2, max: IVec2, passability: f32) {
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                self.set_passability(x, y, passability);
            }
        }
    }
}

impl SpatialIndex for TileGrid {
    fn tile(&self, x: i32, y: i32) -> Option<TileInfo> {
        self.index(x, y).map(|idx| self.tiles[idx].clone())
    }
}

/// The world the navigation systems query. Embedders replace the default
/// empty grid with their own index.
#[derive(Resource)]
pub struct NavWorld(pub Box<dyn SpatialIndex>);

impl NavWorld {
    pub fn new(index: impl SpatialIndex + 'static) -> Self {
        Self(Box::new(index))
    }
}

impl Default for NavWorld {
    fn default() -> Self {
        Self::new(TileGrid::default())
    }
}

// ============================================================================
// Unit Registry
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u64,
    pub position: Vec2,
    pub owner: u32,
    pub health: f32,
}

/// Read-only snapshot of active units, refreshed by the simulation each tick.
#[derive(Resource, Default, Clone, Debug)]
pub struct UnitRegistry {
    pub units: Vec<UnitSnapshot>,
}

impl UnitRegistry {
    /// Units with health left.
    pub fn living_units(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.units.iter().filter(|u| u.health > 0.0)
    }
}
