use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default edge length of a chunk in world units.
pub const DEFAULT_CHUNK_SIZE: i32 = 32;

/// Integer coordinate of a square chunk of the world.
///
/// Derived from world coordinates by floor-division with the current chunk
/// size, so negative positions map to negative chunks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// North, east, south, west. No diagonals.
    pub fn neighbors(self) -> [ChunkCoord; 4] {
        [
            ChunkCoord::new(self.x, self.y + 1),
            ChunkCoord::new(self.x + 1, self.y),
            ChunkCoord::new(self.x, self.y - 1),
            ChunkCoord::new(self.x - 1, self.y),
        ]
    }

    #[inline]
    pub fn manhattan(self, other: ChunkCoord) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Tile coordinate of the chunk's bottom-left corner.
    #[inline]
    pub fn origin(self, chunk_size: i32) -> IVec2 {
        IVec2::new(self.x * chunk_size, self.y * chunk_size)
    }

    pub fn contains_tile(self, tile: IVec2, chunk_size: i32) -> bool {
        tile.x.div_euclid(chunk_size) == self.x && tile.y.div_euclid(chunk_size) == self.y
    }
}

/// How pressing a trip is.
///
/// Scales both the macro edge cost (urgent agents accept rough terrain) and
/// the learning reward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Critical,
    High,
    #[default]
    Normal,
    Low,
    Leisure,
}

impl Urgency {
    pub fn edge_cost_multiplier(self) -> f32 {
        match self {
            Urgency::Critical => 0.5,
            Urgency::Low | Urgency::Leisure => 1.2,
            Urgency::High | Urgency::Normal => 1.0,
        }
    }

    pub fn reward_multiplier(self) -> f32 {
        match self {
            Urgency::Critical => 2.0,
            Urgency::High => 1.5,
            Urgency::Normal => 1.0,
            Urgency::Low => 0.9,
            Urgency::Leisure => 0.8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Normal => "normal",
            Urgency::Low => "low",
            Urgency::Leisure => "leisure",
        }
    }
}

/// Coarse node of the abstract graph, one per chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbstractNode {
    pub chunk: ChunkCoord,
    /// Chunk center in world space.
    pub center: Vec2,
    /// Mean sampled passability. `None` after invalidation until resampled.
    pub passability: Option<f32>,
    /// Node ids of the four adjacent chunks. Node ids are chunk coordinates.
    pub neighbors: [ChunkCoord; 4],
}

/// Directed boundary crossing between two adjacent chunks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterConnection {
    pub from: ChunkCoord,
    pub to: ChunkCoord,
    /// Last tile inside `from`.
    pub exit: IVec2,
    /// First tile inside `to`.
    pub entry: IVec2,
    pub cost: f32,
}

/// Chunk-level route produced by macro search.
#[derive(Clone, Debug, Default)]
pub struct MacroPath {
    pub chunks: Vec<ChunkCoord>,
    pub connections: Vec<ClusterConnection>,
    pub cost: f32,
}

/// Dense route returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailedPath {
    /// Never empty.
    pub waypoints: Vec<Vec2>,
    pub chunks: Vec<ChunkCoord>,
    pub cost: f32,
    pub reasoning: String,
    /// False when micro refinement stalled before the destination.
    pub complete: bool,
}

impl DetailedPath {
    pub fn length(&self) -> f32 {
        polyline_length(&self.waypoints)
    }

    pub fn destination(&self) -> Option<Vec2> {
        self.waypoints.last().copied()
    }
}

pub fn polyline_length(points: &[Vec2]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Phases of a single `find_path` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchPhase {
    #[default]
    Idle,
    MacroSearching,
    MicroRefining,
    Done,
    Failed,
}

/// Open-set entry for macro A*. Lowest f-score pops first.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) struct State {
    pub cost: f32,
    pub chunk: ChunkCoord,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost)
            .then_with(|| self.chunk.x.cmp(&other.chunk.x))
            .then_with(|| self.chunk.y.cmp(&other.chunk.y))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
