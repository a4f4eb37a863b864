mod types;
mod cluster;
mod graph;
mod astar;
mod refine;
mod planner;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use types::{
    ChunkCoord, AbstractNode, ClusterConnection, MacroPath, DetailedPath, SearchPhase, Urgency,
    DEFAULT_CHUNK_SIZE, polyline_length,
};
pub use graph::{ChunkGraph, GraphStats};
pub use planner::{HierarchicalPathfinder, PathfinderSettings};
