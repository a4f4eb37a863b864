use bevy::prelude::*;
use wayfarer_macros::profile;
use crate::nav::config::NavConfig;
use crate::nav::spatial::{SpatialIndex, tile_passability, world_to_tile};
use super::astar::{find_chunk_path, MacroSearch};
use super::graph::ChunkGraph;
use super::refine::{is_walkable, walk_toward};
use super::types::{ChunkCoord, DetailedPath, MacroPath, SearchPhase, Urgency};

/// Tunables copied from [`NavConfig`] when the pathfinder is built.
#[derive(Clone, Debug)]
pub struct PathfinderSettings {
    pub macro_max_expansions: usize,
    pub min_chunk_passability: f32,
    pub micro_passability_threshold: f32,
    pub passability_epsilon: f32,
    pub min_chunk_size: i32,
    pub max_chunk_size: i32,
    pub chunk_shrink_factor: f32,
    pub chunk_grow_factor: f32,
    pub density_threshold: f32,
    pub complexity_threshold: f32,
}

impl From<&NavConfig> for PathfinderSettings {
    fn from(config: &NavConfig) -> Self {
        Self {
            macro_max_expansions: config.macro_max_expansions,
            min_chunk_passability: config.min_chunk_passability,
            micro_passability_threshold: config.micro_passability_threshold,
            passability_epsilon: config.passability_epsilon,
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
            chunk_shrink_factor: config.chunk_shrink_factor,
            chunk_grow_factor: config.chunk_grow_factor,
            density_threshold: config.density_threshold,
            complexity_threshold: config.complexity_threshold,
        }
    }
}

/// Two-phase planner: A* over chunks, then a greedy tile walk inside each
/// chunk on the route.
///
/// Fine-grained search never runs outside the chunks the macro path visits,
/// so planning cost scales with route length rather than world size. The
/// only state kept between calls is the [`ChunkGraph`] cache.
#[derive(Clone, Debug)]
pub struct HierarchicalPathfinder {
    pub graph: ChunkGraph,
    pub settings: PathfinderSettings,
    phase: SearchPhase,
}

impl Default for HierarchicalPathfinder {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

impl HierarchicalPathfinder {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            graph: ChunkGraph::new(config.chunk_size, config.max_chunk_samples, config.passability_epsilon),
            settings: PathfinderSettings::from(config),
            phase: SearchPhase::Idle,
        }
    }

    /// Phase reached by the most recent `find_path` call.
    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Plan a route from `start` to `end`.
    ///
    /// Returns `None` when no chunk route exists or refinement could not leave
    /// the start tile. A stalled refinement that made progress yields a path
    /// with `complete == false`.
    #[profile(2)]
    pub fn find_path(
        &mut self,
        world: &dyn SpatialIndex,
        start: Vec2,
        end: Vec2,
        urgency: Urgency,
    ) -> Option<DetailedPath> {
        let start_tile = world_to_tile(start);
        let end_tile = world_to_tile(end);

        if start_tile == end_tile {
            let waypoints = if start == end { vec![start] } else { vec![start, end] };
            let cost = self.path_cost(world, &waypoints);
            self.phase = SearchPhase::Done;
            return Some(DetailedPath {
                waypoints,
                chunks: vec![self.graph.chunk_of(start)],
                cost,
                reasoning: "Start and destination share a tile".to_string(),
                complete: true,
            });
        }

        self.phase = SearchPhase::MacroSearching;
        let Some(macro_path) = self.macro_search(world, start, end, urgency) else {
            info!("[HPA] No chunk route from {:?} to {:?}", start, end);
            self.phase = SearchPhase::Failed;
            return None;
        };

        self.phase = SearchPhase::MicroRefining;
        let (tiles, complete) = self.refine(world, &macro_path, start_tile, end_tile);

        if tiles.len() <= 1 {
            debug!("[HPA] Refinement made no progress from {:?}", start_tile);
            self.phase = SearchPhase::Failed;
            return None;
        }

        let mut waypoints: Vec<Vec2> = tiles.iter().map(|t| t.as_vec2()).collect();
        waypoints[0] = start;
        if complete {
            if let Some(last) = waypoints.last_mut() {
                *last = end;
            }
        }

        let cost = self.path_cost(world, &waypoints);
        let reasoning = if complete {
            format!(
                "Macro route over {} chunks (est. {:.1}), refined to {} waypoints",
                macro_path.chunks.len(), macro_path.cost, waypoints.len()
            )
        } else {
            format!(
                "Macro route over {} chunks; refinement stalled after {} waypoints",
                macro_path.chunks.len(), waypoints.len()
            )
        };

        self.phase = SearchPhase::Done;
        Some(DetailedPath {
            waypoints,
            chunks: macro_path.chunks,
            cost,
            reasoning,
            complete,
        })
    }

    /// Chunk-level route with boundary crossings between consecutive chunks.
    pub fn macro_search(
        &mut self,
        world: &dyn SpatialIndex,
        start: Vec2,
        end: Vec2,
        urgency: Urgency,
    ) -> Option<MacroPath> {
        let start_chunk = self.graph.chunk_of(start);
        let goal_chunk = self.graph.chunk_of(end);

        if start_chunk == goal_chunk {
            self.graph.ensure_node(world, start_chunk);
            return Some(MacroPath {
                chunks: vec![start_chunk],
                connections: Vec::new(),
                cost: 0.0,
            });
        }

        let search = MacroSearch {
            urgency,
            max_expansions: self.settings.macro_max_expansions,
            min_passability: self.settings.min_chunk_passability,
        };
        let (chunks, cost) = find_chunk_path(&mut self.graph, world, start_chunk, goal_chunk, search)?;

        let mut connections = Vec::with_capacity(chunks.len().saturating_sub(1));
        for pair in chunks.windows(2) {
            connections.push(self.graph.connection(world, pair[0], pair[1])?);
        }

        Some(MacroPath { chunks, connections, cost })
    }

    /// Walk each chunk of `macro_path` in order. Returns the visited tiles
    /// (starting with `start_tile`) and whether the destination was reached.
    fn refine(
        &self,
        world: &dyn SpatialIndex,
        macro_path: &MacroPath,
        start_tile: IVec2,
        end_tile: IVec2,
    ) -> (Vec<IVec2>, bool) {
        let threshold = self.settings.micro_passability_threshold;
        let max_steps = (2 * self.graph.chunk_size()).max(1) as usize;
        let last_index = macro_path.chunks.len() - 1;

        let mut tiles = vec![start_tile];
        let mut current = start_tile;

        for (i, chunk) in macro_path.chunks.iter().enumerate() {
            if i > 0 {
                let entry = macro_path.connections[i - 1].entry;
                if (entry - current).abs().element_sum() == 1 && is_walkable(world, &self.graph, entry, threshold) {
                    tiles.push(entry);
                    current = entry;
                }
            }

            let target = if i == last_index {
                end_tile
            } else {
                macro_path.connections[i].exit
            };

            let walk = walk_toward(world, &self.graph, current, target, max_steps, threshold);
            for tile in walk.tiles {
                if tiles.last() != Some(&tile) {
                    tiles.push(tile);
                }
            }
            current = *tiles.last().unwrap_or(&start_tile);

            if !walk.reached {
                debug!("[HPA] Refinement truncated in chunk {:?} at {:?}", chunk, current);
                return (tiles, false);
            }
        }

        (tiles, current == end_tile)
    }

    /// Sum of segment lengths, each divided by the passability of the tile it enters.
    pub fn path_cost(&self, world: &dyn SpatialIndex, waypoints: &[Vec2]) -> f32 {
        let eps = self.settings.passability_epsilon.max(f32::EPSILON);
        waypoints
            .windows(2)
            .map(|w| {
                let passability = tile_passability(world, world_to_tile(w[1])).max(eps);
                w[0].distance(w[1]) / passability
            })
            .sum()
    }

    // ------------------------------------------------------------------------
    // World updates
    // ------------------------------------------------------------------------

    pub fn register_dynamic_obstacle(&mut self, pos: Vec2, blocked: bool) {
        self.graph.register_dynamic_obstacle(pos, blocked);
    }

    /// Shrink the global chunk size where the world is crowded or rugged,
    /// grow it elsewhere. `region` only identifies the caller's area for
    /// logging; the knob is global. Returns the new chunk size.
    pub fn optimize_chunk_sizes(&mut self, region: ChunkCoord, density: f32, complexity: f32) -> i32 {
        let s = &self.settings;
        let current = self.graph.chunk_size();

        let next = if density > s.density_threshold || complexity > s.complexity_threshold {
            ((current as f32 * s.chunk_shrink_factor) as i32).max(s.min_chunk_size)
        } else {
            ((current as f32 * s.chunk_grow_factor) as i32).min(s.max_chunk_size)
        };

        if next != current {
            info!("[HPA] Region {:?} (density {:.2}, complexity {:.2}): chunk size {} -> {}",
                region, density, complexity, current, next);
            self.graph.set_chunk_size(next);
        }
        next
    }
}
