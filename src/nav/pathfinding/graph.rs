use bevy::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use crate::nav::spatial::{SpatialIndex, world_to_tile};
use super::cluster::{boundary_connection, sample_chunk_complexity, sample_chunk_passability};
use super::types::{AbstractNode, ChunkCoord, ClusterConnection, Urgency, DEFAULT_CHUNK_SIZE};

/// Lazily built abstract graph with one node per chunk.
///
/// # Architecture
///
/// 1. **Chunking:** world tiles are grouped into `chunk_size × chunk_size` squares
/// 2. **Nodes:** a chunk gets an [`AbstractNode`] the first time a search touches it
/// 3. **Passability:** each node caches the mean of at most `max_samples` tile samples
/// 4. **Edges:** implicit 4-connectivity; costs and boundary points are computed per query
///
/// Nothing is precomputed, so the graph works over worlds that are only
/// partially streamed in. Chunks the spatial index cannot answer for sample
/// as passability 0 and macro search routes around them.
///
/// # Dynamic Obstacles
///
/// Tile-level blocks are kept in a per-chunk blocklist. Toggling one drops the
/// owning node's cached passability so the next search resamples it. There is
/// no incremental repair; resampling a chunk is at most `max_samples` lookups.
///
/// # Chunk Size
///
/// The chunk size is a single global knob. Changing it flushes every cached
/// node, because chunk coordinates change meaning with it.
#[derive(Clone, Debug)]
pub struct ChunkGraph {
    chunk_size: i32,
    max_samples: usize,
    epsilon: f32,
    nodes: FxHashMap<ChunkCoord, AbstractNode>,
    blocked_tiles: FxHashMap<ChunkCoord, FxHashSet<IVec2>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub cached_nodes: usize,
    pub blocked_tiles: usize,
    pub chunk_size: i32,
}

impl Default for ChunkGraph {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, 100, 0.001)
    }
}

impl ChunkGraph {
    pub fn new(chunk_size: i32, max_samples: usize, epsilon: f32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_samples: max_samples.max(1),
            epsilon,
            nodes: FxHashMap::default(),
            blocked_tiles: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_of(&self, pos: Vec2) -> ChunkCoord {
        self.chunk_of_tile(world_to_tile(pos))
    }

    #[inline]
    pub fn chunk_of_tile(&self, tile: IVec2) -> ChunkCoord {
        ChunkCoord::new(tile.x.div_euclid(self.chunk_size), tile.y.div_euclid(self.chunk_size))
    }

    /// Return the node for `chunk`, sampling its passability if it is not cached.
    ///
    /// Idempotent: a cached, valid node is returned untouched.
    pub fn ensure_node(&mut self, world: &dyn SpatialIndex, chunk: ChunkCoord) -> &AbstractNode {
        let chunk_size = self.chunk_size;
        let node = self
            .nodes
            .entry(chunk)
            .or_insert_with(|| AbstractNode::new(chunk, chunk_size));

        if node.passability.is_none() {
            let sampled = sample_chunk_passability(
                world,
                chunk,
                chunk_size,
                self.max_samples,
                self.blocked_tiles.get(&chunk),
            );
            debug!("[HPA] Sampled chunk {:?}: passability {:.3}", chunk, sampled);
            node.passability = Some(sampled);
        }
        node
    }

    pub fn passability(&mut self, world: &dyn SpatialIndex, chunk: ChunkCoord) -> f32 {
        self.ensure_node(world, chunk).passability.unwrap_or(0.0)
    }

    /// Cached node, if any. Does not sample.
    pub fn node(&self, chunk: ChunkCoord) -> Option<&AbstractNode> {
        self.nodes.get(&chunk)
    }

    /// The four axis-aligned neighbours. No bounds check; callers filter by passability.
    pub fn neighbors(&self, chunk: ChunkCoord) -> [ChunkCoord; 4] {
        chunk.neighbors()
    }

    pub fn edge_cost(
        &mut self,
        world: &dyn SpatialIndex,
        from: ChunkCoord,
        to: ChunkCoord,
        urgency: Urgency,
    ) -> f32 {
        let eps = self.epsilon;
        let from_p = self.passability(world, from);
        let to_p = self.passability(world, to);
        (1.0 / (from_p + eps) + 1.0 / (to_p + eps)) * urgency.edge_cost_multiplier()
    }

    /// Drop the cached passability of `chunk`. The node itself stays cached.
    pub fn invalidate(&mut self, chunk: ChunkCoord) {
        if let Some(node) = self.nodes.get_mut(&chunk) {
            node.invalidate();
        }
    }

    pub fn connection(
        &mut self,
        world: &dyn SpatialIndex,
        from: ChunkCoord,
        to: ChunkCoord,
    ) -> Option<ClusterConnection> {
        let cost = self.edge_cost(world, from, to, Urgency::Normal);
        boundary_connection(from, to, self.chunk_size, cost)
    }

    // ------------------------------------------------------------------------
    // Dynamic obstacles
    // ------------------------------------------------------------------------

    /// Add (`blocked = true`) or clear a tile-level block at `pos`.
    pub fn register_dynamic_obstacle(&mut self, pos: Vec2, blocked: bool) {
        let tile = world_to_tile(pos);
        let chunk = self.chunk_of_tile(tile);

        if blocked {
            self.blocked_tiles.entry(chunk).or_default().insert(tile);
        } else if let Some(set) = self.blocked_tiles.get_mut(&chunk) {
            set.remove(&tile);
            if set.is_empty() {
                self.blocked_tiles.remove(&chunk);
            }
        }

        self.invalidate(chunk);
        debug!("[HPA] Dynamic obstacle at {:?} -> {} (chunk {:?})", tile, blocked, chunk);
    }

    pub fn is_tile_blocked(&self, tile: IVec2) -> bool {
        self.blocked_tiles
            .get(&self.chunk_of_tile(tile))
            .is_some_and(|set| set.contains(&tile))
    }

    /// Number of dynamically blocked tiles within `radius` of `pos`.
    pub fn blocked_tiles_near(&self, pos: Vec2, radius: f32) -> usize {
        self.blocked_tiles
            .values()
            .flatten()
            .filter(|tile| tile.as_vec2().distance(pos) <= radius)
            .count()
    }

    /// Fraction of the chunk's sampled tiles that are rough terrain. Not cached.
    pub fn complexity(&self, world: &dyn SpatialIndex, chunk: ChunkCoord, rough_below: f32) -> f32 {
        sample_chunk_complexity(world, chunk, self.chunk_size, self.max_samples, rough_below)
    }

    // ------------------------------------------------------------------------
    // Chunk size
    // ------------------------------------------------------------------------

    /// Replace the global chunk size, flushing cached nodes and rekeying blocklists.
    pub fn set_chunk_size(&mut self, chunk_size: i32) {
        let chunk_size = chunk_size.max(1);
        if chunk_size == self.chunk_size {
            return;
        }

        info!("[HPA] Chunk size {} -> {}, flushing {} cached nodes",
            self.chunk_size, chunk_size, self.nodes.len());

        self.chunk_size = chunk_size;
        self.nodes.clear();

        let tiles: Vec<IVec2> = self.blocked_tiles.drain().flat_map(|(_, set)| set).collect();
        for tile in tiles {
            let chunk = self.chunk_of_tile(tile);
            self.blocked_tiles.entry(chunk).or_default().insert(tile);
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            cached_nodes: self.nodes.len(),
            blocked_tiles: self.blocked_tiles.values().map(|s| s.len()).sum(),
            chunk_size: self.chunk_size,
        }
    }
}
