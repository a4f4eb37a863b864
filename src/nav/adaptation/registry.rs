use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;
use wayfarer_macros::profile;
use crate::nav::config::NavConfig;
use crate::nav::pathfinding::polyline_length;
use super::discovery::{score_route, DiscoveryContext, DiscoverySettings};
use super::types::{
    AlternativeRoute, BlockageReport, DiscoveryMethod, RouteDiscovery, RouteKey, WorldChange, WorldChangeId,
};

/// Registry of active world changes plus the caches that gate routes through them.
///
/// # Blockage Model
///
/// Blockage is area based. Registering a change marks every area cell its
/// circle overlaps, and every route key it names explicitly. A route is
/// blocked when one of its waypoints falls in a marked area (or the route
/// key is marked) *and* that waypoint lies inside the change's radius.
///
/// # Alternatives
///
/// Discovered alternatives are cached per route key and reused while they
/// stay clear of every active change. Removing a change drops the
/// alternatives computed against it.
pub struct WorldAdaptation {
    changes: FxHashMap<WorldChangeId, WorldChange>,
    blocked_areas: FxHashMap<IVec2, SmallVec<[WorldChangeId; 4]>>,
    blocked_routes: FxHashMap<RouteKey, SmallVec<[WorldChangeId; 4]>>,
    alternative_routes: FxHashMap<RouteKey, AlternativeRoute>,
    discoveries: FxHashMap<RouteKey, VecDeque<RouteDiscovery>>,
    settings: DiscoverySettings,
    area_size: f32,
    discovery_log_cap: usize,
    rng: StdRng,
}

impl Default for WorldAdaptation {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

impl WorldAdaptation {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            changes: FxHashMap::default(),
            blocked_areas: FxHashMap::default(),
            blocked_routes: FxHashMap::default(),
            alternative_routes: FxHashMap::default(),
            discoveries: FxHashMap::default(),
            settings: DiscoverySettings::from(config),
            area_size: config.blockage_area_size.max(1.0),
            discovery_log_cap: config.discovery_log_cap,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    #[inline]
    fn area_of(&self, pos: Vec2) -> IVec2 {
        (pos / self.area_size).floor().as_ivec2()
    }

    fn areas_covered(&self, change: &WorldChange) -> impl Iterator<Item = IVec2> {
        let min = self.area_of(change.position - Vec2::splat(change.radius));
        let max = self.area_of(change.position + Vec2::splat(change.radius));
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| IVec2::new(x, y)))
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Store `change` and mark the areas and routes it blocks. Re-registering
    /// an id replaces the previous change.
    pub fn register_world_change(&mut self, mut change: WorldChange, now_ms: u64) {
        if self.changes.contains_key(&change.id) {
            self.remove_world_change(change.id);
        }
        change.registered_at_ms = now_ms;

        let id = change.id;
        let areas: Vec<IVec2> = self.areas_covered(&change).collect();
        for area in areas {
            self.blocked_areas.entry(area).or_default().push(id);
        }
        for route in &change.affected_routes {
            self.blocked_routes
                .entry(RouteKey::new(route.start, route.end))
                .or_default()
                .push(id);
        }

        info!("[ADAPT] Registered {:?} {:?} at {:?} (radius {:.1}, duration {}ms)",
            change.kind, id, change.position, change.radius, change.duration_ms);
        self.changes.insert(id, change);
    }

    /// Forget a change, its area and route markers, and any alternatives built around it.
    pub fn remove_world_change(&mut self, id: WorldChangeId) -> Option<WorldChange> {
        let change = self.changes.remove(&id)?;

        self.blocked_areas.retain(|_, ids| {
            ids.retain(|other| *other != id);
            !ids.is_empty()
        });
        self.blocked_routes.retain(|_, ids| {
            ids.retain(|other| *other != id);
            !ids.is_empty()
        });
        self.alternative_routes.retain(|_, alt| !alt.avoided.contains(&id));

        info!("[ADAPT] Removed {:?} {:?}", change.kind, id);
        Some(change)
    }

    /// Remove every finite change whose duration has elapsed at `now_ms`.
    pub fn expire(&mut self, now_ms: u64) -> Vec<WorldChangeId> {
        let mut expired: Vec<WorldChangeId> = self
            .active_changes()
            .filter(|c| c.expires_at_ms().is_some_and(|at| at <= now_ms))
            .map(|c| c.id)
            .collect();
        expired.sort();

        for id in &expired {
            self.remove_world_change(*id);
        }
        if !expired.is_empty() {
            debug!("[ADAPT] Expired {} world changes at {}ms", expired.len(), now_ms);
        }
        expired
    }

    pub fn change(&self, id: WorldChangeId) -> Option<&WorldChange> {
        self.changes.get(&id)
    }

    pub fn active_changes(&self) -> impl Iterator<Item = &WorldChange> {
        self.changes.values()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Active changes whose area reaches within `range` of `pos`.
    pub fn changes_near(&self, pos: Vec2, range: f32) -> usize {
        self.active_changes()
            .filter(|c| c.position.distance(pos) <= c.radius + range)
            .count()
    }

    // ------------------------------------------------------------------------
    // Blockage
    // ------------------------------------------------------------------------

    /// Check whether the route from `start` to `end` through `waypoints` is blocked.
    ///
    /// An empty waypoint list checks the two endpoints.
    pub fn is_route_blocked(&self, start: Vec2, end: Vec2, waypoints: &[Vec2]) -> BlockageReport {
        let endpoints = [start, end];
        let points: &[Vec2] = if waypoints.is_empty() { &endpoints } else { waypoints };

        let mut candidates: SmallVec<[WorldChangeId; 8]> = SmallVec::new();
        if let Some(ids) = self.blocked_routes.get(&RouteKey::new(start, end)) {
            candidates.extend(ids.iter().copied());
        }
        for point in points {
            if let Some(ids) = self.blocked_areas.get(&self.area_of(*point)) {
                candidates.extend(ids.iter().copied());
            }
        }
        if candidates.is_empty() {
            return BlockageReport::default();
        }
        candidates.sort();
        candidates.dedup();

        let blocking_changes: Vec<WorldChange> = candidates
            .iter()
            .filter_map(|id| self.changes.get(id))
            .filter(|change| points.iter().any(|p| change.contains(*p)))
            .cloned()
            .collect();

        BlockageReport {
            blocked: !blocking_changes.is_empty(),
            blocking_changes,
        }
    }

    // ------------------------------------------------------------------------
    // Alternatives
    // ------------------------------------------------------------------------

    /// A cached alternative stays usable while no active change touches it.
    /// Changes covering `start` or `end` are ignored.
    fn alternative_still_clear(&self, start: Vec2, end: Vec2, waypoints: &[Vec2]) -> bool {
        self.is_route_blocked(start, end, waypoints)
            .blocking_changes
            .iter()
            .all(|change| change.contains(start) || change.contains(end))
    }

    /// Find a route from `start` to `end` that avoids `blocking`.
    ///
    /// A cached alternative is returned as-is (the same `Arc`) while it is not
    /// blocked. Otherwise `method`'s strategy runs; a result is cached and
    /// logged as a [`RouteDiscovery`]. Returns `None` when discovery fails.
    #[profile(2)]
    pub fn find_alternative_route(
        &mut self,
        start: Vec2,
        end: Vec2,
        blocking: &[WorldChange],
        method: DiscoveryMethod,
        now_ms: u64,
    ) -> Option<Arc<Vec<Vec2>>> {
        let key = RouteKey::new(start, end);

        if let Some(cached) = self.alternative_routes.get(&key) {
            let waypoints = Arc::clone(&cached.waypoints);
            if self.alternative_still_clear(start, end, &waypoints) {
                debug!("[ADAPT] Reusing cached alternative for {:?}", key);
                return Some(waypoints);
            }
            self.alternative_routes.remove(&key);
        }

        let strategy = method.strategy();
        let mut ctx = DiscoveryContext {
            settings: &self.settings,
            rng: &mut self.rng,
        };
        let Some(route) = strategy(&mut ctx, start, end, blocking) else {
            warn!("[ADAPT] {:?} found no alternative for {:?} around {} changes",
                method, key, blocking.len());
            return None;
        };

        let score = score_route(&route, blocking, self.settings.avoidance_offset);
        let old_route = vec![start, end];
        let new_length = polyline_length(&route);
        let efficiency = if new_length > 0.0 {
            polyline_length(&old_route) / new_length
        } else {
            1.0
        };

        let waypoints = Arc::new(route);
        self.alternative_routes.insert(key, AlternativeRoute {
            waypoints: Arc::clone(&waypoints),
            avoided: blocking.iter().map(|c| c.id).collect(),
            method,
            score,
            successes: 0,
        });

        let log = self.discoveries.entry(key).or_default();
        log.push_back(RouteDiscovery {
            method,
            old_route,
            new_route: waypoints.as_ref().clone(),
            efficiency,
            timestamp_ms: now_ms,
        });
        while log.len() > self.discovery_log_cap {
            log.pop_front();
        }

        info!("[ADAPT] {:?} discovered {} waypoint alternative for {:?} (efficiency {:.2})",
            method, waypoints.len(), key, efficiency);
        Some(waypoints)
    }

    pub fn cached_alternative(&self, start: Vec2, end: Vec2) -> Option<&AlternativeRoute> {
        self.alternative_routes.get(&RouteKey::new(start, end))
    }

    pub fn discoveries(&self, start: Vec2, end: Vec2) -> impl Iterator<Item = &RouteDiscovery> {
        self.discoveries
            .get(&RouteKey::new(start, end))
            .into_iter()
            .flat_map(|log| log.iter())
    }

    /// Feed a trip outcome back into the alternative cache: a success counts
    /// toward the cached route, a failure evicts it.
    pub fn record_route_outcome(&mut self, start: Vec2, end: Vec2, reached: bool) {
        let key = RouteKey::new(start, end);
        if reached {
            if let Some(alt) = self.alternative_routes.get_mut(&key) {
                alt.successes += 1;
            }
        } else if self.alternative_routes.remove(&key).is_some() {
            debug!("[ADAPT] Evicted failed alternative for {:?}", key);
        }
    }
}

/// Points every `step` units along the segment `start..=end`.
pub fn sample_segment(start: Vec2, end: Vec2, step: f32) -> Vec<Vec2> {
    let length = start.distance(end);
    let segments = (length / step.max(f32::EPSILON)).ceil().max(1.0) as usize;
    (0..=segments)
        .map(|i| start.lerp(end, i as f32 / segments as f32))
        .collect()
}
