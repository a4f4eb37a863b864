use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use wayfarer_macros::profile;
use crate::nav::adaptation::{sample_segment, DiscoveryMethod, WorldAdaptation, WorldChange, WorldChangeId};
use crate::nav::config::NavConfig;
use crate::nav::learning::{
    calculate_reward, Experience, MetaAction, NavigationAgent, NavigationState, ObstacleDescriptor,
    ObstacleEncounter, ObstacleKind, PathStatus, Resolution, TripOutcome,
};
use crate::nav::pathfinding::{polyline_length, ChunkCoord, HierarchicalPathfinder, Urgency};
use crate::nav::spatial::{world_to_tile, SpatialIndex, UnitRegistry};

pub type AgentId = u64;

/// Per-request switches on which sources the orchestrator may use.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConstraints {
    pub discovery_method: DiscoveryMethod,
    pub allow_learned_routes: bool,
    pub allow_direct_fallback: bool,
    /// Overrides `NavConfig::learned_route_max_age_ms`.
    pub learned_route_max_age_ms: Option<u64>,
}

impl Default for NavigationConstraints {
    fn default() -> Self {
        Self {
            discovery_method: DiscoveryMethod::Exploration,
            allow_learned_routes: true,
            allow_direct_fallback: true,
            learned_route_max_age_ms: None,
        }
    }
}

#[derive(Message, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub start: Vec2,
    pub destination: Vec2,
    /// Free text, echoed in the reasoning.
    pub purpose: String,
    pub urgency: Urgency,
    pub agent_id: AgentId,
    pub constraints: NavigationConstraints,
}

impl NavigationRequest {
    pub fn new(agent_id: AgentId, start: Vec2, destination: Vec2) -> Self {
        Self {
            start,
            destination,
            purpose: String::new(),
            urgency: Urgency::Normal,
            agent_id,
            constraints: NavigationConstraints::default(),
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn with_constraints(mut self, constraints: NavigationConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Which source produced the returned path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationStrategy {
    /// Alternative found by world adaptation.
    Adapted,
    /// Replayed from the agent's route memory.
    Learned,
    Hierarchical,
    /// Straight line; the planner found nothing.
    DirectFallback,
    /// Path is valid but the agent chose to hold position.
    Wait,
    Abandoned,
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub path: Vec<Vec2>,
    pub strategy: NavigationStrategy,
    pub reasoning: String,
    pub estimated_time: f32,
    pub estimated_cost: f32,
    /// In [0, 1].
    pub confidence: f32,
    pub meta_action: MetaAction,
    pub status: PathStatus,
}

/// What the agent decided for a trip still awaiting its outcome.
#[derive(Clone, Debug)]
struct PendingTrip {
    state: NavigationState,
    action: MetaAction,
    used_alternative: bool,
}

struct Candidate {
    path: Vec<Vec2>,
    strategy: NavigationStrategy,
    status: PathStatus,
    cost: f32,
    confidence: f32,
    reasoning: String,
}

/// Front door of the navigation core.
///
/// # Request Flow
///
/// 1. **Adaptation:** if the straight route crosses an active world change,
///    ask [`WorldAdaptation`] for an alternative
/// 2. **Memory:** replay a learned route for the same endpoints, unless it
///    failed recently or is now blocked
/// 3. **Planner:** run the [`HierarchicalPathfinder`]
/// 4. **Fallback:** a straight `[start, destination]` line, if allowed
///
/// The first source to produce a path wins. The requesting agent then picks
/// a [`MetaAction`] that decides how the path is handed back. The choice is
/// kept until [`Navigator::record_navigation_outcome`] closes the trip.
#[derive(Resource)]
pub struct Navigator {
    pub pathfinder: HierarchicalPathfinder,
    pub adaptation: WorldAdaptation,
    agents: FxHashMap<AgentId, NavigationAgent>,
    pending: FxHashMap<AgentId, PendingTrip>,
    config: NavConfig,
    requests_served: u64,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

impl Navigator {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            pathfinder: HierarchicalPathfinder::from_config(config),
            adaptation: WorldAdaptation::from_config(config),
            agents: FxHashMap::default(),
            pending: FxHashMap::default(),
            config: config.clone(),
            requests_served: 0,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn agent(&self, id: AgentId) -> Option<&NavigationAgent> {
        self.agents.get(&id)
    }

    /// The agent's brain, created on first use with seed `config.seed ^ id`.
    pub fn agent_mut(&mut self, id: AgentId) -> &mut NavigationAgent {
        let config = &self.config;
        self.agents
            .entry(id)
            .or_insert_with(|| NavigationAgent::from_config(config, config.seed ^ id))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    pub fn has_pending_trip(&self, id: AgentId) -> bool {
        self.pending.contains_key(&id)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    #[profile(5)]
    pub fn navigate(&mut self, world: &dyn SpatialIndex, request: &NavigationRequest, now_ms: u64) -> NavigationResult {
        self.requests_served += 1;
        crate::profile_log!(self.requests_served, "[NAV] Served {} requests", self.requests_served);

        let start = request.start;
        let end = request.destination;

        let candidate = self.plan(world, request, now_ms);

        let mut state = NavigationState {
            position: start,
            destination: end,
            nearby_obstacles: self.obstacles_near(start),
            urgency: request.urgency,
            path_status: candidate.status,
        };
        if candidate.path.is_empty() {
            state.path_status = PathStatus::Blocked;
        }

        let action = self.choose_action(request.agent_id, &state, &candidate, now_ms);
        let result = self.apply_action(request, candidate, action, now_ms);

        self.pending.insert(request.agent_id, PendingTrip {
            state,
            action,
            used_alternative: result.strategy == NavigationStrategy::Adapted,
        });

        info!("[NAV] Agent {} {:?} -> {:?}: {:?}/{:?} ({} waypoints, confidence {:.2})",
            request.agent_id, start, end, result.strategy, action, result.path.len(), result.confidence);
        result
    }

    /// Find a path in the fixed order adaptation, memory, planner, fallback.
    fn plan(&mut self, world: &dyn SpatialIndex, request: &NavigationRequest, now_ms: u64) -> Candidate {
        let start = request.start;
        let end = request.destination;
        let constraints = request.constraints;
        let purpose = if request.purpose.is_empty() { "travel" } else { request.purpose.as_str() };

        // 1. World adaptation
        let straight = sample_segment(start, end, self.config.route_sample_step);
        let blockage = self.adaptation.is_route_blocked(start, end, &straight);
        if blockage.blocked {
            if let Some(route) = self.adaptation.find_alternative_route(
                start,
                end,
                &blockage.blocking_changes,
                constraints.discovery_method,
                now_ms,
            ) {
                let path = route.as_ref().clone();
                return Candidate {
                    cost: polyline_length(&path),
                    reasoning: format!(
                        "{}: straight route crosses {} world change(s); {:?} found a detour",
                        purpose, blockage.blocking_changes.len(), constraints.discovery_method
                    ),
                    path,
                    strategy: NavigationStrategy::Adapted,
                    status: PathStatus::Valid,
                    confidence: 0.7,
                };
            }
            debug!("[NAV] No detour around {} changes, trying memory and planner",
                blockage.blocking_changes.len());
        }

        // 2. Route memory
        if constraints.allow_learned_routes {
            let max_age = constraints
                .learned_route_max_age_ms
                .unwrap_or(self.config.learned_route_max_age_ms);
            let agent = self.agent_mut(request.agent_id);
            let learned = (!agent.has_recent_failure(start, end, max_age, now_ms))
                .then(|| agent.get_learned_route(start, end, max_age, now_ms).map(<[Vec2]>::to_vec))
                .flatten();
            if let Some(path) = learned {
                if !self.adaptation.is_route_blocked(start, end, &path).blocked {
                    return Candidate {
                        cost: polyline_length(&path),
                        reasoning: format!("{}: replaying a remembered route", purpose),
                        path,
                        strategy: NavigationStrategy::Learned,
                        status: PathStatus::Valid,
                        confidence: 0.9,
                    };
                }
            }
        }

        // 3. Hierarchical planner
        if let Some(detailed) = self.pathfinder.find_path(world, start, end, request.urgency) {
            let crosses_change = self.adaptation.is_route_blocked(start, end, &detailed.waypoints).blocked;
            let (status, confidence) = match (detailed.complete, crosses_change) {
                (_, true) => (PathStatus::Blocked, 0.3),
                (false, false) => (PathStatus::Partial, 0.5),
                (true, false) => (PathStatus::Valid, 0.8),
            };
            return Candidate {
                path: detailed.waypoints,
                strategy: NavigationStrategy::Hierarchical,
                status,
                cost: detailed.cost,
                confidence,
                reasoning: format!("{}: {}", purpose, detailed.reasoning),
            };
        }

        // 4. Direct fallback
        if constraints.allow_direct_fallback {
            warn!("[NAV] No planned route {:?} -> {:?}, falling back to a straight line", start, end);
            return Candidate {
                path: vec![start, end],
                strategy: NavigationStrategy::DirectFallback,
                status: if blockage.blocked { PathStatus::Blocked } else { PathStatus::Unknown },
                cost: start.distance(end),
                confidence: 0.1,
                reasoning: format!("{}: no route found; heading straight for the destination", purpose),
            };
        }

        Candidate {
            path: Vec::new(),
            strategy: NavigationStrategy::Unreachable,
            status: PathStatus::Blocked,
            cost: 0.0,
            confidence: 0.0,
            reasoning: format!("{}: no route found", purpose),
        }
    }

    fn choose_action(&mut self, agent_id: AgentId, state: &NavigationState, candidate: &Candidate, now_ms: u64) -> MetaAction {
        let available: &[MetaAction] = if candidate.path.is_empty() {
            &[MetaAction::Wait, MetaAction::Abandon]
        } else {
            &MetaAction::ALL
        };

        // A blocked path defers to what worked before around the same obstacle.
        if state.path_status == PathStatus::Blocked && !candidate.path.is_empty() {
            let precedent = self.nearest_change(&candidate.path).and_then(|change| {
                self.agent_mut(agent_id).get_obstacle_strategy(&ObstacleDescriptor {
                    kind: ObstacleKind::WorldChange(change.kind),
                    position: change.position,
                })
            });
            if let Some(action) = precedent {
                debug!("[RL] Agent {} follows precedent {:?} at {}ms", agent_id, action, now_ms);
                return action;
            }
        }

        self.agent_mut(agent_id).select_action(state, available)
    }

    fn apply_action(
        &mut self,
        request: &NavigationRequest,
        candidate: Candidate,
        action: MetaAction,
        now_ms: u64,
    ) -> NavigationResult {
        let Candidate { mut path, mut strategy, mut status, mut cost, mut confidence, mut reasoning } = candidate;

        match action {
            MetaAction::FollowPath => {}
            MetaAction::FindAlternateRoute => {
                let blocking = self
                    .adaptation
                    .is_route_blocked(request.start, request.destination, &path)
                    .blocking_changes;
                if !blocking.is_empty() {
                    if let Some(route) = self.adaptation.find_alternative_route(
                        request.start,
                        request.destination,
                        &blocking,
                        DiscoveryMethod::TrialAndError,
                        now_ms,
                    ) {
                        path = route.as_ref().clone();
                        cost = polyline_length(&path);
                        strategy = NavigationStrategy::Adapted;
                        status = PathStatus::Valid;
                        confidence = confidence.max(0.6);
                        reasoning.push_str("; rerouted around blocking changes");
                    }
                }
            }
            MetaAction::Wait => {
                strategy = NavigationStrategy::Wait;
                reasoning.push_str("; holding position");
            }
            MetaAction::Abandon => {
                path.clear();
                cost = 0.0;
                confidence = 0.0;
                strategy = NavigationStrategy::Abandoned;
                reasoning.push_str("; trip abandoned");
            }
        }

        let length = polyline_length(&path);
        NavigationResult {
            estimated_time: length / self.config.agent_speed.max(f32::EPSILON),
            estimated_cost: cost,
            confidence,
            reasoning,
            meta_action: action,
            status,
            strategy,
            path,
        }
    }

    // ========================================================================
    // Feedback
    // ========================================================================

    /// Close a trip: reward the agent's last decision, store the route in its
    /// memory, and update the alternative-route cache.
    pub fn record_navigation_outcome(
        &mut self,
        agent_id: AgentId,
        start: Vec2,
        end: Vec2,
        path: &[Vec2],
        outcome: &TripOutcome,
        now_ms: u64,
    ) {
        let pending = self.pending.remove(&agent_id).unwrap_or_else(|| PendingTrip {
            state: NavigationState::new(start, end),
            action: MetaAction::FollowPath,
            used_alternative: false,
        });

        let reward = calculate_reward(&pending.state, pending.action, outcome);
        let position = if outcome.reached_destination {
            end
        } else {
            let remaining = outcome.distance_remaining.max(self.config.arrival_distance);
            let back = (start - end).try_normalize().unwrap_or(Vec2::X);
            end + back * remaining
        };
        let next_state = NavigationState {
            position,
            destination: end,
            nearby_obstacles: outcome.obstacles_encountered,
            urgency: pending.state.urgency,
            path_status: if outcome.reached_destination { PathStatus::Valid } else { pending.state.path_status },
        };

        if outcome.obstacles_encountered > 0 {
            if let (Some(change), Some(resolution)) = (self.nearest_change(path), Resolution::from_action(pending.action)) {
                let encounter = ObstacleEncounter {
                    obstacle: ObstacleDescriptor {
                        kind: ObstacleKind::WorldChange(change.kind),
                        position: change.position,
                    },
                    resolution,
                    success: outcome.reached_destination,
                    timestamp_ms: now_ms,
                };
                self.agent_mut(agent_id).record_obstacle_encounter(encounter);
            }
        }

        if pending.used_alternative {
            self.adaptation.record_route_outcome(start, end, outcome.reached_destination);
        }

        info!("[RL] Agent {} trip {:?} -> {:?}: reached={} reward {:.2}",
            agent_id, start, end, outcome.reached_destination, reward);

        self.agent_mut(agent_id).learn(Experience {
            state: pending.state,
            action: pending.action,
            reward,
            next_state,
            route: path.to_vec(),
            timestamp_ms: now_ms,
        });
    }

    // ========================================================================
    // World updates
    // ========================================================================

    pub fn register_world_change(&mut self, change: WorldChange, now_ms: u64) {
        self.adaptation.register_world_change(change, now_ms);
    }

    pub fn remove_world_change(&mut self, id: WorldChangeId) -> Option<WorldChange> {
        self.adaptation.remove_world_change(id)
    }

    pub fn register_dynamic_obstacle(&mut self, pos: Vec2, blocked: bool) {
        self.pathfinder.register_dynamic_obstacle(pos, blocked);
    }

    /// Retune the global chunk size from the crowding and terrain roughness of `region`.
    pub fn adapt_chunk_size(&mut self, world: &dyn SpatialIndex, units: &UnitRegistry, region: ChunkCoord) -> i32 {
        let graph = &self.pathfinder.graph;
        let chunk_size = graph.chunk_size();
        let occupants = units
            .living_units()
            .filter(|unit| region.contains_tile(world_to_tile(unit.position), chunk_size))
            .count();
        let density = (occupants as f32 / self.config.crowd_saturation.max(1.0)).min(1.0);
        let complexity = graph.complexity(world, region, self.config.micro_passability_threshold);

        debug!("[NAV] Region {:?} at chunk size {}: {} units, complexity {:.2}",
            region, chunk_size, occupants, complexity);
        self.pathfinder.optimize_chunk_sizes(region, density, complexity)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn obstacles_near(&self, pos: Vec2) -> u32 {
        let radius = self.config.obstacle_scan_radius;
        let count = self.adaptation.changes_near(pos, radius)
            + self.pathfinder.graph.blocked_tiles_near(pos, radius);
        count as u32
    }

    /// Active change closest to any waypoint of `path` that the path enters.
    fn nearest_change(&self, path: &[Vec2]) -> Option<WorldChange> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return None;
        };
        self.adaptation
            .is_route_blocked(first, last, path)
            .blocking_changes
            .into_iter()
            .next()
    }
}
