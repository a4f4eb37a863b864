use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use crate::nav::config::NavConfig;
use super::memory::{
    FailedRoute, FailureReason, NavigationMemory, ObstacleDescriptor, ObstacleEncounter, ObstacleKind,
    Resolution, SuccessfulRoute,
};
use super::qtable::QTable;
use super::state::{MetaAction, NavigationState, PathStatus, StateKey};

/// One step of experience fed to [`NavigationAgent::learn`].
#[derive(Clone, Debug)]
pub struct Experience {
    pub state: NavigationState,
    pub action: MetaAction,
    pub reward: f32,
    pub next_state: NavigationState,
    /// Waypoints travelled, stored on success.
    pub route: Vec<Vec2>,
    pub timestamp_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub learning_rate: f32,
    pub discount_factor: f32,
    pub initial_exploration_rate: f32,
    pub exploration_decay: f32,
    pub min_exploration_rate: f32,
    pub replay_capacity: usize,
    pub q_table_capacity: Option<usize>,
    pub position_bucket: f32,
    pub distance_bucket: f32,
    pub successful_route_cap: usize,
    pub failed_route_cap: usize,
    pub obstacle_encounter_cap: usize,
    /// Max distance between query and stored endpoints for a route to match.
    pub route_match_threshold: f32,
    pub arrival_distance: f32,
    pub obstacle_precedent_radius: f32,
}

impl From<&NavConfig> for AgentSettings {
    fn from(config: &NavConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            initial_exploration_rate: config.initial_exploration_rate,
            exploration_decay: config.exploration_decay,
            min_exploration_rate: config.min_exploration_rate,
            replay_capacity: config.replay_capacity,
            q_table_capacity: config.q_table_capacity,
            position_bucket: config.position_bucket,
            distance_bucket: config.distance_bucket,
            successful_route_cap: config.successful_route_cap,
            failed_route_cap: config.failed_route_cap,
            obstacle_encounter_cap: config.obstacle_encounter_cap,
            route_match_threshold: config.route_match_threshold,
            arrival_distance: config.arrival_distance,
            obstacle_precedent_radius: config.obstacle_precedent_radius,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AgentStats {
    pub q_states: usize,
    pub exploration_rate: f32,
    pub experiences: usize,
    pub successes: usize,
    pub failures: usize,
}

/// Per-agent tabular Q-learner plus route memory.
///
/// The agent never fails: unseen states, empty memory and missing
/// precedents all resolve to a neutral answer.
pub struct NavigationAgent {
    settings: AgentSettings,
    q_table: QTable,
    exploration_rate: f32,
    replay: VecDeque<Experience>,
    memory: NavigationMemory,
    rng: StdRng,
}

impl NavigationAgent {
    pub fn new(settings: AgentSettings, seed: u64) -> Self {
        Self {
            q_table: QTable::new(settings.q_table_capacity),
            exploration_rate: settings.initial_exploration_rate,
            replay: VecDeque::with_capacity(settings.replay_capacity.min(1024)),
            memory: NavigationMemory::with_caps(
                settings.successful_route_cap,
                settings.failed_route_cap,
                settings.obstacle_encounter_cap,
            ),
            rng: StdRng::seed_from_u64(seed),
            settings,
        }
    }

    pub fn from_config(config: &NavConfig, seed: u64) -> Self {
        Self::new(AgentSettings::from(config), seed)
    }

    pub fn state_key(&self, state: &NavigationState) -> StateKey {
        StateKey::discretize(state, self.settings.position_bucket, self.settings.distance_bucket)
    }

    // ========================================================================
    // Policy
    // ========================================================================

    /// Epsilon-greedy choice among `available`.
    ///
    /// Greedy ties go to the earliest entry in `available`. A state with no
    /// learned values prefers [`MetaAction::FollowPath`] when it is offered.
    pub fn select_action(&mut self, state: &NavigationState, available: &[MetaAction]) -> MetaAction {
        let Some(&first) = available.first() else {
            return MetaAction::FollowPath;
        };

        let key = self.state_key(state);
        let untrained = self.q_table.touch(key);

        if self.rng.random::<f32>() < self.exploration_rate {
            let pick = available[self.rng.random_range(0..available.len())];
            debug!("[RL] Exploring: {:?}", pick);
            return pick;
        }

        if untrained {
            return if available.contains(&MetaAction::FollowPath) {
                MetaAction::FollowPath
            } else {
                first
            };
        }

        let mut best = first;
        let mut best_value = self.q_table.value(&key, first);
        for &action in &available[1..] {
            let value = self.q_table.value(&key, action);
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        best
    }

    pub fn q_value(&self, state: &NavigationState, action: MetaAction) -> f32 {
        self.q_table.value(&self.state_key(state), action)
    }

    pub fn exploration_rate(&self) -> f32 {
        self.exploration_rate
    }

    // ========================================================================
    // Learning
    // ========================================================================

    /// Apply one Q-learning update, decay exploration, and update memory.
    pub fn learn(&mut self, experience: Experience) {
        let s = &self.settings;
        let action = experience.action;
        let key = self.state_key(&experience.state);
        let next_key = self.state_key(&experience.next_state);

        let current = self.q_table.value(&key, action);
        let target = experience.reward + s.discount_factor * self.q_table.max_value(&next_key);
        let updated = current + s.learning_rate * (target - current);
        self.q_table.set(key, action, updated);

        self.exploration_rate = (self.exploration_rate * s.exploration_decay).max(s.min_exploration_rate);

        self.remember(&experience);

        while self.replay.len() >= self.settings.replay_capacity.max(1) {
            self.replay.pop_front();
        }
        self.replay.push_back(experience);

        debug!("[RL] Q({}, {:?}) {:.3} -> {:.3} (epsilon {:.4})",
            key, action, current, updated, self.exploration_rate);
    }

    fn remember(&mut self, experience: &Experience) {
        let state = &experience.state;
        let next = &experience.next_state;
        let arrived = next.distance_to_destination() < self.settings.arrival_distance;

        if arrived {
            self.memory.record_success(SuccessfulRoute {
                start: state.position,
                end: state.destination,
                waypoints: experience.route.clone(),
                recorded_at_ms: experience.timestamp_ms,
            });
        } else {
            self.memory.record_failure(FailedRoute {
                start: state.position,
                end: state.destination,
                reason: infer_failure_reason(next),
                recorded_at_ms: experience.timestamp_ms,
            });
        }

        if state.nearby_obstacles > 0 {
            if let Some(resolution) = Resolution::from_action(experience.action) {
                self.memory.record_encounter(ObstacleEncounter {
                    obstacle: ObstacleDescriptor {
                        kind: ObstacleKind::Unspecified,
                        position: state.position,
                    },
                    resolution,
                    success: next.distance_to_destination() < state.distance_to_destination(),
                    timestamp_ms: experience.timestamp_ms,
                });
            }
        }
    }

    pub fn record_obstacle_encounter(&mut self, encounter: ObstacleEncounter) {
        self.memory.record_encounter(encounter);
    }

    // ========================================================================
    // Memory queries
    // ========================================================================

    fn endpoints_match(&self, a_start: Vec2, a_end: Vec2, b_start: Vec2, b_end: Vec2) -> bool {
        let threshold = self.settings.route_match_threshold;
        a_start.distance(b_start) <= threshold && a_end.distance(b_end) <= threshold
    }

    /// Most recent remembered route between matching endpoints no older than `max_age_ms`.
    pub fn get_learned_route(&self, start: Vec2, end: Vec2, max_age_ms: u64, now_ms: u64) -> Option<&[Vec2]> {
        self.memory
            .successful_routes()
            .iter()
            .rev()
            .filter(|r| now_ms.saturating_sub(r.recorded_at_ms) <= max_age_ms)
            .find(|r| !r.waypoints.is_empty() && self.endpoints_match(r.start, r.end, start, end))
            .map(|r| r.waypoints.as_slice())
    }

    pub fn has_recent_failure(&self, start: Vec2, end: Vec2, max_age_ms: u64, now_ms: u64) -> bool {
        self.memory
            .failed_routes()
            .iter()
            .filter(|r| now_ms.saturating_sub(r.recorded_at_ms) <= max_age_ms)
            .any(|r| self.endpoints_match(r.start, r.end, start, end))
    }

    /// Most frequent successful resolution for similar obstacles nearby.
    ///
    /// Ties favour waiting, then rerouting, then forcing through.
    pub fn get_obstacle_strategy(&self, obstacle: &ObstacleDescriptor) -> Option<MetaAction> {
        let mut counts = [0usize; Resolution::ALL.len()];
        for encounter in self.memory.obstacle_encounters() {
            if encounter.success
                && encounter.obstacle.kind == obstacle.kind
                && encounter.obstacle.position.distance(obstacle.position) <= self.settings.obstacle_precedent_radius
            {
                counts[encounter.resolution as usize] += 1;
            }
        }

        let mut best: Option<(Resolution, usize)> = None;
        for (resolution, count) in Resolution::ALL.into_iter().zip(counts) {
            if count > 0 && best.is_none_or(|(_, top)| count > top) {
                best = Some((resolution, count));
            }
        }
        best.map(|(resolution, _)| resolution.to_action())
    }

    pub fn memory(&self) -> &NavigationMemory {
        &self.memory
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            q_states: self.q_table.len(),
            exploration_rate: self.exploration_rate,
            experiences: self.replay.len(),
            successes: self.memory.successful_routes().len(),
            failures: self.memory.failed_routes().len(),
        }
    }
}

fn infer_failure_reason(next: &NavigationState) -> FailureReason {
    match next.path_status {
        PathStatus::Blocked => FailureReason::Blocked,
        PathStatus::Partial => FailureReason::PartialPath,
        _ if next.nearby_obstacles > 0 => FailureReason::Obstacles,
        _ => FailureReason::Unknown,
    }
}
