use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use crate::nav::adaptation::ChangeKind;
use super::state::MetaAction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulRoute {
    pub start: Vec2,
    pub end: Vec2,
    pub waypoints: Vec<Vec2>,
    pub recorded_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    Blocked,
    PartialPath,
    Obstacles,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedRoute {
    pub start: Vec2,
    pub end: Vec2,
    pub reason: FailureReason,
    pub recorded_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// A toggled tile blockage.
    DynamicTile,
    WorldChange(ChangeKind),
    /// Counted near the agent without further detail.
    Unspecified,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDescriptor {
    pub kind: ObstacleKind,
    pub position: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Waited,
    Rerouted,
    ForcedThrough,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Waited, Resolution::Rerouted, Resolution::ForcedThrough];

    pub fn from_action(action: MetaAction) -> Option<Self> {
        match action {
            MetaAction::Wait => Some(Resolution::Waited),
            MetaAction::FindAlternateRoute => Some(Resolution::Rerouted),
            MetaAction::FollowPath => Some(Resolution::ForcedThrough),
            MetaAction::Abandon => None,
        }
    }

    pub fn to_action(self) -> MetaAction {
        match self {
            Resolution::Waited => MetaAction::Wait,
            Resolution::Rerouted => MetaAction::FindAlternateRoute,
            Resolution::ForcedThrough => MetaAction::FollowPath,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleEncounter {
    pub obstacle: ObstacleDescriptor,
    pub resolution: Resolution,
    pub success: bool,
    pub timestamp_ms: u64,
}

/// Bounded per-agent record of how past trips went.
///
/// Each list is a ring buffer: once full, the oldest entry is dropped.
#[derive(Clone, Debug)]
pub struct NavigationMemory {
    successful_routes: VecDeque<SuccessfulRoute>,
    failed_routes: VecDeque<FailedRoute>,
    obstacle_encounters: VecDeque<ObstacleEncounter>,
    success_cap: usize,
    failure_cap: usize,
    encounter_cap: usize,
}

impl Default for NavigationMemory {
    fn default() -> Self {
        Self::with_caps(50, 50, 100)
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, cap: usize, item: T) {
    if cap == 0 {
        return;
    }
    while buffer.len() >= cap {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

impl NavigationMemory {
    pub fn with_caps(success_cap: usize, failure_cap: usize, encounter_cap: usize) -> Self {
        Self {
            successful_routes: VecDeque::with_capacity(success_cap),
            failed_routes: VecDeque::with_capacity(failure_cap),
            obstacle_encounters: VecDeque::with_capacity(encounter_cap),
            success_cap,
            failure_cap,
            encounter_cap,
        }
    }

    pub fn record_success(&mut self, route: SuccessfulRoute) {
        push_capped(&mut self.successful_routes, self.success_cap, route);
    }

    pub fn record_failure(&mut self, route: FailedRoute) {
        push_capped(&mut self.failed_routes, self.failure_cap, route);
    }

    pub fn record_encounter(&mut self, encounter: ObstacleEncounter) {
        push_capped(&mut self.obstacle_encounters, self.encounter_cap, encounter);
    }

    pub fn successful_routes(&self) -> &VecDeque<SuccessfulRoute> {
        &self.successful_routes
    }

    pub fn failed_routes(&self) -> &VecDeque<FailedRoute> {
        &self.failed_routes
    }

    pub fn obstacle_encounters(&self) -> &VecDeque<ObstacleEncounter> {
        &self.obstacle_encounters
    }
}
