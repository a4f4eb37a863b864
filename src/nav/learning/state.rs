use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::nav::pathfinding::Urgency;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    Valid,
    Blocked,
    Partial,
    #[default]
    Unknown,
}

impl PathStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PathStatus::Valid => "valid",
            PathStatus::Blocked => "blocked",
            PathStatus::Partial => "partial",
            PathStatus::Unknown => "unknown",
        }
    }
}

/// Continuous navigation situation as seen by an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub position: Vec2,
    pub destination: Vec2,
    pub nearby_obstacles: u32,
    pub urgency: Urgency,
    pub path_status: PathStatus,
}

impl NavigationState {
    pub fn new(position: Vec2, destination: Vec2) -> Self {
        Self {
            position,
            destination,
            nearby_obstacles: 0,
            urgency: Urgency::Normal,
            path_status: PathStatus::Unknown,
        }
    }

    #[inline]
    pub fn distance_to_destination(&self) -> f32 {
        self.position.distance(self.destination)
    }
}

/// Bucketed [`NavigationState`] used to index the Q-table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Position rounded to the nearest bucket multiple.
    pub position: IVec2,
    /// Distance to destination rounded to the nearest bucket multiple.
    pub distance: i32,
    pub obstacles: u32,
    pub urgency: Urgency,
    pub status: PathStatus,
}

impl StateKey {
    pub fn discretize(state: &NavigationState, position_bucket: f32, distance_bucket: f32) -> Self {
        let snap = |v: f32, bucket: f32| ((v / bucket).round() * bucket) as i32;
        Self {
            position: IVec2::new(
                snap(state.position.x, position_bucket),
                snap(state.position.y, position_bucket),
            ),
            distance: snap(state.distance_to_destination(), distance_bucket),
            obstacles: state.nearby_obstacles,
            urgency: state.urgency,
            status: state.path_status,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}",
            self.position.x,
            self.position.y,
            self.distance,
            self.obstacles,
            self.urgency.as_str(),
            self.status.as_str()
        )
    }
}

/// High-level decision governing how a proposed path is used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaAction {
    #[default]
    FollowPath,
    FindAlternateRoute,
    Wait,
    Abandon,
}

impl MetaAction {
    pub const ALL: [MetaAction; 4] = [
        MetaAction::FollowPath,
        MetaAction::FindAlternateRoute,
        MetaAction::Wait,
        MetaAction::Abandon,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}
