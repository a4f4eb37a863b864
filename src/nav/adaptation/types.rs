use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldChangeId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Construction,
    Disaster,
    PlayerInfluence,
    Environmental,
    TemporaryBlockage,
    PermanentObstacle,
}

/// Duration value marking a change that never expires.
pub const PERMANENT: i64 = -1;

/// Route identity used by the blockage and alternative caches.
///
/// Endpoints are rounded to whole world units so near-identical requests
/// share cache entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub start: IVec2,
    pub end: IVec2,
}

impl RouteKey {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self {
            start: start.round().as_ivec2(),
            end: end.round().as_ivec2(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffectedRoute {
    pub start: Vec2,
    pub end: Vec2,
}

/// An active, area-scoped event that can block routes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldChange {
    pub id: WorldChangeId,
    pub kind: ChangeKind,
    pub position: Vec2,
    pub radius: f32,
    /// In [0, 1].
    pub severity: f32,
    /// Milliseconds, or [`PERMANENT`].
    pub duration_ms: i64,
    pub affected_routes: Vec<AffectedRoute>,
    /// Simulation time of registration; set by the registry.
    #[serde(default)]
    pub registered_at_ms: u64,
}

impl WorldChange {
    pub fn new(id: u64, kind: ChangeKind, position: Vec2, radius: f32) -> Self {
        Self {
            id: WorldChangeId(id),
            kind,
            position,
            radius,
            severity: 1.0,
            duration_ms: PERMANENT,
            affected_routes: Vec::new(),
            registered_at_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_severity(mut self, severity: f32) -> Self {
        self.severity = severity.clamp(0.0, 1.0);
        self
    }

    pub fn affecting(mut self, start: Vec2, end: Vec2) -> Self {
        self.affected_routes.push(AffectedRoute { start, end });
        self
    }

    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.duration_ms < 0
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        self.position.distance(point) <= self.radius
    }

    pub fn expires_at_ms(&self) -> Option<u64> {
        (!self.is_permanent()).then(|| self.registered_at_ms.saturating_add(self.duration_ms as u64))
    }
}

/// Result of a blockage check.
#[derive(Clone, Debug, Default)]
pub struct BlockageReport {
    pub blocked: bool,
    /// Changes with at least one waypoint inside their radius, ordered by id.
    pub blocking_changes: Vec<WorldChange>,
}

/// How a replacement route is searched for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryMethod {
    #[default]
    Exploration,
    SocialObservation,
    MapConsultation,
    AiAssisted,
    TrialAndError,
}

/// Log entry for a successfully discovered alternative.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteDiscovery {
    pub method: DiscoveryMethod,
    pub old_route: Vec<Vec2>,
    pub new_route: Vec<Vec2>,
    /// Old length divided by new length.
    pub efficiency: f32,
    pub timestamp_ms: u64,
}

/// Cached replacement for a blocked route.
#[derive(Clone, Debug)]
pub struct AlternativeRoute {
    pub waypoints: Arc<Vec<Vec2>>,
    pub avoided: SmallVec<[WorldChangeId; 4]>,
    pub method: DiscoveryMethod,
    pub score: f32,
    pub successes: u32,
}
