mod types;
mod discovery;
mod registry;


// ============================================================================
// PUBLIC API
// ============================================================================

pub use types::{
    WorldChangeId, ChangeKind, AffectedRoute, WorldChange, BlockageReport, DiscoveryMethod,
    RouteDiscovery, AlternativeRoute, RouteKey, PERMANENT,
};
pub use discovery::{DiscoverySettings, score_route};
pub use registry::{WorldAdaptation, sample_segment};
