mod state;
mod memory;
mod qtable;
mod reward;
mod agent;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use state::{MetaAction, NavigationState, PathStatus, StateKey};
pub use memory::{
    FailedRoute, FailureReason, NavigationMemory, ObstacleDescriptor, ObstacleEncounter, ObstacleKind,
    Resolution, SuccessfulRoute,
};
pub use qtable::QTable;
pub use reward::{calculate_reward, TripOutcome};
pub use agent::{AgentSettings, AgentStats, Experience, NavigationAgent};
