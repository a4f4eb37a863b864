use serde::{Deserialize, Serialize};
use super::state::{MetaAction, NavigationState};

/// Measured result of one trip, reported by the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TripOutcome {
    pub reached_destination: bool,
    /// Only used for partial credit when the destination was not reached.
    pub distance_remaining: f32,
    pub estimated_max_distance: f32,
    pub time_taken: f32,
    pub energy_used: f32,
    pub obstacles_encountered: u32,
    pub path_efficiency: f32,
}

pub const ARRIVAL_REWARD: f32 = 100.0;
pub const PARTIAL_CREDIT: f32 = 50.0;
pub const EFFICIENCY_WEIGHT: f32 = 20.0;
pub const TIME_PENALTY: f32 = 0.1;
pub const ENERGY_PENALTY: f32 = 0.05;
pub const OBSTACLE_PENALTY: f32 = 10.0;
pub const REROUTE_BONUS: f32 = 5.0;

/// Composite shaping reward for taking `action` in `state` with result `outcome`.
///
/// The base terms are scaled by the state's urgency multiplier. The reroute
/// bonus is added afterwards, unscaled.
pub fn calculate_reward(state: &NavigationState, action: MetaAction, outcome: &TripOutcome) -> f32 {
    let mut reward = if outcome.reached_destination {
        ARRIVAL_REWARD
    } else if outcome.estimated_max_distance > 0.0 {
        (1.0 - outcome.distance_remaining / outcome.estimated_max_distance) * PARTIAL_CREDIT
    } else {
        0.0
    };

    reward += outcome.path_efficiency * EFFICIENCY_WEIGHT;
    reward -= outcome.time_taken * TIME_PENALTY;
    reward -= outcome.energy_used * ENERGY_PENALTY;
    reward -= outcome.obstacles_encountered as f32 * OBSTACLE_PENALTY;
    reward *= state.urgency.reward_multiplier();

    if action == MetaAction::FindAlternateRoute && outcome.obstacles_encountered > 0 {
        reward += REROUTE_BONUS;
    }
    reward
}
