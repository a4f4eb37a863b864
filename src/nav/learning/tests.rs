//! Tests for the Q-learner, reward shaping and route memory.

use super::*;
use bevy::prelude::*;
use crate::nav::config::NavConfig;
use crate::nav::pathfinding::Urgency;

fn greedy_agent() -> NavigationAgent {
    let config = NavConfig {
        initial_exploration_rate: 0.0,
        min_exploration_rate: 0.0,
        ..NavConfig::default()
    };
    NavigationAgent::from_config(&config, 1)
}

fn state_at(position: Vec2, destination: Vec2) -> NavigationState {
    NavigationState::new(position, destination)
}

fn experience(state: NavigationState, action: MetaAction, reward: f32, next_state: NavigationState) -> Experience {
    Experience {
        state,
        action,
        reward,
        next_state,
        route: Vec::new(),
        timestamp_ms: 0,
    }
}

fn arrival(start: Vec2, end: Vec2, route: Vec<Vec2>, timestamp_ms: u64) -> Experience {
    Experience {
        state: state_at(start, end),
        action: MetaAction::FollowPath,
        reward: 100.0,
        next_state: state_at(end, end),
        route,
        timestamp_ms,
    }
}

// ============================================================================
// Reward
// ============================================================================

#[test]
fn test_reward_for_clean_arrival() {
    let state = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let outcome = TripOutcome {
        reached_destination: true,
        time_taken: 10.0,
        energy_used: 5.0,
        obstacles_encountered: 0,
        path_efficiency: 1.0,
        ..TripOutcome::default()
    };
    let reward = calculate_reward(&state, MetaAction::FollowPath, &outcome);
    assert!((reward - 118.75).abs() < 1e-4, "reward {}", reward);

    let critical = NavigationState { urgency: Urgency::Critical, ..state };
    let reward = calculate_reward(&critical, MetaAction::FollowPath, &outcome);
    assert!((reward - 237.5).abs() < 1e-4, "reward {}", reward);
}

#[test]
fn test_reroute_bonus_applies_after_urgency_scaling() {
    let state = NavigationState {
        urgency: Urgency::Leisure,
        ..state_at(Vec2::ZERO, Vec2::new(100.0, 0.0))
    };
    let outcome = TripOutcome {
        reached_destination: true,
        time_taken: 10.0,
        energy_used: 5.0,
        obstacles_encountered: 2,
        path_efficiency: 1.0,
        ..TripOutcome::default()
    };

    // (100 + 20 - 1 - 0.25 - 20) * 0.8 = 79.0
    let follow = calculate_reward(&state, MetaAction::FollowPath, &outcome);
    assert!((follow - 79.0).abs() < 1e-4, "reward {}", follow);
    let reroute = calculate_reward(&state, MetaAction::FindAlternateRoute, &outcome);
    assert!((reroute - 84.0).abs() < 1e-4, "reward {}", reroute);
}

#[test]
fn test_partial_credit_when_destination_missed() {
    let state = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let outcome = TripOutcome {
        reached_destination: false,
        distance_remaining: 25.0,
        estimated_max_distance: 100.0,
        path_efficiency: 0.5,
        ..TripOutcome::default()
    };
    // 0.75 * 50 + 0.5 * 20
    let reward = calculate_reward(&state, MetaAction::FollowPath, &outcome);
    assert!((reward - 47.5).abs() < 1e-4, "reward {}", reward);

    let no_estimate = TripOutcome { estimated_max_distance: 0.0, ..outcome };
    let reward = calculate_reward(&state, MetaAction::FollowPath, &no_estimate);
    assert!((reward - 10.0).abs() < 1e-4, "reward {}", reward);
}

// ============================================================================
// State discretization
// ============================================================================

#[test]
fn test_state_key_buckets() {
    let state = NavigationState {
        position: Vec2::new(12.4, -7.6),
        destination: Vec2::new(12.4, 36.4),
        nearby_obstacles: 3,
        urgency: Urgency::High,
        path_status: PathStatus::Blocked,
    };
    let key = StateKey::discretize(&state, 5.0, 10.0);
    assert_eq!(key.position, IVec2::new(10, -10));
    assert_eq!(key.distance, 40);
    assert_eq!(key.to_string(), "10_-10_40_3_high_blocked");
}

#[test]
fn test_nearby_states_share_a_key() {
    let a = state_at(Vec2::new(101.0, 49.0), Vec2::new(200.0, 50.0));
    let b = state_at(Vec2::new(99.0, 51.0), Vec2::new(200.0, 50.0));
    assert_eq!(StateKey::discretize(&a, 5.0, 10.0), StateKey::discretize(&b, 5.0, 10.0));
}

// ============================================================================
// Q-learning
// ============================================================================

#[test]
fn test_q_update_rule() {
    let mut agent = greedy_agent();
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let next = state_at(Vec2::new(50.0, 0.0), Vec2::new(100.0, 0.0));

    agent.learn(experience(s.clone(), MetaAction::Wait, 10.0, next.clone()));
    assert!((agent.q_value(&s, MetaAction::Wait) - 1.0).abs() < 1e-6);

    // Q(next) is still unseen, so the bootstrap term is zero.
    agent.learn(experience(s.clone(), MetaAction::Wait, 10.0, next.clone()));
    assert!((agent.q_value(&s, MetaAction::Wait) - 1.9).abs() < 1e-5);

    // Seed next with a value and check it flows back through the discount.
    agent.learn(experience(next.clone(), MetaAction::FollowPath, 20.0, s.clone()));
    let q_next = agent.q_value(&next, MetaAction::FollowPath);
    agent.learn(experience(s.clone(), MetaAction::Wait, 0.0, next));
    let expected = 1.9 + 0.1 * (0.95 * q_next - 1.9);
    assert!((agent.q_value(&s, MetaAction::Wait) - expected).abs() < 1e-5);
}

#[test]
fn test_exploration_rate_decays_to_floor() {
    let mut agent = NavigationAgent::from_config(&NavConfig::default(), 3);
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let next = state_at(Vec2::new(10.0, 0.0), Vec2::new(100.0, 0.0));

    for k in 1..=1000 {
        agent.learn(experience(s.clone(), MetaAction::FollowPath, 1.0, next.clone()));
        if k == 200 {
            let expected = (0.3 * 0.995f32.powi(200)).max(0.01);
            assert!((agent.exploration_rate() - expected).abs() < 1e-4);
        }
    }
    assert!((agent.exploration_rate() - 0.01).abs() < 1e-6);
}

#[test]
fn test_unseen_state_prefers_follow_path() {
    let mut agent = greedy_agent();
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    assert_eq!(agent.select_action(&s, &[MetaAction::Wait, MetaAction::FollowPath]), MetaAction::FollowPath);
    assert_eq!(agent.select_action(&s, &[MetaAction::Wait, MetaAction::Abandon]), MetaAction::Wait);
    assert_eq!(agent.select_action(&s, &[]), MetaAction::FollowPath);
    // The first two lookups created the entry; the empty list never reaches the table.
    assert_eq!(agent.stats().q_states, 1);
}

#[test]
fn test_greedy_ties_follow_supplied_order() {
    let mut agent = greedy_agent();
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let next = state_at(Vec2::new(50.0, 0.0), Vec2::new(100.0, 0.0));
    agent.learn(experience(s.clone(), MetaAction::Wait, 10.0, next.clone()));
    agent.learn(experience(s.clone(), MetaAction::FindAlternateRoute, 10.0, next));

    assert_eq!(
        agent.select_action(&s, &[MetaAction::FindAlternateRoute, MetaAction::Wait]),
        MetaAction::FindAlternateRoute
    );
    assert_eq!(
        agent.select_action(&s, &[MetaAction::Wait, MetaAction::FindAlternateRoute]),
        MetaAction::Wait
    );
    // Learned values beat the untouched FollowPath entry.
    assert_eq!(agent.select_action(&s, &MetaAction::ALL), MetaAction::FindAlternateRoute);
}

#[test]
fn test_exploring_agent_only_picks_available_actions() {
    let config = NavConfig {
        initial_exploration_rate: 1.0,
        ..NavConfig::default()
    };
    let mut agent = NavigationAgent::from_config(&config, 11);
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    let available = [MetaAction::Wait, MetaAction::Abandon];
    for _ in 0..50 {
        assert!(available.contains(&agent.select_action(&s, &available)));
    }
}

#[test]
fn test_same_seed_same_choices() {
    let config = NavConfig {
        initial_exploration_rate: 0.5,
        ..NavConfig::default()
    };
    let mut a = NavigationAgent::from_config(&config, 99);
    let mut b = NavigationAgent::from_config(&config, 99);
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    for _ in 0..100 {
        assert_eq!(a.select_action(&s, &MetaAction::ALL), b.select_action(&s, &MetaAction::ALL));
    }
}

#[test]
fn test_q_table_evicts_least_recently_updated() {
    let key = |x: i32| StateKey {
        position: IVec2::new(x, 0),
        distance: 0,
        obstacles: 0,
        urgency: Urgency::Normal,
        status: PathStatus::Unknown,
    };
    let mut table = QTable::new(Some(2));
    table.set(key(1), MetaAction::FollowPath, 1.0);
    table.set(key(2), MetaAction::FollowPath, 2.0);
    table.set(key(1), MetaAction::Wait, 3.0);
    table.set(key(3), MetaAction::FollowPath, 4.0);

    assert_eq!(table.len(), 2);
    assert!(table.contains(&key(1)));
    assert!(!table.contains(&key(2)));
    assert!(table.contains(&key(3)));
    assert_eq!(table.value(&key(2), MetaAction::FollowPath), 0.0);
}

#[test]
fn test_q_table_creates_entry_on_first_reference() {
    let key = StateKey {
        position: IVec2::ZERO,
        distance: 10,
        obstacles: 0,
        urgency: Urgency::High,
        status: PathStatus::Valid,
    };
    let mut table = QTable::new(Some(1));
    assert!(table.touch(key));
    assert_eq!(table.len(), 1);
    assert_eq!(table.value(&key, MetaAction::Wait), 0.0);

    table.set(key, MetaAction::Wait, 0.5);
    assert!(!table.touch(key));
    assert_eq!(table.len(), 1);
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn test_memory_stays_bounded() {
    let mut agent = NavigationAgent::from_config(&NavConfig::default(), 5);
    let end = Vec2::new(100.0, 0.0);
    for i in 0..400u64 {
        let start = Vec2::new(i as f32, 0.0);
        let mut state = state_at(start, end);
        state.nearby_obstacles = 1;
        let next = if i % 2 == 0 { state_at(end, end) } else { state_at(start, end) };
        agent.learn(Experience {
            route: vec![start, end],
            timestamp_ms: i,
            ..experience(state, MetaAction::FollowPath, 0.0, next)
        });
    }

    let memory = agent.memory();
    assert_eq!(memory.successful_routes().len(), 50);
    assert_eq!(memory.failed_routes().len(), 50);
    assert_eq!(memory.obstacle_encounters().len(), 100);
    assert_eq!(agent.stats().experiences, 400);
}

#[test]
fn test_replay_buffer_is_capped() {
    let config = NavConfig {
        replay_capacity: 8,
        ..NavConfig::default()
    };
    let mut agent = NavigationAgent::from_config(&config, 5);
    let s = state_at(Vec2::ZERO, Vec2::new(100.0, 0.0));
    for _ in 0..20 {
        agent.learn(experience(s.clone(), MetaAction::FollowPath, 0.0, s.clone()));
    }
    assert_eq!(agent.stats().experiences, 8);
}

#[test]
fn test_learned_route_requires_near_exact_endpoints() {
    let mut agent = greedy_agent();
    let start = Vec2::ZERO;
    let end = Vec2::new(100.0, 100.0);
    let route = vec![start, Vec2::new(50.0, 0.0), end];
    agent.learn(arrival(start, end, route.clone(), 1_000));

    let max_age = 60_000;
    assert_eq!(agent.get_learned_route(Vec2::new(0.2, 0.0), Vec2::new(100.0, 100.1), max_age, 2_000), Some(route.as_slice()));
    assert!(agent.get_learned_route(Vec2::new(0.5, 0.0), end, max_age, 2_000).is_none());
    assert!(agent.get_learned_route(start, end, max_age, 1_000 + max_age + 1).is_none());
    assert!(!agent.has_recent_failure(start, end, max_age, 2_000));
}

#[test]
fn test_latest_learned_route_wins() {
    let mut agent = greedy_agent();
    let start = Vec2::ZERO;
    let end = Vec2::new(40.0, 0.0);
    agent.learn(arrival(start, end, vec![start, Vec2::new(20.0, 5.0), end], 10));
    agent.learn(arrival(start, end, vec![start, end], 20));

    assert_eq!(agent.get_learned_route(start, end, 1_000, 30), Some([start, end].as_slice()));
}

#[test]
fn test_failure_reason_inferred_from_next_state() {
    let mut agent = greedy_agent();
    let start = Vec2::ZERO;
    let end = Vec2::new(100.0, 0.0);
    let stuck = NavigationState {
        path_status: PathStatus::Blocked,
        ..state_at(Vec2::new(30.0, 0.0), end)
    };
    agent.learn(Experience {
        timestamp_ms: 500,
        ..experience(state_at(start, end), MetaAction::FollowPath, -10.0, stuck)
    });

    assert!(agent.has_recent_failure(start, end, 1_000, 900));
    assert!(!agent.has_recent_failure(start, end, 100, 900));
    let failure = agent.memory().failed_routes().back().expect("failure recorded");
    assert_eq!(failure.reason, FailureReason::Blocked);
}

#[test]
fn test_obstacle_strategy_uses_successful_precedent() {
    let mut agent = greedy_agent();
    let tile = |x: f32, y: f32| ObstacleDescriptor {
        kind: ObstacleKind::DynamicTile,
        position: Vec2::new(x, y),
    };
    let encounter = |resolution, success| ObstacleEncounter {
        obstacle: tile(10.0, 10.0),
        resolution,
        success,
        timestamp_ms: 0,
    };
    agent.record_obstacle_encounter(encounter(Resolution::Rerouted, true));
    agent.record_obstacle_encounter(encounter(Resolution::Rerouted, true));
    agent.record_obstacle_encounter(encounter(Resolution::Waited, true));
    for _ in 0..3 {
        agent.record_obstacle_encounter(encounter(Resolution::ForcedThrough, false));
    }

    assert_eq!(agent.get_obstacle_strategy(&tile(12.0, 10.0)), Some(MetaAction::FindAlternateRoute));
    assert_eq!(agent.get_obstacle_strategy(&tile(30.0, 30.0)), None);
    let other_kind = ObstacleDescriptor {
        kind: ObstacleKind::Unspecified,
        position: Vec2::new(10.0, 10.0),
    };
    assert_eq!(agent.get_obstacle_strategy(&other_kind), None);
}

#[test]
fn test_learning_logs_obstacle_encounters() {
    let mut agent = greedy_agent();
    let end = Vec2::new(100.0, 0.0);
    let crowded = NavigationState {
        nearby_obstacles: 2,
        ..state_at(Vec2::new(20.0, 0.0), end)
    };
    let closer = state_at(Vec2::new(40.0, 0.0), end);
    agent.learn(experience(crowded.clone(), MetaAction::Wait, 0.0, closer));
    agent.learn(experience(crowded, MetaAction::Abandon, 0.0, state_at(Vec2::new(20.0, 0.0), end)));

    let encounters = agent.memory().obstacle_encounters();
    assert_eq!(encounters.len(), 1);
    assert_eq!(encounters[0].resolution, Resolution::Waited);
    assert!(encounters[0].success);

    let here = ObstacleDescriptor {
        kind: ObstacleKind::Unspecified,
        position: Vec2::new(22.0, 0.0),
    };
    assert_eq!(agent.get_obstacle_strategy(&here), Some(MetaAction::Wait));
}
