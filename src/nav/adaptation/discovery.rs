//! Route discovery strategies for blocked routes.
//!
//! Each [`DiscoveryMethod`] resolves to a plain function through
//! [`DiscoveryMethod::strategy`]. Social observation, map consultation and
//! AI assistance currently delegate to exploration.

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::Rng;
use crate::nav::config::NavConfig;
use super::types::{DiscoveryMethod, WorldChange};

#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    pub step: f32,
    pub max_iterations: usize,
    /// Extra clearance around a change that triggers a detour.
    pub avoidance_margin: f32,
    /// Distance beyond the radius at which avoidance points are placed.
    pub avoidance_offset: f32,
    pub trial_count: usize,
}

impl From<&NavConfig> for DiscoverySettings {
    fn from(config: &NavConfig) -> Self {
        Self {
            step: config.exploration_step,
            max_iterations: config.exploration_max_iterations,
            avoidance_margin: config.avoidance_margin,
            avoidance_offset: config.avoidance_offset,
            trial_count: config.trial_count,
        }
    }
}

pub(super) struct DiscoveryContext<'a> {
    pub settings: &'a DiscoverySettings,
    pub rng: &'a mut StdRng,
}

pub(super) type DiscoveryStrategy =
    fn(&mut DiscoveryContext, Vec2, Vec2, &[WorldChange]) -> Option<Vec<Vec2>>;

impl DiscoveryMethod {
    pub(super) fn strategy(self) -> DiscoveryStrategy {
        match self {
            DiscoveryMethod::Exploration => explore,
            DiscoveryMethod::SocialObservation => social_observation,
            DiscoveryMethod::MapConsultation => map_consultation,
            DiscoveryMethod::AiAssisted => ai_assisted,
            DiscoveryMethod::TrialAndError => trial_and_error,
        }
    }
}

/// Potential-field walk from `start` to `end` that swings around blocking changes.
///
/// Each iteration steps toward the destination. If that step would come
/// within `radius + margin` of a change, the walk heads instead for an
/// avoidance point `radius + offset` from the change's center, rotated 45°
/// toward one side (chosen randomly per run, with a small random jitter).
pub(super) fn explore(
    ctx: &mut DiscoveryContext,
    start: Vec2,
    end: Vec2,
    blocking: &[WorldChange],
) -> Option<Vec<Vec2>> {
    let s = ctx.settings;
    let side = if ctx.rng.random_bool(0.5) { 1.0 } else { -1.0 };

    let mut path = vec![start];
    let mut pos = start;

    for _ in 0..s.max_iterations {
        if pos.distance(end) <= s.step {
            path.push(end);
            return Some(path);
        }

        let mut next = pos + (end - pos).normalize_or_zero() * s.step;

        if let Some(change) = blocking
            .iter()
            .find(|c| c.position.distance(next) < c.radius + s.avoidance_margin)
        {
            let mut away = (pos - change.position).normalize_or_zero();
            if away == Vec2::ZERO {
                away = Vec2::X;
            }
            let jitter: f32 = ctx.rng.random_range(-0.25..0.25);
            let tangent = away.perp() * side;
            let offset_dir = (away + tangent * (1.0 + jitter)).normalize_or_zero();
            let avoidance = change.position + offset_dir * (change.radius + s.avoidance_offset);
            next = pos + (avoidance - pos).normalize_or_zero() * s.step;
        }

        for change in blocking {
            let delta = next - change.position;
            if delta.length() <= change.radius {
                let dir = if delta == Vec2::ZERO { Vec2::X } else { delta.normalize() };
                next = change.position + dir * (change.radius + s.avoidance_margin);
            }
        }

        path.push(next);
        pos = next;
    }

    None
}

fn social_observation(
    ctx: &mut DiscoveryContext,
    start: Vec2,
    end: Vec2,
    blocking: &[WorldChange],
) -> Option<Vec<Vec2>> {
    explore(ctx, start, end, blocking)
}

fn map_consultation(
    ctx: &mut DiscoveryContext,
    start: Vec2,
    end: Vec2,
    blocking: &[WorldChange],
) -> Option<Vec<Vec2>> {
    explore(ctx, start, end, blocking)
}

fn ai_assisted(
    ctx: &mut DiscoveryContext,
    start: Vec2,
    end: Vec2,
    blocking: &[WorldChange],
) -> Option<Vec<Vec2>> {
    explore(ctx, start, end, blocking)
}

/// Run exploration `trial_count` times and keep the best-scoring candidate.
fn trial_and_error(
    ctx: &mut DiscoveryContext,
    start: Vec2,
    end: Vec2,
    blocking: &[WorldChange],
) -> Option<Vec<Vec2>> {
    let offset = ctx.settings.avoidance_offset;
    let mut best: Option<(Vec<Vec2>, f32)> = None;

    for _ in 0..ctx.settings.trial_count.max(1) {
        let Some(candidate) = explore(ctx, start, end, blocking) else {
            continue;
        };
        let score = score_route(&candidate, blocking, offset);
        if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(route, _)| route)
}

/// Start at 1, subtract 0.1 for each waypoint within `radius + offset` of a
/// blocking change and 0.01 per unit of total length, floored at 0.
pub fn score_route(route: &[Vec2], blocking: &[WorldChange], offset: f32) -> f32 {
    let near = route
        .iter()
        .filter(|p| blocking.iter().any(|c| c.position.distance(**p) < c.radius + offset))
        .count();
    let length: f32 = route.windows(2).map(|w| w[0].distance(w[1])).sum();

    (1.0 - 0.1 * near as f32 - 0.01 * length).max(0.0)
}
