//! Candidate ordering strategies
//!
//! `round_robin` rotates the candidate list by a cursor kept per distinct
//! candidate set, so requests narrowed by preferred providers or an open
//! breaker do not skew rotation for the full set.
//! `cost_priority_round_robin` groups candidates into priority tiers
//! (highest first) and runs a smooth weighted rotation inside each tier:
//! every call adds each member's weight to its credit, the member with the
//! most credit goes first and pays back the tier's total weight. Weights are
//! the inverse blended cost, clamped so no member is weighted below
//! `1 / MAX_WEIGHT_RATIO` of the cheapest, which bounds how long any member
//! can go without being placed first.

use crate::config::LoadBalancing;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Largest allowed ratio between the heaviest and lightest weight in a tier
pub const MAX_WEIGHT_RATIO: f64 = 10.0;

/// Floor applied to blended cost so free models get a finite weight
const MIN_COST: f64 = 1e-6;

/// What the strategy needs to know about one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub priority: i32,
    /// Mean of the per-1k input and output cost for the resolved model
    pub blended_cost: f64,
}

impl Candidate {
    pub fn new(name: impl Into<String>, priority: i32, blended_cost: f64) -> Self {
        Self {
            name: name.into(),
            priority,
            blended_cost,
        }
    }
}

/// Shared rotation state for one router
#[derive(Debug, Default)]
pub struct RotationCursor {
    /// Next start position, keyed by candidate names in order
    positions: Mutex<HashMap<Vec<String>, usize>>,
    credits: Mutex<HashMap<String, f64>>,
}

impl RotationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current weighted-rotation credit of a provider
    pub fn credit(&self, name: &str) -> f64 {
        self.credits.lock().get(name).copied().unwrap_or(0.0)
    }

    fn next_position(&self, candidates: &[Candidate]) -> usize {
        let key: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
        let mut positions = self.positions.lock();
        let position = positions.entry(key).or_insert(0);
        let current = *position;
        *position = position.wrapping_add(1);
        current
    }
}

/// Order candidates for one request; returns indices into `candidates`
pub fn order_candidates(
    candidates: &[Candidate],
    strategy: LoadBalancing,
    cursor: &RotationCursor,
) -> Vec<usize> {
    if candidates.is_empty() {
        return Vec::new();
    }

    match strategy {
        LoadBalancing::RoundRobin => round_robin(candidates, cursor),
        LoadBalancing::CostPriorityRoundRobin => cost_priority(candidates, cursor),
    }
}

fn round_robin(candidates: &[Candidate], cursor: &RotationCursor) -> Vec<usize> {
    let len = candidates.len();
    if len == 1 {
        return vec![0];
    }
    let start = cursor.next_position(candidates) % len;
    (0..len).map(|offset| (start + offset) % len).collect()
}

fn cost_priority(candidates: &[Candidate], cursor: &RotationCursor) -> Vec<usize> {
    let mut tiers: Vec<i32> = candidates.iter().map(|c| c.priority).collect();
    tiers.sort_unstable_by(|a, b| b.cmp(a));
    tiers.dedup();

    let mut order = Vec::with_capacity(candidates.len());
    let mut credits = cursor.credits.lock();

    for priority in tiers {
        let members: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].priority == priority)
            .collect();
        order.extend(rotate_tier(candidates, &members, &mut credits));
    }

    order
}

/// Weights for the tier members, in the same order as `members`
pub fn tier_weights(candidates: &[Candidate], members: &[usize]) -> Vec<f64> {
    let raw: Vec<f64> = members
        .iter()
        .map(|&i| 1.0 / candidates[i].blended_cost.max(MIN_COST))
        .collect();
    let heaviest = raw.iter().copied().fold(0.0_f64, f64::max);
    let floor = heaviest / MAX_WEIGHT_RATIO;

    raw.into_iter().map(|w| w.max(floor)).collect()
}

fn rotate_tier(
    candidates: &[Candidate],
    members: &[usize],
    credits: &mut HashMap<String, f64>,
) -> Vec<usize> {
    if members.len() == 1 {
        return members.to_vec();
    }

    let weights = tier_weights(candidates, members);
    let total: f64 = weights.iter().sum();

    let mut winner = 0;
    let mut best = f64::NEG_INFINITY;
    for (slot, (&i, &weight)) in members.iter().zip(&weights).enumerate() {
        let credit = credits.entry(candidates[i].name.clone()).or_insert(0.0);
        *credit += weight;
        let better = *credit > best
            || (*credit == best && candidates[i].name < candidates[members[winner]].name);
        if better {
            best = *credit;
            winner = slot;
        }
    }
    if let Some(credit) = credits.get_mut(&candidates[members[winner]].name) {
        *credit -= total;
    }

    let mut rest: Vec<usize> = (0..members.len()).filter(|&s| s != winner).collect();
    rest.sort_by(|&a, &b| {
        weights[b]
            .partial_cmp(&weights[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| candidates[members[a]].name.cmp(&candidates[members[b]].name))
    });

    std::iter::once(members[winner])
        .chain(rest.into_iter().map(|s| members[s]))
        .collect()
}
