//! Budgeted selection of representatives: a 0/1 knapsack with the composite
//! score as value and the execution cost as weight.
//!
//! Scores are compared in fixed-point millionths so ties are exact.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Budget, OptimizerConfig, OptimizerMode};
use crate::scoring::ScoredMutant;

/// Fixed-point scale: 1_000_000 = a composite score of 1.0.
const SCORE_SCALE: f64 = 1_000_000.0;

/// Algorithm used for one run, resolved once from the configured mode.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// DP over cost buckets of `bucket_ms` milliseconds.
    Exact { bucket_ms: u64 },

    /// Greedy by score/cost ratio plus a local-swap pass.
    Approximate,
}

impl Strategy {
    pub fn resolve(config: &OptimizerConfig, candidates: usize, budget: Budget) -> Self {
        let exact = match config.mode {
            OptimizerMode::Exact => true,
            OptimizerMode::Approximate => false,
            OptimizerMode::Auto => candidates <= config.exact_threshold,
        };

        if exact {
            Strategy::Exact {
                bucket_ms: budget.total_ms.div_ceil(config.max_buckets).max(1),
            }
        } else {
            Strategy::Approximate
        }
    }
}

/// Result of one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Indices into the scored slice, ascending.
    pub selected: Vec<usize>,

    /// Candidates that cost more than the whole budget on their own.
    pub over_budget: Vec<usize>,

    pub total_cost_ms: u64,
    pub total_score: f64,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy)]
struct Item {
    index: usize,
    value: u64,
    cost: u64,
}

/// (total value, total cost); more value wins, then less cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Objective {
    value: u64,
    cost: u64,
}

impl Objective {
    fn better_than(self, other: Objective) -> bool {
        match self.value.cmp(&other.value) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.cost < other.cost,
        }
    }

    fn with(self, item: &Item) -> Objective {
        Objective {
            value: self.value + item.value,
            cost: self.cost.saturating_add(item.cost),
        }
    }
}

fn fixed_point(score: f64) -> u64 {
    (score.clamp(0.0, 1.0) * SCORE_SCALE).round() as u64
}

/// Choose a subset of `candidates` maximizing total score within `budget`.
pub fn optimize(
    scored: &[ScoredMutant],
    candidates: &[usize],
    budget: Budget,
    config: &OptimizerConfig,
) -> Selection {
    let strategy = Strategy::resolve(config, candidates.len(), budget);

    let mut over_budget = Vec::new();
    let mut items = Vec::with_capacity(candidates.len());
    for &index in candidates {
        let s = &scored[index];
        if s.cost_ms() > budget.total_ms {
            debug!(mutant = s.id(), cost_ms = s.cost_ms(), "mutant exceeds the whole budget");
            over_budget.push(index);
        } else {
            items.push(Item {
                index,
                value: fixed_point(s.score()),
                cost: s.cost_ms(),
            });
        }
    }
    over_budget.sort_unstable();

    if !candidates.is_empty() && items.is_empty() {
        warn!(
            budget_ms = budget.total_ms,
            candidates = candidates.len(),
            "every candidate exceeds the budget; plan will be empty"
        );
    }

    // Ties on value and cost fall back to id order.
    items.sort_by(|a, b| scored[a.index].id().cmp(scored[b.index].id()));

    let mut selected = if budget.total_ms == 0 {
        Vec::new()
    } else {
        match strategy {
            Strategy::Exact { bucket_ms } => exact(&items, budget.total_ms, bucket_ms),
            Strategy::Approximate => approximate(scored, &items, budget.total_ms),
        }
    };
    selected.sort_unstable();

    let total_cost_ms = selected
        .iter()
        .fold(0u64, |acc, &i| acc.saturating_add(scored[i].cost_ms()));
    let total_score = selected.iter().map(|&i| scored[i].score()).sum();

    Selection {
        selected,
        over_budget,
        total_cost_ms,
        total_score,
        strategy,
    }
}

/// Dynamic programming over integer cost buckets.
///
/// Items are ordered by id; reconstruction takes an item whenever doing so is
/// still optimal, so among equal optima the one containing smaller ids wins.
fn exact(items: &[Item], budget_ms: u64, bucket_ms: u64) -> Vec<usize> {
    let n = items.len();
    let cap = (budget_ms / bucket_ms) as usize;
    let weights: Vec<usize> = items
        .iter()
        .map(|it| it.cost.div_ceil(bucket_ms) as usize)
        .collect();

    let width = cap + 1;
    let mut take = vec![false; n * width];
    let mut next = vec![Objective::default(); width];
    let mut cur = vec![Objective::default(); width];

    for i in (0..n).rev() {
        let w = weights[i];
        for c in 0..width {
            let skip = next[c];
            cur[c] = skip;
            if w <= c {
                let with = next[c - w].with(&items[i]);
                if !skip.better_than(with) {
                    cur[c] = with;
                    take[i * width + c] = true;
                }
            }
        }
        std::mem::swap(&mut cur, &mut next);
    }

    let mut chosen = Vec::new();
    let mut c = cap;
    for (i, item) in items.iter().enumerate() {
        if weights[i] <= c && take[i * width + c] {
            chosen.push(item.index);
            c -= weights[i];
        }
    }
    chosen
}

fn ratio(item: &Item) -> f64 {
    if item.cost == 0 {
        f64::INFINITY
    } else {
        item.value as f64 / item.cost as f64
    }
}

/// Greedy fill by descending score/cost ratio followed by a local-swap pass.
fn approximate(scored: &[ScoredMutant], items: &[Item], budget_ms: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        ratio(&items[b])
            .total_cmp(&ratio(&items[a]))
            .then_with(|| items[b].value.cmp(&items[a].value))
            .then_with(|| scored[items[a].index].id().cmp(scored[items[b].index].id()))
    });

    let mut chosen = vec![false; items.len()];
    let mut total = Objective::default();
    fill(items, &order, &mut chosen, &mut total, budget_ms);

    // A single high-value item can beat the whole greedy fill.
    if let Some(&best) = order.iter().max_by(|&&a, &&b| {
        items[a]
            .value
            .cmp(&items[b].value)
            .then_with(|| items[b].cost.cmp(&items[a].cost))
    }) {
        let single = Objective::default().with(&items[best]);
        if single.better_than(total) {
            chosen.iter_mut().for_each(|c| *c = false);
            chosen[best] = true;
            total = single;
            fill(items, &order, &mut chosen, &mut total, budget_ms);
        }
    }

    for _ in 0..items.len() {
        let Some(lowest) = order.iter().rev().copied().find(|&i| chosen[i]) else {
            break;
        };

        let base = Objective {
            value: total.value - items[lowest].value,
            cost: total.cost - items[lowest].cost,
        };

        let mut swap: Option<(usize, Objective)> = None;
        for &u in &order {
            if chosen[u] || !fits(base.cost, items[u].cost, budget_ms) {
                continue;
            }
            let candidate = base.with(&items[u]);
            let current_best = swap.map(|(_, o)| o).unwrap_or(total);
            if candidate.better_than(current_best) {
                swap = Some((u, candidate));
            }
        }

        let Some((u, improved)) = swap else {
            break;
        };

        debug!(
            out = scored[items[lowest].index].id(),
            into = scored[items[u].index].id(),
            "local swap"
        );
        chosen[lowest] = false;
        chosen[u] = true;
        total = improved;
        fill(items, &order, &mut chosen, &mut total, budget_ms);
    }

    (0..items.len())
        .filter(|&i| chosen[i])
        .map(|i| items[i].index)
        .collect()
}

/// Whether `cost` more still fits; an overflowing sum never fits.
fn fits(spent: u64, cost: u64, budget_ms: u64) -> bool {
    spent.checked_add(cost).is_some_and(|total| total <= budget_ms)
}

/// Add every unchosen item that still fits, in `order`.
fn fill(items: &[Item], order: &[usize], chosen: &mut [bool], total: &mut Objective, budget_ms: u64) {
    for &i in order {
        let it = &items[i];
        if chosen[i] || !fits(total.cost, it.cost, budget_ms) {
            continue;
        }
        // Zero-value items only cost time.
        if it.value == 0 && it.cost > 0 {
            continue;
        }
        chosen[i] = true;
        *total = total.with(it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::fixtures::scored;
    use proptest::prelude::*;
    use proptest::strategy::Strategy as _;
    use super::Strategy;

    fn all(scored: &[ScoredMutant]) -> Vec<usize> {
        (0..scored.len()).collect()
    }

    fn config(mode: OptimizerMode) -> OptimizerConfig {
        OptimizerConfig {
            mode,
            ..OptimizerConfig::default()
        }
    }

    fn ids(scored: &[ScoredMutant], sel: &Selection) -> Vec<String> {
        sel.selected
            .iter()
            .map(|&i| scored[i].id().to_string())
            .collect()
    }

    fn budget(ms: u64) -> Budget {
        Budget { total_ms: ms }
    }

    /// Best (value, cost) over every subset; ids break remaining ties.
    fn brute_force(scored: &[ScoredMutant], budget_ms: u64) -> Objective {
        let n = scored.len();
        let mut best = Objective::default();
        for mask in 0u32..(1 << n) {
            let mut o = Objective::default();
            for i in 0..n {
                if mask & (1 << i) != 0 {
                    o.value += fixed_point(scored[i].score());
                    o.cost += scored[i].cost_ms();
                }
            }
            if o.cost <= budget_ms && o.better_than(best) {
                best = o;
            }
        }
        best
    }

    fn objective(scored: &[ScoredMutant], sel: &Selection) -> Objective {
        Objective {
            value: sel.selected.iter().map(|&i| fixed_point(scored[i].score())).sum(),
            cost: sel.total_cost_ms,
        }
    }

    #[test]
    fn scenario_a_representatives_fill_the_budget() {
        let batch = vec![
            scored("M2", 0.8, 5, &["t1"]),
            scored("M3", 0.5, 3, &["t1", "t2", "t3"]),
        ];

        for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
            let sel = optimize(&batch, &all(&batch), budget(8), &config(mode));
            assert_eq!(ids(&batch, &sel), vec!["M2", "M3"]);
            assert_eq!(sel.total_cost_ms, 8);
            assert!((sel.total_score - 1.3).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_budget_selects_nothing() {
        let batch = vec![scored("free", 0.9, 0, &["t1"]), scored("m", 0.5, 3, &["t2"])];
        for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
            let sel = optimize(&batch, &all(&batch), budget(0), &config(mode));
            assert!(sel.selected.is_empty());
            assert_eq!(sel.total_cost_ms, 0);
            assert_eq!(sel.total_score, 0.0);
        }
    }

    #[test]
    fn mutant_costlier_than_budget_is_never_selected() {
        let batch = vec![
            scored("big", 1.0, 11, &["t1"]),
            scored("a", 0.2, 4, &["t2"]),
            scored("b", 0.1, 4, &["t3"]),
        ];
        for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
            let sel = optimize(&batch, &all(&batch), budget(10), &config(mode));
            assert_eq!(ids(&batch, &sel), vec!["a", "b"]);
            assert_eq!(sel.over_budget, vec![0]);
        }
    }

    #[test]
    fn equal_scores_prefer_cheaper_subset_then_lower_ids() {
        let batch = vec![
            scored("d", 0.5, 4, &["t1"]),
            scored("c", 0.5, 2, &["t2"]),
            scored("b", 0.5, 2, &["t3"]),
            scored("a", 0.5, 2, &["t4"]),
        ];
        let sel = optimize(&batch, &all(&batch), budget(4), &config(OptimizerMode::Exact));
        assert_eq!(ids(&batch, &sel), vec!["b", "a"]);
        assert_eq!(sel.total_cost_ms, 4);
    }

    #[test]
    fn local_swap_recovers_from_a_poor_greedy_fill() {
        let batch = vec![
            scored("A", 0.6, 5, &["t1"]),
            scored("B", 0.33, 3, &["t2"]),
            scored("C", 0.5, 5, &["t3"]),
        ];
        let sel = optimize(&batch, &all(&batch), budget(10), &config(OptimizerMode::Approximate));
        assert_eq!(ids(&batch, &sel), vec!["A", "C"]);
        assert_eq!(sel.total_cost_ms, 10);
    }

    #[test]
    fn costs_near_u64_max_never_wrap() {
        let batch = vec![
            scored("cheap", 0.4, 1, &["t1"]),
            scored("huge", 0.9, u64::MAX - 1, &["t2"]),
            scored("max", 0.8, u64::MAX, &["t3"]),
        ];
        for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
            let sel = optimize(&batch, &all(&batch), budget(u64::MAX), &config(mode));
            let real: u128 = sel.selected.iter().map(|&i| batch[i].cost_ms() as u128).sum();
            assert!(real <= u64::MAX as u128, "{mode:?} overran the budget");
            assert_eq!(sel.total_cost_ms as u128, real);
        }
    }

    #[test]
    fn auto_mode_switches_on_threshold() {
        let cfg = OptimizerConfig {
            mode: OptimizerMode::Auto,
            exact_threshold: 2,
            max_buckets: 100,
        };
        assert_eq!(
            Strategy::resolve(&cfg, 2, budget(1_000)),
            Strategy::Exact { bucket_ms: 10 }
        );
        assert_eq!(Strategy::resolve(&cfg, 3, budget(1_000)), Strategy::Approximate);
        assert_eq!(
            Strategy::resolve(&cfg, 1, budget(50)),
            Strategy::Exact { bucket_ms: 1 }
        );
    }

    #[test]
    fn bucketed_costs_never_overrun_the_budget() {
        let batch: Vec<ScoredMutant> = (0..30)
            .map(|i| scored(&format!("m{i:02}"), 0.3 + (i % 7) as f64 / 10.0, 97 + i * 13, &[]))
            .collect();
        let cfg = OptimizerConfig {
            mode: OptimizerMode::Exact,
            exact_threshold: 0,
            max_buckets: 16,
        };
        let sel = optimize(&batch, &all(&batch), budget(1_234), &cfg);
        assert!(sel.total_cost_ms <= 1_234);
        assert!(!sel.selected.is_empty());
    }

    #[test]
    fn exact_matches_brute_force_on_twenty_mutants() {
        let batch: Vec<ScoredMutant> = (0..20u64)
            .map(|i| {
                scored(
                    &format!("m{i:02}"),
                    ((i * 37) % 100) as f64 / 100.0,
                    1 + (i * 7) % 11,
                    &[],
                )
            })
            .collect();
        let sel = optimize(&batch, &all(&batch), budget(40), &config(OptimizerMode::Exact));
        assert_eq!(objective(&batch, &sel), brute_force(&batch, 40));
    }

    fn arb_batch() -> impl proptest::strategy::Strategy<Value = (Vec<ScoredMutant>, u64)> {
        (
            prop::collection::vec((0u32..=100, 0u64..20), 1..12),
            0u64..60,
        )
            .prop_map(|(rows, budget)| {
                let batch = rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, (score, cost))| {
                        scored(&format!("m{i:02}"), score as f64 / 100.0, cost, &[])
                    })
                    .collect();
                (batch, budget)
            })
    }

    proptest! {
        #[test]
        fn exact_mode_is_optimal((batch, b) in arb_batch()) {
            let sel = optimize(&batch, &all(&batch), budget(b), &config(OptimizerMode::Exact));
            prop_assert!(sel.total_cost_ms <= b);
            if b > 0 {
                prop_assert_eq!(objective(&batch, &sel), brute_force(&batch, b));
            }
        }

        #[test]
        fn selection_never_exceeds_budget((batch, b) in arb_batch()) {
            for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
                let sel = optimize(&batch, &all(&batch), budget(b), &config(mode));
                prop_assert!(sel.total_cost_ms <= b);
                for &i in &sel.selected {
                    prop_assert!(batch[i].cost_ms() <= b);
                }
            }
        }

        #[test]
        fn optimization_is_deterministic((batch, b) in arb_batch()) {
            for mode in [OptimizerMode::Exact, OptimizerMode::Approximate] {
                let first = optimize(&batch, &all(&batch), budget(b), &config(mode));
                let second = optimize(&batch, &all(&batch), budget(b), &config(mode));
                prop_assert_eq!(first, second);
            }
        }
    }
}
