use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::Budget;
use crate::factor::Factor;
use crate::ingest::Rejection;
use crate::mutant::{Location, MutantId, MutantStatus};
use crate::optimizer::{Selection, Strategy};
use crate::scoring::{ScoredMutant, rank_cmp};
use crate::subsumption::{Reduction, ReductionStats, Trace};

/// One representative, as it appears in the plan.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedMutant {
    pub id: MutantId,
    pub location: Location,
    pub score: f64,
    pub cost_ms: u64,

    /// Mutants this representative stands for, itself included.
    pub class_size: usize,

    /// Factors that fell back to the neutral default.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imputed: Vec<Factor>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanStats {
    pub input: usize,
    pub rejected: usize,
    pub representatives: usize,
    pub subsumed: usize,
    pub selected: usize,
    pub deferred: usize,
    pub over_budget: usize,
    pub low_confidence: usize,
    pub reduction: ReductionStats,
    pub strategy: Strategy,

    /// Cost of running every valid mutant.
    pub full_cost_ms: u64,

    /// Share of `full_cost_ms` the plan avoids.
    pub cost_saved_percent: f64,

    /// Share of the budget the plan consumes.
    pub budget_utilisation_percent: f64,
}

/// Final artifact of a planning run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Plan {
    pub budget_ms: u64,

    /// Selected mutants in execution order.
    pub order: Vec<PlannedMutant>,

    /// Representatives left out of the budget, in ranking order.
    pub deferred: Vec<PlannedMutant>,

    pub total_cost_ms: u64,
    pub total_score: f64,

    /// Eliminated mutant -> representative that subsumed it.
    pub subsumed: BTreeMap<MutantId, Trace>,

    /// Final status of every mutant in the batch that had an id.
    pub status: BTreeMap<MutantId, MutantStatus>,

    pub rejected: Vec<Rejection>,
    pub stats: PlanStats,
}

impl Plan {
    /// Selected ids in execution order.
    #[cfg(test)]
    pub fn selected_ids(&self) -> Vec<&str> {
        self.order.iter().map(|p| p.id.as_str()).collect()
    }
}

fn planned(s: &ScoredMutant, class_sizes: &BTreeMap<MutantId, usize>) -> PlannedMutant {
    PlannedMutant {
        id: s.mutant.id.clone(),
        location: s.mutant.location.clone(),
        score: s.score(),
        cost_ms: s.cost_ms(),
        class_size: class_sizes.get(&s.mutant.id).copied().unwrap_or(1),
        imputed: s.card.imputed(),
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Order the selection and aggregate upstream results into a [`Plan`].
pub fn assemble(
    scored: &[ScoredMutant],
    reduction: Reduction,
    selection: Selection,
    rejected: Vec<Rejection>,
    budget: Budget,
) -> Plan {
    let mut chosen: Vec<&ScoredMutant> = selection.selected.iter().map(|&i| &scored[i]).collect();
    chosen.sort_by(|a, b| rank_cmp(a, b));

    let mut left_out: Vec<&ScoredMutant> = reduction
        .representatives
        .iter()
        .filter(|i| selection.selected.binary_search(i).is_err())
        .map(|&i| &scored[i])
        .collect();
    left_out.sort_by(|a, b| rank_cmp(a, b));

    let order: Vec<PlannedMutant> = chosen
        .iter()
        .map(|s| planned(s, &reduction.class_sizes))
        .collect();
    let deferred: Vec<PlannedMutant> = left_out
        .iter()
        .map(|s| planned(s, &reduction.class_sizes))
        .collect();

    for p in order.iter().filter(|p| p.class_size > 1) {
        info!(mutant = %p.id, class_size = p.class_size, "representative of a larger class");
    }

    let mut status = BTreeMap::new();
    for p in &order {
        status.insert(p.id.clone(), MutantStatus::Selected);
    }
    for p in &deferred {
        status.insert(p.id.clone(), MutantStatus::Deferred);
    }
    for id in reduction.trace.keys() {
        status.insert(id.clone(), MutantStatus::Subsumed);
    }
    for r in &rejected {
        if let Some(id) = &r.id {
            status.entry(id.clone()).or_insert(MutantStatus::Rejected);
        }
    }

    let full_cost_ms = scored
        .iter()
        .fold(0u64, |acc, s| acc.saturating_add(s.cost_ms()));

    let stats = PlanStats {
        input: scored.len() + rejected.len(),
        rejected: rejected.len(),
        representatives: reduction.representatives.len(),
        subsumed: reduction.trace.len(),
        selected: order.len(),
        deferred: deferred.len(),
        over_budget: selection.over_budget.len(),
        low_confidence: scored.iter().filter(|s| !s.card.imputed().is_empty()).count(),
        reduction: reduction.stats.clone(),
        strategy: selection.strategy,
        full_cost_ms,
        cost_saved_percent: percent(
            full_cost_ms.saturating_sub(selection.total_cost_ms),
            full_cost_ms,
        ),
        budget_utilisation_percent: percent(selection.total_cost_ms, budget.total_ms),
    };

    info!(
        selected = stats.selected,
        deferred = stats.deferred,
        subsumed = stats.subsumed,
        total_cost_ms = selection.total_cost_ms,
        "plan assembled"
    );

    Plan {
        budget_ms: budget.total_ms,
        order,
        deferred,
        total_cost_ms: selection.total_cost_ms,
        total_score: selection.total_score,
        subsumed: reduction.trace,
        status,
        rejected,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizerConfig, SubsumptionConfig};
    use crate::ingest::RejectReason;
    use crate::optimizer::optimize;
    use crate::mutant::fixtures::scored;
    use crate::subsumption::{EliminationReason, analyze};

    fn plan_for(batch: &[ScoredMutant], budget_ms: u64, rejected: Vec<Rejection>) -> Plan {
        let budget = Budget {
            total_ms: budget_ms,
        };
        let reduction = analyze(batch, &SubsumptionConfig::default()).unwrap();
        let selection = optimize(
            batch,
            &reduction.representatives,
            budget,
            &OptimizerConfig::default(),
        );
        assemble(batch, reduction, selection, rejected, budget)
    }

    #[test]
    fn plan_orders_by_score_and_tracks_every_mutant() {
        let batch = vec![
            scored("low", 0.2, 2, &["t1"]),
            scored("hi", 0.9, 4, &["t2"]),
            scored("hi-twin", 0.3, 1, &["t2"]),
            scored("mid", 0.5, 5, &["t3"]),
        ];
        let rejected = vec![Rejection {
            index: 4,
            id: Some("broken".to_string()),
            reason: RejectReason::MissingCost,
        }];

        let plan = plan_for(&batch, 6, rejected);

        assert_eq!(plan.selected_ids(), vec!["hi", "low"]);
        assert_eq!(plan.total_cost_ms, 6);
        assert_eq!(plan.order[0].class_size, 2);
        assert_eq!(plan.deferred.len(), 1);
        assert_eq!(plan.deferred[0].id, "mid");
        assert_eq!(
            plan.subsumed["hi-twin"].reason,
            EliminationReason::Equivalent
        );

        assert_eq!(plan.status["hi"], MutantStatus::Selected);
        assert_eq!(plan.status["mid"], MutantStatus::Deferred);
        assert_eq!(plan.status["hi-twin"], MutantStatus::Subsumed);
        assert_eq!(plan.status["broken"], MutantStatus::Rejected);

        assert_eq!(plan.stats.input, 5);
        assert_eq!(plan.stats.full_cost_ms, 12);
        assert!((plan.stats.cost_saved_percent - 50.0).abs() < 1e-9);
        assert!((plan.stats.budget_utilisation_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn full_cost_saturates_instead_of_wrapping() {
        let batch = vec![
            scored("a", 0.9, u64::MAX / 2 + 1, &["t1"]),
            scored("b", 0.4, u64::MAX / 2 + 1, &["t2"]),
        ];
        let plan = plan_for(&batch, 10, Vec::new());

        assert_eq!(plan.stats.full_cost_ms, u64::MAX);
        assert!(plan.order.is_empty());
    }

    #[test]
    fn infeasible_budget_gives_empty_plan() {
        let batch = vec![scored("a", 0.9, 50, &["t1"]), scored("b", 0.4, 60, &["t2"])];
        let plan = plan_for(&batch, 10, Vec::new());

        assert!(plan.order.is_empty());
        assert_eq!(plan.total_cost_ms, 0);
        assert_eq!(plan.stats.over_budget, 2);
        assert_eq!(plan.deferred.len(), 2);
    }
}
