use crate::mutant::{Mutant, MutantStatus};
use crate::optimizer::Strategy;
use crate::plan::Plan;
use crate::scoring::ScoredMutant;
use crate::subsumption::EliminationReason;
use crate::ui::Ui;

/// Print the headline numbers of a plan.
pub fn print_plan_summary(ui: &Ui, plan: &Plan) {
    let s = &plan.stats;

    ui.title("--- mutation plan summary ---");
    ui.line(format!("mutants in batch:   {}", s.input));
    ui.line(format!("rejected:           {}", s.rejected));
    ui.line(format!(
        "representatives:    {} ({} subsumed, {:.1}% reduction)",
        s.representatives, s.subsumed, s.reduction.reduction_percent
    ));
    ui.line(format!("strategy:           {}", strategy_label(&s.strategy)));
    ui.line(format!(
        "selected:           {} (deferred {}, over budget {})",
        s.selected, s.deferred, s.over_budget
    ));
    ui.line(format!(
        "total cost:         {}ms of {}ms budget ({:.1}%)",
        plan.total_cost_ms, plan.budget_ms, s.budget_utilisation_percent
    ));
    ui.line(format!("total score:        {:.4}", plan.total_score));
    ui.line(format!(
        "cost saved:         {:.1}% of {}ms for all mutants",
        s.cost_saved_percent, s.full_cost_ms
    ));
    if s.low_confidence > 0 {
        ui.line(format!(
            "low confidence:     {} mutant(s) with imputed factors",
            s.low_confidence
        ));
    }
}

/// Print the execution order.
pub fn print_plan_order(ui: &Ui, plan: &Plan) {
    if plan.order.is_empty() {
        return;
    }

    ui.title(format!("--- execution order ({}) ---", plan.order.len()));
    for (i, p) in plan.order.iter().enumerate() {
        ui.planned(i + 1, MutantStatus::Selected, p);
    }
}

/// Print deferred representatives and the subsumption trace.
pub fn print_plan_details(ui: &Ui, plan: &Plan) {
    if !plan.deferred.is_empty() {
        ui.title(format!("--- deferred ({}) ---", plan.deferred.len()));
        for (i, p) in plan.deferred.iter().enumerate() {
            ui.planned(i + 1, MutantStatus::Deferred, p);
        }
    }

    if !plan.subsumed.is_empty() {
        ui.title(format!("--- subsumed ({}) ---", plan.subsumed.len()));
        for (id, t) in &plan.subsumed {
            ui.line(format_trace(id, &t.representative, t.reason));
        }
    }

    if !plan.rejected.is_empty() {
        ui.title(format!("--- rejected ({}) ---", plan.rejected.len()));
        for r in &plan.rejected {
            let id = r.id.as_deref().unwrap_or("-");
            ui.line(format!("#{} (record {}): {}", id, r.index, r.reason));
        }
    }
}

pub fn format_trace(id: &str, representative: &str, reason: EliminationReason) -> String {
    let how = match reason {
        EliminationReason::Equivalent => "equivalent to",
        EliminationReason::Dominated => "dominated by",
    };
    format!("#{id} {how} #{representative}")
}

pub fn strategy_label(strategy: &Strategy) -> String {
    match strategy {
        Strategy::Exact { bucket_ms } => format!("exact (buckets of {bucket_ms}ms)"),
        Strategy::Approximate => "approximate (greedy + local swap)".to_string(),
    }
}

/// Multi-line breakdown of how a composite score was built.
pub fn format_score_card(s: &ScoredMutant) -> String {
    let mut lines = vec![format!(
        "#{} {} composite {:.4}",
        s.mutant.id, s.mutant.location, s.card.composite
    )];

    for f in &s.card.factors {
        let raw = match f.raw {
            Some(v) => format!("{v}"),
            None => "missing".to_string(),
        };
        lines.push(format!(
            "  {name:<16} raw {raw:>8}  norm {norm:.4}  x {weight:.2} = {contrib:.4}{imputed}",
            name = f.factor.name(),
            norm = f.normalized,
            weight = f.weight,
            contrib = f.contribution,
            imputed = if f.imputed { "  (imputed)" } else { "" },
        ));
    }

    lines.join("\n")
}

/// The edit a mutant applies, when the adapter supplied the code.
pub fn format_code_change(m: &Mutant) -> Option<String> {
    if m.original_code.is_none() && m.mutated_code.is_none() {
        return None;
    }

    let mut lines = Vec::new();
    if let Some(description) = &m.description {
        lines.push(format!("  {description}"));
    }
    lines.push(format!("  - {}", m.original_code.as_deref().unwrap_or("")));
    lines.push(format!("  + {}", m.mutated_code.as_deref().unwrap_or("")));
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactorWeights;
    use crate::factor::Factor;
    use crate::mutant::fixtures::mutant;
    use crate::scoring::score_all;

    #[test]
    fn trace_lines_are_stable() {
        insta::assert_snapshot!(
            format_trace("m7", "m2", EliminationReason::Dominated),
            @"#m7 dominated by #m2"
        );
        insta::assert_snapshot!(
            format_trace("m8", "m2", EliminationReason::Equivalent),
            @"#m8 equivalent to #m2"
        );
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(
            strategy_label(&Strategy::Exact { bucket_ms: 2 }),
            "exact (buckets of 2ms)"
        );
        assert_eq!(
            strategy_label(&Strategy::Approximate),
            "approximate (greedy + local swap)"
        );
    }

    #[test]
    fn code_change_lines() {
        let mut m = mutant("m1", 5, &["t1"]);
        assert_eq!(format_code_change(&m), None);

        m.description = Some("replaced + with -".to_string());
        m.original_code = Some("total + fee".to_string());
        m.mutated_code = Some("total - fee".to_string());

        assert_eq!(
            format_code_change(&m).unwrap(),
            "  replaced + with -\n  - total + fee\n  + total - fee"
        );
    }

    #[test]
    fn score_card_breakdown() {
        let mut m = mutant("m1", 5, &["t1"]);
        m.factor_signals.insert(Factor::Historical, 0.75);
        m.factor_signals.insert(Factor::Security, 1.0);

        let scored = score_all(vec![m], &FactorWeights::default());
        let text = format_score_card(&scored[0]);

        insta::assert_snapshot!(text, @r"
        #m1 src/lib.rs:1:1-1:2 arithmetic-replacement composite 0.6750
          historical       raw     0.75  norm 0.7500  x 0.30 = 0.2250
          complexity       raw  missing  norm 0.5000  x 0.25 = 0.1250  (imputed)
          security         raw        1  norm 1.0000  x 0.20 = 0.2000
          recency          raw  missing  norm 0.5000  x 0.15 = 0.0750  (imputed)
          bug_correlation  raw  missing  norm 0.5000  x 0.10 = 0.0500  (imputed)
        ");
    }
}
