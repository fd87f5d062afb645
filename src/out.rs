use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::plan::{Plan, PlannedMutant};
use crate::report::{format_trace, strategy_label};
use crate::run_report::PlanReport;

/// Write every plan artifact into `out_dir`, creating it if needed.
pub fn write_plan_artifacts(out_dir: &Path, report: &PlanReport) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir {:?}", out_dir))?;

    write_pretty_json(&out_dir.join("plan.json"), report)?;

    if let Some(plan) = &report.plan {
        write_plan_txts(out_dir, plan)?;
    }
    write_log(out_dir, report)
}

/// Write plain-text lists, one mutant per line:
/// - selected.txt (execution order)
/// - deferred.txt (ranking order)
/// - subsumed.txt (sorted by id, with the subsuming representative)
/// - rejected.txt (batch order, with the reason)
pub fn write_plan_txts(out_dir: &Path, plan: &Plan) -> Result<()> {
    write_atomic(&out_dir.join("selected.txt"), &planned_lines(&plan.order))?;
    write_atomic(&out_dir.join("deferred.txt"), &planned_lines(&plan.deferred))?;

    let subsumed: String = plan
        .subsumed
        .iter()
        .map(|(id, t)| format_trace(id, &t.representative, t.reason) + "\n")
        .collect();
    write_atomic(&out_dir.join("subsumed.txt"), &subsumed)?;

    let rejected: String = plan
        .rejected
        .iter()
        .map(|r| {
            format!(
                "{}\t{}\t{}\n",
                r.index,
                r.id.as_deref().unwrap_or("-"),
                r.reason
            )
        })
        .collect();
    write_atomic(&out_dir.join("rejected.txt"), &rejected)
}

/// Write a stable `log` file (no timestamps) with the run summary or error.
pub fn write_log(out_dir: &Path, report: &PlanReport) -> Result<()> {
    let mut lines = vec![
        format!("tool: {}", report.tool),
        format!("version: {}", report.version),
        format!("mutants_file: {}", report.mutants_file.display()),
    ];

    if let Some(plan) = &report.plan {
        let s = &plan.stats;
        lines.push(format!("budget_ms: {}", plan.budget_ms));
        lines.push(format!("strategy: {}", strategy_label(&s.strategy)));
        lines.push(format!(
            "mutants: input={} rejected={} representatives={} subsumed={}",
            s.input, s.rejected, s.representatives, s.subsumed
        ));
        lines.push(format!(
            "selection: selected={} deferred={} over_budget={}",
            s.selected, s.deferred, s.over_budget
        ));
        lines.push(format!(
            "totals: cost_ms={} score={:.6}",
            plan.total_cost_ms, plan.total_score
        ));
    }
    if let Some(err) = &report.error {
        lines.push(format!("error: {err}"));
    }

    write_atomic(&out_dir.join("log"), &(lines.join("\n") + "\n"))
}

fn planned_lines(mutants: &[PlannedMutant]) -> String {
    // The file is created even when the list is empty.
    mutants
        .iter()
        .map(|p| format!("{}\t{}\t{:.6}\t{}ms\n", p.id, p.location, p.score, p.cost_ms))
        .collect()
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {:?}", dir))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {:?}", path))?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist {:?}", path))?;
    Ok(())
}

// `?Sized` allows passing unsized values such as slices.
fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize json")?;
    write_atomic(path, &(json + "\n"))
}
