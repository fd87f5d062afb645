use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::factor::Factor;
use crate::ingest::{ingest, read_batch};
use crate::mutant::{ChangeKey, MutantId};

/// High-level overview of a mutant batch, computed without planning.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOverview {
    /// Batch file the overview was computed from.
    pub path: PathBuf,

    /// Number of records in the file.
    pub records: usize,

    /// Records that passed validation.
    pub valid: usize,

    /// Records dropped at ingestion.
    pub rejected: usize,

    /// Distinct test identifiers across all kill sets.
    pub distinct_tests: usize,

    /// Distinct non-empty kill sets (upper bound on equivalence classes).
    pub distinct_kill_sets: usize,

    /// Valid mutants no test kills.
    pub unkilled: usize,

    /// Cost of running every valid mutant.
    pub total_cost_ms: u64,

    /// Number of valid mutants carrying a signal for each factor.
    pub factor_coverage: BTreeMap<Factor, usize>,

    /// Valid mutants per operator kind.
    pub operators: BTreeMap<String, usize>,

    /// Groups of ids that apply the same edit at the same place, sorted.
    pub duplicate_changes: Vec<Vec<MutantId>>,
}

/// Read a batch and summarise it.
pub fn scan_batch(path: &Path) -> Result<BatchOverview> {
    let records = read_batch(path)?;
    let total = records.len();
    let ingested = ingest(records);

    let mut tests: BTreeSet<&str> = BTreeSet::new();
    let mut kill_sets: BTreeSet<Vec<&str>> = BTreeSet::new();
    let mut factor_coverage: BTreeMap<Factor, usize> =
        Factor::ALL.iter().map(|&f| (f, 0)).collect();
    let mut operators: BTreeMap<String, usize> = BTreeMap::new();
    let mut changes: BTreeMap<ChangeKey<'_>, Vec<MutantId>> = BTreeMap::new();

    for m in &ingested.mutants {
        tests.extend(m.kill_set.iter().map(String::as_str));
        if !m.is_unkilled() {
            kill_sets.insert(m.kill_set.iter().map(String::as_str).collect());
        }
        for factor in m.factor_signals.keys() {
            *factor_coverage.entry(*factor).or_default() += 1;
        }
        *operators.entry(m.location.operator.to_string()).or_default() += 1;
        changes.entry(m.change_key()).or_default().push(m.id.clone());
    }

    let mut duplicate_changes: Vec<Vec<MutantId>> = changes
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|mut ids| {
            ids.sort();
            ids
        })
        .collect();
    duplicate_changes.sort();

    Ok(BatchOverview {
        path: path.to_path_buf(),
        records: total,
        valid: ingested.mutants.len(),
        rejected: ingested.rejections.len(),
        distinct_tests: tests.len(),
        distinct_kill_sets: kill_sets.len(),
        unkilled: ingested.mutants.iter().filter(|m| m.is_unkilled()).count(),
        total_cost_ms: ingested
            .mutants
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.execution_cost_ms)),
        factor_coverage,
        operators,
        duplicate_changes,
    })
}
