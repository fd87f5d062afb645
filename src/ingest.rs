use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::MAX_MILLIS;
use crate::factor::Factor;
use crate::mutant::{Location, Mutant, MutantId, OperatorKind};

/// Why a single record was dropped from the batch.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("record could not be parsed: {0}")]
    Unparseable(String),

    #[error("missing mutant id")]
    MissingId,

    #[error("duplicate mutant id")]
    DuplicateId,

    #[error("missing location field `{0}`")]
    MissingLocationField(&'static str),

    #[error("unknown factor `{0}`")]
    UnknownFactor(String),

    #[error("signal for `{0}` is not a finite number")]
    NonFiniteSignal(Factor),

    #[error("missing execution cost")]
    MissingCost,

    #[error("execution cost must be a finite number of milliseconds in [0, 2^53], got {0}")]
    InvalidCost(f64),
}

/// A record dropped at ingestion. The rest of the batch is still planned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position of the record in the batch file.
    pub index: usize,

    /// Mutant id, when the record had a usable one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MutantId>,

    pub reason: RejectReason,
}

/// Location as supplied by an adapter; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocationRecord {
    #[serde(alias = "file_path")]
    pub file: Option<PathBuf>,
    #[serde(alias = "line_start")]
    pub start_line: Option<u32>,
    #[serde(alias = "column_start")]
    pub start_column: Option<u32>,
    #[serde(alias = "line_end")]
    pub end_line: Option<u32>,
    #[serde(alias = "column_end")]
    pub end_column: Option<u32>,
    pub operator: Option<OperatorKind>,
}

/// One mutant as it arrives from an adapter, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutantRecord {
    pub id: Option<String>,
    pub location: Option<LocationRecord>,
    #[serde(alias = "killSet", alias = "killing_tests")]
    pub kill_set: Vec<String>,
    #[serde(alias = "executionCostMs")]
    pub execution_cost_ms: Option<f64>,
    #[serde(alias = "factorSignals")]
    pub factor_signals: BTreeMap<String, f64>,
    pub description: Option<String>,
    pub original_code: Option<String>,
    pub mutated_code: Option<String>,
}

impl MutantRecord {
    /// Turn the record into a [`Mutant`] or explain why it cannot be one.
    pub fn validate(self) -> Result<Mutant, RejectReason> {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(RejectReason::MissingId),
        };

        let location = validate_location(self.location)?;

        let mut factor_signals = BTreeMap::new();
        for (name, value) in self.factor_signals {
            let factor: Factor = name
                .parse()
                .map_err(|_| RejectReason::UnknownFactor(name.clone()))?;
            if !value.is_finite() {
                return Err(RejectReason::NonFiniteSignal(factor));
            }
            factor_signals.insert(factor, value);
        }

        let cost = self.execution_cost_ms.ok_or(RejectReason::MissingCost)?;
        if !cost.is_finite() || !(0.0..=MAX_MILLIS).contains(&cost) {
            return Err(RejectReason::InvalidCost(cost));
        }

        Ok(Mutant {
            id,
            location,
            kill_set: self.kill_set.into_iter().collect::<BTreeSet<_>>(),
            // Round up so the budget check never underestimates a mutant.
            execution_cost_ms: cost.ceil() as u64,
            factor_signals,
            description: self.description,
            original_code: self.original_code,
            mutated_code: self.mutated_code,
        })
    }
}

fn validate_location(record: Option<LocationRecord>) -> Result<Location, RejectReason> {
    let loc = record.ok_or(RejectReason::MissingLocationField("location"))?;

    let file = loc.file.ok_or(RejectReason::MissingLocationField("file"))?;
    let start_line = loc
        .start_line
        .ok_or(RejectReason::MissingLocationField("start_line"))?;
    let start_column = loc
        .start_column
        .ok_or(RejectReason::MissingLocationField("start_column"))?;
    let operator = loc
        .operator
        .ok_or(RejectReason::MissingLocationField("operator"))?;

    Ok(Location {
        file,
        start_line,
        start_column,
        end_line: loc.end_line.unwrap_or(start_line),
        end_column: loc.end_column.unwrap_or(start_column),
        operator,
    })
}

/// Valid mutants in batch order plus every rejected record.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub mutants: Vec<Mutant>,
    pub rejections: Vec<Rejection>,
}

/// Validate each record independently; malformed ones are logged and skipped.
pub fn ingest(records: Vec<Value>) -> Ingested {
    let mut out = Ingested::default();
    let mut seen: BTreeSet<MutantId> = BTreeSet::new();

    for (index, value) in records.into_iter().enumerate() {
        let raw_id = value.get("id").and_then(Value::as_str).map(str::to_string);

        let result = serde_json::from_value::<MutantRecord>(value)
            .map_err(|e| RejectReason::Unparseable(e.to_string()))
            .and_then(MutantRecord::validate)
            .and_then(|m| {
                if seen.insert(m.id.clone()) {
                    Ok(m)
                } else {
                    Err(RejectReason::DuplicateId)
                }
            });

        match result {
            Ok(m) => out.mutants.push(m),
            Err(reason) => {
                warn!(index, mutant = ?raw_id, %reason, "rejecting malformed mutant");
                out.rejections.push(Rejection {
                    index,
                    id: raw_id,
                    reason,
                });
            }
        }
    }

    out
}

/// Parse a batch: either `{ "mutants": [...] }` or a bare array.
pub fn parse_batch(text: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(text).context("batch is not valid JSON")?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut obj) => match obj.remove("mutants") {
            Some(Value::Array(records)) => Ok(records),
            _ => anyhow::bail!("batch object must contain a `mutants` array"),
        },
        _ => anyhow::bail!("batch must be an array or an object with a `mutants` array"),
    }
}

/// Read and parse a batch file from disk.
pub fn read_batch(path: &Path) -> Result<Vec<Value>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read batch {:?}", path))?;
    parse_batch(&text).with_context(|| format!("failed to parse batch {:?}", path))
}
