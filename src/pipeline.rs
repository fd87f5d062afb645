use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ConfigError, PlanConfig};
use crate::ingest::ingest;
use crate::optimizer::optimize;
use crate::plan::{Plan, assemble};
use crate::scoring::score_all;
use crate::subsumption::{SubsumptionError, analyze};

/// Errors that abort a planning run. Per-mutant problems never end up here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("inconsistent kill-set data: {0}")]
    Consistency(#[from] SubsumptionError),
}

/// Run the whole pipeline on one batch: validate, score, reduce, select, assemble.
///
/// A pure function of its inputs: the same batch and configuration always
/// produce the same plan.
pub fn run(records: Vec<Value>, config: &PlanConfig) -> Result<Plan, PlanError> {
    let budget = config.validate()?;

    let ingested = ingest(records);
    if !ingested.rejections.is_empty() {
        warn!(
            rejected = ingested.rejections.len(),
            "some mutants were rejected and will not be planned"
        );
    }

    let scored = score_all(ingested.mutants, &config.weights);
    let reduction = analyze(&scored, &config.subsumption)?;
    let selection = optimize(
        &scored,
        &reduction.representatives,
        budget,
        &config.optimizer,
    );

    info!(strategy = ?selection.strategy, "selection complete");

    Ok(assemble(
        &scored,
        reduction,
        selection,
        ingested.rejections,
        budget,
    ))
}
