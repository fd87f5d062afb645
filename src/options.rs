use std::path::PathBuf;

use anyhow::Result;

use crate::config::{OptimizerMode, PlanConfig};

/// Options for a `plan` run, derived from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    /// Batch of mutant records (JSON).
    pub mutants: PathBuf,

    /// Optional JSON configuration file.
    pub config: Option<PathBuf>,

    /// Budget override in milliseconds.
    pub budget_ms: Option<f64>,

    /// Optimizer mode override.
    pub mode: Option<OptimizerMode>,

    /// Exact/approximate crossover override.
    pub exact_threshold: Option<usize>,

    /// When true, emit JSON output instead of human-readable summary.
    pub json_output: bool,

    /// Print deferred, subsumed and rejected mutants too.
    pub verbose: bool,

    /// Directory for plan artifacts.
    pub out_dir: Option<PathBuf>,

    /// Exit with the failure code when any mutant was rejected.
    pub fail_on_rejected: bool,
}

impl Options {
    /// Construct an `Options` instance with default values.
    pub fn new(mutants: PathBuf) -> Self {
        Self {
            mutants,
            config: None,
            budget_ms: None,
            mode: None,
            exact_threshold: None,
            json_output: false,
            verbose: false,
            out_dir: None,
            fail_on_rejected: false,
        }
    }

    /// Load the configuration file (if any) and apply CLI overrides on top.
    pub fn plan_config(&self) -> Result<PlanConfig> {
        let mut config = match &self.config {
            Some(path) => PlanConfig::from_file(path)?,
            None => PlanConfig::default(),
        };

        if let Some(budget) = self.budget_ms {
            config.budget_ms = Some(budget);
        }
        if let Some(mode) = self.mode {
            config.optimizer.mode = mode;
        }
        if let Some(threshold) = self.exact_threshold {
            config.optimizer.exact_threshold = threshold;
        }

        Ok(config)
    }
}
