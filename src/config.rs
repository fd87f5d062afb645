use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::factor::Factor;

/// Allowed drift of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Largest cost or budget accepted, in milliseconds (2^53, exact in `f64`).
pub const MAX_MILLIS: f64 = 9_007_199_254_740_992.0;

/// Caller mistakes in the run configuration. These abort the run before scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("weight for `{factor}` must be within [0, 1], got {value}")]
    WeightOutOfRange { factor: Factor, value: f64 },

    #[error("factor weights must sum to 1.0, got {sum}")]
    WeightSum { sum: f64 },

    #[error("budget must be a finite number of milliseconds in [0, 2^53], got {0}")]
    InvalidBudget(f64),

    #[error("min_similarity must be within [0, 1], got {0}")]
    InvalidSimilarity(f64),

    #[error("optimizer max_buckets must be at least 1")]
    ZeroBuckets,
}

/// Weight per scoring factor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FactorWeights {
    pub historical: f64,
    pub complexity: f64,
    pub security: f64,
    pub recency: f64,
    #[serde(alias = "bugCorrelation")]
    pub bug_correlation: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            historical: 0.30,
            complexity: 0.25,
            security: 0.20,
            recency: 0.15,
            bug_correlation: 0.10,
        }
    }
}

impl FactorWeights {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Historical => self.historical,
            Factor::Complexity => self.complexity,
            Factor::Security => self.security,
            Factor::Recency => self.recency,
            Factor::BugCorrelation => self.bug_correlation,
        }
    }

    /// Every weight in [0,1] and the five summing to 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for factor in Factor::ALL {
            let value = self.get(factor);
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::WeightOutOfRange { factor, value });
            }
        }

        let sum: f64 = Factor::ALL.iter().map(|&f| self.get(f)).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        Ok(())
    }
}

/// Optimizer selection policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerMode {
    /// Dynamic programming over cost buckets.
    Exact,

    /// Greedy by score/cost ratio plus a local-swap pass.
    Approximate,

    /// Exact up to `exact_threshold` candidates, approximate above.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub mode: OptimizerMode,

    /// Largest candidate count that `auto` still solves exactly.
    pub exact_threshold: usize,

    /// Upper bound on the DP cost axis; costs are bucketed to fit.
    pub max_buckets: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            mode: OptimizerMode::Auto,
            exact_threshold: 512,
            max_buckets: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SubsumptionConfig {
    /// Minimum `|kill(B)| / |kill(A)|` for A to subsume B. 0.0 keeps pure containment.
    pub min_similarity: f64,
}

/// Total time available for one run, fixed for its duration.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Budget {
    pub total_ms: u64,
}

impl Budget {
    /// Rounds down so the integer budget never exceeds what the caller allowed.
    pub fn from_millis(ms: f64) -> Result<Self, ConfigError> {
        if !ms.is_finite() || !(0.0..=MAX_MILLIS).contains(&ms) {
            return Err(ConfigError::InvalidBudget(ms));
        }
        Ok(Self {
            total_ms: ms.floor() as u64,
        })
    }
}

/// Everything one planning run needs besides the mutant batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PlanConfig {
    pub weights: FactorWeights,
    pub optimizer: OptimizerConfig,
    pub subsumption: SubsumptionConfig,

    /// Budget in milliseconds; `--budget-ms` overrides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_ms: Option<f64>,
}

impl PlanConfig {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read config {:?}", path))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Check every configuration invariant and resolve the budget.
    pub fn validate(&self) -> Result<Budget, ConfigError> {
        self.weights.validate()?;

        let s = self.subsumption.min_similarity;
        if !(0.0..=1.0).contains(&s) {
            return Err(ConfigError::InvalidSimilarity(s));
        }

        if self.optimizer.max_buckets == 0 {
            return Err(ConfigError::ZeroBuckets);
        }

        Budget::from_millis(self.budget_ms.unwrap_or(0.0))
    }
}
