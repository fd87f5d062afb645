use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::mutant::Mutant;

/// Value given to a factor when the mutant has no signal for it.
pub const NEUTRAL: f64 = 0.5;

/// The fixed set of scoring dimensions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Historical kill rate of the operator, already in [0,1].
    Historical,

    /// Complexity of the surrounding code (unbounded).
    Complexity,

    /// Security sensitivity on a fixed severity scale in [0,1].
    Security,

    /// Days since the code last changed (unbounded, smaller is hotter).
    Recency,

    /// Bug density of the file (unbounded).
    BugCorrelation,
}

impl Factor {
    pub const ALL: [Factor; 5] = [
        Factor::Historical,
        Factor::Complexity,
        Factor::Security,
        Factor::Recency,
        Factor::BugCorrelation,
    ];

    /// Position in [`Factor::ALL`], handy for fixed-size arrays.
    pub fn index(self) -> usize {
        match self {
            Factor::Historical => 0,
            Factor::Complexity => 1,
            Factor::Security => 2,
            Factor::Recency => 3,
            Factor::BugCorrelation => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Factor::Historical => "historical",
            Factor::Complexity => "complexity",
            Factor::Security => "security",
            Factor::Recency => "recency",
            Factor::BugCorrelation => "bug_correlation",
        }
    }

    /// How raw values of this factor are brought into [0,1].
    pub fn normalization(self) -> Normalization {
        match self {
            Factor::Historical | Factor::Security => Normalization::Clamp,
            Factor::Complexity | Factor::BugCorrelation => Normalization::MinMax { invert: false },
            Factor::Recency => Normalization::MinMax { invert: true },
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for factor names outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown factor `{0}`")]
pub struct UnknownFactor(pub String);

impl FromStr for Factor {
    type Err = UnknownFactor;

    /// Accepts the snake_case names plus the camelCase spellings some adapters emit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "historical" => Ok(Factor::Historical),
            "complexity" => Ok(Factor::Complexity),
            "security" => Ok(Factor::Security),
            "recency" => Ok(Factor::Recency),
            "bug_correlation" | "bugCorrelation" | "bug_history" => Ok(Factor::BugCorrelation),
            other => Err(UnknownFactor(other.to_string())),
        }
    }
}

/// Normalization strategy for one factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Value is already bounded; clamp into [0,1].
    Clamp,

    /// Scale against the observed population range.
    MinMax { invert: bool },
}

/// Observed range of one factor over the population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// Per-factor ranges, computed once over the whole batch before scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationStats {
    ranges: [Option<Range>; 5],
}

impl PopulationStats {
    /// First scoring phase: min/max per factor across all mutants that carry it.
    pub fn compute(mutants: &[Mutant]) -> Self {
        let mut stats = PopulationStats::default();

        for m in mutants {
            for (factor, &value) in &m.factor_signals {
                let slot = &mut stats.ranges[factor.index()];
                *slot = Some(match *slot {
                    None => Range {
                        min: value,
                        max: value,
                    },
                    Some(r) => Range {
                        min: r.min.min(value),
                        max: r.max.max(value),
                    },
                });
            }
        }

        stats
    }

    pub fn range(&self, factor: Factor) -> Option<Range> {
        self.ranges[factor.index()]
    }
}

/// A normalized factor value plus whether it was imputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub value: f64,
    pub imputed: bool,
}

/// Position of `raw` within `r`, clamped to [0,1].
///
/// Operands are halved first so ranges wider than `f64::MAX` stay finite.
fn min_max(raw: f64, r: Range) -> Option<f64> {
    let scaled = (raw * 0.5 - r.min * 0.5) / (r.max * 0.5 - r.min * 0.5);
    scaled.is_finite().then(|| scaled.clamp(0.0, 1.0))
}

/// Bring one raw signal into [0,1].
///
/// Missing signals yield [`NEUTRAL`] and are flagged as imputed. A degenerate
/// range (every mutant has the same value) also yields [`NEUTRAL`].
pub fn normalize(factor: Factor, raw: Option<f64>, stats: &PopulationStats) -> Normalized {
    let Some(raw) = raw else {
        return Normalized {
            value: NEUTRAL,
            imputed: true,
        };
    };

    let value = match factor.normalization() {
        Normalization::Clamp => raw.clamp(0.0, 1.0),
        Normalization::MinMax { invert } => match stats.range(factor) {
            Some(r) if r.max > r.min => match min_max(raw, r) {
                Some(scaled) if invert => 1.0 - scaled,
                Some(scaled) => scaled,
                None => NEUTRAL,
            },
            _ => NEUTRAL,
        },
    };

    Normalized {
        value,
        imputed: false,
    }
}
