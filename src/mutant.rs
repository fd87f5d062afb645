use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::factor::Factor;

/// Stable mutant identifier supplied by the framework adapter.
pub type MutantId = String;

/// See [`Mutant::change_key`].
pub type ChangeKey<'a> = (&'a Path, u32, u32, OperatorKind, Option<&'a str>, Option<&'a str>);

/// Kind of mutation operator, as standardized by the framework adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorKind {
    /// Arithmetic operator swaps (for example `+` ↔ `-`).
    ArithmeticReplacement,

    /// Boundary changes on comparisons (for example `<` → `<=`).
    ConditionalBoundary,

    /// Replacing a whole condition with `true` / `false`.
    ConditionalReplacement,

    /// Negating a condition (for example `==` ↔ `!=`).
    NegateConditional,

    /// Replacing a return value.
    ReturnValue,

    /// Removing a conditional branch.
    RemoveConditional,

    /// Removing a call to a void method.
    VoidMethodCall,

    /// `++` ↔ `--` and friends.
    IncrementDecrement,

    /// Logical connective swaps (for example `&&` ↔ `||`).
    LogicalOperator,

    /// Anything framework-specific.
    #[serde(other)]
    Other,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ArithmeticReplacement => "arithmetic-replacement",
            Self::ConditionalBoundary => "conditional-boundary",
            Self::ConditionalReplacement => "conditional-replacement",
            Self::NegateConditional => "negate-conditional",
            Self::ReturnValue => "return-value",
            Self::RemoveConditional => "remove-conditional",
            Self::VoidMethodCall => "void-method-call",
            Self::IncrementDecrement => "increment-decrement",
            Self::LogicalOperator => "logical-operator",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Where a mutant lives and which operator produced it.
///
/// Lines and columns are 1-based and inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    /// Source file, as reported by the adapter.
    pub file: PathBuf,

    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,

    /// Operator applied at this location.
    pub operator: OperatorKind,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{} {}",
            self.file.display(),
            self.start_line,
            self.start_column,
            self.end_line,
            self.end_column,
            self.operator
        )
    }
}

/// Lifecycle status of a mutant within one planning run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MutantStatus {
    /// Ingested, not yet scored.
    Raw,

    /// Composite score assigned.
    Scored,

    /// Kept by subsumption analysis.
    Representative,

    /// Eliminated by subsumption analysis.
    Subsumed,

    /// Representative chosen by the optimizer.
    Selected,

    /// Representative left out of the budget.
    Deferred,

    /// Dropped at ingestion because the record was malformed.
    Rejected,
}

/// A validated mutant, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mutant {
    /// Unique identifier, stable for a given code revision.
    pub id: MutantId,

    /// Source location and operator.
    pub location: Location,

    /// Tests known (or predicted) to kill this mutant. Empty means never killed.
    pub kill_set: BTreeSet<String>,

    /// Estimated cost of running the relevant tests, in whole milliseconds.
    pub execution_cost_ms: u64,

    /// Raw, un-normalized signals per factor. May be partial.
    pub factor_signals: BTreeMap<Factor, f64>,

    /// Free-form description from the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Original code snippet (before mutation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_code: Option<String>,

    /// Mutated code snippet (after mutation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutated_code: Option<String>,
}

impl Mutant {
    /// Raw signal for `factor`, if the adapter supplied one.
    pub fn signal(&self, factor: Factor) -> Option<f64> {
        self.factor_signals.get(&factor).copied()
    }

    /// Identity of the change itself: start position, operator and code.
    ///
    /// Two mutants with the same key apply the same edit at the same place.
    pub fn change_key(&self) -> ChangeKey<'_> {
        (
            self.location.file.as_path(),
            self.location.start_line,
            self.location.start_column,
            self.location.operator,
            self.original_code.as_deref(),
            self.mutated_code.as_deref(),
        )
    }

    /// Never-killed mutants carry no detection evidence.
    pub fn is_unkilled(&self) -> bool {
        self.kill_set.is_empty()
    }
}
