use std::path::PathBuf;

use serde::Serialize;

use crate::plan::Plan;

/// Machine-readable envelope for a planning run.
///
/// In `--json` mode we print this to stdout as pretty JSON.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Tool name, stable across versions.
    pub tool: &'static str,

    /// Current crate version.
    pub version: &'static str,

    /// The batch file the plan was built from.
    pub mutants_file: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    /// High-level error message when no plan could be produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanReport {
    pub fn success(mutants_file: PathBuf, plan: Plan) -> Self {
        Self {
            tool: "mutant-planner",
            version: env!("CARGO_PKG_VERSION"),
            mutants_file,
            plan: Some(plan),
            error: None,
        }
    }

    pub fn failure(mutants_file: PathBuf, error: String) -> Self {
        Self {
            tool: "mutant-planner",
            version: env!("CARGO_PKG_VERSION"),
            mutants_file,
            plan: None,
            error: Some(error),
        }
    }
}
