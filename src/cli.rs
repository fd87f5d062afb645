use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::OptimizerMode;
use crate::ingest::{ingest, read_batch};
use crate::options::Options;
use crate::out::write_plan_artifacts;
use crate::pipeline;
use crate::report::{
    format_code_change, format_score_card, print_plan_details, print_plan_order,
    print_plan_summary,
};
use crate::run_report::PlanReport;
use crate::scan::{BatchOverview, scan_batch};
use crate::scoring::score_all;
use crate::ui::Ui;

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_REJECTED: i32 = 2;

/// Top-level CLI arguments for the `mutant-planner` binary.
#[derive(Debug, Parser)]
#[command(
    name = "mutant-planner",
    version,
    about = "Prioritize, deduplicate and budget mutation-testing runs"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands supported by `mutant-planner`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarise a mutant batch without planning.
    Scan {
        /// Batch of mutant records (JSON).
        #[arg(long)]
        mutants: PathBuf,

        /// Emit the overview as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Build an execution plan that fits the time budget.
    Plan {
        /// Batch of mutant records (JSON).
        #[arg(long)]
        mutants: PathBuf,

        /// Time budget in milliseconds (overrides the config file).
        #[arg(long)]
        budget_ms: Option<f64>,

        /// JSON configuration file (weights, optimizer, subsumption, budget).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Optimizer mode (overrides the config file).
        #[arg(long, value_enum)]
        mode: Option<OptimizerMode>,

        /// Largest candidate count solved exactly in `auto` mode.
        #[arg(long)]
        exact_threshold: Option<usize>,

        /// Emit a machine-readable JSON report to stdout.
        #[arg(long)]
        json: bool,

        /// Also print deferred, subsumed and rejected mutants.
        #[arg(long, short = 'v')]
        verbose: bool,

        /// Write plan artifacts into this directory.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Exit with code 2 if any mutant was rejected (useful for CI).
        #[arg(long)]
        fail_on_rejected: bool,
    },

    /// Show how one mutant's score was computed.
    Explain {
        /// Batch of mutant records (JSON).
        #[arg(long)]
        mutants: PathBuf,

        /// Mutant id to explain.
        #[arg(long)]
        id: String,

        /// JSON configuration file providing the factor weights.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Emit the score card as JSON to stdout.
        #[arg(long)]
        json: bool,
    },
}

fn print_json_and_exit<T: Serialize>(report: &T, exit_code: i32) -> ! {
    let json = serde_json::to_string_pretty(report).expect("serialize report to json");
    println!("{json}");
    std::process::exit(exit_code);
}

/// Print human-oriented output.
/// - normal mode: stdout
/// - `--json` mode: stderr (so stdout stays machine-readable)
fn human_ln(json: bool, msg: impl std::fmt::Display) {
    if json {
        eprintln!("{msg}");
    } else {
        println!("{msg}");
    }
}

/// Parse CLI arguments and dispatch the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan { mutants, json } => {
            human_ln(json, "mutant-planner: scan");
            human_ln(json, format!("mutants: {:?}", mutants));

            let overview = scan_batch(&mutants)?;
            if json {
                print_json_and_exit(&overview, EXIT_OK);
            }

            print_scan_summary(&Ui::new(false), &overview);
            Ok(())
        }

        Command::Plan {
            mutants,
            budget_ms,
            config,
            mode,
            exact_threshold,
            json,
            verbose,
            out,
            fail_on_rejected,
        } => {
            let options = Options {
                config,
                budget_ms,
                mode,
                exact_threshold,
                json_output: json,
                verbose,
                out_dir: out,
                fail_on_rejected,
                ..Options::new(mutants)
            };
            run_plan(&options)
        }

        Command::Explain {
            mutants,
            id,
            config,
            json,
        } => {
            let options = Options {
                config,
                json_output: json,
                ..Options::new(mutants)
            };
            run_explain(&options, &id)
        }
    }
}

fn run_plan(options: &Options) -> Result<()> {
    let json = options.json_output;
    let mut ui = Ui::new(json);

    human_ln(json, "mutant-planner: plan");
    human_ln(json, format!("mutants: {:?}", options.mutants));

    let config = match options.plan_config() {
        Ok(c) => c,
        Err(e) => return fail(options, e),
    };

    if config.budget_ms.is_none() {
        return fail(
            options,
            anyhow!("no time budget given: pass --budget-ms or set `budget_ms` in the config"),
        );
    }

    let records = match read_batch(&options.mutants) {
        Ok(r) => r,
        Err(e) => return fail(options, e),
    };

    let plan = match pipeline::run(records, &config) {
        Ok(p) => p,
        Err(e) => return fail(options, e.into()),
    };

    let rejected = plan.rejected.len();
    let report = PlanReport::success(options.mutants.clone(), plan);

    if let Some(dir) = &options.out_dir {
        write_plan_artifacts(dir, &report)?;
        human_ln(json, format!("plan artifacts written to {:?}", dir));
    }

    // CI policy
    let wants_ci_fail = options.fail_on_rejected && rejected > 0;
    let exit_code = if wants_ci_fail {
        EXIT_REJECTED
    } else {
        EXIT_OK
    };

    if json {
        print_json_and_exit(&report, exit_code);
    }

    let Some(plan) = &report.plan else {
        return Ok(());
    };

    print_plan_summary(&ui, plan);
    print_plan_order(&ui, plan);

    if options.verbose {
        print_plan_details(&ui, plan);
    } else if rejected > 0 {
        ui.warn(format!(
            "{rejected} mutant(s) rejected at ingestion (use -v to list them)"
        ));
    }

    if wants_ci_fail {
        ui.error(format!(
            "planning failed policy: {rejected} mutant(s) rejected (--fail-on-rejected)"
        ));
        std::process::exit(EXIT_REJECTED);
    }

    Ok(())
}

/// Report a run-level error: JSON envelope plus artifacts when requested, else propagate.
fn fail(options: &Options, err: anyhow::Error) -> Result<()> {
    let report = PlanReport::failure(options.mutants.clone(), format!("{err:#}"));

    if let Some(dir) = &options.out_dir {
        write_plan_artifacts(dir, &report)?;
    }

    if options.json_output {
        print_json_and_exit(&report, EXIT_ERROR);
    }

    Err(err)
}

fn run_explain(options: &Options, id: &str) -> Result<()> {
    let json = options.json_output;

    let config = options.plan_config()?;
    config.weights.validate()?;

    let ingested = ingest(read_batch(&options.mutants)?);

    if let Some(r) = ingested
        .rejections
        .iter()
        .find(|r| r.id.as_deref() == Some(id))
    {
        if ingested.mutants.iter().all(|m| m.id != id) {
            return Err(anyhow!("mutant `{id}` was rejected: {}", r.reason));
        }
    }

    let scored = score_all(ingested.mutants, &config.weights);
    let Some((rank, target)) = scored.iter().enumerate().find(|(_, s)| s.id() == id) else {
        return Err(anyhow!(
            "mutant `{id}` not found in {}",
            options.mutants.display()
        ));
    };

    if json {
        print_json_and_exit(target, EXIT_OK);
    }

    let ui = Ui::new(false);
    ui.line(format_score_card(target));
    if let Some(change) = format_code_change(&target.mutant) {
        ui.line(change);
    }
    ui.line(format!("rank {} of {}", rank + 1, scored.len()));
    Ok(())
}

/// Print a short summary based on the batch overview.
fn print_scan_summary(ui: &Ui, overview: &BatchOverview) {
    ui.title("--- batch overview ---");
    ui.line(format!("batch file:              {}", overview.path.display()));
    ui.line(format!("records:                 {}", overview.records));
    ui.line(format!("valid mutants:           {}", overview.valid));
    ui.line(format!("rejected records:        {}", overview.rejected));
    ui.line(format!("distinct tests:          {}", overview.distinct_tests));
    ui.line(format!("distinct kill sets:      {}", overview.distinct_kill_sets));
    ui.line(format!("unkilled mutants:        {}", overview.unkilled));
    ui.line(format!("total cost:              {}ms", overview.total_cost_ms));

    ui.title("--- factor coverage ---");
    for (factor, n) in &overview.factor_coverage {
        ui.line(format!("{:<24} {}/{}", factor.name(), n, overview.valid));
    }

    ui.title("--- operators ---");
    for (op, n) in &overview.operators {
        ui.line(format!("{op:<24} {n}"));
    }

    if !overview.duplicate_changes.is_empty() {
        ui.title(format!(
            "--- duplicate changes ({}) ---",
            overview.duplicate_changes.len()
        ));
        for ids in &overview.duplicate_changes {
            ui.line(ids.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(" "));
        }
    }
}
