use console::{Term, style};
use std::{env, fmt::Display};

use crate::mutant::MutantStatus;
use crate::plan::PlannedMutant;

/// Small UI helper:
/// - normal mode: human output to stdout, errors to stderr
/// - `--json` mode: ALL human output to stderr (stdout stays machine-readable JSON)
/// - fancy styling only on a real TTY and when NO_COLOR/CI are not set
#[derive(Debug, Clone)]
pub struct Ui {
    out: Term,
    err: Term,
    fancy: bool,
    enabled: bool,

    // Counted regardless of output mode; used by tests.
    warnings: u64,
    errors: u64,
}

impl Ui {
    pub fn new(json: bool) -> Self {
        let out = if json { Term::stderr() } else { Term::stdout() };
        let err = Term::stderr();

        let out_is_tty = out.is_term();
        let no_color = env::var_os("NO_COLOR").is_some();
        let in_ci = env::var_os("CI").is_some();

        Self {
            out,
            err,
            fancy: out_is_tty && !no_color && !in_ci,
            enabled: true,
            warnings: 0,
            errors: 0,
        }
    }

    /// Useful for unit tests to avoid noisy output.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            fancy: false,
            enabled: false,
            warnings: 0,
            errors: 0,
        }
    }

    fn write_out(&self, s: &str) {
        if self.enabled {
            let _ = self.out.write_line(s);
        }
    }

    fn write_err(&self, s: &str) {
        if self.enabled {
            let _ = self.err.write_line(s);
        }
    }

    pub fn line(&self, msg: impl Display) {
        self.write_out(&msg.to_string());
    }

    pub fn title(&self, msg: impl Display) {
        let s = msg.to_string();
        if self.fancy {
            self.write_out(&style(s).bold().to_string());
        } else {
            self.write_out(&s);
        }
    }

    pub fn warn(&mut self, msg: impl Display) {
        self.warnings += 1;
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).yellow().to_string());
        } else {
            self.write_err(&s);
        }
    }

    pub fn error(&mut self, msg: impl Display) {
        self.errors += 1;
        let s = msg.to_string();
        if self.fancy {
            self.write_err(&style(s).red().bold().to_string());
        } else {
            self.write_err(&s);
        }
    }

    /// One plan line: rank, status tag, score, cost, class size and location.
    ///
    /// Non-fancy output is plain text so snapshots stay stable.
    pub fn planned(&self, rank: usize, status: MutantStatus, p: &PlannedMutant) {
        let label = status_label(status);
        let tag = if self.fancy {
            match status {
                MutantStatus::Selected => style(label).green().bold().to_string(),
                MutantStatus::Deferred => style(label).yellow().to_string(),
                _ => style(label).dim().to_string(),
            }
        } else {
            label.to_string()
        };

        self.line(format!(
            "{rank:>4}. {tag:<9} {score:.4} {cost:>8}  x{size:<3} #{id} {loc}",
            score = p.score,
            cost = format!("{}ms", p.cost_ms),
            size = p.class_size,
            id = p.id,
            loc = p.location,
        ));
    }

    #[cfg(test)]
    pub fn warnings(&self) -> u64 {
        self.warnings
    }

    #[cfg(test)]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    #[cfg(test)]
    pub fn is_fancy(&self) -> bool {
        self.fancy && self.enabled
    }
}

pub fn status_label(status: MutantStatus) -> &'static str {
    match status {
        MutantStatus::Raw => "raw",
        MutantStatus::Scored => "scored",
        MutantStatus::Representative => "rep",
        MutantStatus::Subsumed => "subsumed",
        MutantStatus::Selected => "selected",
        MutantStatus::Deferred => "deferred",
        MutantStatus::Rejected => "rejected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fancy_requires_fancy_and_enabled() {
        let base = Ui::silent();

        let mut a = base.clone();
        a.fancy = true;
        assert!(!a.is_fancy());

        let mut b = base.clone();
        b.enabled = true;
        assert!(!b.is_fancy());

        let mut c = base;
        c.fancy = true;
        c.enabled = true;
        assert!(c.is_fancy());
    }

    #[test]
    fn warn_and_error_are_counted() {
        let mut ui = Ui::silent();
        ui.warn("budget is tight");
        ui.warn("budget is tighter");
        ui.error("boom");
        assert_eq!(ui.warnings(), 2);
        assert_eq!(ui.errors(), 1);
    }
}
