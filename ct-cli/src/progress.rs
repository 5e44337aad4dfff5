//! Human-readable progress/diff output, backed by `colored` + `spinoff`
//! (both carried as the teacher's own dev-dependencies, per SPEC_FULL.md
//! §3, here promoted to plain dependencies since the CLI -- not a test --
//! is what prints progress).

use colored::Colorize;
use spinoff::{spinners, Color, Spinner};

use ct_core::ProgressUpdate;

pub struct ProgressPrinter {
    spinner: Spinner,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self { spinner: Spinner::new(spinners::Dots, "starting...".to_string(), Color::Cyan) }
    }

    pub fn on_update(&mut self, update: ProgressUpdate) {
        let rate = if update.elapsed.as_secs_f64() > 0.0 {
            update.cases_run as f64 / update.elapsed.as_secs_f64()
        } else {
            0.0
        };
        let text = format!(
            "{:>6.1}s  {}/{} rules  {} cases  {:.0} cases/s  {} issues",
            update.elapsed.as_secs_f64(),
            update.rules_done,
            update.rules_total,
            update.cases_run,
            rate,
            update.issues_found,
        );
        self.spinner.update_text(text);
    }

    pub fn finish(mut self, report: &ct_core::HarnessReport) {
        let summary = format!(
            "{} cases run, {} unsatisfiable skipped, {} issues",
            report.cases_run,
            report.unsatisfiable,
            report.issues.len()
        );
        if report.issues.is_empty() && !report.aborted {
            self.spinner.success(&summary);
        } else {
            self.spinner.fail(&summary);
        }
    }
}

impl Default for ProgressPrinter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_issue(issue: &ct_core::Issue) {
    println!("{} {}", "issue:".red().bold(), issue.rule_name);
    println!("  kind: {:?}", issue.kind);
    println!("  detail: {}", issue.detail);
    println!("  pre.pc={} pre.gas={}", issue.pre_state.pc, issue.pre_state.gas);
    println!("  expected.pc={} expected.gas={}", issue.expected_post.pc, issue.expected_post.gas);
    if let Some(actual) = &issue.actual_post {
        println!("  actual.pc={} actual.gas={}", actual.pc, actual.gas);
    }
}
