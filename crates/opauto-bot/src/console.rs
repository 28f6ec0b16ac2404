//! Console front-end.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use chrono::Local;
use opauto_core::{RunParams, RunSummary, Severity};
use opauto_engine::ProgressSink;

const RULE_WIDTH: usize = 70;

/// Prints run progress to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "  ",
        Severity::Success => "OK",
        Severity::Warning => "!!",
        Severity::Error => "XX",
    }
}

impl ProgressSink for ConsoleSink {
    fn log(&self, message: &str, severity: Severity) {
        println!(
            "[{}] {} {message}",
            Local::now().format("%H:%M:%S"),
            marker(severity)
        );
    }

    fn counters(&self, _created: u64, _failed: u64, _current_round: i32) {}

    fn progress(&self, current: u64, total: u64) {
        if total > 0 && current > 0 {
            println!("           progress {current}/{total} ({}%)", current * 100 / total);
        }
    }

    fn finished(&self) {
        println!("{}", "-".repeat(RULE_WIDTH));
    }
}

pub fn print_header() {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("    PRODUCTION ORDER AUTOMATION");
    println!("{}", "=".repeat(RULE_WIDTH));
    println!();
}

/// Describe a run before it starts.
pub fn describe_run(params: &RunParams, pending: u64) -> String {
    format!(
        "{pending} pending records on {} for line {}, rounds {} to {}",
        params.plan_date.format("%d/%m/%Y"),
        params.line,
        params.round_from,
        params.round_to
    )
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N]: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Final summary table.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "RUN SUMMARY");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Orders created : {}", summary.created_count);
    let _ = writeln!(out, "Failures       : {}", summary.failed_count);

    if !summary.successes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<12} {:<12}", "PLAN", "ORDER");
        for success in &summary.successes {
            let _ = writeln!(out, "{:<12} {:<12}", success.plan_id.get(), success.order_id.get());
        }
    }

    if !summary.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<12} {:<12} MESSAGE", "PLAN", "KIND");
        for failure in &summary.failures {
            let _ = writeln!(
                out,
                "{:<12} {:<12} {}",
                failure.plan_id.get(),
                failure.kind.as_str(),
                failure.message
            );
        }
    }
    let _ = write!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use opauto_core::{FailureKind, OrderId, PlanId};

    #[test]
    fn test_summary_lists_successes_and_failures() {
        let mut summary = RunSummary::new();
        summary.record_success(PlanId(500), OrderId(900111));
        summary.record_failure(PlanId(501), FailureKind::Gateway, "Product not found");

        let text = render_summary(&summary);

        assert!(text.contains("Orders created : 1"));
        assert!(text.contains("Failures       : 1"));
        assert!(text.contains("500          900111"));
        assert!(text.contains("501          gateway      Product not found"));
    }

    #[test]
    fn test_empty_summary_has_no_tables() {
        let text = render_summary(&RunSummary::new());
        assert!(!text.contains("PLAN"));
    }

    #[test]
    fn test_describe_run_uses_operator_date_format() {
        let params = RunParams::new(NaiveDate::from_ymd_opt(2025, 7, 21).unwrap(), 2, 1, 3).unwrap();
        assert_eq!(
            describe_run(&params, 12),
            "12 pending records on 21/07/2025 for line 2, rounds 1 to 3"
        );
    }
}
