//! Human-readable rendering of a dry-run plan, a finished run's
//! [`Summary`](dsp_core::Summary), and a [`RollbackReport`](dsp_engine::RollbackReport).
//!
//! Kept separate from `dsp_core`/`dsp_engine` since it is presentation, not
//! domain data; the structured values themselves are what gets persisted to
//! the metadata snapshot.

use std::io::{self, Write};

use dsp_core::{ExitCode, Operation, ScanWarning, Summary};
use dsp_engine::RollbackReport;

/// Writes one line per planned operation, in the order the engine would
/// execute them.
pub fn render_plan<W: Write>(out: &mut W, plan: &[Operation]) -> io::Result<()> {
    writeln!(out, "dry run: {} operation(s) planned", plan.len())?;
    for op in plan {
        writeln!(out, "  {:<10} {}", op.tag(), op.rel())?;
    }
    Ok(())
}

/// Writes the end-of-run summary table and any scan warnings.
pub fn render_summary<W: Write>(
    out: &mut W,
    job_name: &str,
    summary: &Summary,
    warnings: &[ScanWarning],
    exit_code: ExitCode,
) -> io::Result<()> {
    writeln!(out, "job {job_name}: {exit_code:?} ({})", exit_code.as_i32())?;
    writeln!(out, "  copied            {}", summary.copied)?;
    writeln!(out, "  updated           {}", summary.updated)?;
    writeln!(out, "  deleted           {}", summary.deleted)?;
    writeln!(out, "  moved_to_safety_net {}", summary.moved_to_safety_net)?;
    writeln!(out, "  skipped_noop      {}", summary.skipped_noop)?;
    writeln!(out, "  failed            {}", summary.failed)?;
    writeln!(out, "  scan_warnings     {}", summary.scan_warnings)?;
    writeln!(out, "  bytes_transferred {}", summary.bytes_transferred)?;
    writeln!(out, "  duration_ms       {}", summary.duration_ms)?;
    for warning in warnings {
        writeln!(out, "  warning: {warning}")?;
    }
    Ok(())
}

/// Writes a rollback's reversed/already-rolled-back/skipped counts.
pub fn render_rollback<W: Write>(out: &mut W, report: &RollbackReport) -> io::Result<()> {
    writeln!(
        out,
        "rollback: {} reversed, {} already rolled back, {} skipped",
        report.reversed, report.already_rolled_back, report.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::operation::{OpId, OpIdGenerator};

    #[test]
    fn render_plan_lists_every_operation() {
        let mut gen = OpIdGenerator::new();
        let plan = vec![Operation::Copy {
            op_id: gen.issue(),
            rel: "a.txt".into(),
            size: 10,
        }];
        let mut out = Vec::new();
        render_plan(&mut out, &plan).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("a.txt"));
        assert!(text.contains("copy"));
    }

    #[test]
    fn render_summary_reports_exit_code_and_counters() {
        let mut summary = Summary::new();
        summary.copied = 3;
        let mut out = Vec::new();
        render_summary(&mut out, "nightly", &summary, &[], ExitCode::Success).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("nightly"));
        assert!(text.contains("copied            3"));
    }
}
