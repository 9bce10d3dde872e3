//! Human-readable progress lines through the [`Logger`]

use crate::error::Result;
use crate::logging::Logger;
use crate::replication::{CopyStatus, ImageRecord, ReplicationRun, RunTotals};
use crate::report::ReportSink;
use std::time::Duration;

pub struct ConsoleSink {
    output: Logger,
    expected: usize,
}

impl ConsoleSink {
    pub fn new(output: Logger, expected: usize) -> Self {
        Self { output, expected }
    }
}

impl ReportSink for ConsoleSink {
    fn record(&mut self, record: &ImageRecord, totals: &RunTotals) -> Result<()> {
        let line = format!(
            "[{}/{}] {}:{} {} in {}",
            totals.total,
            self.expected,
            record.repository,
            record.tag,
            record.status(),
            self.output
                .format_duration(Duration::from_secs_f64(record.outcome.duration_secs.max(0.0)))
        );
        match record.status() {
            CopyStatus::Success => self.output.success(&line),
            CopyStatus::Skipped => self.output.info(&line),
            CopyStatus::Failed => self.output.error(&format!(
                "{}: {}",
                line,
                record.outcome.error.as_deref().unwrap_or("unknown error")
            )),
        }
        Ok(())
    }

    fn finalize(&mut self, run: &ReplicationRun) -> Result<()> {
        let totals = &run.totals;
        self.output.summary_kv(
            "Replication Summary",
            &[
                ("Run", run.run_id.to_string()),
                ("Total", totals.total.to_string()),
                ("Succeeded", totals.success.to_string()),
                ("Skipped", totals.skipped.to_string()),
                ("Failed", totals.failed.to_string()),
                ("Success ratio", format!("{:.1}%", totals.success_ratio() * 100.0)),
                ("Elapsed", self.output.elapsed_time()),
            ],
        );

        let failed: Vec<&ImageRecord> = run
            .records
            .iter()
            .filter(|r| r.status() == CopyStatus::Failed)
            .collect();
        if !failed.is_empty() {
            self.output.subsection("Failed images");
            for record in failed {
                self.output.error(&format!(
                    "{}:{}: {}",
                    record.repository,
                    record.tag,
                    record.outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        Ok(())
    }
}
