//! JSON report files
//!
//! `results.jsonl` gets one line per image as it completes. `summary.json`
//! is rewritten with the running totals after every record and patched with
//! the final state when the run is finalized.

use crate::copy::CopyMethod;
use crate::error::{ReplicatorError, Result};
use crate::replication::{ImageRecord, ReplicationRun, RunTotals};
use crate::report::ReportSink;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const RESULTS_FILE: &str = "results.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Serialize)]
struct SummaryDocument<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<Uuid>,
    method: CopyMethod,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<u64>,
    totals: &'a RunTotals,
    success_ratio: f64,
}

pub struct JsonReportSink {
    dir: PathBuf,
    results: BufWriter<File>,
    method: CopyMethod,
    dry_run: bool,
}

impl JsonReportSink {
    /// Create the report directory and start fresh result files
    pub fn create(dir: &Path, method: CopyMethod, dry_run: bool) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            ReplicatorError::Report(format!("Cannot create report directory {}: {}", dir.display(), e))
        })?;
        let results = File::create(dir.join(RESULTS_FILE))?;

        let sink = Self {
            dir: dir.to_path_buf(),
            results: BufWriter::new(results),
            method,
            dry_run,
        };
        sink.write_summary(&SummaryDocument {
            status: "running",
            run_id: None,
            method,
            dry_run,
            started_at: None,
            finished_at: None,
            totals: &RunTotals::default(),
            success_ratio: 1.0,
        })?;
        Ok(sink)
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    // Write to a sibling file and rename, so readers never see a half-written summary
    fn write_summary(&self, document: &SummaryDocument<'_>) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", SUMMARY_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        fs::rename(&tmp, self.summary_path())?;
        Ok(())
    }
}

impl ReportSink for JsonReportSink {
    fn record(&mut self, record: &ImageRecord, totals: &RunTotals) -> Result<()> {
        serde_json::to_writer(&mut self.results, record)?;
        self.results.write_all(b"\n")?;
        self.results.flush()?;

        self.write_summary(&SummaryDocument {
            status: "running",
            run_id: None,
            method: self.method,
            dry_run: self.dry_run,
            started_at: None,
            finished_at: None,
            totals,
            success_ratio: totals.success_ratio(),
        })
    }

    fn finalize(&mut self, run: &ReplicationRun) -> Result<()> {
        self.results.flush()?;
        self.write_summary(&SummaryDocument {
            status: "complete",
            run_id: Some(run.run_id),
            method: self.method,
            dry_run: self.dry_run,
            started_at: Some(run.started_at),
            finished_at: run.finished_at,
            totals: &run.totals,
            success_ratio: run.totals.success_ratio(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageReference;
    use crate::replication::CopyOutcome;
    use std::time::Duration;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn streams_records_and_patches_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(dir.path(), CopyMethod::Import, false).unwrap();
        assert_eq!(read_json(&sink.summary_path())["status"], "running");

        let mut run = ReplicationRun::new();
        for (tag, outcome) in [
            ("1", CopyOutcome::success(Duration::from_secs(2), "pending".into(), "sha256:a".into())),
            ("2", CopyOutcome::failed(Duration::from_secs(1), "pending".into(), "denied".into())),
        ] {
            let record = ImageRecord::new(&ImageReference::new("app", tag), "mirror/app".into(), outcome);
            let totals = run.record(record.clone());
            sink.record(&record, &totals).unwrap();
        }

        let running = read_json(&sink.summary_path());
        assert_eq!(running["totals"]["total"], 2);
        assert_eq!(running["totals"]["failed"], 1);

        run.finish();
        sink.finalize(&run).unwrap();

        let lines: Vec<serde_json::Value> = fs::read_to_string(sink.results_path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["destination_repository"], "mirror/app");
        assert_eq!(lines[1]["status"], "FAILED");

        let summary = read_json(&sink.summary_path());
        assert_eq!(summary["status"], "complete");
        assert_eq!(summary["method"], "import");
        assert_eq!(summary["run_id"], run.run_id.to_string());
        assert_eq!(summary["success_ratio"], 0.5);
    }
}
