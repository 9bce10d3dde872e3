//! Per-image outcomes and the run aggregate

use crate::image::ImageReference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CopyStatus {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CopyStatus::Success => "SUCCESS",
            CopyStatus::Skipped => "SKIPPED",
            CopyStatus::Failed => "FAILED",
        })
    }
}

/// Terminal result of replicating one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub status: CopyStatus,
    pub duration_secs: f64,
    /// May be `"pending"` when the copy method can't report it up front
    pub source_digest: String,
    /// Empty when unknown
    pub destination_digest: String,
    /// Set only for FAILED; serialized as `null` otherwise
    pub error: Option<String>,
}

impl CopyOutcome {
    pub fn success(duration: Duration, source_digest: String, destination_digest: String) -> Self {
        Self {
            status: CopyStatus::Success,
            duration_secs: duration.as_secs_f64(),
            source_digest,
            destination_digest,
            error: None,
        }
    }

    pub fn skipped(duration: Duration, source_digest: String, destination_digest: String) -> Self {
        Self {
            status: CopyStatus::Skipped,
            duration_secs: duration.as_secs_f64(),
            source_digest,
            destination_digest,
            error: None,
        }
    }

    pub fn failed(duration: Duration, source_digest: String, error: String) -> Self {
        Self {
            status: CopyStatus::Failed,
            duration_secs: duration.as_secs_f64(),
            source_digest,
            destination_digest: String::new(),
            error: Some(error),
        }
    }
}

/// Outcome together with the identity of the image it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub repository: String,
    pub tag: String,
    pub destination_repository: String,
    #[serde(flatten)]
    pub outcome: CopyOutcome,
}

impl ImageRecord {
    pub fn new(image: &ImageReference, destination_repository: String, outcome: CopyOutcome) -> Self {
        Self {
            repository: image.source_repository().to_string(),
            tag: image.tag().to_string(),
            destination_repository,
            outcome,
        }
    }

    pub fn status(&self) -> CopyStatus {
        self.outcome.status
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunTotals {
    pub fn count(&mut self, status: CopyStatus) {
        self.total += 1;
        match status {
            CopyStatus::Success => self.success += 1,
            CopyStatus::Skipped => self.skipped += 1,
            CopyStatus::Failed => self.failed += 1,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.success + self.skipped + self.failed
    }

    /// Share of images that ended up present (copied or already there)
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.success + self.skipped) as f64 / self.total as f64
        }
    }
}

/// Aggregate of one replication run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationRun {
    pub run_id: Uuid,
    pub started_at: u64,
    pub finished_at: Option<u64>,
    pub totals: RunTotals,
    pub records: Vec<ImageRecord>,
}

impl Default for ReplicationRun {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationRun {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: unix_now(),
            finished_at: None,
            totals: RunTotals::default(),
            records: Vec::new(),
        }
    }

    /// Count and append as one step; returns the totals after this record
    pub fn record(&mut self, record: ImageRecord) -> RunTotals {
        self.totals.count(record.status());
        self.records.push(record);
        self.totals
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(unix_now());
    }

    pub fn is_complete(&self) -> bool {
        self.finished_at.is_some()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str, outcome: CopyOutcome) -> ImageRecord {
        ImageRecord::new(&ImageReference::new("nginx", tag), "nginx".to_string(), outcome)
    }

    #[test]
    fn record_keeps_totals_consistent() {
        let mut run = ReplicationRun::new();
        run.record(record("a", CopyOutcome::success(Duration::from_secs(1), "sha256:a".into(), "sha256:a".into())));
        run.record(record("b", CopyOutcome::skipped(Duration::ZERO, "pending".into(), "sha256:b".into())));
        let totals = run.record(record("c", CopyOutcome::failed(Duration::from_secs(3), "pending".into(), "boom".into())));

        assert_eq!(totals, RunTotals { total: 3, success: 1, skipped: 1, failed: 1 });
        assert!(totals.is_consistent());
        assert_eq!(run.records.len(), 3);
        assert!((totals.success_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn record_serializes_flat_with_uppercase_status() {
        let value = serde_json::to_value(record(
            "1.25",
            CopyOutcome::failed(Duration::from_millis(1500), "pending".into(), "denied".into()),
        ))
        .unwrap();

        assert_eq!(value["repository"], "nginx");
        assert_eq!(value["tag"], "1.25");
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["duration_secs"], 1.5);
        assert_eq!(value["error"], "denied");
        assert_eq!(value["destination_digest"], "");
    }

    #[test]
    fn successful_records_carry_null_error() {
        let value = serde_json::to_value(record(
            "1",
            CopyOutcome::success(Duration::ZERO, "pending".into(), String::new()),
        ))
        .unwrap();
        assert!(value["error"].is_null());
        assert_eq!(value.as_object().unwrap().len(), 8);
    }
}
