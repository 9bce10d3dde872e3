//! Post-hoc validation of a destination registry
//!
//! Checks an expected image list against the live destination, classifying
//! every image FOUND or MISSING. Uses the same [`ExistenceChecker`] as the
//! replication engine and never copies anything.

use crate::error::{ReplicatorError, Result};
use crate::image::{DestinationMapping, ImageReference};
use crate::logging::Logger;
use crate::registry::ExistenceChecker;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const VALIDATION_FILE: &str = "validation.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Found,
    Missing,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationStatus::Found => "FOUND",
            ValidationStatus::Missing => "MISSING",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub repository: String,
    pub tag: String,
    pub destination_repository: String,
    pub status: ValidationStatus,
    /// Empty unless FOUND
    pub digest: String,
    /// Set when the lookup itself failed, so the image may actually exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub found: usize,
    pub missing: usize,
    pub records: Vec<ValidationRecord>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.found + self.missing
    }

    /// `found / total`, 1.0 for an empty list
    pub fn success_ratio(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => self.found as f64 / total as f64,
        }
    }

    pub fn missing_records(&self) -> impl Iterator<Item = &ValidationRecord> {
        self.records
            .iter()
            .filter(|r| r.status == ValidationStatus::Missing)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Document<'a> {
            #[serde(flatten)]
            report: &'a ValidationReport,
            success_ratio: f64,
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReplicatorError::Report(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }
        let body = serde_json::to_vec_pretty(&Document {
            report: self,
            success_ratio: self.success_ratio(),
        })?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

pub struct Validator {
    checker: Arc<dyn ExistenceChecker>,
    output: Logger,
    concurrency: usize,
}

impl Validator {
    pub fn new(checker: Arc<dyn ExistenceChecker>, output: Logger) -> Self {
        Self {
            checker,
            output,
            concurrency: 4,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classify every expected image; records keep input order
    pub async fn validate(
        &self,
        expected: &[ImageReference],
        mapping: &DestinationMapping,
    ) -> ValidationReport {
        self.output.info(&format!(
            "Validating {} images in the destination registry",
            expected.len()
        ));

        let records: Vec<ValidationRecord> = stream::iter(expected)
            .map(|image| self.check(image, mapping))
            .buffered(self.concurrency)
            .collect()
            .await;

        let found = records
            .iter()
            .filter(|r| r.status == ValidationStatus::Found)
            .count();
        let report = ValidationReport {
            found,
            missing: records.len() - found,
            records,
        };

        self.output.summary_kv(
            "Validation Summary",
            &[
                ("Expected", report.total().to_string()),
                ("Found", report.found.to_string()),
                ("Missing", report.missing.to_string()),
                ("Success ratio", format!("{:.1}%", report.success_ratio() * 100.0)),
            ],
        );
        report
    }

    async fn check(&self, image: &ImageReference, mapping: &DestinationMapping) -> ValidationRecord {
        let destination_repository = mapping.destination_repository(image);
        let tag = mapping.destination_tag(image);
        let log = self.output.scoped(format!("{}:{}", destination_repository, tag));

        let (status, digest, diagnostic) = match self.checker.lookup(&destination_repository, tag).await {
            Ok(Some(digest)) => {
                log.success(&format!("FOUND {}", digest));
                (ValidationStatus::Found, digest, None)
            }
            Ok(None) => {
                log.warning("MISSING");
                (ValidationStatus::Missing, String::new(), None)
            }
            Err(e) => {
                log.warning(&format!("MISSING (lookup failed: {})", e));
                (
                    ValidationStatus::Missing,
                    String::new(),
                    Some(format!("lookup failed: {}", e)),
                )
            }
        };

        ValidationRecord {
            repository: image.source_repository().to_string(),
            tag: image.tag().to_string(),
            destination_repository,
            status,
            digest,
            diagnostic,
        }
    }
}
