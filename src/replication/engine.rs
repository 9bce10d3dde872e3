//! Per-image replication state machine
//!
//! `PENDING -> CHECKING -> (SKIPPED | COPYING) -> (SUCCESS | FAILED)`.
//! Retries inside COPYING are invisible from outside; every image ends in
//! exactly one terminal state and produces exactly one [`ImageRecord`].

use crate::copy::{CopyOptions, CopyStrategy};
use crate::image::{DestinationMapping, ImageReference, PENDING_DIGEST};
use crate::logging::Logger;
use crate::registry::ExistenceChecker;
use crate::replication::{CopyOutcome, ImageRecord, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    Checking,
    Skipped,
    Copying,
    Success,
    Failed,
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageState::Pending => "PENDING",
            ImageState::Checking => "CHECKING",
            ImageState::Skipped => "SKIPPED",
            ImageState::Copying => "COPYING",
            ImageState::Success => "SUCCESS",
            ImageState::Failed => "FAILED",
        })
    }
}

/// When an existing destination tag short-circuits the copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipPolicy {
    /// Any existing tag is trusted, even if it points at a stale manifest
    #[default]
    TagExists,
    /// Skip only when the destination digest equals the resolved source digest
    DigestMatch,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub source_registry: String,
    pub source_namespace: Option<String>,
    pub mapping: DestinationMapping,
    pub skip_existing: bool,
    pub skip_policy: SkipPolicy,
    pub verify_digest: bool,
    pub copy_options: CopyOptions,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            source_registry: "docker.io".to_string(),
            source_namespace: None,
            mapping: DestinationMapping::default(),
            skip_existing: true,
            skip_policy: SkipPolicy::TagExists,
            verify_digest: true,
            copy_options: CopyOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ReplicationEngine {
    checker: Arc<dyn ExistenceChecker>,
    strategy: Arc<dyn CopyStrategy>,
    settings: EngineSettings,
    output: Logger,
}

impl ReplicationEngine {
    pub fn new(
        checker: Arc<dyn ExistenceChecker>,
        strategy: Arc<dyn CopyStrategy>,
        settings: EngineSettings,
        output: Logger,
    ) -> Self {
        Self {
            checker,
            strategy,
            settings,
            output,
        }
    }

    fn transition(log: &Logger, from: ImageState, to: ImageState) {
        log.debug(&format!("{} -> {}", from, to));
    }

    /// Drive one image to a terminal state. Never fails: every error is
    /// folded into the returned record.
    pub async fn replicate(&self, image: &ImageReference) -> ImageRecord {
        let log = self.output.scoped(image.to_string());
        let destination_repository = self.settings.mapping.destination_repository(image);
        let destination_tag = self.settings.mapping.destination_tag(image);
        let source = image.source_full_reference(
            &self.settings.source_registry,
            self.settings.source_namespace.as_deref(),
        );

        Self::transition(&log, ImageState::Pending, ImageState::Checking);
        let started = Instant::now();

        // Only digest-match skipping needs the source digest before the check;
        // otherwise it is resolved once the image is known to need a copy.
        let mut source_digest = None;
        let mut resolved = false;
        if self.settings.skip_existing && self.settings.skip_policy == SkipPolicy::DigestMatch {
            source_digest = self.resolve_source_digest(&source, &log).await;
            resolved = true;
        }

        if self.settings.skip_existing {
            if let Some(existing) = self
                .existing_digest(&log, &destination_repository, destination_tag, source_digest.as_deref())
                .await
            {
                Self::transition(&log, ImageState::Checking, ImageState::Skipped);
                log.info(&format!(
                    "Skipped: {}:{} already present ({})",
                    destination_repository, destination_tag, existing
                ));
                let outcome = CopyOutcome::skipped(
                    started.elapsed(),
                    source_digest.unwrap_or_else(|| PENDING_DIGEST.to_string()),
                    existing,
                );
                return ImageRecord::new(image, destination_repository, outcome);
            }
        }

        Self::transition(&log, ImageState::Checking, ImageState::Copying);
        if !resolved {
            source_digest = self.resolve_source_digest(&source, &log).await;
        }
        log.step(&format!(
            "Copying {} -> {}:{} via {}{}",
            source,
            destination_repository,
            destination_tag,
            self.strategy.method(),
            if self.settings.copy_options.dry_run { " (dry run)" } else { "" }
        ));

        let strategy = self.strategy.as_ref();
        let options = &self.settings.copy_options;
        let source_ref = source.as_str();
        let repository_ref = destination_repository.as_str();
        let log_ref = &log;
        let result = self
            .settings
            .retry
            .execute(&log, move |_| {
                strategy.copy(source_ref, repository_ref, destination_tag, options, log_ref)
            })
            .await;

        let source_digest = source_digest.unwrap_or_else(|| PENDING_DIGEST.to_string());
        let outcome = match result {
            Ok(()) => {
                let destination_digest = self
                    .verified_digest(&log, &destination_repository, destination_tag)
                    .await;
                Self::transition(&log, ImageState::Copying, ImageState::Success);
                let elapsed = started.elapsed();
                log.success(&format!("Replicated in {}", log.format_duration(elapsed)));
                CopyOutcome::success(elapsed, source_digest, destination_digest)
            }
            Err(e) => {
                Self::transition(&log, ImageState::Copying, ImageState::Failed);
                CopyOutcome::failed(started.elapsed(), source_digest, e.to_string())
            }
        };

        ImageRecord::new(image, destination_repository, outcome)
    }

    async fn resolve_source_digest(&self, source: &str, log: &Logger) -> Option<String> {
        self.strategy
            .source_digest(source, &self.settings.copy_options, log)
            .await
    }

    /// Digest that justifies skipping, if any. Lookup errors count as absent
    /// so the image gets copied rather than silently skipped.
    async fn existing_digest(
        &self,
        log: &Logger,
        repository: &str,
        tag: &str,
        source_digest: Option<&str>,
    ) -> Option<String> {
        let existing = match self.checker.lookup(repository, tag).await {
            Ok(Some(digest)) => digest,
            Ok(None) => {
                log.detail("Not present in destination");
                return None;
            }
            Err(e) => {
                log.warning(&format!("Existence check failed, copying anyway: {}", e));
                return None;
            }
        };

        match self.settings.skip_policy {
            SkipPolicy::TagExists => Some(existing),
            SkipPolicy::DigestMatch if source_digest == Some(existing.as_str()) => Some(existing),
            SkipPolicy::DigestMatch => {
                log.info(&format!(
                    "Destination digest {} does not match source {}, copying",
                    existing,
                    source_digest.unwrap_or(PENDING_DIGEST)
                ));
                None
            }
        }
    }

    async fn verified_digest(&self, log: &Logger, repository: &str, tag: &str) -> String {
        if !self.settings.verify_digest {
            return String::new();
        }
        match self.checker.lookup(repository, tag).await {
            Ok(Some(digest)) => {
                log.detail(&format!("Destination digest: {}", digest));
                digest
            }
            Ok(None) => {
                log.warning("Copy reported success but the tag is not visible yet");
                String::new()
            }
            Err(e) => {
                log.warning(&format!("Digest verification failed: {}", e));
                String::new()
            }
        }
    }
}
