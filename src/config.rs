//! Configuration for replication and validation runs
//!
//! Settings are layered: defaults, then an optional JSON config file, then
//! `REPLICATOR_*` environment variables, then command-line flags (applied by
//! the CLI runner).

use crate::copy::{CopyMethod, Credentials};
use crate::error::{ReplicatorError, Result};
use crate::image::DestinationMapping;
use crate::replication::{RetryPolicy, SkipPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "REPLICATOR_";

/// Where images are pulled from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub registry: String,
    pub namespace: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            registry: "docker.io".to_string(),
            namespace: None,
            username: None,
            password: None,
        }
    }
}

/// Where images are pushed to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Registry name; required
    pub registry: Option<String>,
    /// Host used for pushes and lookups; derived from `registry` when unset
    pub login_server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 5,
            max_backoff_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    pub method: CopyMethod,
    pub all_platforms: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            method: CopyMethod::StreamCopy,
            all_platforms: true,
        }
    }
}

/// Complete configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub retry: RetryConfig,
    pub copy: CopyConfig,
    pub dry_run: bool,
    pub max_parallel: usize,
    pub skip_existing: bool,
    pub skip_policy: SkipPolicy,
    pub verify_digest: bool,
    pub images_file: PathBuf,
    pub report_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            destination: DestinationConfig::default(),
            retry: RetryConfig::default(),
            copy: CopyConfig::default(),
            dry_run: false,
            max_parallel: 4,
            skip_existing: true,
            skip_policy: SkipPolicy::TagExists,
            verify_digest: true,
            images_file: PathBuf::from("images.txt"),
            report_dir: PathBuf::from("replication-report"),
            timeout_secs: 30,
        }
    }
}

impl ReplicatorConfig {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReplicatorError::Configuration(format!(
                "Cannot read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            ReplicatorError::Configuration(format!(
                "Invalid config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Overlay `REPLICATOR_*` variables from the process environment
    pub fn apply_process_env(self) -> Result<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay `REPLICATOR_*` variables using the given lookup
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(val) = var("SOURCE_REGISTRY") {
            self.source.registry = val;
        }
        if let Some(val) = var("SOURCE_NAMESPACE") {
            self.source.namespace = Some(val);
        }
        if let Some(val) = var("SOURCE_USERNAME") {
            self.source.username = Some(val);
        }
        if let Some(val) = var("SOURCE_PASSWORD") {
            self.source.password = Some(val);
        }
        if let Some(val) = var("DESTINATION_REGISTRY") {
            self.destination.registry = Some(val);
        }
        if let Some(val) = var("LOGIN_SERVER") {
            self.destination.login_server = Some(val);
        }
        if let Some(val) = var("DESTINATION_USERNAME") {
            self.destination.username = Some(val);
        }
        if let Some(val) = var("DESTINATION_PASSWORD") {
            self.destination.password = Some(val);
        }
        if let Some(val) = var("PREFIX") {
            self.destination.prefix = Some(val);
        }
        if let Some(val) = var("DRY_RUN") {
            self.dry_run = parse_bool("DRY_RUN", &val)?;
        }
        if let Some(val) = var("MAX_PARALLEL") {
            self.max_parallel = parse_number("MAX_PARALLEL", &val)?;
        }
        if let Some(val) = var("RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_number("RETRY_ATTEMPTS", &val)?;
        }
        if let Some(val) = var("RETRY_BACKOFF") {
            self.retry.initial_backoff_secs = parse_number("RETRY_BACKOFF", &val)?;
        }
        if let Some(val) = var("COPY_METHOD") {
            self.copy.method = val.parse()?;
        }
        if let Some(val) = var("ALL_PLATFORMS") {
            self.copy.all_platforms = parse_bool("ALL_PLATFORMS", &val)?;
        }
        if let Some(val) = var("SKIP_EXISTING") {
            self.skip_existing = parse_bool("SKIP_EXISTING", &val)?;
        }
        if let Some(val) = var("VERIFY_DIGEST") {
            self.verify_digest = parse_bool("VERIFY_DIGEST", &val)?;
        }
        if let Some(val) = var("IMAGES_FILE") {
            self.images_file = PathBuf::from(val);
        }
        if let Some(val) = var("REPORT_DIR") {
            self.report_dir = PathBuf::from(val);
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.destination_registry()?;
        if self.max_parallel == 0 {
            return Err(ReplicatorError::Configuration(
                "max_parallel must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ReplicatorError::Configuration(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ReplicatorError::Configuration(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.source.registry.trim().is_empty() {
            return Err(ReplicatorError::Configuration(
                "source.registry cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn destination_registry(&self) -> Result<&str> {
        self.destination
            .registry
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ReplicatorError::Configuration(
                    "destination registry is required (destination.registry or REPLICATOR_DESTINATION_REGISTRY)"
                        .to_string(),
                )
            })
    }

    /// Login server, derived from the registry name when not configured
    pub fn login_server(&self) -> Result<String> {
        if let Some(server) = self
            .destination
            .login_server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Ok(server.trim_end_matches('/').to_string());
        }

        let registry = self.destination_registry()?;
        if registry.contains('.') {
            Ok(registry.to_string())
        } else {
            Ok(format!("{}.azurecr.io", registry.to_lowercase()))
        }
    }

    pub fn mapping(&self) -> DestinationMapping {
        DestinationMapping::new(self.destination.prefix.as_deref())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.initial_backoff_secs),
        );
        match self.retry.max_backoff_secs {
            Some(max) => policy.with_max_backoff(Duration::from_secs(max)),
            None => policy,
        }
    }

    pub fn source_credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.source.username.as_deref(), self.source.password.as_deref())
    }

    pub fn destination_credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(
            self.destination.username.as_deref(),
            self.destination.password.as_deref(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ReplicatorError::Configuration(format!(
            "{}{} must be a boolean, got '{}'",
            ENV_PREFIX, name, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ReplicatorError::Configuration(format!(
            "{}{} must be a non-negative integer, got '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
