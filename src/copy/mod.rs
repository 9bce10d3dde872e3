//! Copy strategies
//!
//! A [`CopyStrategy`] moves one image reference from the source registry to
//! the destination. The method is chosen once per run from configuration and
//! resolved into a single boxed strategy by [`CopyStrategyFactory`].

pub mod command;
pub mod strategy;

pub use command::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use strategy::{
    ArtifactCopyStrategy, CopyStrategyFactory, ImportStrategy, PullTagPushStrategy,
    StreamCopyStrategy,
};

use crate::error::{ReplicatorError, Result};
use crate::logging::Logger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported copy mechanisms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMethod {
    /// Server-side import performed by the destination registry
    #[serde(rename = "import")]
    Import,
    /// Layer streaming copy without local storage
    #[serde(rename = "streamcopy")]
    StreamCopy,
    /// OCI artifact copy
    #[serde(rename = "artifact")]
    ArtifactCopy,
    /// Local pull, retag and push
    #[serde(rename = "pulltagpush")]
    PullTagPush,
}

impl CopyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyMethod::Import => "import",
            CopyMethod::StreamCopy => "streamcopy",
            CopyMethod::ArtifactCopy => "artifact",
            CopyMethod::PullTagPush => "pulltagpush",
        }
    }
}

impl fmt::Display for CopyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CopyMethod {
    type Err = ReplicatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "import" => Ok(CopyMethod::Import),
            "streamcopy" | "stream" | "skopeo" => Ok(CopyMethod::StreamCopy),
            "artifact" | "oras" => Ok(CopyMethod::ArtifactCopy),
            "pulltagpush" | "docker" => Ok(CopyMethod::PullTagPush),
            other => Err(ReplicatorError::Configuration(format!(
                "Unsupported copy method '{}'. Expected one of: import, streamcopy, artifact, pulltagpush",
                other
            ))),
        }
    }
}

/// Username/password pair; the password never appears in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both parts must be present and non-empty
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Self::new(u, p)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Per-run options passed to every copy
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub all_platforms: bool,
    pub source_credentials: Option<Credentials>,
    /// Report success without mutating anything
    pub dry_run: bool,
}

#[async_trait]
pub trait CopyStrategy: Send + Sync {
    fn method(&self) -> CopyMethod;

    /// Digest of the source manifest, for methods that can resolve it before copying
    async fn source_digest(
        &self,
        _source: &str,
        _options: &CopyOptions,
        _log: &Logger,
    ) -> Option<String> {
        None
    }

    /// Copy `source` to `destination_repository:destination_tag`
    async fn copy(
        &self,
        source: &str,
        destination_repository: &str,
        destination_tag: &str,
        options: &CopyOptions,
        log: &Logger,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_methods_and_aliases() {
        assert_eq!("import".parse::<CopyMethod>().unwrap(), CopyMethod::Import);
        assert_eq!("StreamCopy".parse::<CopyMethod>().unwrap(), CopyMethod::StreamCopy);
        assert_eq!("oras".parse::<CopyMethod>().unwrap(), CopyMethod::ArtifactCopy);
        assert_eq!("pulltagpush".parse::<CopyMethod>().unwrap(), CopyMethod::PullTagPush);
    }

    #[test]
    fn unknown_method_is_a_configuration_error() {
        let err = "rsync".parse::<CopyMethod>().unwrap_err();
        assert!(matches!(err, ReplicatorError::Configuration(_)));
    }

    #[test]
    fn credentials_require_both_parts() {
        assert!(Credentials::from_parts(Some("user"), None).is_none());
        assert!(Credentials::from_parts(Some(""), Some("secret")).is_none());
        let creds = Credentials::from_parts(Some("user"), Some("secret")).unwrap();
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
