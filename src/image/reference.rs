//! Image references and destination mapping

use crate::error::{ReplicatorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag assumed when an identifier doesn't carry one
pub const DEFAULT_TAG: &str = "latest";

/// A source `repository:tag` pair, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    source_repository: String,
    tag: String,
}

impl ImageReference {
    pub fn new(source_repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            source_repository: source_repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse a raw identifier. The repository is everything before the first
    /// `:`; without one the tag defaults to `latest`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (repository, tag) = match raw.split_once(':') {
            Some((repository, tag)) => (repository.trim(), tag.trim()),
            None => (raw, DEFAULT_TAG),
        };

        if repository.is_empty() {
            return Err(ReplicatorError::Input(format!(
                "Image identifier '{}' has an empty repository",
                raw
            )));
        }
        if tag.is_empty() {
            return Err(ReplicatorError::Input(format!(
                "Image identifier '{}' has an empty tag",
                raw
            )));
        }

        Ok(Self::new(repository, tag))
    }

    pub fn source_repository(&self) -> &str {
        &self.source_repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Fully qualified source reference: `registry/namespace/repository:tag`
    pub fn source_full_reference(&self, registry: &str, namespace: Option<&str>) -> String {
        let path = [
            registry.trim_end_matches('/'),
            namespace.map(|n| n.trim_matches('/')).unwrap_or_default(),
            self.source_repository.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

        format!("{}:{}", path, self.tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_repository, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = ReplicatorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Maps source repositories into the destination namespace
///
/// The only renaming supported is a single optional path prefix; the tag is
/// carried over unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationMapping {
    prefix: Option<String>,
}

impl DestinationMapping {
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| p.trim().trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn destination_repository(&self, image: &ImageReference) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, image.source_repository()),
            None => image.source_repository().to_string(),
        }
    }

    pub fn destination_tag<'a>(&self, image: &'a ImageReference) -> &'a str {
        image.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tag_defaults_to_latest() {
        for raw in ["nginx", "library/nginx", "  bitnami/redis  "] {
            let image = ImageReference::parse(raw).unwrap();
            assert_eq!(image.tag(), DEFAULT_TAG, "raw = {raw}");
        }
    }

    #[test]
    fn splits_on_first_colon() {
        let image = ImageReference::parse("redis:7").unwrap();
        assert_eq!(image.source_repository(), "redis");
        assert_eq!(image.tag(), "7");

        let image = ImageReference::parse("app:1.0:rc").unwrap();
        assert_eq!(image.source_repository(), "app");
        assert_eq!(image.tag(), "1.0:rc");
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(ImageReference::parse(":7").is_err());
        assert!(ImageReference::parse("redis:").is_err());
        assert!(ImageReference::parse("   ").is_err());
    }

    #[test]
    fn prefix_is_prepended_to_destination() {
        let image = ImageReference::parse("library/nginx").unwrap();
        let mapping = DestinationMapping::new(Some("mirror"));
        assert_eq!(mapping.destination_repository(&image), "mirror/library/nginx");
        assert_eq!(mapping.destination_tag(&image), "latest");
    }

    #[test]
    fn empty_or_slashed_prefix_is_normalized() {
        let image = ImageReference::parse("redis:7").unwrap();
        assert_eq!(
            DestinationMapping::new(Some("")).destination_repository(&image),
            "redis"
        );
        assert_eq!(
            DestinationMapping::new(Some("/mirror/")).destination_repository(&image),
            "mirror/redis"
        );
        assert_eq!(DestinationMapping::new(None).destination_repository(&image), "redis");
    }

    #[test]
    fn source_reference_joins_registry_and_namespace() {
        let image = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(
            image.source_full_reference("docker.io", Some("library")),
            "docker.io/library/nginx:1.25"
        );
        assert_eq!(image.source_full_reference("ghcr.io/", None), "ghcr.io/nginx:1.25");
    }
}
