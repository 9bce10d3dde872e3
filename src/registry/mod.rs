//! Destination registry queries
//!
//! The replicator only needs one read-only question answered by the
//! destination registry: which manifest digest, if any, does
//! `repository:tag` point to. [`ExistenceChecker`] is that seam;
//! [`RegistryClient`] answers it over the Registry HTTP API v2.

pub mod client;

pub use client::{RegistryClient, RegistryClientBuilder};

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    /// Digest of the manifest tagged `tag` in `repository`.
    ///
    /// `Ok(None)` means the tag is absent; `Err` means the registry could not
    /// be asked, which callers must not confuse with absence when reporting.
    async fn lookup(&self, repository: &str, tag: &str) -> Result<Option<String>>;
}
