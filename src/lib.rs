//! Image Replicator Library
//!
//! This file serves as the library root for the image-replicator crate,
//! organizing and exposing the modules that copy container images from a
//! source registry into a destination registry and validate the result.

pub mod cli;
pub mod config;
pub mod copy;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod replication;
pub mod report;
pub mod validate;

pub use config::ReplicatorConfig;
pub use error::{ReplicatorError, Result};
pub use logging::Logger;
