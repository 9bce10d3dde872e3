//! Command-line argument parsing

use crate::config::ReplicatorConfig;
use crate::copy::CopyMethod;
use crate::error::{ReplicatorError, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "image-replicator")]
#[command(about = "Replicate container images from a source registry into a private registry")]
#[command(version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy every listed image into the destination registry
    Replicate(ReplicateArgs),
    /// Check which listed images are present in the destination registry
    Validate(ValidateArgs),
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Replicate(args) => &args.common,
            Command::Validate(args) => &args.common,
        }
    }
}

/// Flags shared by every subcommand
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file path
    #[arg(long = "config", short = 'c', help = "Path to a JSON configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long = "images",
        short = 'i',
        help = "Image list file, one repository[:tag] per line"
    )]
    pub images: Option<PathBuf>,

    #[arg(long = "prefix", help = "Repository prefix in the destination registry")]
    pub prefix: Option<String>,

    #[arg(long = "report-dir", help = "Directory for report files")]
    pub report_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Only print errors"
    )]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ReplicateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Dry run mode (log commands without copying)
    #[arg(
        long = "dry-run",
        short = 'n',
        help = "Log what would be copied without mutating the destination"
    )]
    pub dry_run: bool,

    #[arg(
        long = "parallel",
        short = 'j',
        help = "Number of images replicated concurrently"
    )]
    pub parallel: Option<usize>,

    #[arg(
        long = "method",
        short = 'm',
        help = "Copy method: import, streamcopy, artifact, pulltagpush"
    )]
    pub method: Option<String>,

    #[arg(
        long = "validate",
        help = "Validate the destination against the expected list after replicating"
    )]
    pub validate: bool,

    #[arg(
        long = "expected",
        requires = "validate",
        help = "Expected image list for --validate (defaults to the image list)"
    )]
    pub expected: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

impl CommonArgs {
    /// Overlay flags that were actually given
    pub fn apply(&self, mut config: ReplicatorConfig) -> ReplicatorConfig {
        if let Some(images) = &self.images {
            config.images_file = images.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.destination.prefix = Some(prefix.clone());
        }
        if let Some(dir) = &self.report_dir {
            config.report_dir = dir.clone();
        }
        config
    }
}

impl ReplicateArgs {
    /// Overlay replicate-only flags; shared flags go through [`CommonArgs::apply`]
    pub fn apply(&self, mut config: ReplicatorConfig) -> Result<ReplicatorConfig> {
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(parallel) = self.parallel {
            if parallel == 0 {
                return Err(ReplicatorError::Configuration(
                    "--parallel must be greater than 0".to_string(),
                ));
            }
            config.max_parallel = parallel;
        }
        if let Some(method) = &self.method {
            config.copy.method = method.parse::<CopyMethod>()?;
        }
        Ok(config)
    }
}
