//! Runner wiring configuration, registry client, strategy and sinks together

use crate::cli::args::{Args, Command, CommonArgs, ReplicateArgs};
use crate::config::ReplicatorConfig;
use crate::copy::{CopyOptions, CopyStrategyFactory, TokioCommandRunner};
use crate::error::Result;
use crate::image::{ImageReference, dedupe_images, load_image_list};
use crate::logging::Logger;
use crate::registry::{ExistenceChecker, RegistryClient};
use crate::replication::{EngineSettings, ReplicationEngine, WorkScheduler};
use crate::report::{ConsoleSink, JsonReportSink, MultiSink, ReportSink};
use crate::validate::{VALIDATION_FILE, ValidationReport, Validator};
use std::path::Path;
use std::sync::Arc;

/// Exit status for a finished run: 0 when nothing failed or is missing,
/// 1 when something did, 2 when the run could not proceed
pub fn exit_status(result: &Result<usize>) -> u8 {
    match result {
        Ok(0) => 0,
        Ok(_) => 1,
        Err(_) => 2,
    }
}

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let common = args.command.common();
        let output = if common.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(common.verbose)
        };
        Self { args, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    /// Run the selected subcommand; returns the number of failed (or missing)
    /// images so the caller can pick an exit status
    pub async fn run(&self) -> Result<usize> {
        match &self.args.command {
            Command::Replicate(args) => self.replicate(args).await,
            Command::Validate(args) => self.validate(&args.common).await,
        }
    }

    fn load_config(&self, common: &CommonArgs) -> Result<ReplicatorConfig> {
        let config = match &common.config {
            Some(path) => {
                self.output.detail(&format!("Loading configuration from {}", path.display()));
                ReplicatorConfig::from_file(path)?
            }
            None => ReplicatorConfig::default(),
        };
        Ok(common.apply(config.apply_process_env()?))
    }

    fn load_images(&self, path: &Path) -> Result<Vec<ImageReference>> {
        let mut images = load_image_list(path)?;
        let dropped = dedupe_images(&mut images);
        if dropped > 0 {
            self.output.warning(&format!("Ignoring {} duplicate entries in {}", dropped, path.display()));
        }
        self.output.info(&format!("Loaded {} images from {}", images.len(), path.display()));
        Ok(images)
    }

    fn create_checker(&self, config: &ReplicatorConfig) -> Result<Arc<dyn ExistenceChecker>> {
        let login_server = config.login_server()?;
        self.output.detail(&format!("Destination login server: {}", login_server));
        let client = RegistryClient::builder(login_server)
            .with_credentials(config.destination_credentials())
            .with_timeout(config.timeout())
            .build()?;
        let checker: Arc<dyn ExistenceChecker> = Arc::new(client);
        Ok(checker)
    }

    async fn replicate(&self, args: &ReplicateArgs) -> Result<usize> {
        self.output.section("Image Replication");

        let config = args.apply(self.load_config(&args.common)?)?;
        config.validate()?;
        let images = self.load_images(&config.images_file)?;

        let checker = self.create_checker(&config)?;
        let factory = CopyStrategyFactory::new(
            config.destination_registry()?,
            config.login_server()?,
            Arc::new(TokioCommandRunner),
        );
        let strategy = factory.create(config.copy.method);

        self.output.info(&format!(
            "Source: {}{}",
            config.source.registry,
            config
                .source
                .namespace
                .as_deref()
                .map(|ns| format!("/{}", ns))
                .unwrap_or_default()
        ));
        self.output.info(&format!(
            "Destination: {}{}",
            config.login_server()?,
            config.mapping().prefix().map(|p| format!("/{}", p)).unwrap_or_default()
        ));
        self.output.info(&format!("Copy method: {}", config.copy.method));
        let retry = config.retry_policy();
        let backoff: Vec<String> = retry
            .backoff_schedule()
            .into_iter()
            .map(|delay| self.output.format_duration(delay))
            .collect();
        self.output.detail(&format!(
            "Retry: {} attempts, backoff {}",
            retry.max_attempts(),
            if backoff.is_empty() { "none".to_string() } else { backoff.join(", ") }
        ));
        if config.dry_run {
            self.output.warning("Dry run mode: the destination will not be modified");
        }

        let settings = EngineSettings {
            source_registry: config.source.registry.clone(),
            source_namespace: config.source.namespace.clone(),
            mapping: config.mapping(),
            skip_existing: config.skip_existing,
            skip_policy: config.skip_policy,
            verify_digest: config.verify_digest,
            copy_options: CopyOptions {
                all_platforms: config.copy.all_platforms,
                source_credentials: config.source_credentials(),
                dry_run: config.dry_run,
            },
            retry,
        };
        let engine = ReplicationEngine::new(checker.clone(), strategy, settings, self.output.clone());
        let scheduler = WorkScheduler::new(Arc::new(engine), self.output.clone());

        let json = JsonReportSink::create(&config.report_dir, config.copy.method, config.dry_run)?;
        self.output.detail(&format!("Streaming results to {}", json.results_path().display()));
        let mut sink = MultiSink::new()
            .with(json)
            .with(ConsoleSink::new(self.output.clone(), images.len()));

        let run = scheduler
            .run(&images, config.max_parallel, &mut sink as &mut dyn ReportSink)
            .await;
        let mut failures = run.totals.failed;

        // The run is already complete here, so a bad expected list only skips validation
        if args.validate {
            let path = args.expected.as_deref().unwrap_or(&config.images_file);
            match self.load_images(path) {
                Ok(expected) => {
                    let report = self.run_validation(checker, &config, &expected).await;
                    failures += report.missing;
                }
                Err(e) => self.output.warning(&format!(
                    "Skipping validation, expected image list unusable: {}",
                    e
                )),
            }
        }

        Ok(failures)
    }

    async fn validate(&self, common: &CommonArgs) -> Result<usize> {
        self.output.section("Destination Validation");

        let config = self.load_config(common)?;
        config.validate()?;
        let expected = self.load_images(&config.images_file)?;
        let checker = self.create_checker(&config)?;

        let report = self.run_validation(checker, &config, &expected).await;
        Ok(report.missing)
    }

    async fn run_validation(
        &self,
        checker: Arc<dyn ExistenceChecker>,
        config: &ReplicatorConfig,
        expected: &[ImageReference],
    ) -> ValidationReport {
        let validator =
            Validator::new(checker, self.output.clone()).with_concurrency(config.max_parallel);
        let report = validator.validate(expected, &config.mapping()).await;

        let path = config.report_dir.join(VALIDATION_FILE);
        match report.write_json(&path) {
            Ok(()) => self.output.detail(&format!("Validation report written to {}", path.display())),
            Err(e) => self.output.warning(&format!("Cannot write {}: {}", path.display(), e)),
        }

        for record in report.missing_records() {
            self.output.error(&format!(
                "Missing {}:{}{}",
                record.destination_repository,
                record.tag,
                record
                    .diagnostic
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default()
            ));
        }
        report
    }
}
