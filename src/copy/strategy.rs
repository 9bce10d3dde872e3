//! Copy strategy implementations, one per [`CopyMethod`]

use crate::copy::{CommandOutput, CommandRunner, CommandSpec, CopyMethod, CopyOptions, CopyStrategy};
use crate::error::{ReplicatorError, Result};
use crate::image::DigestUtils;
use crate::logging::Logger;
use async_trait::async_trait;
use std::sync::Arc;

/// Run one step of a copy. Mutating steps are only logged in dry-run mode.
async fn execute(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
    options: &CopyOptions,
    log: &Logger,
) -> Result<CommandOutput> {
    if options.dry_run && command.mutating {
        log.detail(&format!("$ {} (dry run, not executed)", command.display()));
        return Ok(CommandOutput::succeeded(""));
    }

    log.detail(&format!("$ {}", command.display()));
    let output = runner.run(command).await?;
    if output.success {
        Ok(output)
    } else {
        Err(ReplicatorError::Copy(output.failure_message(&command.program)))
    }
}

/// Resolve a digest through a read-only inspection command
async fn resolve_digest(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
    options: &CopyOptions,
    log: &Logger,
) -> Option<String> {
    match execute(runner, command, options, log).await {
        Ok(output) => DigestUtils::parse_tool_output(&output.stdout),
        Err(e) => {
            log.detail(&format!("Source digest unavailable: {}", e));
            None
        }
    }
}

/// Server-side import: the destination registry pulls from the source itself
pub struct ImportStrategy {
    runner: Arc<dyn CommandRunner>,
    registry: String,
}

impl ImportStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, registry: impl Into<String>) -> Self {
        Self {
            runner,
            registry: registry.into(),
        }
    }
}

#[async_trait]
impl CopyStrategy for ImportStrategy {
    fn method(&self) -> CopyMethod {
        CopyMethod::Import
    }

    async fn copy(
        &self,
        source: &str,
        destination_repository: &str,
        destination_tag: &str,
        options: &CopyOptions,
        log: &Logger,
    ) -> Result<()> {
        let image = format!("{}:{}", destination_repository, destination_tag);
        let mut command = CommandSpec::new("az").args([
            "acr",
            "import",
            "--name",
            self.registry.as_str(),
            "--source",
            source,
            "--image",
            image.as_str(),
            "--force",
        ]);
        if let Some(creds) = &options.source_credentials {
            command = command
                .args(["--username", creds.username.as_str(), "--password"])
                .secret_arg(creds.password.as_str(), &creds.password);
        }

        execute(self.runner.as_ref(), &command, options, log).await?;
        Ok(())
    }
}

/// Streaming copy of layers straight from registry to registry
pub struct StreamCopyStrategy {
    runner: Arc<dyn CommandRunner>,
    login_server: String,
}

impl StreamCopyStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, login_server: impl Into<String>) -> Self {
        Self {
            runner,
            login_server: login_server.into(),
        }
    }
}

#[async_trait]
impl CopyStrategy for StreamCopyStrategy {
    fn method(&self) -> CopyMethod {
        CopyMethod::StreamCopy
    }

    async fn source_digest(&self, source: &str, options: &CopyOptions, log: &Logger) -> Option<String> {
        let mut command = CommandSpec::new("skopeo").arg("inspect").read_only();
        if let Some(creds) = &options.source_credentials {
            command = command.arg("--creds").secret_arg(
                format!("{}:{}", creds.username, creds.password),
                &creds.password,
            );
        }
        let command = command
            .args(["--format", "{{.Digest}}"])
            .arg(format!("docker://{}", source));

        resolve_digest(self.runner.as_ref(), &command, options, log).await
    }

    async fn copy(
        &self,
        source: &str,
        destination_repository: &str,
        destination_tag: &str,
        options: &CopyOptions,
        log: &Logger,
    ) -> Result<()> {
        let mut command = CommandSpec::new("skopeo").arg("copy");
        if options.all_platforms {
            command = command.arg("--all");
        }
        if let Some(creds) = &options.source_credentials {
            command = command.arg("--src-creds").secret_arg(
                format!("{}:{}", creds.username, creds.password),
                &creds.password,
            );
        }
        let command = command.arg(format!("docker://{}", source)).arg(format!(
            "docker://{}/{}:{}",
            self.login_server, destination_repository, destination_tag
        ));

        execute(self.runner.as_ref(), &command, options, log).await?;
        Ok(())
    }
}

/// Copy of OCI artifacts (non-container payloads)
pub struct ArtifactCopyStrategy {
    runner: Arc<dyn CommandRunner>,
    login_server: String,
}

impl ArtifactCopyStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, login_server: impl Into<String>) -> Self {
        Self {
            runner,
            login_server: login_server.into(),
        }
    }
}

#[async_trait]
impl CopyStrategy for ArtifactCopyStrategy {
    fn method(&self) -> CopyMethod {
        CopyMethod::ArtifactCopy
    }

    async fn source_digest(&self, source: &str, options: &CopyOptions, log: &Logger) -> Option<String> {
        let mut command = CommandSpec::new("oras").arg("resolve").read_only();
        if let Some(creds) = &options.source_credentials {
            command = command
                .args(["--username", creds.username.as_str(), "--password"])
                .secret_arg(creds.password.as_str(), &creds.password);
        }
        let command = command.arg(source);

        resolve_digest(self.runner.as_ref(), &command, options, log).await
    }

    async fn copy(
        &self,
        source: &str,
        destination_repository: &str,
        destination_tag: &str,
        options: &CopyOptions,
        log: &Logger,
    ) -> Result<()> {
        let mut command = CommandSpec::new("oras").arg("copy");
        if let Some(creds) = &options.source_credentials {
            command = command
                .args(["--from-username", creds.username.as_str(), "--from-password"])
                .secret_arg(creds.password.as_str(), &creds.password);
        }
        let command = command.arg(source).arg(format!(
            "{}/{}:{}",
            self.login_server, destination_repository, destination_tag
        ));

        execute(self.runner.as_ref(), &command, options, log).await?;
        Ok(())
    }
}

/// Pull locally, retag and push. Tags this strategy created are removed
/// whatever the outcome of the push; a source image that was already present
/// locally before the pull is left in place.
pub struct PullTagPushStrategy {
    runner: Arc<dyn CommandRunner>,
    login_server: String,
}

impl PullTagPushStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, login_server: impl Into<String>) -> Self {
        Self {
            runner,
            login_server: login_server.into(),
        }
    }

    /// Whether `source` is already in the local image store
    async fn is_local(&self, source: &str, options: &CopyOptions, log: &Logger) -> bool {
        if options.dry_run {
            return false;
        }
        let inspect = CommandSpec::new("docker")
            .args(["image", "inspect", "--format", "{{.Id}}", source])
            .read_only();
        execute(self.runner.as_ref(), &inspect, options, log).await.is_ok()
    }

    async fn transfer(&self, source: &str, target: &str, options: &CopyOptions, log: &Logger) -> Result<()> {
        let runner = self.runner.as_ref();
        execute(runner, &CommandSpec::new("docker").args(["pull", source]), options, log).await?;
        execute(runner, &CommandSpec::new("docker").args(["tag", source, target]), options, log).await?;
        execute(runner, &CommandSpec::new("docker").args(["push", target]), options, log).await?;
        Ok(())
    }
}

#[async_trait]
impl CopyStrategy for PullTagPushStrategy {
    fn method(&self) -> CopyMethod {
        CopyMethod::PullTagPush
    }

    async fn copy(
        &self,
        source: &str,
        destination_repository: &str,
        destination_tag: &str,
        options: &CopyOptions,
        log: &Logger,
    ) -> Result<()> {
        if options.source_credentials.is_some() {
            log.detail("pulltagpush uses the local docker login; source credentials are not passed");
        }
        if options.all_platforms {
            log.detail("pulltagpush copies only the local platform variant");
        }

        let target = format!("{}/{}:{}", self.login_server, destination_repository, destination_tag);
        let source_was_local = self.is_local(source, options, log).await;
        let result = self.transfer(source, &target, options, log).await;

        let mut cleanup = CommandSpec::new("docker").args(["rmi", "--force"]);
        if !source_was_local {
            cleanup = cleanup.arg(source);
        }
        let cleanup = cleanup.arg(target.as_str());
        if let Err(e) = execute(self.runner.as_ref(), &cleanup, options, log).await {
            log.warning(&format!("Local image cleanup failed: {}", e));
        }

        result
    }
}

/// Builds the single strategy used for a whole run
pub struct CopyStrategyFactory {
    pub registry: String,
    pub login_server: String,
    pub runner: Arc<dyn CommandRunner>,
}

impl CopyStrategyFactory {
    pub fn new(
        registry: impl Into<String>,
        login_server: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            registry: registry.into(),
            login_server: login_server.into(),
            runner,
        }
    }

    pub fn create(&self, method: CopyMethod) -> Arc<dyn CopyStrategy> {
        let runner = Arc::clone(&self.runner);
        match method {
            CopyMethod::Import => Arc::new(ImportStrategy::new(runner, self.registry.clone())),
            CopyMethod::StreamCopy => {
                Arc::new(StreamCopyStrategy::new(runner, self.login_server.clone()))
            }
            CopyMethod::ArtifactCopy => {
                Arc::new(ArtifactCopyStrategy::new(runner, self.login_server.clone()))
            }
            CopyMethod::PullTagPush => {
                Arc::new(PullTagPushStrategy::new(runner, self.login_server.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::Credentials;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        fail_program_step: Option<&'static str>,
        stdout: String,
    }

    impl RecordingRunner {
        fn lines(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| format!("{} {}", c.program, c.args.join(" ")))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(command.clone());
            match self.fail_program_step {
                Some(step) if command.args.first().map(String::as_str) == Some(step) => {
                    Ok(CommandOutput::failed(1, format!("{} refused", step)))
                }
                _ => Ok(CommandOutput::succeeded(self.stdout.clone())),
            }
        }
    }

    fn factory(runner: Arc<RecordingRunner>) -> CopyStrategyFactory {
        CopyStrategyFactory::new("mirror", "mirror.azurecr.io", runner)
    }

    fn log() -> Logger {
        Logger::new_quiet()
    }

    #[tokio::test]
    async fn import_passes_source_and_credentials() {
        let runner = Arc::new(RecordingRunner::default());
        let strategy = factory(runner.clone()).create(CopyMethod::Import);
        let options = CopyOptions {
            source_credentials: Some(Credentials::new("robot", "pw")),
            ..CopyOptions::default()
        };

        strategy
            .copy("docker.io/library/nginx:1.25", "hub/library/nginx", "1.25", &options, &log())
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "az acr import --name mirror --source docker.io/library/nginx:1.25 \
                 --image hub/library/nginx:1.25 --force --username robot --password pw"
                    .to_string()
            ]
        );
        assert!(strategy.source_digest("docker.io/library/nginx:1.25", &options, &log()).await.is_none());
    }

    #[tokio::test]
    async fn stream_copy_honours_all_platforms() {
        let runner = Arc::new(RecordingRunner::default());
        let strategy = factory(runner.clone()).create(CopyMethod::StreamCopy);
        let options = CopyOptions {
            all_platforms: true,
            ..CopyOptions::default()
        };

        strategy
            .copy("docker.io/library/redis:7", "redis", "7", &options, &log())
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "skopeo copy --all docker://docker.io/library/redis:7 \
                 docker://mirror.azurecr.io/redis:7"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn stream_copy_reports_source_digest() {
        let digest = DigestUtils::compute_docker_digest(b"redis");
        let runner = Arc::new(RecordingRunner {
            stdout: format!("{}\n", digest),
            ..RecordingRunner::default()
        });
        let strategy = factory(runner.clone()).create(CopyMethod::StreamCopy);

        let resolved = strategy
            .source_digest("docker.io/library/redis:7", &CopyOptions::default(), &log())
            .await;

        assert_eq!(resolved, Some(digest));
        assert!(runner.lines()[0].starts_with("skopeo inspect --format {{.Digest}}"));
    }

    #[tokio::test]
    async fn dry_run_skips_mutating_commands() {
        let runner = Arc::new(RecordingRunner::default());
        let options = CopyOptions {
            dry_run: true,
            ..CopyOptions::default()
        };

        for method in [
            CopyMethod::Import,
            CopyMethod::StreamCopy,
            CopyMethod::ArtifactCopy,
            CopyMethod::PullTagPush,
        ] {
            factory(runner.clone())
                .create(method)
                .copy("docker.io/library/nginx:latest", "nginx", "latest", &options, &log())
                .await
                .unwrap();
        }

        assert!(runner.lines().is_empty());
    }

    #[tokio::test]
    async fn pull_tag_push_cleans_up_after_failed_push() {
        let runner = Arc::new(RecordingRunner {
            fail_program_step: Some("push"),
            ..RecordingRunner::default()
        });
        let strategy = factory(runner.clone()).create(CopyMethod::PullTagPush);

        let err = strategy
            .copy("docker.io/library/nginx:latest", "nginx", "latest", &CopyOptions::default(), &log())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("push refused"));
        let lines = runner.lines();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "docker rmi --force mirror.azurecr.io/nginx:latest");
    }

    #[tokio::test]
    async fn pull_tag_push_keeps_preexisting_source_image() {
        let runner = Arc::new(RecordingRunner::default());
        let strategy = factory(runner.clone()).create(CopyMethod::PullTagPush);

        strategy
            .copy("docker.io/library/redis:7", "redis", "7", &CopyOptions::default(), &log())
            .await
            .unwrap();

        let lines = runner.lines();
        assert_eq!(lines[0], "docker image inspect --format {{.Id}} docker.io/library/redis:7");
        assert_eq!(lines.last().unwrap(), "docker rmi --force mirror.azurecr.io/redis:7");
    }

    #[tokio::test]
    async fn pull_tag_push_removes_source_it_pulled() {
        // Inspect fails, so the source image was not local before the pull
        let runner = Arc::new(RecordingRunner {
            fail_program_step: Some("image"),
            ..RecordingRunner::default()
        });
        let strategy = factory(runner.clone()).create(CopyMethod::PullTagPush);

        strategy
            .copy("docker.io/library/redis:7", "redis", "7", &CopyOptions::default(), &log())
            .await
            .unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[4],
            "docker rmi --force docker.io/library/redis:7 mirror.azurecr.io/redis:7"
        );
    }

    #[tokio::test]
    async fn artifact_copy_targets_login_server() {
        let runner = Arc::new(RecordingRunner::default());
        let strategy = factory(runner.clone()).create(CopyMethod::ArtifactCopy);

        strategy
            .copy("ghcr.io/org/chart:1.0", "charts/chart", "1.0", &CopyOptions::default(), &log())
            .await
            .unwrap();

        assert_eq!(
            runner.lines(),
            vec!["oras copy ghcr.io/org/chart:1.0 mirror.azurecr.io/charts/chart:1.0".to_string()]
        );
        assert_eq!(strategy.method(), CopyMethod::ArtifactCopy);
    }
}
