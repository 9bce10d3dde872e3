use image_replicator::cli::{Args, Runner, exit_status};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let runner = Runner::new(Args::parse_args());
    let result = runner.run().await;

    if let Err(e) = &result {
        if e.is_fatal() {
            runner.output().error(&format!("Aborted: {}", e));
        } else {
            runner.output().error(&e.to_string());
        }
    }
    ExitCode::from(exit_status(&result))
}
