//! Bounded-concurrency fan-out over an image list
//!
//! Up to `concurrency` engine invocations are in flight at once, gated by a
//! semaphore. Finished images are folded into the shared ledger, which holds
//! both the [`ReplicationRun`] and the report sink behind one mutex so that
//! counting, appending and reporting an image happen as a single step.

use crate::image::ImageReference;
use crate::logging::Logger;
use crate::replication::{ImageRecord, ReplicationEngine, ReplicationRun};
use crate::report::ReportSink;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

struct Ledger<'a> {
    run: ReplicationRun,
    sink: &'a mut dyn ReportSink,
}

impl Ledger<'_> {
    fn record(&mut self, record: ImageRecord, output: &Logger) {
        let totals = self.run.record(record);
        if let Some(last) = self.run.records.last() {
            if let Err(e) = self.sink.record(last, &totals) {
                output.warning(&format!("Report write failed: {}", e));
            }
        }
    }
}

pub struct WorkScheduler {
    engine: Arc<ReplicationEngine>,
    output: Logger,
}

impl WorkScheduler {
    pub fn new(engine: Arc<ReplicationEngine>, output: Logger) -> Self {
        Self { engine, output }
    }

    /// Replicate every image and return the completed run. Per-image failures
    /// are recorded, never propagated.
    pub async fn run(
        &self,
        images: &[ImageReference],
        concurrency: usize,
        sink: &mut dyn ReportSink,
    ) -> ReplicationRun {
        let concurrency = concurrency.max(1);
        self.output.info(&format!(
            "Replicating {} images with {} parallel workers",
            images.len(),
            concurrency
        ));

        let semaphore = Semaphore::new(concurrency);
        let ledger = Mutex::new(Ledger {
            run: ReplicationRun::new(),
            sink,
        });

        let workers = images.iter().map(|image| {
            let semaphore = &semaphore;
            let ledger = &ledger;
            async move {
                // The semaphore is never closed, so acquire only fails if it is dropped
                let _permit = semaphore.acquire().await.ok();
                let record = self.engine.replicate(image).await;
                ledger.lock().await.record(record, &self.output);
            }
        });
        join_all(workers).await;

        let Ledger { mut run, sink } = ledger.into_inner();
        run.finish();
        if let Err(e) = sink.finalize(&run) {
            self.output.warning(&format!("Report finalization failed: {}", e));
        }
        run
    }
}
