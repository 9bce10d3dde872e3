//! Streaming report sinks
//!
//! A [`ReportSink`] sees every image record the moment it is counted, along
//! with the running totals, and is finalized once when the run completes.
//! Sinks are always driven under the scheduler's ledger lock, so they never
//! observe interleaved writes.

pub mod console;
pub mod json;

pub use console::ConsoleSink;
pub use json::JsonReportSink;

use crate::error::Result;
use crate::replication::{ImageRecord, ReplicationRun, RunTotals};
use std::sync::{Arc, Mutex};

pub trait ReportSink: Send {
    /// Called once per image, after the totals include it
    fn record(&mut self, record: &ImageRecord, totals: &RunTotals) -> Result<()>;

    /// Called once when every image has a terminal outcome
    fn finalize(&mut self, run: &ReplicationRun) -> Result<()>;
}

/// Keeps records in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryContents>>,
}

#[derive(Debug, Default)]
struct MemoryContents {
    records: Vec<ImageRecord>,
    totals: Vec<RunTotals>,
    finalized: Option<RunTotals>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ImageRecord> {
        self.inner.lock().map(|c| c.records.clone()).unwrap_or_default()
    }

    /// Running totals as seen after each record
    pub fn running_totals(&self) -> Vec<RunTotals> {
        self.inner.lock().map(|c| c.totals.clone()).unwrap_or_default()
    }

    pub fn finalized_totals(&self) -> Option<RunTotals> {
        self.inner.lock().ok().and_then(|c| c.finalized)
    }
}

impl ReportSink for MemorySink {
    fn record(&mut self, record: &ImageRecord, totals: &RunTotals) -> Result<()> {
        if let Ok(mut contents) = self.inner.lock() {
            contents.records.push(record.clone());
            contents.totals.push(*totals);
        }
        Ok(())
    }

    fn finalize(&mut self, run: &ReplicationRun) -> Result<()> {
        if let Ok(mut contents) = self.inner.lock() {
            contents.finalized = Some(run.totals);
        }
        Ok(())
    }
}

/// Fans every call out to several sinks, in order
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ReportSink for MultiSink {
    // Every sink gets the call even if an earlier one fails; the first error wins.
    fn record(&mut self, record: &ImageRecord, totals: &RunTotals) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.record(record, totals) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn finalize(&mut self, run: &ReplicationRun) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.finalize(run) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
