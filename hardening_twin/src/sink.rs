//! Durable telemetry sinks.
//!
//! A sink persists one finished record per call. The bridge consumer is the
//! only caller, so at most one write is in flight per sink.

use chrono::{Local, NaiveDateTime};
use hardening_common::telemetry::TelemetrySnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::SinkError;

/// Storage backend for finished telemetry records.
pub trait TelemetrySink: Send + 'static {
    /// Sink identifier used in logs (e.g., "jsonl", "memory").
    fn name(&self) -> &'static str;

    /// Persist one record.
    fn persist(
        &mut self,
        record: &TelemetrySnapshot,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Flush and release resources. Called once by the consumer on shutdown.
    fn close(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send {
        async { Ok(()) }
    }
}

/// Row layout of the JSON-lines store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRow {
    pub sim_run_id: u32,
    /// Wall-clock write time.
    pub recorded_at: NaiveDateTime,
    #[serde(flatten)]
    pub record: TelemetrySnapshot,
    pub is_anomaly: bool,
}

impl PersistedRow {
    pub fn new(sim_run_id: u32, record: TelemetrySnapshot) -> Self {
        Self {
            sim_run_id,
            recorded_at: Local::now().naive_local(),
            is_anomaly: record.is_anomaly(),
            record,
        }
    }
}

/// Appends one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    run_id: u32,
    writer: BufWriter<File>,
    written: u64,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub async fn open(path: impl AsRef<Path>, run_id: u32) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("Telemetry sink opened at {}", path.display());
        Ok(Self {
            path,
            run_id,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written since the sink was opened.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl TelemetrySink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn persist(&mut self, record: &TelemetrySnapshot) -> Result<(), SinkError> {
        let row = PersistedRow::new(self.run_id, record.clone());
        let mut line = serde_json::to_vec(&row)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        debug!(
            "Telemetry sink {} closed after {} rows",
            self.path.display(),
            self.written
        );
        Ok(())
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetrySnapshot>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything persisted so far, in persistence order.
    pub fn records(&self) -> Vec<TelemetrySnapshot> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl TelemetrySink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn persist(&mut self, record: &TelemetrySnapshot) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
