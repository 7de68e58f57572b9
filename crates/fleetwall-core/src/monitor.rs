// ── Traffic monitor ──
//
// Connection tables and interface counters. Reads only: nothing here
// mutates a device. Records are decoded lazily and attributed to owners
// as they are collected.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::accounting::{self, AccountingFormat, OwnerResolver, read_local_conntrack};
use crate::config::TimeoutClass;
use crate::error::CoreError;
use crate::executor::Executor;
use crate::model::{ConnectionRecord, Device, InterfaceCounters, TrafficAggregate};
use crate::worker::WorkerPool;

const LOCAL_SOURCE: &str = "localhost";

/// Decoded connection table of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub source: String,
    pub records: Vec<ConnectionRecord>,
    /// Lines that could not be decoded.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct TrafficMonitor {
    executor: Executor,
    workers: WorkerPool,
    owners: Arc<dyn OwnerResolver>,
    read_timeout: Duration,
}

impl TrafficMonitor {
    pub fn new(
        executor: Executor,
        workers: WorkerPool,
        owners: Arc<dyn OwnerResolver>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            workers,
            owners,
            read_timeout,
        }
    }

    /// The device's connection table.
    pub async fn connections(&self, device: &Device) -> Result<ConnectionReport, CoreError> {
        let Some((command, format)) = device.kind.dialect().accounting() else {
            return Err(CoreError::unsupported(device.label(), "connection accounting"));
        };
        let raw = self.read(device, command).await?;
        Ok(self.decode(device.label(), &raw, format))
    }

    /// This host's own conntrack table.
    pub async fn local_connections(&self) -> Result<ConnectionReport, CoreError> {
        let raw = self
            .workers
            .run(self.read_timeout, read_local_conntrack)
            .await
            .map_err(|e| CoreError::worker(LOCAL_SOURCE, e))??;
        Ok(self.decode(LOCAL_SOURCE, &raw, AccountingFormat::Conntrack))
    }

    /// Per-owner totals, largest first.
    pub fn summarize(&self, report: ConnectionReport) -> Vec<TrafficAggregate> {
        accounting::aggregate(report.records, self.owners.as_ref())
    }

    pub async fn interfaces(&self, device: &Device) -> Result<Vec<InterfaceCounters>, CoreError> {
        let dialect = device.kind.dialect();
        if !dialect.capabilities().interface_stats {
            return Err(CoreError::unsupported(device.label(), "interface statistics"));
        }
        let mut outputs = Vec::new();
        for command in dialect.interface_commands() {
            outputs.push(self.read(device, &command).await?);
        }
        Ok(dialect.decode_interfaces(&outputs))
    }

    fn decode(&self, source: &str, raw: &str, format: AccountingFormat) -> ConnectionReport {
        let mut decoder = accounting::decode(raw, format);
        let mut records: Vec<ConnectionRecord> = decoder.by_ref().collect();
        let skipped = decoder.skipped();
        if skipped > 0 {
            debug!(source, %format, skipped, "undecodable connection lines skipped");
        }
        accounting::attribute(&mut records, self.owners.as_ref());
        ConnectionReport {
            source: source.to_owned(),
            records,
            skipped,
        }
    }

    async fn read(&self, device: &Device, command: &str) -> Result<String, CoreError> {
        match self.executor.execute(device, command, TimeoutClass::Read).await {
            Err(e) if e.should_evict() && device.kind.uses_cli() => {
                warn!(device = %device.label(), error = %e, "evicting session after failed read");
                self.executor.evict(device).await;
                Err(e)
            }
            other => other,
        }
    }
}
