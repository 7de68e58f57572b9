// ── Fleet facade ──
//
// The single entry point for consumers. Wires the worker pool, session
// pool, executor, rule engine, traffic monitor and prober together, owns
// the background sweep and poll tasks, and resolves device identifiers
// through the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetwall_transport::{CliConnector, SnmpClient, SshConnector};

use crate::accounting::OwnerResolver;
use crate::config::{FleetConfig, TimeoutClass};
use crate::engine::{BlockRequest, DomainListing, RawListing, RuleEngine};
use crate::error::CoreError;
use crate::executor::Executor;
use crate::model::{BlockRule, Device, Direction, InterfaceCounters, Outcome, TrafficAggregate};
use crate::monitor::{ConnectionReport, TrafficMonitor};
use crate::poller::{DeviceStatus, FleetPoller, poll_task};
use crate::pool::{PoolStats, SessionPool, sweep_task};
use crate::probe::{ProbeReport, Prober};
use crate::registry::DeviceRegistry;
use crate::worker::WorkerPool;

/// Where a connection table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingSource {
    /// A registered device, by id, name or address.
    Device(String),
    /// The host running fleetwall.
    LocalHost,
}

/// Cheaply cloneable handle to a managed fleet.
#[derive(Clone)]
pub struct Fleet {
    inner: Arc<FleetInner>,
}

struct FleetInner {
    config: FleetConfig,
    registry: Arc<dyn DeviceRegistry>,
    workers: WorkerPool,
    executor: Executor,
    engine: RuleEngine,
    monitor: TrafficMonitor,
    prober: Arc<Prober>,
    poller: Arc<FleetPoller>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Fleet {
    /// Build a fleet that reaches CLI devices over SSH.
    pub fn new(
        config: FleetConfig,
        registry: Arc<dyn DeviceRegistry>,
        owners: Arc<dyn OwnerResolver>,
    ) -> Self {
        let connector = Arc::new(SshConnector::new(config.transport()));
        Self::with_connector(config, registry, owners, connector)
    }

    pub fn with_connector(
        config: FleetConfig,
        registry: Arc<dyn DeviceRegistry>,
        owners: Arc<dyn OwnerResolver>,
        connector: Arc<dyn CliConnector>,
    ) -> Self {
        let workers = WorkerPool::new(config.max_blocking);
        let snmp = Arc::new(SnmpClient::new(config.transport()));
        let pool = SessionPool::new(Arc::clone(&connector), workers.clone(), &config);
        let executor = Executor::new(
            pool,
            Arc::clone(&snmp),
            workers.clone(),
            config.timeouts.clone(),
        );
        let engine = RuleEngine::new(executor.clone(), config.dnsmasq_conf.clone());
        let monitor = TrafficMonitor::new(
            executor.clone(),
            workers.clone(),
            owners,
            config.timeouts.read,
        );
        let prober = Arc::new(Prober::standard(&config, connector, snmp, workers.clone()));
        let poller = Arc::new(FleetPoller::new(Arc::clone(&registry), Arc::clone(&prober)));

        Self {
            inner: Arc::new(FleetInner {
                config,
                registry,
                workers,
                executor,
                engine,
                monitor,
                prober,
                poller,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the session sweeper and fleet poller. Intervals of zero
    /// disable the matching task. Calling twice is a no-op.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return;
        }
        let config = &self.inner.config;

        if config.sweep_interval > Duration::ZERO {
            let pool = self.inner.executor.pool().clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(sweep_task(pool, config.sweep_interval, cancel)));
        }
        if config.poll_interval > Duration::ZERO {
            let poller = Arc::clone(&self.inner.poller);
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(poll_task(poller, config.poll_interval, cancel)));
        }
        info!(tasks = handles.len(), "fleet started");
    }

    /// Stop background tasks and close every pooled session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.executor.pool().close_all().await;
        info!("fleet shut down");
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<Device> {
        self.inner.registry.devices()
    }

    pub fn device(&self, identifier: &str) -> Result<Device, CoreError> {
        self.inner.registry.resolve(identifier)
    }

    /// Run one raw command (or SNMP `get`/`walk`) on a device.
    pub async fn execute(
        &self,
        identifier: &str,
        command: &str,
        class: TimeoutClass,
    ) -> Result<String, CoreError> {
        let device = self.device(identifier)?;
        self.inner.executor.execute(&device, command, class).await
    }

    pub async fn probe(&self, identifier: &str) -> Result<ProbeReport, CoreError> {
        let device = self.device(identifier)?;
        Ok(self.inner.prober.probe(&device).await)
    }

    /// Open (or reuse) a session and report how it went. Failures are
    /// reported in the outcome, not as errors.
    pub async fn test_connection(&self, identifier: &str) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        let result = if device.kind.uses_cli() {
            self.inner
                .executor
                .lease(&device)
                .await
                .map(|lease| {
                    format!(
                        "Connected to {} (session {})",
                        device.label(),
                        lease.session_id()
                    )
                })
        } else {
            self.inner
                .executor
                .execute(&device, "get ifNumber.0", TimeoutClass::Probe)
                .await
                .map(|out| format!("SNMP agent on {} answered: {}", device.label(), out.trim()))
        };
        Ok(match result {
            Ok(message) => Outcome::done(message, 0),
            Err(e) => Outcome::failed(e.to_string()),
        })
    }

    /// Probe every device now.
    pub async fn poll_once(&self) -> Arc<Vec<DeviceStatus>> {
        self.inner.poller.poll_once().await
    }

    pub fn status(&self) -> watch::Receiver<Arc<Vec<DeviceStatus>>> {
        self.inner.poller.subscribe()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.executor.pool().stats()
    }

    pub fn worker_capacity(&self) -> (usize, usize) {
        (self.inner.workers.available(), self.inner.workers.size())
    }

    // ── IP blocking ──────────────────────────────────────────────────

    pub async fn add_block(
        &self,
        identifier: &str,
        request: &BlockRequest,
    ) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.add_block(&device, request).await
    }

    pub async fn list_blocks(
        &self,
        identifier: &str,
        filter: Direction,
    ) -> Result<Vec<BlockRule>, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.list_blocks(&device, filter).await
    }

    pub async fn remove_block(&self, identifier: &str, target: &str) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.remove_block(&device, target).await
    }

    pub async fn clear_blocks(&self, identifier: &str) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.clear_blocks(&device).await
    }

    pub async fn raw_rules(&self, identifier: &str) -> Result<Vec<RawListing>, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.raw_rules(&device).await
    }

    // ── Domain blocking ──────────────────────────────────────────────

    pub async fn list_domains(&self, identifier: &str) -> Result<DomainListing, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.list_domains(&device).await
    }

    pub async fn block_domain(&self, identifier: &str, domain: &str) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.block_domain(&device, domain).await
    }

    pub async fn unblock_domain(
        &self,
        identifier: &str,
        domain: &str,
    ) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.unblock_domain(&device, domain).await
    }

    pub async fn clear_domains(&self, identifier: &str) -> Result<Outcome, CoreError> {
        let device = self.device(identifier)?;
        self.inner.engine.clear_domains(&device).await
    }

    // ── Traffic ──────────────────────────────────────────────────────

    pub async fn list_connections(
        &self,
        source: &AccountingSource,
    ) -> Result<ConnectionReport, CoreError> {
        match source {
            AccountingSource::Device(identifier) => {
                let device = self.device(identifier)?;
                self.inner.monitor.connections(&device).await
            }
            AccountingSource::LocalHost => self.inner.monitor.local_connections().await,
        }
    }

    pub async fn traffic_summary(
        &self,
        source: &AccountingSource,
    ) -> Result<Vec<TrafficAggregate>, CoreError> {
        let report = self.list_connections(source).await?;
        Ok(self.inner.monitor.summarize(report))
    }

    pub async fn interfaces(&self, identifier: &str) -> Result<Vec<InterfaceCounters>, CoreError> {
        let device = self.device(identifier)?;
        self.inner.monitor.interfaces(&device).await
    }
}
