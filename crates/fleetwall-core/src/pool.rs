// ── Session pool ──
//
// One slot per device key, each behind its own async mutex. The map itself
// is a sharded `DashMap`: inserting or dropping a slot never waits on
// network I/O, and work on one device never blocks another. Holding a
// `SessionLease` means holding that device's slot lock, so whole logical
// operations on a device are serialized.
//
// Sessions are opened lazily, reused only after a passing liveness probe,
// and torn down on probe failure, explicit eviction, or the idle sweep.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetwall_transport::{CliConnector, CliSession, CommandOutput};

use crate::config::{FleetConfig, TimeoutClass, TimeoutConfig};
use crate::error::{CoreError, ExecutionKind};
use crate::model::{Device, DeviceKey};
use crate::worker::WorkerPool;

/// Last known state of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Alive,
    Dead,
}

struct Slot {
    session: Option<Box<dyn CliSession>>,
    session_id: u64,
    device: String,
    liveness_command: Option<&'static str>,
    last_used: Instant,
    liveness: Liveness,
}

impl Slot {
    fn new(device: &Device) -> Self {
        Self {
            session: None,
            session_id: 0,
            device: device.label().to_owned(),
            liveness_command: device.kind.dialect().liveness_command(),
            last_used: Instant::now(),
            liveness: Liveness::Dead,
        }
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Slots currently in the map.
    pub sessions: usize,
    pub created: u64,
    pub torn_down: u64,
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
    /// Slots skipped because an operation held them.
    pub busy: usize,
}

/// Shared pool of CLI sessions keyed by device identity.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    slots: DashMap<DeviceKey, Arc<Mutex<Slot>>>,
    connector: Arc<dyn CliConnector>,
    workers: WorkerPool,
    timeouts: TimeoutConfig,
    idle_before_probe: Duration,
    next_id: AtomicU64,
    created: AtomicU64,
    torn_down: AtomicU64,
}

impl SessionPool {
    pub fn new(
        connector: Arc<dyn CliConnector>,
        workers: WorkerPool,
        config: &FleetConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: DashMap::new(),
                connector,
                workers,
                timeouts: config.timeouts.clone(),
                idle_before_probe: config.idle_before_probe,
                next_id: AtomicU64::new(0),
                created: AtomicU64::new(0),
                torn_down: AtomicU64::new(0),
            }),
        }
    }

    /// Borrow the session for `device`, probing a cached one first.
    ///
    /// Waits while another operation holds the same device. Creation
    /// failures are not retried.
    pub async fn acquire(&self, device: &Device) -> Result<SessionLease, CoreError> {
        if !device.kind.uses_cli() {
            return Err(CoreError::unsupported(device.label(), "CLI sessions"));
        }
        let key = device.key();
        let (slot, mut guard) = self.lock_slot(&key, device).await;

        if guard.session.is_some() {
            if self.inner.probe(&mut guard).await {
                debug!(%key, session = guard.session_id, "reusing session");
                return Ok(self.lease(key, slot, guard));
            }
            warn!(%key, session = guard.session_id, "stale session replaced");
            self.inner.teardown(&mut guard).await;
        }

        if let Err(e) = self.inner.open(&mut guard, device).await {
            self.inner.forget(&key, &slot);
            return Err(e);
        }
        Ok(self.lease(key, slot, guard))
    }

    /// Tear down and forget the session for `key`. Idempotent; returns
    /// whether a slot existed.
    pub async fn evict(&self, key: &DeviceKey) -> bool {
        let Some((_, slot)) = self.inner.slots.remove(key) else {
            return false;
        };
        let mut guard = slot.lock_owned().await;
        self.inner.teardown(&mut guard).await;
        info!(%key, "session evicted");
        true
    }

    /// Probe sessions idle longer than the configured threshold and evict
    /// the dead ones. Slots held by an operation are skipped.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let slots: Vec<(DeviceKey, Arc<Mutex<Slot>>)> = self
            .inner
            .slots
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        for (key, slot) in slots {
            let Ok(mut guard) = Arc::clone(&slot).try_lock_owned() else {
                report.busy += 1;
                continue;
            };
            if guard.session.is_none() {
                self.inner.forget(&key, &slot);
                continue;
            }
            if guard.last_used.elapsed() < self.inner.idle_before_probe {
                continue;
            }
            report.probed += 1;
            if !self.inner.probe(&mut guard).await {
                self.inner.teardown(&mut guard).await;
                self.inner.forget(&key, &slot);
                report.evicted += 1;
                warn!(%key, "dead session evicted by sweep");
            }
        }
        report
    }

    /// Evict every session.
    pub async fn close_all(&self) {
        let keys: Vec<DeviceKey> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.evict(&key).await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            sessions: self.inner.slots.len(),
            created: self.inner.created.load(Ordering::Relaxed),
            torn_down: self.inner.torn_down.load(Ordering::Relaxed),
        }
    }

    async fn lock_slot(
        &self,
        key: &DeviceKey,
        device: &Device,
    ) -> (Arc<Mutex<Slot>>, OwnedMutexGuard<Slot>) {
        loop {
            let slot = Arc::clone(
                self.inner
                    .slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::new(device))))
                    .value(),
            );
            let guard = Arc::clone(&slot).lock_owned().await;
            // An eviction may have dropped this slot while we waited.
            if self.inner.is_current(key, &slot) {
                return (slot, guard);
            }
        }
    }

    fn lease(
        &self,
        key: DeviceKey,
        slot: Arc<Mutex<Slot>>,
        guard: OwnedMutexGuard<Slot>,
    ) -> SessionLease {
        SessionLease {
            key,
            slot,
            guard,
            pool: Arc::clone(&self.inner),
        }
    }
}

impl PoolInner {
    fn is_current(&self, key: &DeviceKey, slot: &Arc<Mutex<Slot>>) -> bool {
        self.slots
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }

    fn forget(&self, key: &DeviceKey, slot: &Arc<Mutex<Slot>>) {
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    async fn open(&self, slot: &mut Slot, device: &Device) -> Result<(), CoreError> {
        let target = device.ssh_target()?;
        let label = device.label().to_owned();
        let connector = Arc::clone(&self.connector);
        // TCP connect and the SSH handshake are each bounded by `connect`.
        let bound = self.timeouts.connect.saturating_mul(2);

        let session = match self.workers.run(bound, move || connector.connect(&target)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(CoreError::connect_failed(&label, e)),
            Err(e) => {
                return Err(CoreError::Connectivity {
                    device: label,
                    reason: e.to_string(),
                });
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.created.fetch_add(1, Ordering::Relaxed);
        slot.session = Some(session);
        slot.session_id = id;
        slot.device = label;
        slot.liveness = Liveness::Alive;
        slot.last_used = Instant::now();
        info!(device = %slot.device, session = id, "session opened");
        Ok(())
    }

    /// Run one command on the slot's session.
    ///
    /// The session travels to a blocking worker and back. If the worker
    /// is abandoned on timeout the session goes with it and the slot is
    /// left dead.
    async fn exec(
        &self,
        slot: &mut Slot,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, CoreError> {
        let Some(mut session) = slot.session.take() else {
            return Err(CoreError::Execution {
                device: slot.device.clone(),
                kind: ExecutionKind::Transport,
                message: "session is closed".into(),
            });
        };
        let command = command.to_owned();
        let result = self
            .workers
            .run(timeout, move || {
                let output = session.exec(&command);
                (session, output)
            })
            .await;

        match result {
            Ok((session, output)) => {
                slot.session = Some(session);
                slot.last_used = Instant::now();
                output.map_err(|e| CoreError::transport(&slot.device, e))
            }
            Err(e) => {
                slot.liveness = Liveness::Dead;
                self.torn_down.fetch_add(1, Ordering::Relaxed);
                Err(CoreError::worker(&slot.device, e))
            }
        }
    }

    async fn probe(&self, slot: &mut Slot) -> bool {
        let Some(command) = slot.liveness_command else {
            return slot.session.is_some();
        };
        let alive = match self.exec(slot, command, self.timeouts.probe).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                debug!(
                    device = %slot.device,
                    status = ?output.exit_status,
                    "liveness probe failed"
                );
                false
            }
            Err(e) => {
                debug!(device = %slot.device, error = %e, "liveness probe failed");
                false
            }
        };
        slot.liveness = if alive { Liveness::Alive } else { Liveness::Dead };
        alive
    }

    async fn teardown(&self, slot: &mut Slot) {
        slot.liveness = Liveness::Dead;
        let Some(mut session) = slot.session.take() else {
            return;
        };
        self.torn_down.fetch_add(1, Ordering::Relaxed);
        debug!(device = %slot.device, session = slot.session_id, "closing session");
        if let Err(e) = self
            .workers
            .run(self.timeouts.probe, move || session.close())
            .await
        {
            debug!(device = %slot.device, error = %e, "session close abandoned");
        }
    }
}

// ── Lease ───────────────────────────────────────────────────────────

/// Exclusive use of one device's session until dropped.
pub struct SessionLease {
    key: DeviceKey,
    slot: Arc<Mutex<Slot>>,
    guard: OwnedMutexGuard<Slot>,
    pool: Arc<PoolInner>,
}

impl SessionLease {
    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    /// Identity of the underlying session. Changes whenever the pool
    /// replaces it.
    pub fn session_id(&self) -> u64 {
        self.guard.session_id
    }

    pub fn liveness(&self) -> Liveness {
        self.guard.liveness
    }

    /// Run one command bounded by the timeout of `class`.
    pub async fn run(
        &mut self,
        command: &str,
        class: TimeoutClass,
    ) -> Result<CommandOutput, CoreError> {
        let timeout = self.pool.timeouts.for_class(class);
        self.pool.exec(&mut self.guard, command, timeout).await
    }

    /// Tear the session down and drop the slot from the pool.
    pub async fn invalidate(mut self) {
        self.pool.teardown(&mut self.guard).await;
        self.pool.forget(&self.key, &self.slot);
        info!(key = %self.key, "session invalidated");
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("key", &self.key)
            .field("session_id", &self.guard.session_id)
            .finish_non_exhaustive()
    }
}

/// Run [`SessionPool::sweep`] every `period` until cancelled.
pub(crate) async fn sweep_task(pool: SessionPool, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let report = pool.sweep().await;
                if report.evicted > 0 {
                    info!(probed = report.probed, evicted = report.evicted, "session sweep");
                } else {
                    debug!(probed = report.probed, busy = report.busy, "session sweep");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;
    use crate::testing::{FakeConnector, device};

    fn pool(connector: &Arc<FakeConnector>) -> SessionPool {
        let config = FleetConfig {
            idle_before_probe: Duration::ZERO,
            ..FleetConfig::default()
        };
        SessionPool::new(connector.clone(), WorkerPool::new(4), &config)
    }

    #[tokio::test]
    async fn passing_probe_reuses_the_same_session() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let router = device(DeviceKind::Linux, "192.0.2.1");

        let first = pool.acquire(&router).await.unwrap().session_id();
        let second = pool.acquire(&router).await.unwrap().session_id();

        assert_eq!(first, second);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 0);
        assert!(connector.commands().contains(&"echo fleetwall-alive".to_owned()));
    }

    #[tokio::test]
    async fn failing_probe_replaces_the_session_once() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let router = device(DeviceKind::Linux, "192.0.2.1");

        let first = pool.acquire(&router).await.unwrap().session_id();
        connector.kill_sessions();
        let second = pool.acquire(&router).await.unwrap().session_id();

        assert_ne!(first, second);
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.closes(), 1);
        let stats = pool.stats();
        assert_eq!((stats.created, stats.torn_down, stats.sessions), (2, 1, 1));
    }

    #[tokio::test]
    async fn same_device_operations_are_serialized() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let router = device(DeviceKind::Mikrotik, "192.0.2.1");

        let held = pool.acquire(&router).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            let router = router.clone();
            tokio::spawn(async move { pool.acquire(&router).await.map(|l| l.session_id()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let id = held.session_id();
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), id);
    }

    #[tokio::test]
    async fn different_devices_do_not_contend() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let a = device(DeviceKind::Linux, "192.0.2.1");
        let b = device(DeviceKind::Linux, "192.0.2.2");

        let _held = pool.acquire(&a).await.unwrap();
        let other = tokio::time::timeout(Duration::from_secs(2), pool.acquire(&b)).await;
        assert!(other.unwrap().is_ok());
        assert_eq!(pool.stats().sessions, 2);
    }

    #[tokio::test]
    async fn connect_failure_is_connectivity_and_not_cached() {
        let connector = FakeConnector::echo();
        connector.refuse_connections(true);
        let pool = pool(&connector);
        let router = device(DeviceKind::Linux, "192.0.2.1");

        let err = pool.acquire(&router).await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(pool.stats().sessions, 0);

        connector.refuse_connections(false);
        assert!(pool.acquire(&router).await.is_ok());
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let router = device(DeviceKind::Linux, "192.0.2.1");
        drop(pool.acquire(&router).await.unwrap());

        assert!(pool.evict(&router.key()).await);
        assert!(!pool.evict(&router.key()).await);
        assert_eq!(connector.closes(), 1);
        assert_eq!(pool.stats().sessions, 0);
    }

    #[tokio::test]
    async fn sweep_evicts_dead_idle_sessions() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let a = device(DeviceKind::Linux, "192.0.2.1");
        let b = device(DeviceKind::Linux, "192.0.2.2");
        drop(pool.acquire(&a).await.unwrap());
        drop(pool.acquire(&b).await.unwrap());

        let report = pool.sweep().await;
        assert_eq!((report.probed, report.evicted), (2, 0));

        connector.kill_sessions();
        let held = pool.acquire(&a).await.unwrap();
        let report = pool.sweep().await;
        assert_eq!(report.busy, 1);
        assert_eq!(report.evicted, 1);
        drop(held);
        assert_eq!(pool.stats().sessions, 1);
    }

    #[tokio::test]
    async fn invalidated_lease_drops_the_slot() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let router = device(DeviceKind::Cisco, "192.0.2.1");

        pool.acquire(&router).await.unwrap().invalidate().await;
        assert_eq!(pool.stats().sessions, 0);
        assert_eq!(connector.closes(), 1);

        pool.acquire(&router).await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn snmp_devices_have_no_sessions() {
        let connector = FakeConnector::echo();
        let pool = pool(&connector);
        let err = pool.acquire(&device(DeviceKind::Snmp, "192.0.2.9")).await.unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }
}
