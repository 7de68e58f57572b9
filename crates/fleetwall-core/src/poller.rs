// ── Fleet poller ──
//
// Probes every registered device concurrently and publishes the latest
// status snapshot on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::DeviceKind;
use crate::probe::{ProbeMethod, Prober};
use crate::registry::DeviceRegistry;

/// Reachability of one device as of its last poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub id: String,
    pub name: String,
    pub address: String,
    pub kind: DeviceKind,
    pub reachable: bool,
    pub method: Option<ProbeMethod>,
    pub last_poll: DateTime<Utc>,
}

pub struct FleetPoller {
    registry: Arc<dyn DeviceRegistry>,
    prober: Arc<Prober>,
    status: watch::Sender<Arc<Vec<DeviceStatus>>>,
}

impl FleetPoller {
    pub fn new(registry: Arc<dyn DeviceRegistry>, prober: Arc<Prober>) -> Self {
        let (status, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            registry,
            prober,
            status,
        }
    }

    /// Probe every device once, in parallel.
    pub async fn poll_once(&self) -> Arc<Vec<DeviceStatus>> {
        let devices = self.registry.devices();
        let statuses = join_all(devices.iter().map(|device| async {
            let report = self.prober.probe(device).await;
            DeviceStatus {
                id: device.id.clone(),
                name: device.name.clone(),
                address: device.address.clone(),
                kind: device.kind,
                reachable: report.reachable,
                method: report.method,
                last_poll: Utc::now(),
            }
        }))
        .await;

        let up = statuses.iter().filter(|s| s.reachable).count();
        debug!(devices = statuses.len(), up, "fleet poll complete");
        let snapshot = Arc::new(statuses);
        self.status.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DeviceStatus>>> {
        self.status.subscribe()
    }

    /// Latest published statuses; empty before the first poll.
    pub fn snapshot(&self) -> Arc<Vec<DeviceStatus>> {
        Arc::clone(&self.status.borrow())
    }
}

/// Poll the fleet every `period` until cancelled.
pub(crate) async fn poll_task(
    poller: Arc<FleetPoller>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let statuses = poller.poll_once().await;
                let down: Vec<&str> = statuses
                    .iter()
                    .filter(|s| !s.reachable)
                    .map(|s| s.name.as_str())
                    .collect();
                if !down.is_empty() {
                    info!(?down, "unreachable devices");
                }
            }
        }
    }
}
