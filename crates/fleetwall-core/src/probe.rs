// ── Reachability prober ──
//
// Ordered checks, cheapest first: ICMP echo, TCP connect to the
// management port, then a full CLI handshake (or an SNMP GET). The first
// check that succeeds wins and later ones are skipped. Every check is a
// blocking call and runs on the shared worker pool.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tracing::debug;

use fleetwall_transport::{CliConnector, Oid, SnmpClient};

use crate::config::FleetConfig;
use crate::model::Device;
use crate::worker::WorkerPool;

/// Which check established reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProbeMethod {
    Icmp,
    Tcp,
    Cli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub reachable: bool,
    pub method: Option<ProbeMethod>,
}

impl ProbeReport {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            method: None,
        }
    }
}

/// One blocking reachability check.
pub trait ReachabilityCheck: Send + Sync {
    fn method(&self) -> ProbeMethod;

    fn check(&self, device: &Device) -> bool;
}

// ── Checks ──────────────────────────────────────────────────────────

/// Single echo request through the system `ping`.
#[derive(Debug, Clone)]
pub struct IcmpCheck {
    pub timeout: Duration,
}

impl ReachabilityCheck for IcmpCheck {
    fn method(&self) -> ProbeMethod {
        ProbeMethod::Icmp
    }

    fn check(&self, device: &Device) -> bool {
        let wait = self.timeout.as_secs().max(1).to_string();
        Command::new("ping")
            .args(["-c", "1", "-W", &wait, &device.address])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

/// TCP connect to the device's SSH port, or to the configured management
/// port for SNMP-only devices.
#[derive(Debug, Clone)]
pub struct TcpCheck {
    pub timeout: Duration,
    pub management_port: u16,
}

impl ReachabilityCheck for TcpCheck {
    fn method(&self) -> ProbeMethod {
        ProbeMethod::Tcp
    }

    fn check(&self, device: &Device) -> bool {
        let port = if device.kind.uses_cli() {
            device.port
        } else {
            self.management_port
        };
        let Ok(addrs) = (device.address.as_str(), port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Full login on a fresh connection, or an `ifNumber.0` GET for SNMP
/// devices. Never touches the session pool.
pub struct CliCheck {
    pub connector: Arc<dyn CliConnector>,
    pub snmp: Arc<SnmpClient>,
}

impl ReachabilityCheck for CliCheck {
    fn method(&self) -> ProbeMethod {
        ProbeMethod::Cli
    }

    fn check(&self, device: &Device) -> bool {
        if device.kind.uses_cli() {
            let Ok(target) = device.ssh_target() else {
                return false;
            };
            match self.connector.connect(&target) {
                Ok(mut session) => {
                    session.close();
                    true
                }
                Err(e) => {
                    debug!(device = %device.label(), error = %e, "CLI handshake failed");
                    false
                }
            }
        } else {
            let (Ok(agent), Ok(oid)) = (device.snmp_agent(), Oid::resolve("ifNumber.0")) else {
                return false;
            };
            self.snmp
                .get(&agent, &[oid])
                .is_ok_and(|vbs| vbs.iter().all(|vb| !vb.value.is_exception()))
        }
    }
}

// ── Prober ──────────────────────────────────────────────────────────

pub struct Prober {
    checks: Vec<Arc<dyn ReachabilityCheck>>,
    workers: WorkerPool,
    bound: Duration,
}

impl Prober {
    /// `bound` caps each check, including time queued for a worker.
    pub fn new(
        checks: Vec<Arc<dyn ReachabilityCheck>>,
        workers: WorkerPool,
        bound: Duration,
    ) -> Self {
        Self {
            checks,
            workers,
            bound,
        }
    }

    /// ICMP, TCP, then CLI/SNMP, with timeouts from `config`.
    pub fn standard(
        config: &FleetConfig,
        connector: Arc<dyn CliConnector>,
        snmp: Arc<SnmpClient>,
        workers: WorkerPool,
    ) -> Self {
        let probe = config.timeouts.probe;
        let checks: Vec<Arc<dyn ReachabilityCheck>> = vec![
            Arc::new(IcmpCheck { timeout: probe }),
            Arc::new(TcpCheck {
                timeout: probe,
                management_port: config.management_port,
            }),
            Arc::new(CliCheck { connector, snmp }),
        ];
        // The CLI handshake needs a TCP connect plus the SSH exchange.
        let bound = config.timeouts.connect.saturating_mul(2).max(probe);
        Self::new(checks, workers, bound)
    }

    pub async fn probe(&self, device: &Device) -> ProbeReport {
        if device.address.trim().is_empty() {
            return ProbeReport::unreachable();
        }
        for check in &self.checks {
            let method = check.method();
            let job = {
                let check = Arc::clone(check);
                let device = device.clone();
                move || check.check(&device)
            };
            match self.workers.run(self.bound, job).await {
                Ok(true) => {
                    debug!(device = %device.label(), %method, "reachable");
                    return ProbeReport {
                        reachable: true,
                        method: Some(method),
                    };
                }
                Ok(false) => debug!(device = %device.label(), %method, "check failed"),
                Err(e) => debug!(device = %device.label(), %method, error = %e, "check abandoned"),
            }
        }
        ProbeReport::unreachable()
    }
}
