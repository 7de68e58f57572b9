// ── Command executor ──
//
// Routes a command to the transport the device speaks: a pooled CLI
// session, or a stateless SNMP exchange. Failures come back classified;
// deciding whether to evict is left to the caller.

use std::sync::Arc;

use tracing::debug;

use fleetwall_transport::{CommandOutput, Oid, SnmpClient};

use crate::config::{TimeoutClass, TimeoutConfig};
use crate::error::{CoreError, ExecutionKind};
use crate::model::Device;
use crate::pool::{SessionLease, SessionPool};
use crate::worker::WorkerPool;

/// SNMP "commands" understood by [`Executor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum SnmpRequest {
    Get(Vec<Oid>),
    Walk(Oid),
}

impl SnmpRequest {
    /// `get <oid> [<oid>...]` or `walk <oid>`. Symbolic names resolve
    /// through the transport's MIB table.
    fn parse(command: &str) -> Result<Self, CoreError> {
        let mut words = command.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let oids = words
            .map(|w| Oid::resolve(w).map_err(|e| CoreError::validation(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        match (verb, oids.as_slice()) {
            ("get", [_, ..]) => Ok(Self::Get(oids)),
            ("walk", [root]) => Ok(Self::Walk(root.clone())),
            _ => Err(CoreError::validation(format!(
                "SNMP command must be 'get <oid>...' or 'walk <oid>', got '{command}'"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    pool: SessionPool,
    snmp: Arc<SnmpClient>,
    workers: WorkerPool,
    timeouts: TimeoutConfig,
}

impl Executor {
    pub fn new(
        pool: SessionPool,
        snmp: Arc<SnmpClient>,
        workers: WorkerPool,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            pool,
            snmp,
            workers,
            timeouts,
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Run one command and return its stdout.
    pub async fn execute(
        &self,
        device: &Device,
        command: &str,
        class: TimeoutClass,
    ) -> Result<String, CoreError> {
        if device.kind.uses_cli() {
            let mut lease = self.pool.acquire(device).await?;
            self.run(&mut lease, device, command, class).await
        } else {
            self.snmp(device, command, class).await
        }
    }

    /// Borrow the device's session for a multi-command operation.
    pub async fn lease(&self, device: &Device) -> Result<SessionLease, CoreError> {
        self.pool.acquire(device).await
    }

    /// Run one command on a held lease.
    pub async fn run(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        command: &str,
        class: TimeoutClass,
    ) -> Result<String, CoreError> {
        debug!(device = %device.label(), %class, command, "exec");
        let output = lease.run(command, class).await?;
        check_output(device, output)
    }

    /// Drop the device's pooled session, if any.
    pub async fn evict(&self, device: &Device) -> bool {
        self.pool.evict(&device.key()).await
    }

    async fn snmp(
        &self,
        device: &Device,
        command: &str,
        class: TimeoutClass,
    ) -> Result<String, CoreError> {
        let agent = device.snmp_agent()?;
        let request = SnmpRequest::parse(command)?;
        let client = Arc::clone(&self.snmp);
        let label = device.label().to_owned();
        debug!(device = %label, %class, command, "snmp");

        let result = self
            .workers
            .run(self.timeouts.for_class(class), move || match &request {
                SnmpRequest::Get(oids) => client.get(&agent, oids),
                SnmpRequest::Walk(root) => client.walk(&agent, root),
            })
            .await;
        let varbinds = match result {
            Ok(Ok(varbinds)) => varbinds,
            Ok(Err(e)) => return Err(CoreError::transport(&label, e)),
            Err(e) => return Err(CoreError::worker(&label, e)),
        };
        Ok(varbinds.iter().map(|vb| format!("{vb}\n")).collect())
    }
}

/// Non-zero exits and in-band error text become remote-command failures.
fn check_output(device: &Device, output: CommandOutput) -> Result<String, CoreError> {
    if !output.success() {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        return Err(CoreError::Execution {
            device: device.label().to_owned(),
            kind: ExecutionKind::RemoteCommand,
            message: format!(
                "exit status {}: {detail}",
                output.exit_status.unwrap_or_default()
            ),
        });
    }
    if let Some(message) = device.kind.dialect().output_error(&output.stdout) {
        return Err(CoreError::Execution {
            device: device.label().to_owned(),
            kind: ExecutionKind::RemoteCommand,
            message,
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::FleetConfig;
    use crate::model::DeviceKind;
    use crate::testing::{FakeConnector, device};

    fn executor(connector: &Arc<FakeConnector>) -> Executor {
        let config = FleetConfig::default();
        let workers = WorkerPool::new(4);
        let pool = SessionPool::new(connector.clone(), workers.clone(), &config);
        Executor::new(
            pool,
            Arc::new(SnmpClient::new(config.transport())),
            workers,
            config.timeouts,
        )
    }

    #[tokio::test]
    async fn stdout_is_returned_on_success() {
        let connector = FakeConnector::new(|cmd| Ok(CommandOutput::text(format!("ran {cmd}"))));
        let exec = executor(&connector);
        let out = exec
            .execute(&device(DeviceKind::Linux, "192.0.2.1"), "uptime", TimeoutClass::Read)
            .await
            .unwrap();
        assert_eq!(out, "ran uptime");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_remote_failure_and_keeps_the_session() {
        let connector = FakeConnector::new(|cmd| {
            Ok(if cmd.starts_with("echo") {
                CommandOutput::text("fleetwall-alive")
            } else {
                CommandOutput {
                    stdout: String::new(),
                    stderr: "iptables: No chain/target/match by that name.".into(),
                    exit_status: Some(1),
                }
            })
        });
        let exec = executor(&connector);
        let router = device(DeviceKind::Linux, "192.0.2.1");

        let err = exec
            .execute(&router, "iptables -L NOPE", TimeoutClass::Read)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Execution {
                kind: ExecutionKind::RemoteCommand,
                ..
            }
        ));
        assert!(!err.should_evict());
        assert_eq!(exec.pool().stats().sessions, 1);
    }

    #[tokio::test]
    async fn in_band_errors_are_detected_per_dialect() {
        let connector = FakeConnector::new(|_| {
            Ok(CommandOutput {
                stdout: "% Invalid input detected at '^' marker.".into(),
                stderr: String::new(),
                exit_status: None,
            })
        });
        let exec = executor(&connector);
        let err = exec
            .execute(&device(DeviceKind::Cisco, "192.0.2.1"), "show bogus", TimeoutClass::Read)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid input"));
    }

    #[tokio::test]
    async fn broken_session_is_a_transport_failure() {
        let connector = FakeConnector::new(|_| {
            Err(fleetwall_transport::Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe",
            )))
        });
        let exec = executor(&connector);
        let err = exec
            .execute(
                &device(DeviceKind::Mikrotik, "192.0.2.1"),
                "/system identity print",
                TimeoutClass::Read,
            )
            .await
            .unwrap_err();
        assert!(err.should_evict());
    }

    #[test]
    fn snmp_requests_parse() {
        assert!(matches!(
            SnmpRequest::parse("walk ifDescr").unwrap(),
            SnmpRequest::Walk(_)
        ));
        assert!(matches!(
            SnmpRequest::parse("get 1.3.6.1.2.1.2.1.0 ifDescr.1").unwrap(),
            SnmpRequest::Get(oids) if oids.len() == 2
        ));
        assert!(SnmpRequest::parse("walk").is_err());
        assert!(SnmpRequest::parse("set ifDescr.1 x").is_err());
    }
}
