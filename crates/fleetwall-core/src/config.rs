// ── Runtime fleet configuration ──
//
// These types describe *how* the core talks to devices: timeouts per
// call class, worker pool size, background task intervals. They never
// touch disk. `fleetwall-config` builds a `FleetConfig` and hands it in.

use std::time::Duration;

use strum::Display;

use fleetwall_transport::TransportConfig;

/// Timeout class of a remote call. Each class maps to its own bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TimeoutClass {
    /// Liveness probes and reachability checks.
    Probe,
    /// Listing and accounting reads.
    Read,
    /// Rule and resolver-config mutations.
    Mutation,
    /// Service restarts (resolver reload).
    Restart,
}

/// Per-class timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub probe: Duration,
    pub read: Duration,
    pub mutation: Duration,
    pub restart: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            probe: Duration::from_secs(3),
            read: Duration::from_secs(15),
            mutation: Duration::from_secs(20),
            restart: Duration::from_secs(60),
        }
    }
}

impl TimeoutConfig {
    pub fn for_class(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Probe => self.probe,
            TimeoutClass::Read => self.read,
            TimeoutClass::Mutation => self.mutation,
            TimeoutClass::Restart => self.restart,
        }
    }
}

/// Configuration for a fleet of managed devices.
///
/// Built by the CLI -- core never reads config files.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub timeouts: TimeoutConfig,
    /// Upper bound on concurrently running blocking remote calls.
    pub max_blocking: usize,
    /// How often the session sweeper runs. Zero disables it.
    pub sweep_interval: Duration,
    /// Sessions used more recently than this are not probed by the sweeper.
    pub idle_before_probe: Duration,
    /// How often the fleet poller probes every device. Zero disables it.
    pub poll_interval: Duration,
    /// TCP port for the reachability check on SNMP-only devices.
    pub management_port: u16,
    /// dnsmasq file holding sinkhole `address=` lines on Linux devices.
    pub dnsmasq_conf: String,
    /// SNMP retries per request.
    pub snmp_retries: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            max_blocking: 16,
            sweep_interval: Duration::from_secs(60),
            idle_before_probe: Duration::from_secs(30),
            poll_interval: Duration::from_secs(0),
            management_port: 22,
            dnsmasq_conf: "/etc/dnsmasq.d/fleetwall-blocklist.conf".into(),
            snmp_retries: 3,
        }
    }
}

impl FleetConfig {
    /// Transport-level bounds derived from the call-class timeouts.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.timeouts.connect,
            io_timeout: self.timeouts.restart,
            snmp_timeout: self.timeouts.probe,
            snmp_retries: self.snmp_retries,
            ..TransportConfig::default()
        }
    }
}
