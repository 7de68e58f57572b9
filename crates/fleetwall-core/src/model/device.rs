// ── Managed device ──

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use fleetwall_transport::{SnmpAgent, SshTarget};

use crate::error::CoreError;

/// Device family. Resolves once to a static dialect via
/// [`DeviceKind::dialect`](crate::dialect).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum DeviceKind {
    /// Linux / OpenWrt: iptables + dnsmasq.
    #[serde(alias = "openwrt")]
    #[strum(to_string = "linux", serialize = "openwrt")]
    Linux,
    /// Mikrotik RouterOS.
    #[serde(alias = "routeros", alias = "mikrotik_routeros")]
    #[strum(to_string = "mikrotik", serialize = "routeros", serialize = "mikrotik_routeros")]
    Mikrotik,
    /// Cisco IOS extended named ACLs.
    #[serde(alias = "cisco_ios", alias = "ios")]
    #[strum(to_string = "cisco", serialize = "cisco_ios", serialize = "ios")]
    Cisco,
    /// SNMP-managed: interface counters only.
    #[strum(to_string = "snmp")]
    Snmp,
}

impl DeviceKind {
    /// Whether commands reach this device through a pooled CLI session.
    pub fn uses_cli(self) -> bool {
        !matches!(self, Self::Snmp)
    }
}

/// What a device's dialect can do.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub ip_blocking: bool,
    pub domain_blocking: bool,
    pub accounting: bool,
    pub interface_stats: bool,
}

/// How to authenticate with a device.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// SSH password authentication.
    Password {
        username: String,
        password: SecretString,
    },
    /// SNMPv2c read community.
    Community(SecretString),
}

/// Pool key: one session per (address, login identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub address: String,
    pub identity: String,
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.address)
    }
}

/// A registered device. Registry data, read-only to the core.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Management port: SSH for CLI devices, the agent port for SNMP.
    pub port: u16,
    pub kind: DeviceKind,
    pub credentials: Credentials,
    /// Interface the device's deny lists are bound to. Cisco ACLs filter
    /// nothing until applied with `ip access-group`.
    pub acl_interface: Option<String>,
}

impl Device {
    pub fn key(&self) -> DeviceKey {
        let identity = match &self.credentials {
            Credentials::Password { username, .. } => username.clone(),
            Credentials::Community(_) => "snmp".into(),
        };
        DeviceKey {
            address: self.address.clone(),
            identity,
        }
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn ssh_target(&self) -> Result<SshTarget, CoreError> {
        match &self.credentials {
            Credentials::Password { username, password } => Ok(SshTarget {
                host: self.address.clone(),
                port: self.port,
                username: username.clone(),
                password: password.clone(),
            }),
            Credentials::Community(_) => Err(CoreError::Config {
                message: format!("device '{}' has no SSH credentials", self.label()),
            }),
        }
    }

    pub fn snmp_agent(&self) -> Result<SnmpAgent, CoreError> {
        match &self.credentials {
            Credentials::Community(community) => Ok(SnmpAgent {
                host: self.address.clone(),
                port: self.port,
                community: community.clone(),
            }),
            Credentials::Password { .. } => Err(CoreError::Config {
                message: format!("device '{}' has no SNMP community", self.label()),
            }),
        }
    }
}
