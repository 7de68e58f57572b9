//! Shared configuration for fleetwall.
//!
//! TOML config file, the device inventory, credential resolution
//! (env + keyring + plaintext), and translation to
//! `fleetwall_core::FleetConfig` and core `Device` values. The CLI adds
//! flag-aware wrappers on top.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::debug;

use fleetwall_core::{
    AddressOwnerMap, Credentials, Device, DeviceKind, FleetConfig, TimeoutConfig,
};

/// Keyring service name; entries are `<device-id>/<secret>`.
pub const KEYRING_SERVICE: &str = "fleetwall";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FLEETWALL_CONFIG";

const ENV_PREFIX: &str = "FLEETWALL_";
const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_SNMP_PORT: u16 = 161;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {secret} configured for device '{device}'")]
    NoCredentials { device: String, secret: SecretKind },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Which secret a keyring entry or credential lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SecretKind {
    /// SSH login password.
    Password,
    /// SNMPv2c read community.
    Community,
}

impl SecretKind {
    /// Keyring entry name for this secret on `device_id`.
    pub fn entry(self, device_id: &str) -> String {
        format!("{device_id}/{self}")
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Per-call-class timeouts, in seconds.
    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub workers: WorkerSettings,

    #[serde(default)]
    pub poller: PollerSettings,

    #[serde(default)]
    pub dnsmasq: DnsmasqSettings,

    #[serde(default)]
    pub snmp: SnmpSettings,

    /// Managed device inventory.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,

    /// Address to owner name, used to attribute traffic.
    #[serde(default)]
    pub owners: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub output: String,
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: "table".into(),
            color: "auto".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect: u64,
    pub probe: u64,
    pub read: u64,
    pub mutation: u64,
    pub restart: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        let t = TimeoutConfig::default();
        Self {
            connect: t.connect.as_secs(),
            probe: t.probe.as_secs(),
            read: t.read.as_secs(),
            mutation: t.mutation.as_secs(),
            restart: t.restart.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Seconds between session sweeps; 0 disables the sweeper.
    pub sweep_interval: u64,
    /// Sessions idle for less than this many seconds are not probed.
    pub idle_before_probe: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let d = FleetConfig::default();
        Self {
            sweep_interval: d.sweep_interval.as_secs(),
            idle_before_probe: d.idle_before_probe.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub max_blocking: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_blocking: FleetConfig::default().max_blocking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Seconds between fleet polls; 0 disables background polling.
    pub interval: u64,
    /// TCP port probed on SNMP-only devices.
    pub management_port: u16,
}

impl Default for PollerSettings {
    fn default() -> Self {
        let d = FleetConfig::default();
        Self {
            interval: d.poll_interval.as_secs(),
            management_port: d.management_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsmasqSettings {
    /// Blocklist file on Linux devices.
    pub conf: String,
}

impl Default for DnsmasqSettings {
    fn default() -> Self {
        Self {
            conf: FleetConfig::default().dnsmasq_conf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SnmpSettings {
    pub retries: u32,
}

impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            retries: FleetConfig::default().snmp_retries,
        }
    }
}

/// One managed device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceEntry {
    /// Stable identifier, also the keyring entry prefix.
    pub id: String,

    /// Display name; falls back to the id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Hostname or IP address.
    pub address: String,

    pub kind: DeviceKind,

    /// SSH port for CLI devices, agent port for SNMP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// SSH login (CLI devices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password (plaintext; prefer the keyring or an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// SNMP community (plaintext; prefer the keyring or an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,

    /// Environment variable name containing the SNMP community.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_env: Option<String>,

    /// Interface the Cisco deny ACLs are applied to (`ip access-group`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_interface: Option<String>,
}

impl DeviceEntry {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Configured port, or the protocol default for the device kind.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.kind.uses_cli() {
            DEFAULT_SSH_PORT
        } else {
            DEFAULT_SNMP_PORT
        })
    }

    /// The secret this device authenticates with.
    pub fn secret_kind(&self) -> SecretKind {
        if self.kind.uses_cli() {
            SecretKind::Password
        } else {
            SecretKind::Community
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `FLEETWALL_CONFIG`, then XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "fleetwall", "fleetwall").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetwall");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_from(&config_path())
}

/// Load and validate the Config from `path` + environment.
///
/// A missing file yields the defaults. Nested keys in the environment
/// use `__`: `FLEETWALL_TIMEOUTS__READ=30`.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"));

    let config: Config = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

/// Check inventory and runtime settings for values the core cannot use.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let t = &config.timeouts;
    for (name, secs) in [
        ("connect", t.connect),
        ("probe", t.probe),
        ("read", t.read),
        ("mutation", t.mutation),
        ("restart", t.restart),
    ] {
        if secs == 0 {
            return Err(invalid(format!("timeouts.{name}"), "must be at least 1 second"));
        }
    }
    if config.workers.max_blocking == 0 {
        return Err(invalid("workers.max_blocking", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for entry in &config.devices {
        let field = |key: &str| format!("devices.{}.{key}", entry.id);
        if entry.id.trim().is_empty() {
            return Err(invalid("devices.id", "must not be empty"));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(invalid(field("id"), "duplicate device id"));
        }
        if entry.address.trim().is_empty() {
            return Err(invalid(field("address"), "must not be empty"));
        }
        if entry.port == Some(0) {
            return Err(invalid(field("port"), "must be between 1 and 65535"));
        }
        if entry.kind.uses_cli() && entry.username.as_deref().is_none_or(str::is_empty) {
            return Err(invalid(field("username"), "required for CLI devices"));
        }
        let bad_iface = |iface: &String| iface.is_empty() || iface.contains(char::is_whitespace);
        if entry.acl_interface.as_ref().is_some_and(bad_iface) {
            return Err(invalid(field("acl_interface"), "must be a single interface name"));
        }
    }

    for address in config.owners.keys() {
        if address.parse::<IpAddr>().is_err() {
            return Err(invalid(
                format!("owners.{address}"),
                "key must be an IP address",
            ));
        }
    }
    Ok(())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a device's credentials from the chain: env var, system
/// keyring, then plaintext in the config.
pub fn resolve_credentials(entry: &DeviceEntry) -> Result<Credentials, ConfigError> {
    if entry.kind.uses_cli() {
        let username = entry
            .username
            .clone()
            .ok_or_else(|| {
                invalid(format!("devices.{}.username", entry.id), "required for CLI devices")
            })?;
        let password = resolve_secret(
            &entry.id,
            SecretKind::Password,
            entry.password_env.as_deref(),
            entry.password.as_deref(),
        )?;
        Ok(Credentials::Password { username, password })
    } else {
        let community = resolve_secret(
            &entry.id,
            SecretKind::Community,
            entry.community_env.as_deref(),
            entry.community.as_deref(),
        )?;
        Ok(Credentials::Community(community))
    }
}

fn resolve_secret(
    device_id: &str,
    kind: SecretKind,
    env_name: Option<&str>,
    plaintext: Option<&str>,
) -> Result<SecretString, ConfigError> {
    // 1. Named env var
    if let Some(env_name) = env_name {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &kind.entry(device_id)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(value) = plaintext {
        return Ok(SecretString::from(value.to_owned()));
    }

    Err(ConfigError::NoCredentials {
        device: device_id.into(),
        secret: kind,
    })
}

/// Store a device secret in the system keyring.
pub fn store_secret(
    device_id: &str,
    kind: SecretKind,
    secret: &SecretString,
) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &kind.entry(device_id))?;
    entry.set_password(secret.expose_secret())?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

/// Build the core runtime config.
pub fn to_fleet_config(cfg: &Config) -> FleetConfig {
    let t = &cfg.timeouts;
    FleetConfig {
        timeouts: TimeoutConfig {
            connect: Duration::from_secs(t.connect),
            probe: Duration::from_secs(t.probe),
            read: Duration::from_secs(t.read),
            mutation: Duration::from_secs(t.mutation),
            restart: Duration::from_secs(t.restart),
        },
        max_blocking: cfg.workers.max_blocking,
        sweep_interval: Duration::from_secs(cfg.pool.sweep_interval),
        idle_before_probe: Duration::from_secs(cfg.pool.idle_before_probe),
        poll_interval: Duration::from_secs(cfg.poller.interval),
        management_port: cfg.poller.management_port,
        dnsmasq_conf: cfg.dnsmasq.conf.clone(),
        snmp_retries: cfg.snmp.retries,
    }
}

/// Resolve one inventory entry into a core `Device`.
pub fn to_device(entry: &DeviceEntry) -> Result<Device, ConfigError> {
    Ok(Device {
        id: entry.id.clone(),
        name: entry.display_name().to_owned(),
        address: entry.address.clone(),
        port: entry.effective_port(),
        kind: entry.kind,
        credentials: resolve_credentials(entry)?,
        acl_interface: entry.acl_interface.clone(),
    })
}

/// Resolve the whole inventory. Fails on the first device without
/// usable credentials.
pub fn to_devices(cfg: &Config) -> Result<Vec<Device>, ConfigError> {
    cfg.devices.iter().map(to_device).collect()
}

pub fn owner_map(cfg: &Config) -> AddressOwnerMap {
    cfg.owners
        .iter()
        .map(|(address, owner)| (address.clone(), owner.clone()))
        .collect()
}
