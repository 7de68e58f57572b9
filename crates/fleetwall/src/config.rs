//! CLI wrappers over `fleetwall-config`: `--config` aware loading,
//! output settings, and lazy construction of the core `Fleet`.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::ValueEnum;

use fleetwall_config::{Config, DeviceEntry};
use fleetwall_core::{Fleet, StaticRegistry};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Config file path: `--config` / `FLEETWALL_CONFIG`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(fleetwall_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(fleetwall_config::load_from(&config_path(global))?)
}

/// Output format: flag, then `defaults.output`, then table.
pub fn output_format(global: &GlobalOpts, cfg: Option<&Config>) -> OutputFormat {
    global
        .output
        .or_else(|| cfg.and_then(|c| OutputFormat::from_str(&c.defaults.output, true).ok()))
        .unwrap_or(OutputFormat::Table)
}

fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global
        .color
        .or_else(|| ColorMode::from_str(&cfg.defaults.color, true).ok())
        .unwrap_or(ColorMode::Auto)
}

// ── Command context ─────────────────────────────────────────────────

/// Everything a device command needs. The fleet is only built (and
/// credentials only resolved) when a handler asks for it.
pub struct Context {
    pub config: Config,
    pub path: PathBuf,
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub yes: bool,
    fleet: OnceLock<Fleet>,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = config_path(global);
        let config = fleetwall_config::load_from(&path)?;
        Ok(Self {
            format: output_format(global, Some(&config)),
            color: output::should_color(color_mode(global, &config)),
            quiet: global.quiet,
            yes: global.yes,
            config,
            path,
            fleet: OnceLock::new(),
        })
    }

    /// Inventory entries, or `NoConfig` when there are none.
    pub fn inventory(&self) -> Result<&[DeviceEntry], CliError> {
        if self.config.devices.is_empty() {
            return Err(CliError::NoConfig {
                path: self.path.display().to_string(),
            });
        }
        Ok(&self.config.devices)
    }

    /// The fleet for device commands; `NoConfig` without an inventory.
    pub fn fleet(&self) -> Result<&Fleet, CliError> {
        self.inventory()?;
        self.build_fleet()
    }

    /// The fleet for commands that can run against this host alone.
    pub fn local_fleet(&self) -> Result<&Fleet, CliError> {
        self.build_fleet()
    }

    fn build_fleet(&self) -> Result<&Fleet, CliError> {
        if let Some(fleet) = self.fleet.get() {
            return Ok(fleet);
        }
        let devices = fleetwall_config::to_devices(&self.config)?;
        let fleet = Fleet::new(
            fleetwall_config::to_fleet_config(&self.config),
            Arc::new(StaticRegistry::new(devices)),
            Arc::new(fleetwall_config::owner_map(&self.config)),
        );
        Ok(self.fleet.get_or_init(|| fleet))
    }

    /// Close pooled sessions, if a fleet was built.
    pub async fn shutdown(&self) {
        if let Some(fleet) = self.fleet.get() {
            fleet.shutdown().await;
        }
    }
}
