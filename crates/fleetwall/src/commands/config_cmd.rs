//! Config subcommand handlers.

use std::io::{self, IsTerminal};

use dialoguer::{Input, Select};
use secrecy::SecretString;
use strum::IntoEnumIterator;

use fleetwall_config::{Config, DeviceEntry, SecretKind};
use fleetwall_core::DeviceKind;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for device in &mut cfg.devices {
        if device.password.is_some() {
            device.password = Some("****".into());
        }
        if device.community.is_some() {
            device.community = Some("****".into());
        }
    }
    cfg
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn require_terminal(command: &str) -> Result<(), CliError> {
    if io::stdin().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: "terminal".into(),
            reason: format!("`fleetwall config {command}` needs an interactive terminal"),
        })
    }
}

fn secret_label(kind: SecretKind) -> &'static str {
    match kind {
        SecretKind::Password => "Password",
        SecretKind::Community => "SNMP community",
    }
}

fn prompt_secret(kind: SecretKind) -> Result<String, CliError> {
    let label = secret_label(kind);
    let secret = rpassword::prompt_password(format!("{label}: ")).map_err(prompt_err)?;
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: kind.to_string(),
            reason: format!("{label} cannot be empty"),
        });
    }
    Ok(secret)
}

/// Store the secret in the keyring, or hand it back for plaintext config.
fn prompt_storage(
    device_id: &str,
    kind: SecretKind,
    secret: String,
) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt(format!("Where to store the {}?", secret_label(kind).to_lowercase()))
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        fleetwall_config::store_secret(device_id, kind, &SecretString::from(secret))?;
        eprintln!("   ✓ {} stored in system keyring", secret_label(kind));
        Ok(None)
    } else {
        Ok(Some(secret))
    }
}

fn prompt_device(existing: &Config) -> Result<DeviceEntry, CliError> {
    let id: String = Input::new()
        .with_prompt("Device id")
        .interact_text()
        .map_err(prompt_err)?;
    if existing.devices.iter().any(|d| d.id == id) {
        return Err(CliError::Validation {
            field: "id".into(),
            reason: format!("device '{id}' is already configured"),
        });
    }

    let name: String = Input::new()
        .with_prompt("Display name (optional)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let address: String = Input::new()
        .with_prompt("Address")
        .interact_text()
        .map_err(prompt_err)?;

    let kinds: Vec<DeviceKind> = DeviceKind::iter().collect();
    let labels: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    let selection = Select::new()
        .with_prompt("Device kind")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    let kind = kinds.get(selection).copied().unwrap_or(DeviceKind::Linux);

    let default_port = if kind.uses_cli() { 22 } else { 161 };
    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(default_port)
        .interact_text()
        .map_err(prompt_err)?;

    let username = if kind.uses_cli() {
        let user: String = Input::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(prompt_err)?;
        Some(user)
    } else {
        None
    };

    let acl_interface = if kind == DeviceKind::Cisco {
        let iface: String = Input::new()
            .with_prompt("Interface to bind the deny ACLs to")
            .interact_text()
            .map_err(prompt_err)?;
        Some(iface.trim().to_owned())
    } else {
        None
    };

    let mut entry = DeviceEntry {
        id,
        name,
        address,
        kind,
        port: (port != default_port).then_some(port),
        username,
        password: None,
        password_env: None,
        community: None,
        community_env: None,
        acl_interface,
    };

    let kind = entry.secret_kind();
    let secret = prompt_secret(kind)?;
    let plaintext = prompt_storage(&entry.id, kind, secret)?;
    match kind {
        SecretKind::Password => entry.password = plaintext,
        SecretKind::Community => entry.community = plaintext,
    }
    Ok(entry)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            require_terminal("init")?;
            let path = config::config_path(global);
            eprintln!("fleetwall: add a device");
            eprintln!("   Config path: {}\n", path.display());

            let mut cfg = if path.exists() {
                config::load(global)?
            } else {
                Config::default()
            };
            let entry = prompt_device(&cfg)?;
            let id = entry.id.clone();
            cfg.devices.push(entry);
            fleetwall_config::validate(&cfg)?;
            fleetwall_config::save_to(&cfg, &path)?;

            eprintln!("\n   ✓ Saved device '{id}' to {}", path.display());
            eprintln!("   Try: fleetwall devices test {id}");
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let text = toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?;
            let format = config::output_format(global, Some(&cfg));
            let out = output::render_single(format, &cfg, |_| text.clone(), |_| text.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::SetPassword { device } => {
            let cfg = config::load(global)?;
            let entry = cfg
                .devices
                .iter()
                .find(|d| d.id == device)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "device".into(),
                    identifier: device.clone(),
                    list_command: "devices list".into(),
                })?;
            require_terminal("set-password")?;

            let kind = entry.secret_kind();
            let secret = prompt_secret(kind)?;
            fleetwall_config::store_secret(&entry.id, kind, &SecretString::from(secret))?;
            if !global.quiet {
                eprintln!("✓ {} for '{device}' stored in system keyring", secret_label(kind));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_masks_only_plaintext_secrets() {
        let mut cfg = Config::default();
        cfg.devices.push(DeviceEntry {
            id: "edge".into(),
            name: String::new(),
            address: "192.0.2.1".into(),
            kind: DeviceKind::Linux,
            port: None,
            username: Some("root".into()),
            password: Some("hunter2".into()),
            password_env: Some("EDGE_PW".into()),
            community: None,
            community_env: None,
            acl_interface: None,
        });
        let masked = redacted(&cfg);
        let device = &masked.devices[0];
        assert_eq!(device.password.as_deref(), Some("****"));
        assert_eq!(device.password_env.as_deref(), Some("EDGE_PW"));
        assert_eq!(device.community, None);
        assert_eq!(cfg.devices[0].password.as_deref(), Some("hunter2"));
    }
}
