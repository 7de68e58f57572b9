//! Device command handlers.

use serde::Serialize;
use tabled::Tabled;

use fleetwall_config::DeviceEntry;
use fleetwall_core::{Capabilities, DeviceStatus, Dialect, ProbeReport, TimeoutClass};

use crate::cli::{DevicesArgs, DevicesCommand, OutputFormat};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: u16,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Via")]
    method: String,
    #[tabled(rename = "Polled")]
    polled: String,
}

impl From<&DeviceStatus> for StatusRow {
    fn from(s: &DeviceStatus) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            address: s.address.clone(),
            state: output::up_down(s.reachable, false),
            method: output::or_dash(s.method),
            polled: s
                .last_poll
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
        }
    }
}

/// Inventory entry plus what its dialect supports. Never carries secrets.
#[derive(Serialize)]
struct DeviceDetail<'a> {
    id: &'a str,
    name: &'a str,
    kind: String,
    address: &'a str,
    port: u16,
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    acl_interface: Option<&'a str>,
    capabilities: Capabilities,
}

impl<'a> From<&'a DeviceEntry> for DeviceDetail<'a> {
    fn from(d: &'a DeviceEntry) -> Self {
        Self {
            id: &d.id,
            name: d.display_name(),
            kind: d.kind.to_string(),
            address: &d.address,
            port: d.effective_port(),
            username: d.username.as_deref(),
            acl_interface: d.acl_interface.as_deref(),
            capabilities: d.kind.dialect().capabilities(),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn detail(d: &DeviceDetail<'_>) -> String {
    let caps = &d.capabilities;
    [
        format!("ID:           {}", d.id),
        format!("Name:         {}", d.name),
        format!("Kind:         {}", d.kind),
        format!("Address:      {}:{}", d.address, d.port),
        format!("User:         {}", d.username.unwrap_or("-")),
        format!("ACL binding:  {}", d.acl_interface.unwrap_or("-")),
        format!("IP blocking:  {}", yes_no(caps.ip_blocking)),
        format!("DNS blocking: {}", yes_no(caps.domain_blocking)),
        format!("Accounting:   {}", yes_no(caps.accounting)),
        format!("Interfaces:   {}", yes_no(caps.interface_stats)),
    ]
    .join("\n")
}

fn find_entry<'a>(ctx: &'a Context, identifier: &str) -> Result<&'a DeviceEntry, CliError> {
    let entries = ctx.inventory()?;
    entries
        .iter()
        .find(|d| d.id == identifier)
        .or_else(|| {
            entries
                .iter()
                .find(|d| d.display_name().eq_ignore_ascii_case(identifier))
        })
        .or_else(|| entries.iter().find(|d| d.address == identifier))
        .ok_or_else(|| CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices list".into(),
        })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(ctx: &Context, args: DevicesArgs) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let entries = ctx.inventory()?;
            let details: Vec<DeviceDetail<'_>> = entries.iter().map(DeviceDetail::from).collect();
            let out = output::render_list(
                ctx.format,
                &details,
                |d| DeviceRow {
                    id: d.id.to_owned(),
                    name: d.name.to_owned(),
                    kind: d.kind.clone(),
                    address: d.address.to_owned(),
                    port: d.port,
                },
                |d| d.id.to_owned(),
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        DevicesCommand::Show { device } => {
            let entry = find_entry(ctx, &device)?;
            let out = output::render_single(ctx.format, &DeviceDetail::from(entry), detail, |d| {
                d.id.to_owned()
            })?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        DevicesCommand::Status => {
            let fleet = ctx.fleet()?;
            let pb = output::spinner("Probing devices...", ctx.quiet);
            let statuses = fleet.poll_once().await;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            let out = output::render_list(
                ctx.format,
                statuses.as_slice(),
                |s| StatusRow::from(s),
                |s| format!("{}\t{}", s.id, output::up_down(s.reachable, false)),
            )?;
            output::print_output(&out, ctx.quiet);

            let up = statuses.iter().filter(|s| s.reachable).count();
            let summary = format!("{up}/{} devices reachable", statuses.len());
            output::note(
                &output::paint(&summary, up == statuses.len(), ctx.color),
                ctx.quiet || ctx.format != OutputFormat::Table,
            );
            Ok(())
        }

        DevicesCommand::Probe { device } => {
            let fleet = ctx.fleet()?;
            let pb = output::spinner(&format!("Probing {device}..."), ctx.quiet);
            let report = fleet.probe(&device).await?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let color = ctx.color;
            util::print_single(ctx, &report, |r: &ProbeReport| match r.method {
                Some(method) => {
                    format!("{device}: {} (via {method})", output::up_down(true, color))
                }
                None => format!("{device}: {}", output::up_down(false, color)),
            })
        }

        DevicesCommand::Test { device } => {
            let fleet = ctx.fleet()?;
            let outcome = fleet.test_connection(&device).await?;
            util::report(ctx, &outcome)
        }

        DevicesCommand::Exec { device, command } => {
            let fleet = ctx.fleet()?;
            let line = command.join(" ");
            let out = fleet.execute(&device, &line, TimeoutClass::Read).await?;
            util::print_single(ctx, &out, |o: &String| o.trim_end().to_owned())
        }
    }
}
