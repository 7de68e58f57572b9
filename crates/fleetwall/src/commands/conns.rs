//! Connection table and traffic summary handlers.

use tabled::Tabled;

use fleetwall_core::{AccountingSource, ConnectionRecord, Fleet, TrafficAggregate};

use crate::cli::{ConnsArgs, ConnsCommand, OutputFormat};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "Proto")]
    protocol: String,
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Remote")]
    remote: String,
    #[tabled(rename = "State")]
    status: String,
    #[tabled(rename = "In")]
    bytes_in: String,
    #[tabled(rename = "Out")]
    bytes_out: String,
    #[tabled(rename = "Owner")]
    owner: String,
}

impl From<&ConnectionRecord> for ConnectionRow {
    fn from(c: &ConnectionRecord) -> Self {
        Self {
            protocol: c.protocol.clone(),
            local: c.local.to_string(),
            remote: c.remote.to_string(),
            status: output::or_dash(c.status.as_deref()),
            bytes_in: output::format_bytes(c.bytes_in),
            bytes_out: output::format_bytes(c.bytes_out),
            owner: output::or_dash(c.owner.as_deref()),
        }
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "Conns")]
    connections: usize,
    #[tabled(rename = "In")]
    bytes_in: String,
    #[tabled(rename = "Out")]
    bytes_out: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Protocols")]
    protocols: String,
    #[tabled(rename = "Remotes")]
    remotes: usize,
}

impl From<&TrafficAggregate> for SummaryRow {
    fn from(a: &TrafficAggregate) -> Self {
        Self {
            owner: a.owner.clone(),
            connections: a.connections,
            bytes_in: output::format_bytes(a.bytes_in),
            bytes_out: output::format_bytes(a.bytes_out),
            total: output::format_bytes(a.total_bytes()),
            protocols: a.protocols.iter().cloned().collect::<Vec<_>>().join(","),
            remotes: a.distinct_remotes,
        }
    }
}

/// Local accounting needs no device inventory.
fn fleet_for<'a>(ctx: &'a Context, source: &AccountingSource) -> Result<&'a Fleet, CliError> {
    match source {
        AccountingSource::LocalHost => ctx.local_fleet(),
        AccountingSource::Device(_) => ctx.fleet(),
    }
}

pub async fn handle(ctx: &Context, args: ConnsArgs) -> Result<(), CliError> {
    match args.command {
        ConnsCommand::List { source, top } => {
            let source = util::source(source);
            let mut report = fleet_for(ctx, &source)?.list_connections(&source).await?;
            if let Some(n) = top {
                report
                    .records
                    .sort_by_key(|r| std::cmp::Reverse(r.total_bytes()));
                report.records.truncate(n);
            }

            let out = match ctx.format {
                OutputFormat::Table | OutputFormat::Plain => output::render_list(
                    ctx.format,
                    &report.records,
                    |c| ConnectionRow::from(c),
                    |c| format!("{}\t{}\t{}", c.protocol, c.local, c.remote),
                )?,
                format => {
                    output::render_single(format, &report, |_| String::new(), |_| String::new())?
                }
            };
            output::print_output(&out, ctx.quiet);
            if report.skipped > 0 {
                tracing::warn!(
                    source = %report.source,
                    skipped = report.skipped,
                    "unparseable accounting lines skipped"
                );
            }
            Ok(())
        }

        ConnsCommand::Summary { source } => {
            let source = util::source(source);
            let summary = fleet_for(ctx, &source)?.traffic_summary(&source).await?;
            let out = output::render_list(
                ctx.format,
                &summary,
                |a| SummaryRow::from(a),
                |a| format!("{}\t{}", a.owner, a.total_bytes()),
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }
    }
}
