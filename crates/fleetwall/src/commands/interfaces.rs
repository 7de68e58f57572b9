//! Interface counter command handler.

use tabled::Tabled;

use fleetwall_core::{CounterUnit, InterfaceCounters};

use crate::config::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Interface")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "RX")]
    rx: String,
    #[tabled(rename = "TX")]
    tx: String,
}

fn figure(value: u64, unit: CounterUnit) -> String {
    match unit {
        CounterUnit::Bytes => output::format_bytes(value),
        CounterUnit::BitsPerSecond => format!("{value} bit/s"),
    }
}

impl From<&InterfaceCounters> for InterfaceRow {
    fn from(i: &InterfaceCounters) -> Self {
        Self {
            name: i.name.clone(),
            status: output::or_dash(i.status.as_deref()),
            rx: figure(i.rx, i.unit),
            tx: figure(i.tx, i.unit),
        }
    }
}

pub async fn handle(ctx: &Context, device: &str) -> Result<(), CliError> {
    let counters = ctx.fleet()?.interfaces(device).await?;
    let out = output::render_list(
        ctx.format,
        &counters,
        |i| InterfaceRow::from(i),
        |i| format!("{}\t{}\t{}", i.name, i.rx, i.tx),
    )?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
