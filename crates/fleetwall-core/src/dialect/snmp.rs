// ── SNMP-managed devices ──
//
// No CLI and no rule state: interface counters only. Commands use the
// executor's SNMP grammar (`walk <oid>`), and outputs come back as
// `<oid> = <value>` lines.

use std::collections::BTreeMap;

use fleetwall_transport::Oid;

use crate::model::{Capabilities, CounterUnit, DeviceKind, InterfaceCounters};

use super::Dialect;

const COLUMNS: [&str; 4] = ["ifDescr", "ifOperStatus", "ifInOctets", "ifOutOctets"];

#[derive(Debug)]
pub struct Snmp;

impl Dialect for Snmp {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Snmp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            interface_stats: true,
            ..Capabilities::default()
        }
    }

    fn liveness_command(&self) -> Option<&'static str> {
        None
    }

    fn interface_commands(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| format!("walk {c}")).collect()
    }

    /// Join the four column walks on ifIndex.
    fn decode_interfaces(&self, outputs: &[String]) -> Vec<InterfaceCounters> {
        let mut rows: BTreeMap<u32, InterfaceCounters> = BTreeMap::new();
        for (column, raw) in COLUMNS.iter().zip(outputs) {
            let Ok(base) = Oid::resolve(column) else {
                continue;
            };
            for (index, value) in raw.lines().filter_map(|l| column_cell(&base, l)) {
                let row = rows.entry(index).or_insert_with(|| InterfaceCounters {
                    name: format!("if{index}"),
                    status: None,
                    rx: 0,
                    tx: 0,
                    unit: CounterUnit::Bytes,
                });
                match *column {
                    "ifDescr" => row.name = value.to_owned(),
                    "ifOperStatus" => row.status = Some(oper_status(value).to_owned()),
                    "ifInOctets" => row.rx = value.parse().unwrap_or(0),
                    _ => row.tx = value.parse().unwrap_or(0),
                }
            }
        }
        rows.into_values().collect()
    }
}

/// `1.3.6.1.2.1.2.2.1.2.3 = eth0` under `base` gives `(3, "eth0")`.
fn column_cell<'a>(base: &Oid, line: &'a str) -> Option<(u32, &'a str)> {
    let (oid, value) = line.split_once(" = ")?;
    let oid: Oid = oid.trim().parse().ok()?;
    match oid.suffix(base)? {
        [index] => Some((*index, value.trim())),
        _ => None,
    }
}

fn oper_status(value: &str) -> &str {
    match value {
        "1" => "up",
        "2" => "down",
        "3" => "testing",
        "5" => "dormant",
        "6" => "notPresent",
        "7" => "lowerLayerDown",
        _ => "unknown",
    }
}
