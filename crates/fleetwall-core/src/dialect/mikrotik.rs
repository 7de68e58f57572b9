// ── Mikrotik RouterOS ──
//
// Rules live in `/ip firewall filter` (and `/ipv6 firewall filter`). Terse
// listings print one rule per line with a 0-based position that matches
// the order of `find`, so deletes address rules by picking from `find`.

use crate::accounting::AccountingFormat;
use crate::error::CoreError;
use crate::marker::Marker;
use crate::model::{
    BlockTarget, Capabilities, CounterUnit, DeviceKind, Direction, DomainName, InterfaceCounters,
    RuleEntry,
};

use super::{
    Dialect, DomainBlocking, Family, Scope, heuristic_rule, key_value, leading_index, marker_entry,
};

const ERROR_PREFIXES: [&str; 5] = [
    "failure:",
    "syntax error",
    "bad command name",
    "expected end of command",
    "input does not match any value",
];

#[derive(Debug)]
pub struct Mikrotik;

fn menu(family: Family) -> &'static str {
    match family {
        Family::V4 => "/ip firewall filter",
        Family::V6 => "/ipv6 firewall filter",
    }
}

impl Dialect for Mikrotik {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Mikrotik
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ip_blocking: true,
            domain_blocking: true,
            accounting: true,
            interface_stats: true,
        }
    }

    fn liveness_command(&self) -> Option<&'static str> {
        Some(":put fleetwall-alive")
    }

    fn block_commands(
        &self,
        target: &BlockTarget,
        port: Option<u16>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let (chains, side) = match direction {
            Direction::In => (["forward", "input"], "src-address"),
            Direction::Out => (["forward", "output"], "dst-address"),
            Direction::Both => {
                return Err(CoreError::Internal(
                    "block commands need a concrete direction".into(),
                ));
            }
        };
        let menu = menu(Family::of(target));
        let marker = Marker::new(*target, port, direction).token();
        let protocols: Vec<String> = match port {
            Some(port) => ["tcp", "udp"]
                .iter()
                .map(|proto| format!(" protocol={proto} dst-port={port}"))
                .collect(),
            None => vec![String::new()],
        };

        let mut adds = Vec::with_capacity(chains.len() * protocols.len());
        for chain in chains {
            for proto in &protocols {
                adds.push(format!(
                    "{menu} add chain={chain} {side}={target}{proto} action=drop comment={marker}"
                ));
            }
        }
        Ok(vec![adds.join("; ")])
    }

    fn rule_scopes(&self) -> Vec<Scope> {
        [Family::V4, Family::V6]
            .into_iter()
            .map(|family| Scope {
                family,
                chain: String::new(),
                list_command: format!("{} print terse without-paging", menu(family)),
                optional: family == Family::V6,
            })
            .collect()
    }

    fn decode_rule(&self, scope: &Scope, line: &str) -> Option<RuleEntry> {
        let index = leading_index(line)?;
        if !matches!(key_value(line, "action"), Some("drop" | "reject")) {
            return None;
        }
        if let Some(entry) = marker_entry(scope, index, line) {
            return Some(entry);
        }

        let chain = key_value(line, "chain")?;
        let source = key_value(line, "src-address").and_then(BlockTarget::from_listing);
        let destination = key_value(line, "dst-address").and_then(BlockTarget::from_listing);
        let port = key_value(line, "dst-port").and_then(|p| p.parse().ok());
        let rule = heuristic_rule(chain, source, destination, port)?;
        Some(RuleEntry {
            scope: scope.id(),
            index,
            rule,
        })
    }

    fn delete_command(&self, scope: &Scope, index: u32) -> Result<String, CoreError> {
        let menu = menu(scope.family);
        Ok(format!("{menu} remove [:pick [{menu} find] {index}]"))
    }

    fn domains(&self) -> Option<&dyn DomainBlocking> {
        Some(&StaticDns)
    }

    fn accounting(&self) -> Option<(&'static str, AccountingFormat)> {
        Some((
            "/ip firewall connection print terse without-paging",
            AccountingFormat::RouterOsTerse,
        ))
    }

    fn interface_commands(&self) -> Vec<String> {
        vec!["/interface print stats terse without-paging".into()]
    }

    fn decode_interfaces(&self, outputs: &[String]) -> Vec<InterfaceCounters> {
        outputs
            .first()
            .map(|raw| raw.lines().filter_map(decode_interface_line).collect())
            .unwrap_or_default()
    }

    fn output_error(&self, output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| {
                let lower = line.to_ascii_lowercase();
                ERROR_PREFIXES.iter().any(|p| lower.starts_with(p))
            })
            .map(str::to_owned)
    }
}

/// ` 0 R  name=ether1 ... rx-byte=123 tx-byte=456 ...`
fn decode_interface_line(line: &str) -> Option<InterfaceCounters> {
    leading_index(line)?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let name = key_value(line, "name")
        .or_else(|| tokens.get(1).copied().filter(|t| !t.contains('=')))?;
    let flags = tokens
        .iter()
        .skip(1)
        .take_while(|t| !t.contains('='))
        .copied()
        .collect::<String>();
    let status = if flags.contains('R') { "running" } else { "down" };
    let counter = |key: &str| {
        key_value(line, key)
            .map(|v| v.replace(' ', ""))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };
    Some(InterfaceCounters {
        name: name.to_owned(),
        status: Some(status.to_owned()),
        rx: counter("rx-byte"),
        tx: counter("tx-byte"),
        unit: CounterUnit::Bytes,
    })
}

// ── Static DNS ──────────────────────────────────────────────────────

/// Sinkhole entries in `/ip dns static`. The conf path does not apply.
#[derive(Debug)]
struct StaticDns;

impl DomainBlocking for StaticDns {
    fn list_command(&self, _conf: &str) -> String {
        "/ip dns static print terse without-paging where address=0.0.0.0".into()
    }

    fn decode(&self, line: &str) -> Option<DomainName> {
        leading_index(line)?;
        if key_value(line, "address") != Some("0.0.0.0") {
            return None;
        }
        key_value(line, "name")?.parse().ok()
    }

    fn add_command(&self, _conf: &str, domain: &DomainName) -> String {
        format!("/ip dns static add name={domain} address=0.0.0.0 comment=fleetwall")
    }

    fn remove_command(&self, _conf: &str, domain: &DomainName) -> String {
        format!("/ip dns static remove [find name=\"{domain}\" address=0.0.0.0]")
    }

    fn clear_command(&self, _conf: &str) -> String {
        "/ip dns static remove [find address=0.0.0.0]".into()
    }

    fn reload_command(&self) -> &'static str {
        "/ip dns cache flush"
    }
}
