// ── Cisco IOS: extended named ACLs ──
//
// Inbound and outbound denies live in two dedicated ACLs, each ending in a
// high-sequence `permit ip any any` so new denies always land above it.
// A named ACL filters nothing until it is applied to an interface, so every
// install re-applies both lists to the device's configured interface.
// IOS ACL entries carry no comments, so every listed entry is decoded
// heuristically; the ACL name supplies the direction.

use crate::accounting::AccountingFormat;
use crate::error::CoreError;
use crate::model::{
    BlockTarget, Capabilities, CounterUnit, DeviceKind, Direction, InterfaceCounters, RuleEntry,
};

use super::{Dialect, Family, Scope, heuristic_rule, leading_index};

pub const ACL_IN: &str = "FLEETWALL-IN";
pub const ACL_OUT: &str = "FLEETWALL-OUT";
const PERMIT_SEQ: u32 = 2_147_483_640;

#[derive(Debug)]
pub struct Cisco;

fn acl_for(direction: Direction) -> Option<&'static str> {
    match direction {
        Direction::In => Some(ACL_IN),
        Direction::Out => Some(ACL_OUT),
        Direction::Both => None,
    }
}

/// `host A.B.C.D` or `A.B.C.D WILDCARD`.
fn address_spec(target: &BlockTarget) -> Result<String, CoreError> {
    let ipnetwork::IpNetwork::V4(net) = target.network() else {
        return Err(CoreError::validation(format!(
            "Cisco ACL blocking supports IPv4 only ('{target}')"
        )));
    };
    if target.is_host() {
        return Ok(format!("host {}", net.network()));
    }
    let wildcard = std::net::Ipv4Addr::from(!u32::from(net.mask()));
    Ok(format!("{} {wildcard}", net.network()))
}

/// Parse one address spec from `tokens`, returning the specific target
/// (if any) and how many tokens it consumed.
fn parse_address(tokens: &[&str]) -> Option<(Option<BlockTarget>, usize)> {
    match tokens {
        ["any", ..] => Some((None, 1)),
        ["host", addr, ..] => Some((addr.parse().ok(), 2)),
        [addr, wildcard, ..] => {
            let addr: std::net::Ipv4Addr = addr.parse().ok()?;
            let wildcard: std::net::Ipv4Addr = wildcard.parse().ok()?;
            let prefix = (!u32::from(wildcard)).count_ones();
            let target = format!("{addr}/{prefix}").parse().ok();
            Some((target, 2))
        }
        _ => None,
    }
}

/// Tokens taken by an optional port qualifier after an address spec.
fn port_clause_len(tokens: &[&str]) -> usize {
    match tokens {
        ["eq" | "neq" | "gt" | "lt", _, ..] => 2,
        ["range", _, _, ..] => 3,
        _ => 0,
    }
}

fn config_script(acl: &str, body: &[String]) -> String {
    let mut lines = vec![
        "configure terminal".to_owned(),
        format!("ip access-list extended {acl}"),
    ];
    lines.extend(body.iter().cloned());
    lines.push("end".into());
    lines.join("\n")
}

impl Dialect for Cisco {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cisco
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ip_blocking: true,
            domain_blocking: false,
            accounting: true,
            interface_stats: true,
        }
    }

    fn liveness_command(&self) -> Option<&'static str> {
        Some("show clock")
    }

    fn block_commands(
        &self,
        target: &BlockTarget,
        port: Option<u16>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let acl = acl_for(direction)
            .ok_or_else(|| CoreError::Internal("block commands need a concrete direction".into()))?;
        let spec = address_spec(target)?;
        let (source, destination) = match direction {
            Direction::Out => ("any".to_owned(), spec),
            _ => (spec, "any".to_owned()),
        };

        let mut body = vec![format!("no {PERMIT_SEQ}")];
        match port {
            Some(port) => {
                for proto in ["tcp", "udp"] {
                    body.push(format!("deny {proto} {source} {destination} eq {port}"));
                }
            }
            None => body.push(format!("deny ip {source} {destination}")),
        }
        body.push(format!("{PERMIT_SEQ} permit ip any any"));
        Ok(vec![config_script(acl, &body)])
    }

    fn bind_commands(
        &self,
        binding: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let (acl, side) = match direction {
            Direction::In => (ACL_IN, "in"),
            Direction::Out => (ACL_OUT, "out"),
            Direction::Both => {
                return Err(CoreError::Internal("bind commands need a concrete direction".into()));
            }
        };
        let iface = match binding.map(str::trim) {
            Some(iface) if !iface.is_empty() && !iface.contains(char::is_whitespace) => iface,
            Some(iface) => {
                return Err(CoreError::validation(format!(
                    "'{iface}' is not a single interface name"
                )));
            }
            None => {
                return Err(CoreError::validation(
                    "Cisco ACLs only filter traffic once applied to an interface; \
                     set acl_interface on the device",
                ));
            }
        };
        Ok(vec![format!(
            "configure terminal\ninterface {iface}\nip access-group {acl} {side}\nend"
        )])
    }

    fn rule_scopes(&self) -> Vec<Scope> {
        [ACL_IN, ACL_OUT]
            .into_iter()
            .map(|acl| Scope {
                family: Family::V4,
                chain: acl.to_owned(),
                list_command: format!("show ip access-lists {acl}"),
                optional: false,
            })
            .collect()
    }

    /// `    10 deny tcp host 203.0.113.5 any eq 443 (4 matches)`
    fn decode_rule(&self, scope: &Scope, line: &str) -> Option<RuleEntry> {
        let index = leading_index(line)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.get(1) != Some(&"deny") {
            return None;
        }
        let rest = tokens.get(3..)?;
        let (source, used) = parse_address(rest)?;
        let rest = rest.get(used..)?;
        let rest = rest.get(port_clause_len(rest)..)?;
        let (destination, used) = parse_address(rest)?;
        let port = match rest.get(used..) {
            Some(["eq", port, ..]) => port.parse().ok(),
            _ => None,
        };
        let rule = heuristic_rule(&scope.chain, source, destination, port)?;
        Some(RuleEntry {
            scope: scope.id(),
            index,
            rule,
        })
    }

    fn delete_command(&self, scope: &Scope, index: u32) -> Result<String, CoreError> {
        Ok(config_script(&scope.chain, &[format!("no {index}")]))
    }

    fn accounting(&self) -> Option<(&'static str, AccountingFormat)> {
        Some(("show conn", AccountingFormat::CiscoConn))
    }

    fn interface_commands(&self) -> Vec<String> {
        vec!["show interfaces summary".into()]
    }

    fn decode_interfaces(&self, outputs: &[String]) -> Vec<InterfaceCounters> {
        outputs
            .first()
            .map(|raw| raw.lines().filter_map(decode_summary_line).collect())
            .unwrap_or_default()
    }

    fn output_error(&self, output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("% "))
            .map(str::to_owned)
    }
}

/// `* GigabitEthernet0/0  0 0 0 0 1200 2 800 1 0`: an optional `*` (up),
/// the name, then IHQ IQD OHQ OQD RXBS RXPS TXBS TXPS TRTL.
fn decode_summary_line(line: &str) -> Option<InterfaceCounters> {
    if !line.contains("Ethernet") {
        return None;
    }
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    let up = tokens.first() == Some(&"*");
    if up {
        tokens.remove(0);
    }
    let name = (*tokens.first()?).to_owned();
    let rx = tokens.get(5)?.parse().ok()?;
    let tx = tokens.get(7)?.parse().ok()?;
    Some(InterfaceCounters {
        name,
        status: Some(if up { "up" } else { "down" }.to_owned()),
        rx,
        tx,
        unit: CounterUnit::BitsPerSecond,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scope(acl: &str) -> Scope {
        Cisco
            .rule_scopes()
            .into_iter()
            .find(|s| s.chain == acl)
            .unwrap()
    }

    #[test]
    fn inbound_host_block_script() {
        let target: BlockTarget = "203.0.113.5".parse().unwrap();
        let cmds = Cisco.block_commands(&target, None, Direction::In).unwrap();
        assert_eq!(
            cmds[0],
            "configure terminal\n\
             ip access-list extended FLEETWALL-IN\n\
             no 2147483640\n\
             deny ip host 203.0.113.5 any\n\
             2147483640 permit ip any any\n\
             end"
        );
    }

    #[test]
    fn outbound_network_uses_wildcard_mask() {
        let target: BlockTarget = "198.51.100.0/24".parse().unwrap();
        let cmds = Cisco.block_commands(&target, Some(25), Direction::Out).unwrap();
        assert!(cmds[0].contains("deny tcp any 198.51.100.0 0.0.0.255 eq 25"));
        assert!(cmds[0].contains("deny udp any 198.51.100.0 0.0.0.255 eq 25"));
    }

    #[test]
    fn ipv6_is_rejected_before_io() {
        let target: BlockTarget = "2001:db8::1".parse().unwrap();
        let err = Cisco.block_commands(&target, None, Direction::In).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }

    #[test]
    fn decodes_acl_entries() {
        let s = scope(ACL_IN);
        let entry = Cisco
            .decode_rule(&s, "    10 deny tcp host 203.0.113.5 any eq 443 (4 matches)")
            .unwrap();
        assert_eq!(entry.index, 10);
        assert_eq!(entry.rule.target.to_string(), "203.0.113.5");
        assert_eq!(entry.rule.port, Some(443));
        assert_eq!(entry.rule.direction, Direction::In);

        let s = scope(ACL_OUT);
        let entry = Cisco
            .decode_rule(&s, "    20 deny ip any 198.51.100.0 0.0.0.255")
            .unwrap();
        assert_eq!(entry.rule.target.to_string(), "198.51.100.0/24");
        assert_eq!(entry.rule.direction, Direction::Out);
    }

    #[test]
    fn source_port_qualifiers_are_skipped() {
        let s = scope(ACL_IN);
        let entry = Cisco
            .decode_rule(&s, "    30 deny tcp host 203.0.113.9 eq 1024 any eq 443")
            .unwrap();
        assert_eq!(entry.rule.target.to_string(), "203.0.113.9");
        assert_eq!(entry.rule.port, Some(443));

        let entry = Cisco
            .decode_rule(&s, "    40 deny udp 192.0.2.0 0.0.0.255 range 1000 2000 any")
            .unwrap();
        assert_eq!(entry.rule.target.to_string(), "192.0.2.0/24");
        assert_eq!(entry.rule.port, None);

        let s = scope(ACL_OUT);
        let entry = Cisco
            .decode_rule(&s, "    50 deny tcp any gt 1023 host 198.51.100.7 eq 22 (2 matches)")
            .unwrap();
        assert_eq!(entry.rule.target.to_string(), "198.51.100.7");
        assert_eq!(entry.rule.port, Some(22));
        assert_eq!(entry.rule.direction, Direction::Out);
    }

    #[test]
    fn binding_applies_the_acl_per_direction() {
        let cmds = Cisco
            .bind_commands(Some("GigabitEthernet0/1"), Direction::In)
            .unwrap();
        assert_eq!(
            cmds,
            vec![
                "configure terminal\n\
                 interface GigabitEthernet0/1\n\
                 ip access-group FLEETWALL-IN in\n\
                 end"
                    .to_owned()
            ]
        );
        let cmds = Cisco.bind_commands(Some("Gi0/2"), Direction::Out).unwrap();
        assert!(cmds[0].contains("ip access-group FLEETWALL-OUT out"));
    }

    #[test]
    fn binding_requires_one_interface_name() {
        for binding in [None, Some(""), Some("Gi0/1\nno ip routing")] {
            let err = Cisco.bind_commands(binding, Direction::In).unwrap_err();
            assert!(matches!(err, CoreError::ValidationFailed { .. }), "{binding:?}");
        }
    }

    #[test]
    fn skips_permits_and_headers() {
        let s = scope(ACL_IN);
        assert!(Cisco.decode_rule(&s, "Extended IP access list FLEETWALL-IN").is_none());
        assert!(Cisco.decode_rule(&s, "    2147483640 permit ip any any").is_none());
        assert!(Cisco.decode_rule(&s, "    30 deny ip any any").is_none());
    }

    #[test]
    fn delete_removes_by_sequence() {
        let cmd = Cisco.delete_command(&scope(ACL_OUT), 20).unwrap();
        assert!(cmd.contains("ip access-list extended FLEETWALL-OUT\nno 20\nend"));
    }

    #[test]
    fn error_lines_start_with_percent() {
        assert!(Cisco.output_error("% Invalid input detected at '^' marker.").is_some());
        assert!(Cisco.output_error("*10:21:33.123 UTC Mon Oct 19 2026").is_none());
    }

    #[test]
    fn interface_summary_rows() {
        let raw = " *: interface is up\n Interface  IHQ IQD OHQ OQD RXBS RXPS TXBS TXPS TRTL\n\
                   * GigabitEthernet0/0  0 0 0 0 1200 2 800 1 0\n\
                   \x20 FastEthernet0/1  0 0 0 0 0 0 0 0 0\n";
        let rows = Cisco.decode_interfaces(&[raw.to_owned()]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "GigabitEthernet0/0");
        // RXBS and TXBS, not the queue columns before them
        assert_eq!((rows[0].rx, rows[0].tx), (1200, 800));
        assert_eq!(rows[0].status.as_deref(), Some("up"));
        assert_eq!(rows[1].status.as_deref(), Some("down"));
    }
}
