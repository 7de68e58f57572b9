// ── Linux / OpenWrt: iptables + dnsmasq ──

use crate::accounting::AccountingFormat;
use crate::error::CoreError;
use crate::marker::Marker;
use crate::model::{
    BlockTarget, Capabilities, CounterUnit, DeviceKind, Direction, DomainName, InterfaceCounters,
    RuleEntry,
};

use super::{Dialect, DomainBlocking, Family, Scope, heuristic_rule, leading_index, marker_entry};

const CHAINS: [&str; 3] = ["INPUT", "FORWARD", "OUTPUT"];
const SINKHOLE: &str = "0.0.0.0";

#[derive(Debug)]
pub struct Linux;

fn tool(family: Family) -> &'static str {
    match family {
        Family::V4 => "iptables",
        Family::V6 => "ip6tables",
    }
}

impl Dialect for Linux {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Linux
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
        Some("echo fleetwall-alive")
    }

    /// `In` drops traffic from the target in FORWARD and INPUT; `Out` drops
    /// traffic to it in FORWARD and OUTPUT. A port adds one rule per
    /// transport protocol.
    fn block_commands(
        &self,
        target: &BlockTarget,
        port: Option<u16>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let (chains, side) = match direction {
            Direction::In => (["FORWARD", "INPUT"], "-s"),
            Direction::Out => (["FORWARD", "OUTPUT"], "-d"),
            Direction::Both => {
                return Err(CoreError::Internal(
                    "block commands need a concrete direction".into(),
                ));
            }
        };
        let tool = tool(Family::of(target));
        let marker = Marker::new(*target, port, direction).token();

        let matches: Vec<String> = match port {
            Some(port) => ["tcp", "udp"]
                .iter()
                .map(|proto| format!(" -p {proto} --dport {port}"))
                .collect(),
            None => vec![String::new()],
        };

        let mut rules = Vec::with_capacity(chains.len() * matches.len());
        for chain in chains {
            for m in &matches {
                rules.push(format!(
                    "{tool} -I {chain} {side} {target}{m} -m comment --comment {marker} -j DROP"
                ));
            }
        }
        Ok(vec![rules.join(" && ")])
    }

    fn rule_scopes(&self) -> Vec<Scope> {
        [Family::V4, Family::V6]
            .into_iter()
            .flat_map(|family| {
                CHAINS.iter().map(move |chain| Scope {
                    family,
                    chain: (*chain).to_owned(),
                    list_command: format!("{} -L {chain} -n --line-numbers", tool(family)),
                    optional: family == Family::V6,
                })
            })
            .collect()
    }

    fn decode_rule(&self, scope: &Scope, line: &str) -> Option<RuleEntry> {
        let index = leading_index(line)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if !matches!(tokens.get(1), Some(&("DROP" | "REJECT"))) {
            return None;
        }
        if let Some(entry) = marker_entry(scope, index, line) {
            return Some(entry);
        }

        // num target prot [opt] source destination [extras...]
        // ip6tables leaves the opt column blank on some versions.
        let has_opt = tokens
            .get(3)
            .is_some_and(|t| t.starts_with('-') || t.starts_with('!'));
        let source_at = if has_opt { 4 } else { 3 };
        let source = tokens.get(source_at).and_then(|t| BlockTarget::from_listing(t));
        let destination = tokens
            .get(source_at + 1)
            .and_then(|t| BlockTarget::from_listing(t));
        let port = tokens
            .iter()
            .find_map(|t| t.strip_prefix("dpt:"))
            .and_then(|p| p.parse().ok());

        let rule = heuristic_rule(&scope.chain, source, destination, port)?;
        Some(RuleEntry {
            scope: scope.id(),
            index,
            rule,
        })
    }

    fn delete_command(&self, scope: &Scope, index: u32) -> Result<String, CoreError> {
        Ok(format!("{} -D {} {index}", tool(scope.family), scope.chain))
    }

    fn domains(&self) -> Option<&dyn DomainBlocking> {
        Some(&Dnsmasq)
    }

    fn accounting(&self) -> Option<(&'static str, AccountingFormat)> {
        Some((
            "cat /proc/net/nf_conntrack 2>/dev/null || conntrack -L 2>/dev/null",
            AccountingFormat::Conntrack,
        ))
    }

    fn interface_commands(&self) -> Vec<String> {
        vec!["cat /proc/net/dev".into()]
    }

    fn decode_interfaces(&self, outputs: &[String]) -> Vec<InterfaceCounters> {
        outputs
            .first()
            .map(|raw| raw.lines().filter_map(decode_proc_net_dev).collect())
            .unwrap_or_default()
    }
}

/// One `/proc/net/dev` row: `name: rx_bytes ... (8 receive fields) tx_bytes ...`.
fn decode_proc_net_dev(line: &str) -> Option<InterfaceCounters> {
    let (name, counters) = line.split_once(':')?;
    let fields: Vec<u64> = counters
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    Some(InterfaceCounters {
        name: name.trim().to_owned(),
        status: None,
        rx: *fields.first()?,
        tx: *fields.get(8)?,
        unit: CounterUnit::Bytes,
    })
}

// ── dnsmasq ─────────────────────────────────────────────────────────

/// `address=/<domain>/0.0.0.0` lines in a dedicated dnsmasq include file.
#[derive(Debug)]
struct Dnsmasq;

fn sinkhole_line(domain: &DomainName) -> String {
    format!("address=/{domain}/{SINKHOLE}")
}

impl DomainBlocking for Dnsmasq {
    fn list_command(&self, conf: &str) -> String {
        format!("cat {conf} 2>/dev/null || true")
    }

    fn decode(&self, line: &str) -> Option<DomainName> {
        let domain = line
            .trim()
            .strip_prefix("address=/")?
            .strip_suffix(&format!("/{SINKHOLE}"))?;
        domain.parse().ok()
    }

    fn add_command(&self, conf: &str, domain: &DomainName) -> String {
        let line = sinkhole_line(domain);
        format!("grep -qxF '{line}' {conf} 2>/dev/null || echo '{line}' >> {conf}")
    }

    fn remove_command(&self, conf: &str, domain: &DomainName) -> String {
        let line = sinkhole_line(domain);
        format!("grep -vxF '{line}' {conf} > {conf}.tmp; mv {conf}.tmp {conf}")
    }

    fn clear_command(&self, conf: &str) -> String {
        format!(": > {conf}")
    }

    fn reload_command(&self) -> &'static str {
        "/etc/init.d/dnsmasq restart"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scope(family: Family, chain: &str) -> Scope {
        Linux
            .rule_scopes()
            .into_iter()
            .find(|s| s.family == family && s.chain == chain)
            .unwrap()
    }

    #[test]
    fn inbound_block_covers_forward_and_input() {
        let target: BlockTarget = "203.0.113.5".parse().unwrap();
        let cmds = Linux.block_commands(&target, None, Direction::In).unwrap();
        assert_eq!(
            cmds,
            vec![
                "iptables -I FORWARD -s 203.0.113.5 -m comment \
                 --comment FWBLK_203.0.113.5_any_in -j DROP && \
                 iptables -I INPUT -s 203.0.113.5 -m comment \
                 --comment FWBLK_203.0.113.5_any_in -j DROP"
                    .to_owned()
            ]
        );
    }

    #[test]
    fn port_blocks_add_tcp_and_udp() {
        let target: BlockTarget = "2001:db8::7".parse().unwrap();
        let cmds = Linux.block_commands(&target, Some(53), Direction::Out).unwrap();
        let cmd = &cmds[0];
        assert!(cmd.starts_with("ip6tables -I FORWARD -d 2001:db8::7 -p tcp --dport 53"));
        assert!(cmd.contains("ip6tables -I OUTPUT -d 2001:db8::7 -p udp --dport 53"));
        assert_eq!(cmd.matches(" && ").count(), 3);
    }

    #[test]
    fn decodes_marked_listing_line() {
        let line = "1    DROP       tcp  --  203.0.113.5          0.0.0.0/0            \
                    tcp dpt:443 /* FWBLK_203.0.113.5_443_in */";
        let entry = Linux.decode_rule(&scope(Family::V4, "INPUT"), line).unwrap();
        assert_eq!(entry.index, 1);
        assert_eq!(entry.scope, "ipv4/INPUT");
        assert_eq!(entry.rule.port, Some(443));
        assert_eq!(entry.rule.direction, Direction::In);
        assert!(entry.rule.is_managed());
    }

    #[test]
    fn decodes_unmarked_rule_heuristically() {
        let line = "3    DROP       all  --  0.0.0.0/0            198.51.100.0/24";
        let entry = Linux.decode_rule(&scope(Family::V4, "OUTPUT"), line).unwrap();
        assert_eq!(entry.rule.target.to_string(), "198.51.100.0/24");
        assert_eq!(entry.rule.direction, Direction::Out);
        assert!(!entry.rule.is_managed());
    }

    #[test]
    fn decodes_ip6tables_without_opt_column() {
        let line = "2    DROP       all      2001:db8::9          ::/0";
        let entry = Linux.decode_rule(&scope(Family::V6, "FORWARD"), line).unwrap();
        assert_eq!(entry.rule.target.to_string(), "2001:db8::9");
        assert_eq!(entry.rule.direction, Direction::In);
    }

    #[test]
    fn skips_headers_accepts_and_wildcards() {
        let s = scope(Family::V4, "INPUT");
        assert!(Linux.decode_rule(&s, "Chain INPUT (policy ACCEPT)").is_none());
        for line in [
            "num  target     prot opt source               destination",
            "1    ACCEPT     all  --  10.0.0.1             0.0.0.0/0",
            "2    DROP       all  --  0.0.0.0/0            0.0.0.0/0",
        ] {
            assert!(Linux.decode_rule(&s, line).is_none(), "{line}");
        }
    }

    #[test]
    fn delete_uses_chain_position() {
        let cmd = Linux.delete_command(&scope(Family::V6, "OUTPUT"), 4).unwrap();
        assert_eq!(cmd, "ip6tables -D OUTPUT 4");
    }

    #[test]
    fn dnsmasq_lines() {
        let domain: DomainName = "example.com".parse().unwrap();
        let conf = "/etc/dnsmasq.d/blocklist.conf";
        assert_eq!(
            Dnsmasq.add_command(conf, &domain),
            "grep -qxF 'address=/example.com/0.0.0.0' /etc/dnsmasq.d/blocklist.conf 2>/dev/null || \
             echo 'address=/example.com/0.0.0.0' >> /etc/dnsmasq.d/blocklist.conf"
        );
        assert_eq!(Dnsmasq.decode("address=/example.com/0.0.0.0"), Some(domain));
        assert_eq!(Dnsmasq.decode("server=8.8.8.8"), None);
    }

    #[test]
    fn proc_net_dev_counters() {
        let raw = "Inter-|   Receive                                                |  Transmit\n \
                   face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n  \
                   eth0: 1500 10 0 0 0 0 0 0 900 8 0 0 0 0 0 0\n";
        let rows = Linux.decode_interfaces(&[raw.to_owned()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "eth0");
        assert_eq!((rows[0].rx, rows[0].tx), (1500, 900));
    }
}
