// ── Device dialects ──
//
// One static record per device family: command templates plus the
// decoders for that family's listing output. `DeviceKind::dialect()`
// resolves once; callers never branch on the kind string themselves.
// Each dialect decodes only its own output, so an ambiguous line from one
// family can never leak into another family's results.

mod cisco;
mod linux;
mod mikrotik;
mod snmp;

use std::fmt;

use crate::accounting::AccountingFormat;
use crate::error::CoreError;
use crate::marker::Marker;
use crate::model::{
    BlockRule, BlockTarget, Capabilities, DeviceKind, Direction, DomainName, InterfaceCounters,
    RuleEntry,
};

pub use cisco::Cisco;
pub use linux::Linux;
pub use mikrotik::Mikrotik;
pub use snmp::Snmp;

// ── Scopes ──────────────────────────────────────────────────────────

/// Address family a listing scope covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(target: &BlockTarget) -> Self {
        if target.is_ipv4() { Self::V4 } else { Self::V6 }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        })
    }
}

/// One listable rule container: an iptables chain, a RouterOS filter
/// table, or a Cisco ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub family: Family,
    /// Chain or ACL name. Empty when the listing spans every chain.
    pub chain: String,
    pub list_command: String,
    /// Listing failures are tolerated (the family may be disabled).
    pub optional: bool,
}

impl Scope {
    pub fn id(&self) -> String {
        if self.chain.is_empty() {
            self.family.to_string()
        } else {
            format!("{}/{}", self.family, self.chain)
        }
    }
}

// ── Dialect contract ────────────────────────────────────────────────

/// Command vocabulary and output decoders of one device family.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DeviceKind;

    fn capabilities(&self) -> Capabilities;

    /// Harmless command used to check that a pooled session still works.
    fn liveness_command(&self) -> Option<&'static str>;

    /// Commands installing a deny for one concrete direction (`In` or
    /// `Out`). Each command carries the rule's marker token.
    fn block_commands(
        &self,
        target: &BlockTarget,
        port: Option<u16>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let _ = (target, port, direction);
        Err(CoreError::unsupported(self.kind().as_ref(), "IP blocking"))
    }

    /// Commands making the deny container for `direction` take effect,
    /// given the device's configured binding. Run after every install and
    /// must be safe to repeat. Most families need none.
    fn bind_commands(
        &self,
        binding: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<String>, CoreError> {
        let _ = (binding, direction);
        Ok(Vec::new())
    }

    /// Containers to scan when listing rules.
    fn rule_scopes(&self) -> Vec<Scope> {
        Vec::new()
    }

    /// Decode one listing line. `None` for headers, allow rules, and
    /// lines with no specific address.
    fn decode_rule(&self, scope: &Scope, line: &str) -> Option<RuleEntry> {
        let _ = (scope, line);
        None
    }

    /// Delete the entry at `index` of `scope`.
    fn delete_command(&self, scope: &Scope, index: u32) -> Result<String, CoreError> {
        let _ = (scope, index);
        Err(CoreError::unsupported(self.kind().as_ref(), "IP blocking"))
    }

    fn domains(&self) -> Option<&dyn DomainBlocking> {
        None
    }

    /// Command producing the device's connection table, and its format.
    fn accounting(&self) -> Option<(&'static str, AccountingFormat)> {
        None
    }

    /// Commands whose outputs, in order, feed [`Dialect::decode_interfaces`].
    fn interface_commands(&self) -> Vec<String> {
        Vec::new()
    }

    fn decode_interfaces(&self, outputs: &[String]) -> Vec<InterfaceCounters> {
        let _ = outputs;
        Vec::new()
    }

    /// Error text embedded in otherwise successful output. Network OS
    /// shells often report failures on stdout with a zero exit status.
    fn output_error(&self, output: &str) -> Option<String> {
        let _ = output;
        None
    }
}

/// Sinkhole-style domain blocking in a resolver configuration.
pub trait DomainBlocking: Send + Sync {
    fn list_command(&self, conf: &str) -> String;

    fn decode(&self, line: &str) -> Option<DomainName>;

    fn add_command(&self, conf: &str, domain: &DomainName) -> String;

    fn remove_command(&self, conf: &str, domain: &DomainName) -> String;

    fn clear_command(&self, conf: &str) -> String;

    /// Makes the resolver pick up the change. Restart-class.
    fn reload_command(&self) -> &'static str;
}

impl DeviceKind {
    /// Static dialect record for this family.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::Linux => &Linux,
            Self::Mikrotik => &Mikrotik,
            Self::Cisco => &Cisco,
            Self::Snmp => &Snmp,
        }
    }
}

// ── Shared decoding helpers ─────────────────────────────────────────

/// Build a rule entry from a marker found in `line`, if any.
pub(crate) fn marker_entry(scope: &Scope, index: u32, line: &str) -> Option<RuleEntry> {
    let (marker, token) = Marker::find(line)?;
    Some(RuleEntry {
        scope: scope.id(),
        index,
        rule: BlockRule {
            target: marker.target,
            port: marker.port,
            direction: marker.direction,
            marker: Some(token),
            chain: scope_chain(scope, line),
        },
    })
}

/// Rule for an unmarked line: the direction comes from which side of the
/// match carries a specific address. Locally originated chains read the
/// destination side first (outbound); every other chain reads the source
/// side first (inbound).
pub(crate) fn heuristic_rule(
    chain: &str,
    source: Option<BlockTarget>,
    destination: Option<BlockTarget>,
    port: Option<u16>,
) -> Option<BlockRule> {
    let inbound = source.map(|t| (t, Direction::In));
    let outbound = destination.map(|t| (t, Direction::Out));
    let (target, direction) = if is_outbound_chain(chain) {
        outbound.or(inbound)?
    } else {
        inbound.or(outbound)?
    };
    Some(BlockRule {
        target,
        port,
        direction,
        marker: None,
        chain: chain.to_owned(),
    })
}

fn is_outbound_chain(chain: &str) -> bool {
    let chain = chain.to_ascii_lowercase();
    chain == "output" || chain.ends_with("-out")
}

fn scope_chain(scope: &Scope, line: &str) -> String {
    if scope.chain.is_empty() {
        key_value(line, "chain").unwrap_or_default().to_owned()
    } else {
        scope.chain.clone()
    }
}

/// Value of a `key=value` token, with surrounding quotes removed.
pub(crate) fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace().find_map(|token| {
        let (k, v) = token.split_once('=')?;
        (k == key).then(|| v.trim_matches('"'))
    })
}

/// Leading positional index of a listing line.
pub(crate) fn leading_index(line: &str) -> Option<u32> {
    line.split_whitespace().next()?.parse().ok()
}
