// ── Block rules and domain blocks ──

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Serialize, Serializer};
use strum::{Display, EnumString};

use crate::error::CoreError;

// ── BlockTarget ──────────────────────────────────────────────────────

/// An address or network to block, normalized to its network address.
///
/// Host networks (`/32`, `/128`) display as the bare address, which is
/// how every dialect's listing output prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockTarget(IpNetwork);

impl BlockTarget {
    pub fn network(&self) -> IpNetwork {
        self.0
    }

    pub fn is_ipv4(&self) -> bool {
        self.0.is_ipv4()
    }

    pub fn is_host(&self) -> bool {
        match self.0 {
            IpNetwork::V4(n) => n.prefix() == 32,
            IpNetwork::V6(n) => n.prefix() == 128,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.0.network()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Parse a token seen in device output. Wildcards such as `0.0.0.0/0`
    /// or `anywhere` yield `None`.
    pub fn from_listing(token: &str) -> Option<Self> {
        token.parse().ok()
    }
}

impl FromStr for BlockTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::validation("IP address is required"));
        }
        let parsed: IpNetwork = s
            .parse()
            .map_err(|_| CoreError::validation(format!("Invalid IP address format: '{s}'")))?;
        if parsed.prefix() == 0 {
            return Err(CoreError::validation(format!(
                "refusing to block every address ('{s}')"
            )));
        }
        if parsed.network().is_unspecified() {
            return Err(CoreError::validation(format!(
                "unspecified address cannot be blocked ('{s}')"
            )));
        }
        let normalized = IpNetwork::new(parsed.network(), parsed.prefix())
            .map_err(|e| CoreError::validation(format!("Invalid network '{s}': {e}")))?;
        Ok(Self(normalized))
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            write!(f, "{}", self.addr())
        } else {
            write!(f, "{}/{}", self.addr(), self.prefix())
        }
    }
}

impl Serialize for BlockTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validate a port number given by a caller.
pub fn validate_port(port: Option<u16>) -> Result<Option<u16>, CoreError> {
    match port {
        Some(0) => Err(CoreError::validation("port must be between 1 and 65535")),
        other => Ok(other),
    }
}

// ── Direction ────────────────────────────────────────────────────────

/// Traffic direction relative to the blocked target.
///
/// `In` drops traffic coming from the target, `Out` drops traffic going
/// to it. `Both` is only valid as a request or filter; decoded rules are
/// always `In` or `Out`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    /// Concrete directions a request expands to.
    pub fn expand(self) -> &'static [Direction] {
        match self {
            Self::In => &[Self::In],
            Self::Out => &[Self::Out],
            Self::Both => &[Self::In, Self::Out],
        }
    }

    /// Whether a rule with direction `rule` passes this filter.
    pub fn admits(self, rule: Direction) -> bool {
        self == Self::Both || self == rule
    }
}

// ── BlockRule ────────────────────────────────────────────────────────

/// A deny rule as found on (or sent to) a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRule {
    pub target: BlockTarget,
    pub port: Option<u16>,
    pub direction: Direction,
    /// Marker token, when the rule was created by us.
    pub marker: Option<String>,
    /// Chain or ACL holding the rule.
    pub chain: String,
}

impl BlockRule {
    /// Normalized identity used to de-duplicate listings.
    pub fn identity(&self) -> (BlockTarget, Option<u16>, Direction) {
        (self.target, self.port, self.direction)
    }

    pub fn is_managed(&self) -> bool {
        self.marker.is_some()
    }
}

/// A decoded listing line: the rule plus where it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Listing scope id the line came from.
    pub scope: String,
    /// Position used by the scope's delete command.
    pub index: u32,
    pub rule: BlockRule,
}

// ── DomainName ───────────────────────────────────────────────────────

/// A validated, lowercased DNS name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DomainName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() {
            return Err(CoreError::validation("Domain is required"));
        }
        if name.len() > 253 {
            return Err(CoreError::validation("Domain exceeds 253 characters"));
        }
        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(CoreError::validation(format!(
                "Invalid domain '{s}': expected at least two labels"
            )));
        }
        for label in &labels {
            let valid = !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
            if !valid {
                return Err(CoreError::validation(format!(
                    "Invalid domain '{s}': bad label '{label}'"
                )));
            }
        }
        if labels
            .last()
            .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(CoreError::validation(format!(
                "Invalid domain '{s}': looks like an IP address"
            )));
        }
        Ok(Self(name))
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Outcome ──────────────────────────────────────────────────────────

/// Structured result of a mutation.
///
/// Expected conditions such as "nothing matched" are successful outcomes
/// with `affected_count = 0`, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    pub affected_count: usize,
    /// Set when a post-mutation listing was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
}

impl Outcome {
    pub fn done(message: impl Into<String>, affected_count: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            affected_count,
            confirmed: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::done(message, 0)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::done(message, 0)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn host_targets_display_bare() {
        let t: BlockTarget = "203.0.113.5".parse().unwrap();
        assert_eq!(t.to_string(), "203.0.113.5");
        assert!(t.is_host());
        let t: BlockTarget = "203.0.113.5/32".parse().unwrap();
        assert_eq!(t.to_string(), "203.0.113.5");
    }

    #[test]
    fn networks_normalize_to_network_address() {
        let t: BlockTarget = "10.1.2.3/24".parse().unwrap();
        assert_eq!(t.to_string(), "10.1.2.0/24");
        let v6: BlockTarget = "2001:db8::1/64".parse().unwrap();
        assert_eq!(v6.to_string(), "2001:db8::/64");
    }

    #[test]
    fn rejects_wildcards_and_garbage() {
        assert!("0.0.0.0/0".parse::<BlockTarget>().is_err());
        assert!("::/0".parse::<BlockTarget>().is_err());
        assert!("0.0.0.0".parse::<BlockTarget>().is_err());
        assert!("999.1.1.1".parse::<BlockTarget>().is_err());
        assert!("".parse::<BlockTarget>().is_err());
        assert!(BlockTarget::from_listing("anywhere").is_none());
    }

    #[test]
    fn domain_validation() {
        assert_eq!(
            "Example.COM.".parse::<DomainName>().unwrap().as_str(),
            "example.com"
        );
        assert!("".parse::<DomainName>().is_err());
        assert!("localhost".parse::<DomainName>().is_err());
        assert!("bad-.example.com".parse::<DomainName>().is_err());
        assert!("a..b".parse::<DomainName>().is_err());
        assert!("10.0.0.1".parse::<DomainName>().is_err());
        assert!("ex ample.com".parse::<DomainName>().is_err());
    }

    #[test]
    fn direction_expansion_and_filter() {
        assert_eq!(Direction::Both.expand(), &[Direction::In, Direction::Out]);
        assert!(Direction::Both.admits(Direction::Out));
        assert!(!Direction::In.admits(Direction::Out));
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Out);
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(validate_port(Some(0)).is_err());
        assert_eq!(validate_port(Some(443)).unwrap(), Some(443));
        assert_eq!(validate_port(None).unwrap(), None);
    }

    #[test]
    fn rules_serialize_with_textual_targets() {
        let rule = BlockRule {
            target: "10.1.2.3/24".parse().unwrap(),
            port: Some(443),
            direction: Direction::Out,
            marker: None,
            chain: "OUTPUT".into(),
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["target"], "10.1.2.0/24");
        assert_eq!(value["direction"], "out");
        assert_eq!(value["port"], 443);
        assert!(value["marker"].is_null());
    }
}
