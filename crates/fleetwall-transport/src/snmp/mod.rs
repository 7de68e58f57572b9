//! SNMPv2c over UDP.
//!
//! Stateless GET and GET-NEXT walks against a small, fixed set of
//! interface OIDs. No MIB compilation: symbolic names are resolved from
//! [`NAMED_OIDS`] only.

mod ber;
mod client;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use ber::{decode_message, encode_message};
pub use client::{SnmpAgent, SnmpClient};

/// Symbolic names accepted for the fixed interface OID set.
pub const NAMED_OIDS: &[(&str, &str)] = &[
    ("ifNumber", "1.3.6.1.2.1.2.1"),
    ("ifDescr", "1.3.6.1.2.1.2.2.1.2"),
    ("ifOperStatus", "1.3.6.1.2.1.2.2.1.8"),
    ("ifInOctets", "1.3.6.1.2.1.2.2.1.10"),
    ("ifOutOctets", "1.3.6.1.2.1.2.2.1.16"),
];

// ── Oid ─────────────────────────────────────────────────────────────

/// A numeric object identifier. Ordering is lexicographic by arc, which
/// is the order agents walk in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn from_arcs(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Trailing arcs after `prefix`, e.g. the ifIndex of a table column.
    pub fn suffix(&self, prefix: &Oid) -> Option<&[u32]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    /// Resolve a symbolic name from [`NAMED_OIDS`], optionally followed by
    /// numeric instance arcs (`ifDescr.3`), or parse dotted numeric text.
    pub fn resolve(text: &str) -> Result<Self, Error> {
        let (head, tail) = text.split_once('.').unwrap_or((text, ""));
        if let Some((_, base)) = NAMED_OIDS.iter().find(|(name, _)| *name == head) {
            let full = if tail.is_empty() {
                (*base).to_owned()
            } else {
                format!("{base}.{tail}")
            };
            return full.parse();
        }
        text.parse()
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        let arcs = trimmed
            .split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidOid(s.to_owned()))?;
        match arcs.as_slice() {
            [first, second, ..] if *first <= 2 && (*first == 2 || *second < 40) => Ok(Self(arcs)),
            _ => Err(Error::InvalidOid(s.to_owned())),
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
        }
        Ok(())
    }
}

// ── Value ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// True for the v2 exception markers that end a walk or a lookup.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::OctetString(bytes) => {
                if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                    f.write_str(&String::from_utf8_lossy(bytes))
                } else {
                    for b in bytes {
                        write!(f, "{b:02x}")?;
                    }
                    Ok(())
                }
            }
            Self::ObjectId(oid) => write!(f, "{oid}"),
            Self::IpAddress([a, b, c, d]) => write!(f, "{a}.{b}.{c}.{d}"),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => write!(f, "{v}"),
            Self::Counter64(v) => write!(f, "{v}"),
            Self::NoSuchObject => f.write_str("noSuchObject"),
            Self::NoSuchInstance => f.write_str("noSuchInstance"),
            Self::EndOfMibView => f.write_str("endOfMibView"),
        }
    }
}

// ── Message ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    Get,
    GetNext,
    Response,
}

impl PduKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Get => 0xa0,
            Self::GetNext => 0xa1,
            Self::Response => 0xa2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xa0 => Some(Self::Get),
            0xa1 => Some(Self::GetNext),
            0xa2 => Some(Self::Response),
            _ => None,
        }
    }
}

/// One OID/value binding. Displays as `<oid> = <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl fmt::Display for VarBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub community: String,
    pub pdu: Pdu,
}

impl Message {
    /// Build a request with NULL placeholders for each OID.
    pub fn request(community: &str, kind: PduKind, request_id: i32, oids: Vec<Oid>) -> Self {
        Self {
            community: community.to_owned(),
            pdu: Pdu {
                kind,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: oids
                    .into_iter()
                    .map(|oid| VarBind {
                        oid,
                        value: Value::Null,
                    })
                    .collect(),
            },
        }
    }
}
