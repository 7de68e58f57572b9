// ── Connection and traffic records ──

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// One side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Split `addr:port` text. IPv6 needs brackets (`[::1]:53`) to carry
    /// a port; a bare v6 address is taken whole.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        if let Some(rest) = text.strip_prefix('[') {
            let (addr, tail) = rest.split_once(']')?;
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return Some(Self::new(addr, port));
        }
        match text.rsplit_once(':') {
            Some((addr, port)) if !addr.contains(':') => {
                Some(Self::new(addr, Some(port.parse().ok()?)))
            }
            _ => Some(Self::new(text, None)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.address.contains(':') => write!(f, "[{}]:{port}", self.address),
            Some(port) => write!(f, "{}:{port}", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// One tracked connection, produced fresh per accounting read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub protocol: String,
    pub local: Endpoint,
    pub remote: Endpoint,
    pub status: Option<String>,
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ConnectionRecord {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

/// Per-owner traffic totals, recomputed per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficAggregate {
    pub owner: String,
    pub connections: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub protocols: BTreeSet<String>,
    pub distinct_remotes: usize,
}

impl TrafficAggregate {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

/// Unit of the figures in an [`InterfaceCounters`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CounterUnit {
    /// Cumulative octet counters.
    Bytes,
    /// Current rate as reported by the device.
    BitsPerSecond,
}

/// Receive and transmit figures for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub status: Option<String>,
    pub rx: u64,
    pub tx: u64,
    pub unit: CounterUnit,
}
