// ── Rule marker tokens ──
//
// Every rule we install carries `FWBLK_<target>_<port|any>_<in|out>` in the
// dialect's comment field. Listing decoders look for the token anywhere in
// a line, so surrounding quotes or `/* */` do not matter. Underscores never
// occur in an address, which keeps the fields unambiguous.

use crate::model::{BlockTarget, Direction};

pub const MARKER_PREFIX: &str = "FWBLK_";

/// Fields recovered from a marker token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub target: BlockTarget,
    pub port: Option<u16>,
    pub direction: Direction,
}

impl Marker {
    pub fn new(target: BlockTarget, port: Option<u16>, direction: Direction) -> Self {
        Self {
            target,
            port,
            direction,
        }
    }

    pub fn token(&self) -> String {
        let port = self
            .port
            .map_or_else(|| "any".to_owned(), |p| p.to_string());
        format!("{MARKER_PREFIX}{}_{port}_{}", self.target, self.direction)
    }

    /// Find and decode the first marker token in `line`.
    pub fn find(line: &str) -> Option<(Self, String)> {
        let start = line.find(MARKER_PREFIX)?;
        let token: String = line[start..]
            .chars()
            .take_while(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '*' | ','))
            .collect();
        let marker = Self::decode(&token)?;
        Some((marker, token))
    }

    pub fn decode(token: &str) -> Option<Self> {
        let body = token.strip_prefix(MARKER_PREFIX)?;
        let mut parts = body.rsplitn(3, '_');
        let direction = match parts.next()? {
            "in" => Direction::In,
            "out" => Direction::Out,
            _ => return None,
        };
        let port = match parts.next()? {
            "any" => None,
            p => Some(p.parse::<u16>().ok().filter(|p| *p != 0)?),
        };
        let target = parts.next()?.parse().ok()?;
        Some(Self::new(target, port, direction))
    }
}
