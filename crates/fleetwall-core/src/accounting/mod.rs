// ── Connection accounting ──
//
// Raw connection tables come back as text. `decode` turns that text into a
// lazy, single-pass stream of `ConnectionRecord`s; bad lines are skipped
// and counted, never fatal. `aggregate` folds records into per-owner
// totals.

mod aggregate;
mod conntrack;
mod local;
mod table;

use std::str::Lines;

use strum::Display;
use tracing::trace;

use crate::model::ConnectionRecord;

pub use aggregate::{AddressOwnerMap, OwnerResolver, UNKNOWN_OWNER, aggregate, attribute};
pub use local::{LOCAL_CONNTRACK, read_local_conntrack};

/// Text format of a connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AccountingFormat {
    /// `/proc/net/nf_conntrack` or `conntrack -L`.
    Conntrack,
    /// RouterOS `/ip firewall connection print terse`.
    RouterOsTerse,
    /// Seven-column `show conn` rows.
    CiscoConn,
}

/// What one line decoded to.
#[derive(Debug)]
pub(crate) enum Line {
    Record(ConnectionRecord),
    /// Headers, banners and other expected non-data lines.
    Ignored,
    Malformed,
}

impl AccountingFormat {
    fn line_decoder(self) -> fn(&str) -> Line {
        match self {
            Self::Conntrack => conntrack::decode_line,
            Self::RouterOsTerse => table::decode_routeros_line,
            Self::CiscoConn => table::decode_cisco_line,
        }
    }
}

/// Decode `raw` lazily. The iterator is finite and not restartable.
pub fn decode(raw: &str, format: AccountingFormat) -> Decoder<'_> {
    Decoder {
        lines: raw.lines(),
        decode_line: format.line_decoder(),
        skipped: 0,
    }
}

/// Single-pass record stream over one accounting read.
#[derive(Debug)]
pub struct Decoder<'a> {
    lines: Lines<'a>,
    decode_line: fn(&str) -> Line,
    skipped: usize,
}

impl Decoder<'_> {
    /// Malformed lines seen so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Decoder<'_> {
    type Item = ConnectionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            if line.trim().is_empty() {
                continue;
            }
            match (self.decode_line)(line) {
                Line::Record(record) => return Some(record),
                Line::Ignored => {}
                Line::Malformed => {
                    self.skipped += 1;
                    trace!(line, "skipping malformed accounting line");
                }
            }
        }
    }
}

/// Positional `key=value` lookup shared by the token-based formats.
pub(crate) fn values<'a>(tokens: &'a [&'a str], key: &'a str) -> impl Iterator<Item = &'a str> {
    tokens.iter().filter_map(move |t| {
        t.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}
