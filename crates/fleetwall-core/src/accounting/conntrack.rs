// ── conntrack text ──
//
// /proc/net/nf_conntrack prefixes each entry with the L3 family:
//   ipv4 2 tcp 6 431999 ESTABLISHED src=.. dst=.. sport=.. dport=.. packets=.. bytes=.. src=.. ...
// `conntrack -L` starts directly at the protocol name. Stateless protocols
// have no status token.
//
// The first `packets=`/`bytes=` pair is taken as inbound and the second as
// outbound. Entries carry the original tuple first and the reply tuple
// second; this mapping is kept as-is for compatibility with existing
// consumers of these records.

use crate::model::{ConnectionRecord, Endpoint};

use super::{Line, values};

const MIN_TOKENS: usize = 6;

pub(crate) fn decode_line(line: &str) -> Line {
    match parse(line) {
        Some(record) => Line::Record(record),
        None => Line::Malformed,
    }
}

fn parse(line: &str) -> Option<ConnectionRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let proto_at = match tokens.first() {
        Some(&("ipv4" | "ipv6")) => 2,
        _ => 0,
    };
    if tokens.len() < proto_at + MIN_TOKENS {
        return None;
    }
    let protocol = tokens.get(proto_at)?;
    if protocol.contains('=') {
        return None;
    }
    let status = tokens
        .get(proto_at + 3)
        .filter(|t| !t.contains('=') && !t.starts_with('['))
        .map(|t| (*t).to_owned());

    let src = values(&tokens, "src").next()?;
    let dst = values(&tokens, "dst").next()?;
    let sport = first_port(&tokens, "sport")?;
    let dport = first_port(&tokens, "dport")?;

    let [packets_in, packets_out] = legs(&tokens, "packets")?;
    let [bytes_in, bytes_out] = legs(&tokens, "bytes")?;

    Some(ConnectionRecord {
        protocol: (*protocol).to_owned(),
        local: Endpoint::new(src, sport),
        remote: Endpoint::new(dst, dport),
        status,
        packets_in,
        packets_out,
        bytes_in,
        bytes_out,
        owner: None,
    })
}

/// First occurrence of a port key. Absent is fine (ICMP); unparsable is not.
fn first_port(tokens: &[&str], key: &str) -> Option<Option<u16>> {
    match values(tokens, key).next() {
        Some(v) => v.parse().ok().map(Some),
        None => Some(None),
    }
}

/// First and second occurrences of a counter key; missing legs count zero.
fn legs(tokens: &[&str], key: &str) -> Option<[u64; 2]> {
    let mut found = values(tokens, key).map(str::parse::<u64>);
    let first = found.next().transpose().ok()?.unwrap_or(0);
    let second = found.next().transpose().ok()?.unwrap_or(0);
    Some([first, second])
}
