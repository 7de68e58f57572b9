// ── Device connection tables ──

use crate::dialect::{key_value, leading_index};
use crate::model::{ConnectionRecord, Endpoint};

use super::Line;

/// ` 0  SAC  protocol=tcp src-address=10.0.0.5:51000 dst-address=1.1.1.1:443
/// tcp-state=established orig-packets=10 orig-bytes=1000 repl-packets=5 repl-bytes=500`
///
/// Original-direction counters fill the inbound leg and reply counters
/// the outbound leg, the same order as conntrack.
pub(crate) fn decode_routeros_line(line: &str) -> Line {
    if leading_index(line).is_none() {
        return Line::Ignored;
    }
    parse_routeros(line).map_or(Line::Malformed, Line::Record)
}

fn parse_routeros(line: &str) -> Option<ConnectionRecord> {
    let counter = |key: &str| -> Option<u64> {
        key_value(line, key).map_or(Some(0), |v| v.parse().ok())
    };
    Some(ConnectionRecord {
        protocol: key_value(line, "protocol")?.to_owned(),
        local: Endpoint::parse(key_value(line, "src-address")?)?,
        remote: Endpoint::parse(key_value(line, "dst-address")?)?,
        status: key_value(line, "tcp-state").map(str::to_owned),
        packets_in: counter("orig-packets")?,
        packets_out: counter("repl-packets")?,
        bytes_in: counter("orig-bytes")?,
        bytes_out: counter("repl-bytes")?,
        owner: None,
    })
}

/// `inside tcp 10.0.0.5 51000 93.184.216.34 443 ESTABLISHED`: interface,
/// protocol, local address and port, remote address and port, status.
/// These tables carry no counters.
pub(crate) fn decode_cisco_line(line: &str) -> Line {
    if line.starts_with(char::is_whitespace) {
        return Line::Ignored;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [_interface, protocol, local_addr, local_port, remote_addr, remote_port, status, ..] =
        tokens.as_slice()
    else {
        return Line::Malformed;
    };
    if local_port.eq_ignore_ascii_case("port") || local_port.eq_ignore_ascii_case("local_port") {
        return Line::Ignored;
    }
    let (Ok(local_port), Ok(remote_port)) =
        (local_port.parse::<u16>(), remote_port.parse::<u16>())
    else {
        return Line::Malformed;
    };
    Line::Record(ConnectionRecord {
        protocol: (*protocol).to_owned(),
        local: Endpoint::new(*local_addr, Some(local_port)),
        remote: Endpoint::new(*remote_addr, Some(remote_port)),
        status: Some((*status).to_owned()),
        packets_in: 0,
        packets_out: 0,
        bytes_in: 0,
        bytes_out: 0,
        owner: None,
    })
}
