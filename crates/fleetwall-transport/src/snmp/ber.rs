//! BER encoding for the SNMPv2c message subset
//!
//! Only what GET and GET-NEXT need: INTEGER, OCTET STRING, NULL,
//! OBJECT IDENTIFIER, SEQUENCE, the SMIv2 application types and the
//! v2 exception markers.

use crate::error::Error;

use super::{Message, Oid, Pdu, PduKind, Value, VarBind};

// Universal tags
pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_NULL: u8 = 0x05;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;

// SMIv2 application tags
pub(crate) const TAG_IP_ADDRESS: u8 = 0x40;
pub(crate) const TAG_COUNTER32: u8 = 0x41;
pub(crate) const TAG_GAUGE32: u8 = 0x42;
pub(crate) const TAG_TIMETICKS: u8 = 0x43;
pub(crate) const TAG_COUNTER64: u8 = 0x46;

// SNMPv2 exception values
pub(crate) const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub(crate) const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub(crate) const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// SNMP version field value for v2c.
pub(crate) const VERSION_2C: i64 = 1;

// ── Encoding ────────────────────────────────────────────────────────

/// Encode a complete SNMP message.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut varbinds = Vec::new();
    for vb in &msg.pdu.varbinds {
        let mut entry = Vec::new();
        write_tlv(&mut entry, TAG_OID, &encode_oid(&vb.oid));
        encode_value(&mut entry, &vb.value);
        write_tlv(&mut varbinds, TAG_SEQUENCE, &entry);
    }

    let mut pdu = Vec::new();
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(i64::from(msg.pdu.request_id)));
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(msg.pdu.error_status));
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(msg.pdu.error_index));
    write_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut body = Vec::new();
    write_tlv(&mut body, TAG_INTEGER, &encode_integer(VERSION_2C));
    write_tlv(&mut body, TAG_OCTET_STRING, msg.community.as_bytes());
    write_tlv(&mut body, msg.pdu.kind.tag(), &pdu);

    let mut out = Vec::with_capacity(body.len() + 4);
    write_tlv(&mut out, TAG_SEQUENCE, &body);
    out
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => write_tlv(out, TAG_NULL, &[]),
        Value::Integer(v) => write_tlv(out, TAG_INTEGER, &encode_integer(*v)),
        Value::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
        Value::ObjectId(oid) => write_tlv(out, TAG_OID, &encode_oid(oid)),
        Value::IpAddress(octets) => write_tlv(out, TAG_IP_ADDRESS, octets),
        Value::Counter32(v) => write_tlv(out, TAG_COUNTER32, &encode_unsigned(u64::from(*v))),
        Value::Gauge32(v) => write_tlv(out, TAG_GAUGE32, &encode_unsigned(u64::from(*v))),
        Value::TimeTicks(v) => write_tlv(out, TAG_TIMETICKS, &encode_unsigned(u64::from(*v))),
        Value::Counter64(v) => write_tlv(out, TAG_COUNTER64, &encode_unsigned(*v)),
        Value::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        Value::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        Value::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
}

pub(crate) fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if let Ok(short) = u8::try_from(len) {
        if short < 0x80 {
            out.push(short);
            return;
        }
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    // at most 8 length octets, always fits the 7-bit count
    out.push(0x80 | u8::try_from(significant.len()).unwrap_or(8));
    out.extend_from_slice(significant);
}

/// Minimal two's-complement encoding.
pub(crate) fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (cur, next) = (bytes[start], bytes[start + 1]);
        let redundant =
            (cur == 0x00 && next & 0x80 == 0) || (cur == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Unsigned encoding with a leading zero when the high bit is set.
pub(crate) fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().take_while(|b| **b == 0).count().min(bytes.len() - 1);
    let mut out = bytes[start..].to_vec();
    if out.first().is_some_and(|b| b & 0x80 != 0) {
        out.insert(0, 0);
    }
    out
}

pub(crate) fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = oid.arcs();
    let mut out = Vec::with_capacity(arcs.len() + 2);
    match arcs {
        [] => {}
        [first] => encode_arc(&mut out, first * 40),
        [first, second, rest @ ..] => {
            encode_arc(&mut out, first * 40 + second);
            for arc in rest {
                encode_arc(&mut out, *arc);
            }
        }
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn encode_arc(out: &mut Vec<u8>, mut arc: u32) {
    let mut tmp = [0u8; 5];
    let mut i = tmp.len();
    loop {
        i -= 1;
        tmp[i] = (arc & 0x7f) as u8;
        arc >>= 7;
        if arc == 0 {
            break;
        }
    }
    let last = tmp.len() - 1;
    for (pos, byte) in tmp.iter().enumerate().skip(i) {
        out.push(if pos == last { *byte } else { *byte | 0x80 });
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decode a complete SNMP message.
pub fn decode_message(buf: &[u8]) -> Result<Message, Error> {
    let mut outer = Reader::new(buf);
    let mut body = Reader::new(outer.expect(TAG_SEQUENCE)?);

    let version = decode_integer(body.expect(TAG_INTEGER)?)?;
    if version != VERSION_2C && version != 0 {
        return Err(decode_err(format!("unsupported SNMP version {version}")));
    }
    let community = String::from_utf8_lossy(body.expect(TAG_OCTET_STRING)?).into_owned();

    let (tag, pdu_bytes) = body.read_tlv()?;
    let kind = PduKind::from_tag(tag)
        .ok_or_else(|| decode_err(format!("unexpected PDU tag 0x{tag:02x}")))?;
    let mut pdu = Reader::new(pdu_bytes);

    let request_id = i32::try_from(decode_integer(pdu.expect(TAG_INTEGER)?)?)
        .map_err(|_| decode_err("request-id out of range"))?;
    let error_status = decode_integer(pdu.expect(TAG_INTEGER)?)?;
    let error_index = decode_integer(pdu.expect(TAG_INTEGER)?)?;

    let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut entry = Reader::new(list.expect(TAG_SEQUENCE)?);
        let oid = decode_oid(entry.expect(TAG_OID)?)?;
        let (vtag, vbytes) = entry.read_tlv()?;
        varbinds.push(VarBind {
            oid,
            value: decode_value(vtag, vbytes)?,
        });
    }

    Ok(Message {
        community,
        pdu: Pdu {
            kind,
            request_id,
            error_status,
            error_index,
            varbinds,
        },
    })
}

fn decode_value(tag: u8, bytes: &[u8]) -> Result<Value, Error> {
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_INTEGER => Value::Integer(decode_integer(bytes)?),
        TAG_OCTET_STRING => Value::OctetString(bytes.to_vec()),
        TAG_OID => Value::ObjectId(decode_oid(bytes)?),
        TAG_IP_ADDRESS => {
            let octets: [u8; 4] = bytes
                .try_into()
                .map_err(|_| decode_err("IpAddress must be 4 octets"))?;
            Value::IpAddress(octets)
        }
        TAG_COUNTER32 => Value::Counter32(decode_u32(bytes)?),
        TAG_GAUGE32 => Value::Gauge32(decode_u32(bytes)?),
        TAG_TIMETICKS => Value::TimeTicks(decode_u32(bytes)?),
        TAG_COUNTER64 => Value::Counter64(decode_unsigned(bytes)?),
        TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
        other => return Err(decode_err(format!("unsupported value tag 0x{other:02x}"))),
    };
    Ok(value)
}

pub(crate) fn decode_integer(bytes: &[u8]) -> Result<i64, Error> {
    let Some(first) = bytes.first() else {
        return Err(decode_err("empty INTEGER"));
    };
    if bytes.len() > 8 {
        return Err(decode_err("INTEGER wider than 64 bits"));
    }
    let init: i64 = if first & 0x80 == 0 { 0 } else { -1 };
    Ok(bytes.iter().fold(init, |acc, b| (acc << 8) | i64::from(*b)))
}

fn decode_unsigned(bytes: &[u8]) -> Result<u64, Error> {
    let bytes = match bytes {
        [] => return Err(decode_err("empty unsigned value")),
        [0, rest @ ..] if !rest.is_empty() => rest,
        all => all,
    };
    if bytes.len() > 8 {
        return Err(decode_err("unsigned value wider than 64 bits"));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_u32(bytes: &[u8]) -> Result<u32, Error> {
    u32::try_from(decode_unsigned(bytes)?).map_err(|_| decode_err("32-bit value overflow"))
}

pub(crate) fn decode_oid(bytes: &[u8]) -> Result<Oid, Error> {
    let mut arcs = Vec::with_capacity(bytes.len() + 1);
    let mut acc: u32 = 0;
    let mut first = true;
    for byte in bytes {
        acc = acc
            .checked_mul(128)
            .ok_or_else(|| decode_err("OID arc overflow"))?
            | u32::from(byte & 0x7f);
        if byte & 0x80 != 0 {
            continue;
        }
        if first {
            let (a, b) = match acc {
                0..40 => (0, acc),
                40..80 => (1, acc - 40),
                _ => (2, acc - 80),
            };
            arcs.push(a);
            arcs.push(b);
            first = false;
        } else {
            arcs.push(acc);
        }
        acc = 0;
    }
    if acc != 0 || arcs.is_empty() {
        return Err(decode_err("truncated OID"));
    }
    Ok(Oid::from_arcs(arcs))
}

fn decode_err(msg: impl Into<String>) -> Error {
    Error::Decode(msg.into())
}

/// Cursor over a run of TLVs.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), Error> {
        let (&tag, rest) = self
            .buf
            .split_first()
            .ok_or_else(|| decode_err("truncated tag"))?;
        let (&first, rest) = rest
            .split_first()
            .ok_or_else(|| decode_err("truncated length"))?;

        let (len, rest) = if first & 0x80 == 0 {
            (usize::from(first), rest)
        } else {
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 || rest.len() < count {
                return Err(decode_err("unsupported length encoding"));
            }
            let (len_bytes, rest) = rest.split_at(count);
            let len = len_bytes
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            (len, rest)
        };

        if rest.len() < len {
            return Err(decode_err("truncated value"));
        }
        let (content, rest) = rest.split_at(len);
        self.buf = rest;
        Ok((tag, content))
    }

    fn expect(&mut self, tag: u8) -> Result<&'a [u8], Error> {
        let (got, content) = self.read_tlv()?;
        if got != tag {
            return Err(decode_err(format!(
                "expected tag 0x{tag:02x}, found 0x{got:02x}"
            )));
        }
        Ok(content)
    }
}
