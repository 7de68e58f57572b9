// ── Blocking SNMPv2c client ──
//
// Each request binds a fresh ephemeral UDP socket. There is no session:
// retries resend the same request id, and responses carrying a different
// id are discarded.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicI32, Ordering};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{Message, Oid, PduKind, VarBind, decode_message, encode_message};
use crate::error::{Error, is_io_timeout};
use crate::transport::{SNMP_PORT, TransportConfig};

const MAX_DATAGRAM: usize = 65_507;

/// An SNMP agent address plus its read community.
#[derive(Debug, Clone)]
pub struct SnmpAgent {
    pub host: String,
    pub port: u16,
    pub community: SecretString,
}

impl SnmpAgent {
    pub fn new(host: impl Into<String>, community: SecretString) -> Self {
        Self {
            host: host.into(),
            port: SNMP_PORT,
            community,
        }
    }
}

/// Stateless GET / walk client with bounded retries.
#[derive(Debug)]
pub struct SnmpClient {
    config: TransportConfig,
    next_id: AtomicI32,
}

impl SnmpClient {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            next_id: AtomicI32::new(1),
        }
    }

    /// GET every OID in one request.
    pub fn get(&self, agent: &SnmpAgent, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        let resp = self.request(agent, PduKind::Get, oids.to_vec())?;
        Ok(resp.pdu.varbinds)
    }

    /// Walk the subtree under `root` with successive GET-NEXT requests.
    pub fn walk(&self, agent: &SnmpAgent, root: &Oid) -> Result<Vec<VarBind>, Error> {
        let mut current = root.clone();
        let mut out = Vec::new();

        while out.len() < self.config.snmp_max_repetitions {
            let resp = self.request(agent, PduKind::GetNext, vec![current.clone()])?;
            let Some(vb) = resp.pdu.varbinds.into_iter().next() else {
                break;
            };
            // agents must return a strictly increasing OID; guard against loops
            if vb.value.is_exception() || !vb.oid.starts_with(root) || vb.oid <= current {
                break;
            }
            current = vb.oid.clone();
            out.push(vb);
        }

        debug!(agent = %agent.host, root = %root, count = out.len(), "snmp walk complete");
        Ok(out)
    }

    fn request(&self, agent: &SnmpAgent, kind: PduKind, oids: Vec<Oid>) -> Result<Message, Error> {
        let addr = resolve(agent)?;
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed) & i32::MAX;
        let msg = Message::request(agent.community.expose_secret(), kind, request_id, oids);
        let resp = self.exchange(addr, &encode_message(&msg), request_id)?;

        if resp.pdu.error_status != 0 {
            return Err(Error::SnmpStatus {
                status: resp.pdu.error_status,
                index: resp.pdu.error_index,
            });
        }
        Ok(resp)
    }

    fn exchange(
        &self,
        addr: SocketAddr,
        datagram: &[u8],
        request_id: i32,
    ) -> Result<Message, Error> {
        let bind: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_read_timeout(Some(self.config.snmp_timeout))?;

        let attempts = self.config.snmp_retries.max(1);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        for attempt in 1..=attempts {
            socket.send_to(datagram, addr)?;
            loop {
                let (len, from) = match socket.recv_from(&mut buf) {
                    Ok(received) => received,
                    Err(e) if is_io_timeout(&e) => break,
                    Err(e) => return Err(e.into()),
                };
                if from.ip() != addr.ip() {
                    continue;
                }
                match decode_message(&buf[..len]) {
                    Ok(resp)
                        if resp.pdu.kind == PduKind::Response
                            && resp.pdu.request_id == request_id =>
                    {
                        return Ok(resp);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(agent = %addr, error = %e, "discarding undecodable SNMP datagram");
                    }
                }
            }
            debug!(agent = %addr, attempt, "snmp request timed out, retrying");
        }

        Err(Error::NoResponse {
            addr: addr.to_string(),
            attempts,
        })
    }
}

fn resolve(agent: &SnmpAgent) -> Result<SocketAddr, Error> {
    (agent.host.as_str(), agent.port)
        .to_socket_addrs()
        .map_err(|source| Error::Connect {
            addr: format!("{}:{}", agent.host, agent.port),
            source,
        })?
        .next()
        .ok_or_else(|| Error::Resolve {
            host: agent.host.clone(),
        })
}
