// fleetwall-transport: blocking SSH and SNMP transports for managed devices.
//
// Nothing here is async. `fleetwall-core` runs every call on its bounded
// blocking worker pool and wraps it in an outer timeout.

pub mod error;
pub mod snmp;
pub mod ssh;
pub mod transport;

pub use error::Error;
pub use snmp::{Oid, SnmpAgent, SnmpClient, VarBind};
pub use ssh::{CliConnector, CliSession, CommandOutput, SshConnector, SshSession, SshTarget};
pub use transport::{SNMP_PORT, SSH_PORT, TransportConfig};
