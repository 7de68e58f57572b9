// fleetwall-core: pooled device sessions, dialect-driven firewall rule
// management, connection accounting and reachability probing.
//
// `Fleet` is the entry point. Everything below it is usable on its own
// for embedding or testing.

pub mod accounting;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod marker;
pub mod model;
pub mod monitor;
pub mod poller;
pub mod pool;
pub mod probe;
pub mod registry;
pub mod worker;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────

pub use accounting::{AccountingFormat, AddressOwnerMap, OwnerResolver, UNKNOWN_OWNER};
pub use config::{FleetConfig, TimeoutClass, TimeoutConfig};
pub use dialect::{Dialect, DomainBlocking, Family, Scope};
pub use engine::{BlockRequest, DomainListing, RawListing, RuleEngine};
pub use error::{CoreError, ExecutionKind};
pub use executor::Executor;
pub use fleet::{AccountingSource, Fleet};
pub use marker::{MARKER_PREFIX, Marker};
pub use monitor::{ConnectionReport, TrafficMonitor};
pub use poller::{DeviceStatus, FleetPoller};
pub use pool::{Liveness, PoolStats, SessionLease, SessionPool, SweepReport};
pub use probe::{ProbeMethod, ProbeReport, Prober, ReachabilityCheck};
pub use registry::{DeviceRegistry, StaticRegistry};
pub use worker::{WorkerError, WorkerPool};

// ── Model re-exports ────────────────────────────────────────────────

pub use model::{
    BlockRule, BlockTarget, Capabilities, ConnectionRecord, CounterUnit, Credentials, Device,
    DeviceKey, DeviceKind, Direction, DomainName, Endpoint, InterfaceCounters, Outcome, RuleEntry,
    TrafficAggregate,
};
