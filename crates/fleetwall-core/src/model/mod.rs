// ── Domain model ──
//
// Canonical representations of managed devices, block rules and traffic
// records. Rule and traffic values are derived fresh from device output
// on every call and never cached.

pub mod device;
pub mod rule;
pub mod traffic;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{Capabilities, Credentials, Device, DeviceKey, DeviceKind};
pub use rule::{BlockRule, BlockTarget, Direction, DomainName, Outcome, RuleEntry};
pub use traffic::{ConnectionRecord, CounterUnit, Endpoint, InterfaceCounters, TrafficAggregate};
