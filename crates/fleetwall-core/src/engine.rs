// ── Rule engine ──
//
// Block, list, remove and clear deny rules, and manage resolver-level
// domain blocks. The device is the only source of truth: every operation
// re-reads current state and nothing is cached between calls.
//
// Each operation runs on one session lease, so operations on the same
// device never interleave. Input is validated and the device's
// capabilities checked before any network I/O. A failure that leaves the
// session in doubt invalidates it before the error is returned.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TimeoutClass;
use crate::dialect::{Dialect, DomainBlocking, Scope};
use crate::error::CoreError;
use crate::executor::Executor;
use crate::model::{
    BlockRule, BlockTarget, Device, Direction, DomainName, Outcome, RuleEntry, rule::validate_port,
};
use crate::pool::SessionLease;

/// What to block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    /// Address or CIDR network, as typed by the caller.
    pub target: String,
    pub port: Option<u16>,
    pub direction: Direction,
    /// Re-list after installing and report whether the rule shows up.
    pub confirm: bool,
}

/// Raw listing output of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawListing {
    pub scope: String,
    pub output: String,
}

/// Domains currently blocked on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainListing {
    pub domains: Vec<DomainName>,
    pub total_count: usize,
}

/// Entries decoded from one scope's listing.
struct ScopeEntries {
    scope: Scope,
    entries: Vec<RuleEntry>,
}

#[derive(Clone)]
pub struct RuleEngine {
    executor: Executor,
    dnsmasq_conf: String,
}

impl RuleEngine {
    pub fn new(executor: Executor, dnsmasq_conf: impl Into<String>) -> Self {
        Self {
            executor,
            dnsmasq_conf: dnsmasq_conf.into(),
        }
    }

    // ── IP blocking ──────────────────────────────────────────────────

    /// Install deny rules for `request`. `Both` installs one rule set per
    /// direction.
    pub async fn add_block(
        &self,
        device: &Device,
        request: &BlockRequest,
    ) -> Result<Outcome, CoreError> {
        let dialect = ip_dialect(device)?;
        let target: BlockTarget = request.target.parse()?;
        let port = validate_port(request.port)?;

        let mut plan = Vec::new();
        for direction in request.direction.expand() {
            let mut commands = dialect.block_commands(&target, port, *direction)?;
            commands.extend(dialect.bind_commands(device.acl_interface.as_deref(), *direction)?);
            plan.push((*direction, commands));
        }

        let mut lease = self.executor.lease(device).await?;
        let result = self
            .install(&mut lease, device, dialect, &target, port, &plan, request.confirm)
            .await;
        settle(lease, result).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn install(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        dialect: &dyn Dialect,
        target: &BlockTarget,
        port: Option<u16>,
        plan: &[(Direction, Vec<String>)],
        confirm: bool,
    ) -> Result<Outcome, CoreError> {
        for (direction, commands) in plan {
            for command in commands {
                self.executor
                    .run(lease, device, command, TimeoutClass::Mutation)
                    .await?;
            }
            info!(device = %device.label(), %target, %direction, "block installed");
        }

        let directions: Vec<String> = plan.iter().map(|(d, _)| d.to_string()).collect();
        let port_text = port.map(|p| format!(" port {p}")).unwrap_or_default();
        let mut outcome = Outcome::done(
            format!(
                "Blocked {target}{port_text} ({}) on {}",
                directions.join(", "),
                device.label()
            ),
            plan.len(),
        );

        if confirm {
            let listed = dedupe(self.scan(lease, device, dialect).await?);
            let present = plan.iter().all(|(direction, _)| {
                listed
                    .iter()
                    .any(|r| r.identity() == (*target, port, *direction))
            });
            outcome.confirmed = Some(present);
        }
        Ok(outcome)
    }

    /// Deny rules currently on the device, de-duplicated by identity.
    pub async fn list_blocks(
        &self,
        device: &Device,
        filter: Direction,
    ) -> Result<Vec<BlockRule>, CoreError> {
        let dialect = ip_dialect(device)?;
        let mut lease = self.executor.lease(device).await?;
        let result = self.scan(&mut lease, device, dialect).await;
        let rules = dedupe(settle(lease, result).await?);
        Ok(rules
            .into_iter()
            .filter(|r| filter.admits(r.direction))
            .collect())
    }

    /// Delete every deny rule for `target`, in any direction and port.
    pub async fn remove_block(&self, device: &Device, target: &str) -> Result<Outcome, CoreError> {
        let dialect = ip_dialect(device)?;
        let target: BlockTarget = target.parse()?;

        let mut lease = self.executor.lease(device).await?;
        let result: Result<Outcome, CoreError> = async {
            let scopes = self.scan_scopes(&mut lease, device, dialect).await?;
            let deleted = self
                .delete_matching(&mut lease, device, dialect, scopes, |r| r.target == target)
                .await?;
            Ok(if deleted == 0 {
                Outcome::not_found(format!("No block rules for {target} on {}", device.label()))
            } else {
                Outcome::done(
                    format!("Removed {deleted} rule(s) for {target} on {}", device.label()),
                    deleted,
                )
            })
        }
        .await;
        settle(lease, result).await
    }

    /// Delete every deny rule the device's listings decode, managed or not.
    pub async fn clear_blocks(&self, device: &Device) -> Result<Outcome, CoreError> {
        let dialect = ip_dialect(device)?;
        let mut lease = self.executor.lease(device).await?;
        let result: Result<Outcome, CoreError> = async {
            let scopes = self.scan_scopes(&mut lease, device, dialect).await?;
            let deleted = self
                .delete_matching(&mut lease, device, dialect, scopes, |_| true)
                .await?;
            Ok(if deleted == 0 {
                Outcome::not_found(format!("No block rules on {}", device.label()))
            } else {
                Outcome::done(
                    format!("Cleared {deleted} rule(s) on {}", device.label()),
                    deleted,
                )
            })
        }
        .await;
        settle(lease, result).await
    }

    /// Unparsed listing output of every scope, for diagnostics.
    pub async fn raw_rules(&self, device: &Device) -> Result<Vec<RawListing>, CoreError> {
        let dialect = ip_dialect(device)?;
        let mut lease = self.executor.lease(device).await?;
        let result: Result<Vec<RawListing>, CoreError> = async {
            let mut listings = Vec::new();
            for scope in dialect.rule_scopes() {
                if let Some(output) = self.list_scope(&mut lease, device, &scope).await? {
                    listings.push(RawListing {
                        scope: scope.id(),
                        output,
                    });
                }
            }
            Ok(listings)
        }
        .await;
        settle(lease, result).await
    }

    // ── Scanning ─────────────────────────────────────────────────────

    async fn scan(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        dialect: &dyn Dialect,
    ) -> Result<Vec<BlockRule>, CoreError> {
        Ok(self
            .scan_scopes(lease, device, dialect)
            .await?
            .into_iter()
            .flat_map(|s| s.entries)
            .map(|e| e.rule)
            .collect())
    }

    async fn scan_scopes(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        dialect: &dyn Dialect,
    ) -> Result<Vec<ScopeEntries>, CoreError> {
        let mut scanned = Vec::new();
        for scope in dialect.rule_scopes() {
            let Some(raw) = self.list_scope(lease, device, &scope).await? else {
                continue;
            };
            let mut unparsed = 0usize;
            let mut entries = Vec::new();
            for line in raw.lines() {
                match dialect.decode_rule(&scope, line) {
                    Some(entry) => entries.push(entry),
                    None if line_is_numbered(line) => unparsed += 1,
                    None => {}
                }
            }
            if unparsed > 0 {
                debug!(
                    device = %device.label(),
                    scope = %scope.id(),
                    unparsed,
                    "listing lines not decoded as deny rules"
                );
            }
            scanned.push(ScopeEntries { scope, entries });
        }
        Ok(scanned)
    }

    /// Listing output of `scope`, or `None` when an optional scope is
    /// unavailable on this device.
    async fn list_scope(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        scope: &Scope,
    ) -> Result<Option<String>, CoreError> {
        match self
            .executor
            .run(lease, device, &scope.list_command, TimeoutClass::Read)
            .await
        {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if scope.optional && !e.should_evict() => {
                debug!(
                    device = %device.label(),
                    scope = %scope.id(),
                    error = %e,
                    "optional scope skipped"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete matching entries scope by scope, highest index first, so
    /// each deletion leaves the remaining indices valid.
    async fn delete_matching(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        dialect: &dyn Dialect,
        scopes: Vec<ScopeEntries>,
        matches: impl Fn(&BlockRule) -> bool,
    ) -> Result<usize, CoreError> {
        let mut deleted = 0;
        for ScopeEntries { scope, entries } in scopes {
            let mut indices: Vec<u32> = entries
                .iter()
                .filter(|e| matches(&e.rule))
                .map(|e| e.index)
                .collect();
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();

            for index in indices {
                let command = dialect.delete_command(&scope, index)?;
                self.executor
                    .run(lease, device, &command, TimeoutClass::Mutation)
                    .await?;
                deleted += 1;
                debug!(device = %device.label(), scope = %scope.id(), index, "rule deleted");
            }
        }
        if deleted > 0 {
            info!(device = %device.label(), deleted, "block rules removed");
        }
        Ok(deleted)
    }

    // ── Domain blocking ──────────────────────────────────────────────

    pub async fn list_domains(&self, device: &Device) -> Result<DomainListing, CoreError> {
        let domains = domain_dialect(device)?;
        let mut lease = self.executor.lease(device).await?;
        let result = self.read_domains(&mut lease, device, domains).await;
        let domains = settle(lease, result).await?;
        Ok(DomainListing {
            total_count: domains.len(),
            domains,
        })
    }

    /// Sinkhole `domain`. Blocking an already blocked domain changes
    /// nothing and reports zero affected.
    pub async fn block_domain(&self, device: &Device, domain: &str) -> Result<Outcome, CoreError> {
        let blocking = domain_dialect(device)?;
        let domain: DomainName = domain.parse()?;

        let mut lease = self.executor.lease(device).await?;
        let result: Result<Outcome, CoreError> = async {
            if self.read_domains(&mut lease, device, blocking).await?.contains(&domain) {
                return Ok(Outcome::done(
                    format!("{domain} is already blocked on {}", device.label()),
                    0,
                ));
            }
            let command = blocking.add_command(&self.dnsmasq_conf, &domain);
            self.executor
                .run(&mut lease, device, &command, TimeoutClass::Mutation)
                .await?;
            self.reload(&mut lease, device, blocking).await?;
            Ok(Outcome::done(
                format!("Blocked domain {domain} on {}", device.label()),
                1,
            ))
        }
        .await;
        settle(lease, result).await
    }

    pub async fn unblock_domain(
        &self,
        device: &Device,
        domain: &str,
    ) -> Result<Outcome, CoreError> {
        let blocking = domain_dialect(device)?;
        let domain: DomainName = domain.parse()?;

        let mut lease = self.executor.lease(device).await?;
        let result: Result<Outcome, CoreError> = async {
            if !self.read_domains(&mut lease, device, blocking).await?.contains(&domain) {
                return Ok(Outcome::not_found(format!(
                    "{domain} is not blocked on {}",
                    device.label()
                )));
            }
            let command = blocking.remove_command(&self.dnsmasq_conf, &domain);
            self.executor
                .run(&mut lease, device, &command, TimeoutClass::Mutation)
                .await?;
            self.reload(&mut lease, device, blocking).await?;
            Ok(Outcome::done(
                format!("Unblocked domain {domain} on {}", device.label()),
                1,
            ))
        }
        .await;
        settle(lease, result).await
    }

    pub async fn clear_domains(&self, device: &Device) -> Result<Outcome, CoreError> {
        let blocking = domain_dialect(device)?;
        let mut lease = self.executor.lease(device).await?;
        let result: Result<Outcome, CoreError> = async {
            let count = self.read_domains(&mut lease, device, blocking).await?.len();
            if count == 0 {
                return Ok(Outcome::not_found(format!(
                    "No blocked domains on {}",
                    device.label()
                )));
            }
            let command = blocking.clear_command(&self.dnsmasq_conf);
            self.executor
                .run(&mut lease, device, &command, TimeoutClass::Mutation)
                .await?;
            self.reload(&mut lease, device, blocking).await?;
            Ok(Outcome::done(
                format!("Cleared {count} blocked domain(s) on {}", device.label()),
                count,
            ))
        }
        .await;
        settle(lease, result).await
    }

    async fn read_domains(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        blocking: &dyn DomainBlocking,
    ) -> Result<Vec<DomainName>, CoreError> {
        let raw = self
            .executor
            .run(
                lease,
                device,
                &blocking.list_command(&self.dnsmasq_conf),
                TimeoutClass::Read,
            )
            .await?;
        let mut domains: Vec<DomainName> = raw.lines().filter_map(|l| blocking.decode(l)).collect();
        domains.sort();
        domains.dedup();
        Ok(domains)
    }

    async fn reload(
        &self,
        lease: &mut SessionLease,
        device: &Device,
        blocking: &dyn DomainBlocking,
    ) -> Result<(), CoreError> {
        self.executor
            .run(lease, device, blocking.reload_command(), TimeoutClass::Restart)
            .await?;
        info!(device = %device.label(), "resolver reloaded");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ip_dialect(device: &Device) -> Result<&'static dyn Dialect, CoreError> {
    let dialect = device.kind.dialect();
    if dialect.capabilities().ip_blocking {
        Ok(dialect)
    } else {
        Err(CoreError::unsupported(device.label(), "IP blocking"))
    }
}

fn domain_dialect(device: &Device) -> Result<&'static dyn DomainBlocking, CoreError> {
    device
        .kind
        .dialect()
        .domains()
        .ok_or_else(|| CoreError::unsupported(device.label(), "DNS blocking"))
}

fn line_is_numbered(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|t| t.parse::<u32>().is_ok())
}

/// Collapse rules with the same identity, keeping the first position but
/// preferring a marker-carrying copy.
fn dedupe(rules: Vec<BlockRule>) -> Vec<BlockRule> {
    let mut unique: IndexMap<_, BlockRule> = IndexMap::new();
    for rule in rules {
        match unique.get_mut(&rule.identity()) {
            Some(existing) if existing.marker.is_none() && rule.marker.is_some() => {
                *existing = rule;
            }
            Some(_) => {}
            None => {
                unique.insert(rule.identity(), rule);
            }
        }
    }
    unique.into_values().collect()
}

/// Invalidate the lease when `result` leaves the session in doubt.
async fn settle<T>(lease: SessionLease, result: Result<T, CoreError>) -> Result<T, CoreError> {
    match result {
        Err(e) if e.should_evict() => {
            warn!(key = %lease.key(), error = %e, "evicting session after failure");
            lease.invalidate().await;
            Err(e)
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use fleetwall_transport::SnmpClient;

    use super::*;
    use crate::config::FleetConfig;
    use crate::model::DeviceKind;
    use crate::pool::SessionPool;
    use crate::error::ExecutionKind;
    use crate::testing::{CiscoSim, FakeConnector, LinuxSim, MikrotikSim, SimRule, device};
    use crate::worker::WorkerPool;

    const CONF: &str = "/etc/dnsmasq.d/fleetwall.conf";

    fn engine(connector: &Arc<FakeConnector>) -> RuleEngine {
        let config = FleetConfig::default();
        let workers = WorkerPool::new(4);
        let pool = SessionPool::new(connector.clone(), workers.clone(), &config);
        let executor = Executor::new(
            pool,
            Arc::new(SnmpClient::new(config.transport())),
            workers,
            config.timeouts,
        );
        RuleEngine::new(executor, CONF)
    }

    fn block(target: &str, direction: Direction) -> BlockRequest {
        BlockRequest {
            target: target.into(),
            port: None,
            direction,
            confirm: false,
        }
    }

    fn linux() -> Device {
        device(DeviceKind::Linux, "192.0.2.1")
    }

    #[tokio::test]
    async fn block_list_remove_round_trip() {
        let sim = LinuxSim::new();
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = linux();

        let outcome = engine
            .add_block(&router, &block("203.0.113.5", Direction::In))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.affected_count, 1);

        let rules = engine.list_blocks(&router, Direction::Both).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].target.to_string(), "203.0.113.5");
        assert_eq!(rules[0].direction, Direction::In);
        assert!(rules[0].is_managed());

        let removed = engine.remove_block(&router, "203.0.113.5").await.unwrap();
        assert!(removed.success);
        assert!(removed.affected_count >= 1);
        assert!(engine.list_blocks(&router, Direction::Both).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_is_idempotent() {
        let sim = LinuxSim::new();
        sim.seed("iptables", "INPUT", SimRule::drop_from("198.51.100.7"));
        sim.seed("iptables", "INPUT", SimRule::accept_from("192.168.1.0/24"));
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = linux();
        engine
            .add_block(&router, &block("10.9.0.0/16", Direction::Both))
            .await
            .unwrap();

        let first = engine.list_blocks(&router, Direction::Both).await.unwrap();
        let second = engine.list_blocks(&router, Direction::Both).await.unwrap();
        assert_eq!(first, second);
        // one unmarked inbound rule plus the managed pair
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn deletions_run_from_the_highest_index() {
        let sim = LinuxSim::new();
        sim.seed("iptables", "INPUT", SimRule::accept_from("192.0.2.50"));
        sim.seed("iptables", "INPUT", SimRule::drop_from("203.0.113.9"));
        sim.seed("iptables", "INPUT", SimRule::accept_from("192.0.2.51"));
        sim.seed("iptables", "INPUT", SimRule::drop_from("203.0.113.9"));
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);

        let outcome = engine.remove_block(&linux(), "203.0.113.9").await.unwrap();

        assert_eq!(outcome.affected_count, 2);
        assert_eq!(
            sim.deletions(),
            vec!["iptables -D INPUT 4".to_owned(), "iptables -D INPUT 2".to_owned()]
        );
        let left: Vec<_> = sim
            .rules("iptables", "INPUT")
            .into_iter()
            .map(|r| r.source.unwrap())
            .collect();
        assert_eq!(left, vec!["192.0.2.50", "192.0.2.51"]);
    }

    #[tokio::test]
    async fn removing_an_absent_target_is_not_an_error() {
        let sim = LinuxSim::new();
        let connector = FakeConnector::simulating(&sim);
        let outcome = engine(&connector)
            .remove_block(&linux(), "203.0.113.77")
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.affected_count, 0);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_connecting() {
        let connector = FakeConnector::echo();
        let engine = engine(&connector);

        let err = engine
            .add_block(&linux(), &block("not-an-ip", Direction::In))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid IP address format"));

        let mut bad_port = block("203.0.113.5", Direction::In);
        bad_port.port = Some(0);
        assert!(matches!(
            engine.add_block(&linux(), &bad_port).await.unwrap_err(),
            CoreError::ValidationFailed { .. }
        ));

        let err = engine.block_domain(&linux(), "").await.unwrap_err();
        assert!(err.to_string().contains("Domain is required"));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn clear_removes_every_deny_and_keeps_accepts() {
        let sim = LinuxSim::new();
        sim.seed("iptables", "INPUT", SimRule::accept_from("192.0.2.50"));
        sim.seed("iptables", "INPUT", SimRule::drop_from("198.51.100.7"));
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = linux();
        engine
            .add_block(&router, &block("203.0.113.5", Direction::Out))
            .await
            .unwrap();

        let outcome = engine.clear_blocks(&router).await.unwrap();
        assert_eq!(outcome.affected_count, 3);
        assert!(engine.list_blocks(&router, Direction::Both).await.unwrap().is_empty());
        assert_eq!(sim.rules("iptables", "INPUT"), vec![SimRule::accept_from("192.0.2.50")]);
    }

    // ── RouterOS ─────────────────────────────────────────────────────

    const V4_FILTER: &str = "/ip firewall filter";

    fn mikrotik() -> Device {
        device(DeviceKind::Mikrotik, "192.0.2.4")
    }

    #[tokio::test]
    async fn routeros_deletes_from_the_highest_position() {
        let sim = MikrotikSim::new();
        sim.seed(V4_FILTER, "chain=input action=accept src-address=192.0.2.50");
        sim.seed(V4_FILTER, "chain=input action=drop src-address=203.0.113.9");
        sim.seed(V4_FILTER, "chain=forward action=accept src-address=192.0.2.51");
        sim.seed(V4_FILTER, "chain=forward action=drop src-address=203.0.113.9");
        let connector = FakeConnector::simulating(&sim);

        let outcome = engine(&connector)
            .remove_block(&mikrotik(), "203.0.113.9")
            .await
            .unwrap();

        assert_eq!(outcome.affected_count, 2);
        assert_eq!(
            sim.deletions(),
            vec![
                "/ip firewall filter remove 3".to_owned(),
                "/ip firewall filter remove 1".to_owned(),
            ]
        );
        assert_eq!(
            sim.rules(V4_FILTER),
            vec![
                "chain=input action=accept src-address=192.0.2.50".to_owned(),
                "chain=forward action=accept src-address=192.0.2.51".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn routeros_clear_keeps_accepts() {
        let sim = MikrotikSim::new();
        sim.seed(V4_FILTER, "chain=input action=accept src-address=192.0.2.50");
        sim.seed(V4_FILTER, "chain=forward action=drop dst-address=198.51.100.7");
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = mikrotik();

        let mut request = block("203.0.113.0/24", Direction::In);
        request.port = Some(443);
        request.confirm = true;
        let added = engine.add_block(&router, &request).await.unwrap();
        assert_eq!(added.confirmed, Some(true));
        // forward + input, tcp + udp each
        assert_eq!(sim.rules(V4_FILTER).len(), 6);

        let outcome = engine.clear_blocks(&router).await.unwrap();
        assert_eq!(outcome.affected_count, 5);
        assert_eq!(
            sim.rules(V4_FILTER),
            vec!["chain=input action=accept src-address=192.0.2.50".to_owned()]
        );
    }

    #[tokio::test]
    async fn routeros_failure_text_is_an_error_and_keeps_the_session() {
        let sim = MikrotikSim::new();
        sim.seed(V4_FILTER, "chain=input action=drop src-address=203.0.113.9");
        sim.lock_rules(true);
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = mikrotik();

        let err = engine.remove_block(&router, "203.0.113.9").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Execution {
                kind: ExecutionKind::RemoteCommand,
                ref message,
                ..
            } if message.starts_with("failure:")
        ));
        assert!(!err.should_evict());
        assert_eq!(sim.rules(V4_FILTER).len(), 1);

        sim.lock_rules(false);
        let outcome = engine.remove_block(&router, "203.0.113.9").await.unwrap();
        assert_eq!(outcome.affected_count, 1);
        assert_eq!(connector.connects(), 1);
    }

    // ── Cisco IOS ────────────────────────────────────────────────────

    const PERMIT_SEQ: u32 = 2_147_483_640;

    fn cisco(binding: Option<&str>) -> Device {
        let mut router = device(DeviceKind::Cisco, "192.0.2.5");
        router.acl_interface = binding.map(str::to_owned);
        router
    }

    fn seeded_cisco() -> Arc<CiscoSim> {
        let sim = CiscoSim::new();
        sim.seed("FLEETWALL-IN", 10, "permit ip host 203.0.113.9 any");
        sim.seed("FLEETWALL-IN", 20, "deny ip host 203.0.113.9 any");
        sim.seed("FLEETWALL-IN", 30, "deny tcp host 203.0.113.9 any eq 443");
        sim.seed("FLEETWALL-IN", 40, "deny ip host 198.51.100.4 any");
        sim.seed("FLEETWALL-IN", PERMIT_SEQ, "permit ip any any");
        sim
    }

    fn sequences(sim: &CiscoSim, acl: &str) -> Vec<u32> {
        sim.acl(acl).into_iter().map(|(seq, _)| seq).collect()
    }

    #[tokio::test]
    async fn cisco_deletes_from_the_highest_sequence() {
        let sim = seeded_cisco();
        let connector = FakeConnector::simulating(&sim);

        let outcome = engine(&connector)
            .remove_block(&cisco(None), "203.0.113.9")
            .await
            .unwrap();

        assert_eq!(outcome.affected_count, 2);
        assert_eq!(
            sim.deletions(),
            vec!["FLEETWALL-IN no 30".to_owned(), "FLEETWALL-IN no 20".to_owned()]
        );
        assert_eq!(sequences(&sim, "FLEETWALL-IN"), vec![10, 40, PERMIT_SEQ]);
    }

    #[tokio::test]
    async fn cisco_clear_keeps_permits() {
        let sim = seeded_cisco();
        sim.seed("FLEETWALL-OUT", 10, "deny ip any host 203.0.113.20");
        sim.seed("FLEETWALL-OUT", PERMIT_SEQ, "permit ip any any");
        let connector = FakeConnector::simulating(&sim);

        let outcome = engine(&connector).clear_blocks(&cisco(None)).await.unwrap();

        assert_eq!(outcome.affected_count, 4);
        assert_eq!(sequences(&sim, "FLEETWALL-IN"), vec![10, PERMIT_SEQ]);
        assert_eq!(sequences(&sim, "FLEETWALL-OUT"), vec![PERMIT_SEQ]);
    }

    #[tokio::test]
    async fn cisco_block_applies_both_lists_to_the_interface() {
        let sim = CiscoSim::new();
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = cisco(Some("GigabitEthernet0/1"));

        let mut request = block("203.0.113.5", Direction::Both);
        request.confirm = true;
        let outcome = engine.add_block(&router, &request).await.unwrap();
        assert_eq!(outcome.confirmed, Some(true));
        engine
            .add_block(&router, &block("203.0.113.6", Direction::In))
            .await
            .unwrap();

        assert_eq!(
            sim.binding("GigabitEthernet0/1", "in").as_deref(),
            Some("FLEETWALL-IN")
        );
        assert_eq!(
            sim.binding("GigabitEthernet0/1", "out").as_deref(),
            Some("FLEETWALL-OUT")
        );
        // new denies always land above the trailing permit
        assert_eq!(
            sim.acl("FLEETWALL-IN"),
            vec![
                (10, "deny ip host 203.0.113.5 any".to_owned()),
                (20, "deny ip host 203.0.113.6 any".to_owned()),
                (PERMIT_SEQ, "permit ip any any".to_owned()),
            ]
        );
        assert_eq!(sequences(&sim, "FLEETWALL-OUT"), vec![10, PERMIT_SEQ]);
    }

    #[tokio::test]
    async fn cisco_block_without_interface_fails_before_connecting() {
        let connector = FakeConnector::simulating(&CiscoSim::new());

        let err = engine(&connector)
            .add_block(&cisco(None), &block("203.0.113.5", Direction::In))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert!(err.to_string().contains("acl_interface"));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn confirm_relists_after_install() {
        let sim = LinuxSim::new();
        let connector = FakeConnector::simulating(&sim);
        let mut request = block("2001:db8::5", Direction::Out);
        request.port = Some(443);
        request.confirm = true;

        let outcome = engine(&connector).add_block(&linux(), &request).await.unwrap();
        assert_eq!(outcome.confirmed, Some(true));
    }

    #[tokio::test]
    async fn direction_filter_applies_to_listing() {
        let sim = LinuxSim::new();
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = linux();
        engine
            .add_block(&router, &block("203.0.113.5", Direction::In))
            .await
            .unwrap();
        engine
            .add_block(&router, &block("203.0.113.6", Direction::Out))
            .await
            .unwrap();

        let outbound = engine.list_blocks(&router, Direction::Out).await.unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].target.to_string(), "203.0.113.6");
    }

    #[tokio::test]
    async fn domain_blocking_is_idempotent_and_reloads() {
        let sim = LinuxSim::new();
        let connector = FakeConnector::simulating(&sim);
        let engine = engine(&connector);
        let router = linux();

        assert_eq!(engine.block_domain(&router, "Example.com").await.unwrap().affected_count, 1);
        assert_eq!(engine.block_domain(&router, "example.com").await.unwrap().affected_count, 0);
        assert_eq!(sim.dnsmasq(), vec!["address=/example.com/0.0.0.0".to_owned()]);
        assert_eq!(sim.reloads(), 1);

        let listing = engine.list_domains(&router).await.unwrap();
        assert_eq!(listing.total_count, 1);

        let missing = engine.unblock_domain(&router, "other.org").await.unwrap();
        assert_eq!(missing.affected_count, 0);

        engine.block_domain(&router, "ads.example.net").await.unwrap();
        let cleared = engine.clear_domains(&router).await.unwrap();
        assert_eq!(cleared.affected_count, 2);
        assert!(sim.dnsmasq().is_empty());
        assert_eq!(sim.reloads(), 3);
    }

    #[tokio::test]
    async fn unsupported_operations_fail_without_io() {
        let connector = FakeConnector::echo();
        let engine = engine(&connector);

        let err = engine
            .block_domain(&device(DeviceKind::Cisco, "192.0.2.2"), "example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support DNS blocking"));

        let err = engine
            .list_blocks(&device(DeviceKind::Snmp, "192.0.2.3"), Direction::Both)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn transport_failure_evicts_the_session() {
        let connector = FakeConnector::new(|_| {
            Err(fleetwall_transport::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )))
        });
        let engine = engine(&connector);

        let err = engine.list_blocks(&linux(), Direction::Both).await.unwrap_err();
        assert!(err.should_evict());
        assert_eq!(engine.executor.pool().stats().sessions, 0);
        assert_eq!(connector.closes(), 1);
    }
}
