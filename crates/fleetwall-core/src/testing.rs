// ── Test doubles ──
//
// `FakeConnector` hands out in-memory sessions driven by a handler
// closure. The simulators drive it with small device models: `LinuxSim`
// (iptables + dnsmasq), `MikrotikSim` (RouterOS filter tables) and
// `CiscoSim` (sequenced extended ACLs). Each keeps real rule positions,
// so deleting in the wrong order fails the same way it would on a device.
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use secrecy::SecretString;

use fleetwall_transport::{CliConnector, CliSession, CommandOutput, Error, SshTarget};

use crate::model::{Credentials, Device, DeviceKind};

pub(crate) fn device(kind: DeviceKind, address: &str) -> Device {
    let credentials = match kind {
        DeviceKind::Snmp => Credentials::Community(SecretString::from("public")),
        _ => Credentials::Password {
            username: "admin".into(),
            password: SecretString::from("secret"),
        },
    };
    Device {
        id: format!("{kind}-{address}"),
        name: format!("{kind}-{address}"),
        address: address.into(),
        port: if kind == DeviceKind::Snmp { 161 } else { 22 },
        kind,
        credentials,
        acl_interface: None,
    }
}

// ── FakeConnector ───────────────────────────────────────────────────

type Handler = dyn Fn(&str) -> Result<CommandOutput, Error> + Send + Sync;

pub(crate) struct FakeConnector {
    handler: Arc<Handler>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    alive: Mutex<Vec<Arc<AtomicBool>>>,
    refuse: AtomicBool,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<CommandOutput, Error> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(handler),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            alive: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Every command succeeds with empty output.
    pub(crate) fn echo() -> Arc<Self> {
        Self::new(|_| Ok(CommandOutput::text("")))
    }

    pub(crate) fn simulating<S: Simulated + 'static>(sim: &Arc<S>) -> Arc<Self> {
        let sim = Arc::clone(sim);
        Self::new(move |command| Ok(sim.handle(command)))
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Break every session handed out so far.
    pub(crate) fn kill_sessions(&self) {
        for flag in self.alive.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Every command run on any session, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CliConnector for FakeConnector {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn CliSession>, Error> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connect {
                addr: target.addr(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.alive.lock().unwrap().push(Arc::clone(&alive));
        Ok(Box::new(FakeSession {
            alive,
            closed: false,
            handler: Arc::clone(&self.handler),
            closes: Arc::clone(&self.closes),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    alive: Arc<AtomicBool>,
    closed: bool,
    handler: Arc<Handler>,
    closes: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
}

impl CliSession for FakeSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, Error> {
        if self.closed || !self.alive.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        self.log.lock().unwrap().push(command.to_owned());
        (self.handler)(command)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// An in-memory device answering one command line at a time.
pub(crate) trait Simulated: Send + Sync {
    fn handle(&self, command: &str) -> CommandOutput;
}

// ── LinuxSim ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SimRule {
    pub action: String,
    pub proto: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub dport: Option<u16>,
    pub comment: Option<String>,
}

impl SimRule {
    pub(crate) fn drop_from(source: &str) -> Self {
        Self::new("DROP", Some(source), None)
    }

    pub(crate) fn accept_from(source: &str) -> Self {
        Self::new("ACCEPT", Some(source), None)
    }

    fn new(action: &str, source: Option<&str>, destination: Option<&str>) -> Self {
        Self {
            action: action.into(),
            proto: "all".into(),
            source: source.map(str::to_owned),
            destination: destination.map(str::to_owned),
            dport: None,
            comment: None,
        }
    }
}

#[derive(Default)]
struct SimState {
    chains: HashMap<(String, String), Vec<SimRule>>,
    dnsmasq: Vec<String>,
    reloads: usize,
    deletions: Vec<String>,
    conntrack: String,
}

#[derive(Default)]
pub(crate) struct LinuxSim {
    state: Mutex<SimState>,
}

impl LinuxSim {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a rule to `tool`'s `chain`.
    pub(crate) fn seed(&self, tool: &str, chain: &str, rule: SimRule) {
        self.state
            .lock()
            .unwrap()
            .chains
            .entry((tool.into(), chain.into()))
            .or_default()
            .push(rule);
    }

    pub(crate) fn set_conntrack(&self, text: &str) {
        self.state.lock().unwrap().conntrack = text.into();
    }

    pub(crate) fn rules(&self, tool: &str, chain: &str) -> Vec<SimRule> {
        self.state
            .lock()
            .unwrap()
            .chains
            .get(&(tool.into(), chain.into()))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn deletions(&self) -> Vec<String> {
        self.state.lock().unwrap().deletions.clone()
    }

    pub(crate) fn dnsmasq(&self) -> Vec<String> {
        self.state.lock().unwrap().dnsmasq.clone()
    }

    pub(crate) fn reloads(&self) -> usize {
        self.state.lock().unwrap().reloads
    }
}

impl Simulated for LinuxSim {
    /// Run a shell command line. `&&` chains stop at the first failure.
    fn handle(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        let mut stdout = String::new();
        for part in command.split(" && ") {
            match step(&mut state, part.trim()) {
                Ok(out) => stdout.push_str(&out),
                Err(stderr) => {
                    return CommandOutput {
                        stdout,
                        stderr,
                        exit_status: Some(1),
                    };
                }
            }
        }
        CommandOutput::text(stdout)
    }
}

fn step(state: &mut SimState, part: &str) -> Result<String, String> {
    let tokens: Vec<&str> = part.split_whitespace().collect();
    match tokens.as_slice() {
        ["echo", rest @ ..] => Ok(format!("{}\n", rest.join(" "))),
        [tool @ ("iptables" | "ip6tables"), "-I", chain, args @ ..] => {
            let rule = parse_rule(args)?;
            state
                .chains
                .entry(((*tool).into(), (*chain).into()))
                .or_default()
                .insert(0, rule);
            Ok(String::new())
        }
        [tool @ ("iptables" | "ip6tables"), "-L", chain, ..] => Ok(render(
            tool,
            chain,
            state.chains.get(&((*tool).into(), (*chain).into())),
        )),
        [tool @ ("iptables" | "ip6tables"), "-D", chain, index] => {
            let index: usize = index.parse().map_err(|_| "Bad rule number".to_owned())?;
            let rules = state
                .chains
                .entry(((*tool).into(), (*chain).into()))
                .or_default();
            if index == 0 || index > rules.len() {
                return Err(format!("{tool}: Index of deletion too big."));
            }
            rules.remove(index - 1);
            state.deletions.push(part.to_owned());
            Ok(String::new())
        }
        ["cat", "/proc/net/nf_conntrack", ..] => Ok(state.conntrack.clone()),
        ["cat", ..] => Ok(state.dnsmasq.iter().map(|l| format!("{l}\n")).collect()),
        ["grep", "-qxF", ..] => {
            let line = quoted(part)?;
            if !state.dnsmasq.contains(&line) {
                state.dnsmasq.push(line);
            }
            Ok(String::new())
        }
        ["grep", "-vxF", ..] => {
            let line = quoted(part)?;
            state.dnsmasq.retain(|l| *l != line);
            Ok(String::new())
        }
        [":", ">", _] => {
            state.dnsmasq.clear();
            Ok(String::new())
        }
        ["/etc/init.d/dnsmasq", "restart"] => {
            state.reloads += 1;
            Ok(String::new())
        }
        _ => Err(format!("sh: {part}: not found")),
    }
}

fn quoted(part: &str) -> Result<String, String> {
    part.split('\'')
        .nth(1)
        .map(str::to_owned)
        .ok_or_else(|| format!("unquoted pattern in '{part}'"))
}

fn parse_rule(args: &[&str]) -> Result<SimRule, String> {
    let mut rule = SimRule::new("ACCEPT", None, None);
    let mut it = args.iter();
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .map(|v| (*v).to_owned())
                .ok_or_else(|| format!("option {flag} requires an argument"))
        };
        match *flag {
            "-s" => rule.source = Some(value()?),
            "-d" => rule.destination = Some(value()?),
            "-p" => rule.proto = value()?,
            "--dport" => rule.dport = Some(value()?.parse().map_err(|_| "bad port".to_owned())?),
            "--comment" => rule.comment = Some(value()?),
            "-j" => rule.action = value()?,
            "-m" => {
                value()?;
            }
            other => return Err(format!("unknown option {other}")),
        }
    }
    Ok(rule)
}

fn render(tool: &str, chain: &str, rules: Option<&Vec<SimRule>>) -> String {
    let (any, opt) = if tool == "iptables" {
        ("0.0.0.0/0", "--")
    } else {
        ("::/0", "  ")
    };
    let mut out = format!(
        "Chain {chain} (policy ACCEPT)\nnum  target     prot opt source               destination\n"
    );
    for (i, rule) in rules.into_iter().flatten().enumerate() {
        let mut extra = String::new();
        if let Some(port) = rule.dport {
            extra.push_str(&format!("{} dpt:{port} ", rule.proto));
        }
        if let Some(comment) = &rule.comment {
            extra.push_str(&format!("/* {comment} */"));
        }
        out.push_str(&format!(
            "{:<4} {:<10} {:<4} {opt}  {:<20} {:<20} {extra}\n",
            i + 1,
            rule.action,
            rule.proto,
            rule.source.as_deref().unwrap_or(any),
            rule.destination.as_deref().unwrap_or(any),
        ));
    }
    out
}

// ── MikrotikSim ─────────────────────────────────────────────────────

/// RouterOS filter tables. Rules are stored as their `key=value` text and
/// printed with 0-based positions, the same order `find` returns them in.
/// Failures are reported in-band on stdout with a zero exit status.
#[derive(Default)]
pub(crate) struct MikrotikSim {
    state: Mutex<MikrotikState>,
}

#[derive(Default)]
struct MikrotikState {
    tables: HashMap<String, Vec<String>>,
    deletions: Vec<String>,
    locked: bool,
}

impl MikrotikSim {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a rule (`chain=input action=drop ...`) to `menu`.
    pub(crate) fn seed(&self, menu: &str, rule: &str) {
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(menu.into())
            .or_default()
            .push(rule.into());
    }

    pub(crate) fn rules(&self, menu: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(menu)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn deletions(&self) -> Vec<String> {
        self.state.lock().unwrap().deletions.clone()
    }

    /// Refuse every `remove` with a `failure:` line.
    pub(crate) fn lock_rules(&self, locked: bool) {
        self.state.lock().unwrap().locked = locked;
    }
}

impl Simulated for MikrotikSim {
    /// `; ` separates statements; the first failure ends the script.
    fn handle(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        let mut stdout = String::new();
        for statement in command.split("; ") {
            match routeros_step(&mut state, statement.trim()) {
                Ok(out) => stdout.push_str(&out),
                Err(failure) => {
                    stdout.push_str(&failure);
                    stdout.push('\n');
                    break;
                }
            }
        }
        CommandOutput::text(stdout)
    }
}

fn routeros_step(state: &mut MikrotikState, statement: &str) -> Result<String, String> {
    if let Some(text) = statement.strip_prefix(":put ") {
        return Ok(format!("{text}\n"));
    }
    let (menu, action) = ["/ip firewall filter", "/ipv6 firewall filter"]
        .into_iter()
        .find_map(|menu| Some((menu, statement.strip_prefix(menu)?.trim())))
        .ok_or_else(|| "bad command name (line 1 column 1)".to_owned())?;

    if let Some(args) = action.strip_prefix("add ") {
        if let Some(bad) = args.split_whitespace().find(|t| !t.contains('=')) {
            return Err(format!("expected end of command (text \"{bad}\")"));
        }
        state.tables.entry(menu.into()).or_default().push(args.into());
        return Ok(String::new());
    }
    if action == "print terse without-paging" {
        let rules = state.tables.get(menu).map(Vec::as_slice).unwrap_or_default();
        return Ok(rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{i:>2}    {rule}\n"))
            .collect());
    }
    if action.starts_with("remove [:pick [") {
        // remove [:pick [<menu> find] N]
        let index: usize = action
            .split_whitespace()
            .last()
            .map(|t| t.trim_end_matches(']'))
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| "syntax error (line 1 column 8)".to_owned())?;
        if state.locked {
            return Err("failure: rule is locked by another session".into());
        }
        let rules = state.tables.entry(menu.into()).or_default();
        if index >= rules.len() {
            return Err("failure: no such item".into());
        }
        rules.remove(index);
        state.deletions.push(format!("{menu} remove {index}"));
        return Ok(String::new());
    }
    Err("syntax error (line 1 column 1)".into())
}

// ── CiscoSim ────────────────────────────────────────────────────────

/// IOS extended named ACLs keyed by sequence number, plus interface
/// bindings. Errors come back as `% ` lines on stdout.
#[derive(Default)]
pub(crate) struct CiscoSim {
    state: Mutex<CiscoState>,
}

#[derive(Default)]
struct CiscoState {
    acls: HashMap<String, BTreeMap<u32, String>>,
    bindings: BTreeMap<(String, String), String>,
    deletions: Vec<String>,
}

/// Highest sequence number IOS accepts.
const IOS_MAX_SEQ: u32 = 2_147_483_647;

const IOS_INVALID: &str = "% Invalid input detected at '^' marker.";

#[derive(Clone)]
enum CiscoMode {
    Exec,
    Config,
    Acl(String),
    Interface(String),
}

impl CiscoSim {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn seed(&self, acl: &str, seq: u32, entry: &str) {
        self.state
            .lock()
            .unwrap()
            .acls
            .entry(acl.into())
            .or_default()
            .insert(seq, entry.into());
    }

    /// Sequence numbers and entry text of `acl`, in order.
    pub(crate) fn acl(&self, acl: &str) -> Vec<(u32, String)> {
        self.state
            .lock()
            .unwrap()
            .acls
            .get(acl)
            .map(|entries| entries.iter().map(|(seq, e)| (*seq, e.clone())).collect())
            .unwrap_or_default()
    }

    /// ACL applied to `iface` in direction `side` (`in` or `out`).
    pub(crate) fn binding(&self, iface: &str, side: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .bindings
            .get(&(iface.to_owned(), side.to_owned()))
            .cloned()
    }

    pub(crate) fn deletions(&self) -> Vec<String> {
        self.state.lock().unwrap().deletions.clone()
    }
}

impl Simulated for CiscoSim {
    /// Run an exec command or a newline-separated configuration script.
    fn handle(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        let mut mode = CiscoMode::Exec;
        let mut stdout = String::new();
        for line in command.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match ios_step(&mut state, &mut mode, line) {
                Ok(out) => stdout.push_str(&out),
                Err(error) => {
                    stdout.push_str(&error);
                    stdout.push('\n');
                    break;
                }
            }
        }
        CommandOutput::text(stdout)
    }
}

fn ios_step(state: &mut CiscoState, mode: &mut CiscoMode, line: &str) -> Result<String, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if line == "end" {
        *mode = CiscoMode::Exec;
        return Ok(String::new());
    }
    match (mode.clone(), tokens.as_slice()) {
        (CiscoMode::Exec, ["show", "clock"]) => Ok("*10:21:33.123 UTC Mon Oct 19 2026\n".into()),
        (CiscoMode::Exec, ["show", "ip", "access-lists", name]) => {
            let Some(entries) = state.acls.get(*name) else {
                return Ok(String::new());
            };
            let mut out = format!("Extended IP access list {name}\n");
            for (seq, entry) in entries {
                out.push_str(&format!("    {seq} {entry}\n"));
            }
            Ok(out)
        }
        (CiscoMode::Exec, ["configure", "terminal"]) => {
            *mode = CiscoMode::Config;
            Ok(String::new())
        }
        (CiscoMode::Config | CiscoMode::Acl(_), ["ip", "access-list", "extended", name]) => {
            state.acls.entry((*name).to_owned()).or_default();
            *mode = CiscoMode::Acl((*name).to_owned());
            Ok(String::new())
        }
        (CiscoMode::Config | CiscoMode::Interface(_), ["interface", iface]) => {
            *mode = CiscoMode::Interface((*iface).to_owned());
            Ok(String::new())
        }
        (CiscoMode::Interface(iface), ["ip", "access-group", acl, side @ ("in" | "out")]) => {
            state
                .bindings
                .insert((iface, (*side).to_owned()), (*acl).to_owned());
            Ok(String::new())
        }
        (CiscoMode::Acl(acl), ["no", seq]) => {
            let seq: u32 = seq.parse().map_err(|_| IOS_INVALID.to_owned())?;
            let entries = state.acls.entry(acl.clone()).or_default();
            if entries.remove(&seq).is_some() {
                state.deletions.push(format!("{acl} no {seq}"));
            }
            Ok(String::new())
        }
        (CiscoMode::Acl(acl), [first, rest @ ..]) => {
            let entries = state.acls.entry(acl).or_default();
            let (seq, body) = match first.parse::<u32>() {
                Ok(seq) => (seq, rest),
                Err(_) => {
                    let next = entries.keys().next_back().map_or(10, |last| last + 10);
                    (next, tokens.as_slice())
                }
            };
            if seq > IOS_MAX_SEQ {
                return Err("% Sequence number out of range".into());
            }
            if !matches!(body.first(), Some(&"permit" | &"deny")) {
                return Err(IOS_INVALID.into());
            }
            entries.insert(seq, body.join(" "));
            Ok(String::new())
        }
        _ => Err(IOS_INVALID.into()),
    }
}
