//! Clap derive structures for the `fleetwall` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only depends on clap so build.rs can render man pages from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetwall -- block addresses and domains across a fleet of firewalls
#[derive(Debug, Parser)]
#[command(
    name = "fleetwall",
    version,
    about = "Manage firewall blocks and traffic accounting across a device fleet",
    long_about = "Block IP addresses and domains on Linux, Mikrotik and Cisco devices,\n\
        read connection tables and interface counters, and probe reachability.\n\n\
        Devices are listed in the config file; see `fleetwall config init`.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FLEETWALL_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format (defaults to `defaults.output` from the config)
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect, probe and test managed devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Block IP addresses and networks
    #[command(alias = "block", alias = "b")]
    Blocks(BlocksArgs),

    /// Block domains through the device resolver
    #[command(alias = "dns")]
    Domains(DomainsArgs),

    /// Read connection tables and per-owner traffic
    #[command(alias = "connections", alias = "c")]
    Conns(ConnsArgs),

    /// Show interface traffic counters
    #[command(alias = "ifaces", alias = "bandwidth")]
    Interfaces {
        /// Device id, name or address
        device: String,
    },

    /// Manage CLI configuration and the device inventory
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    /// Traffic coming from the target
    In,
    /// Traffic going to the target
    Out,
    /// Both directions
    Both,
}

/// Where a connection table is read from.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Read the table of a managed device (id, name or address)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Read the conntrack table of this host
    #[arg(long)]
    pub local: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List configured devices
    #[command(alias = "ls")]
    List,

    /// Show one device and what its dialect supports
    #[command(alias = "get")]
    Show {
        /// Device id, name or address
        device: String,
    },

    /// Probe every device and report reachability
    Status,

    /// Probe one device: ICMP, then TCP, then a CLI login
    Probe {
        /// Device id, name or address
        device: String,
    },

    /// Open a session to a device and report the result
    Test {
        /// Device id, name or address
        device: String,
    },

    /// Run a raw command (or SNMP `get`/`walk`) on a device
    Exec {
        /// Device id, name or address
        device: String,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BLOCKS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BlocksArgs {
    #[command(subcommand)]
    pub command: BlocksCommand,
}

#[derive(Debug, Subcommand)]
pub enum BlocksCommand {
    /// Block an address or CIDR network
    Add {
        /// Device id, name or address
        device: String,

        /// IPv4/IPv6 address or network
        target: String,

        /// Only block this TCP port
        #[arg(long, short = 'P')]
        port: Option<u16>,

        /// Direction to block
        #[arg(long, short = 'D', default_value = "both")]
        direction: DirectionArg,

        /// Re-list afterwards and check the rule is present
        #[arg(long)]
        confirm: bool,
    },

    /// List deny rules on a device
    #[command(alias = "ls")]
    List {
        /// Device id, name or address
        device: String,

        /// Only show rules in this direction
        #[arg(long, short = 'D', default_value = "both")]
        direction: DirectionArg,
    },

    /// Remove every deny rule matching a target
    #[command(alias = "rm")]
    Remove {
        /// Device id, name or address
        device: String,

        /// Address or network to unblock
        target: String,
    },

    /// Remove all deny rules from a device
    Clear {
        /// Device id, name or address
        device: String,
    },

    /// Print the unparsed rule listings
    Raw {
        /// Device id, name or address
        device: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DOMAINS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DomainsArgs {
    #[command(subcommand)]
    pub command: DomainsCommand,
}

#[derive(Debug, Subcommand)]
pub enum DomainsCommand {
    /// Sinkhole a domain and reload the resolver
    Add {
        /// Device id, name or address
        device: String,

        /// Domain name, e.g. ads.example.com
        domain: String,
    },

    /// List blocked domains
    #[command(alias = "ls")]
    List {
        /// Device id, name or address
        device: String,
    },

    /// Unblock a domain and reload the resolver
    #[command(alias = "rm")]
    Remove {
        /// Device id, name or address
        device: String,

        /// Domain name
        domain: String,
    },

    /// Remove every blocked domain
    Clear {
        /// Device id, name or address
        device: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONNECTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConnsArgs {
    #[command(subcommand)]
    pub command: ConnsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConnsCommand {
    /// List tracked connections
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        source: SourceArgs,

        /// Only show the N largest connections by bytes
        #[arg(long, short = 'n')]
        top: Option<usize>,
    },

    /// Traffic totals per owner
    Summary {
        #[command(flatten)]
        source: SourceArgs,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a device to the config with guided setup
    Init,

    /// Display current resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Store a device password or SNMP community in the system keyring
    SetPassword {
        /// Device id
        device: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
