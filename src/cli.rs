use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use converge::StateToken;
use sacloud::Zone;

#[derive(Parser)]
#[command(name = "sacloud-converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge SAKURA Cloud resources to a desired state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Zone to operate in [default: is1a]
    #[arg(long, value_enum, global = true, env = "SAKURACLOUD_ZONE")]
    pub zone: Option<ZoneArg>,

    /// API access token
    #[arg(long, global = true, env = "SAKURACLOUD_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API access token secret
    #[arg(
        long,
        global = true,
        env = "SAKURACLOUD_ACCESS_TOKEN_SECRET",
        hide_env_values = true
    )]
    pub secret: Option<String>,

    /// Seconds between two status observations [default: 5]
    #[arg(long, global = true, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Observations before giving up on a status [default: 120]
    #[arg(long, global = true, value_name = "N")]
    pub poll_attempts: Option<u32>,

    /// Report what would change without changing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print outcomes as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge a server
    Server(ServerArgs),

    /// Converge a disk
    Disk(DiskArgs),

    /// Converge a router and its switch
    Router(RouterArgs),

    /// Converge a load balancer appliance
    #[command(name = "lb")]
    LoadBalancer(LoadBalancerArgs),

    /// Converge every resource of a manifest
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Value enums
// ============================================================================

#[derive(Clone, Copy, ValueEnum)]
pub enum ZoneArg {
    Is1a,
    Is1b,
    Tk1a,
}

impl From<ZoneArg> for Zone {
    fn from(zone: ZoneArg) -> Self {
        match zone {
            ZoneArg::Is1a => Zone::Is1a,
            ZoneArg::Is1b => Zone::Is1b,
            ZoneArg::Tk1a => Zone::Tk1a,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StateArg {
    Present,
    Absent,
    Stopped,
    Running,
    Connected,
    Disconnected,
    Applied,
}

impl From<StateArg> for StateToken {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Present => StateToken::Present,
            StateArg::Absent => StateToken::Absent,
            StateArg::Stopped => StateToken::Stopped,
            StateArg::Running => StateToken::Running,
            StateArg::Connected => StateToken::Connected,
            StateArg::Disconnected => StateToken::Disconnected,
            StateArg::Applied => StateToken::Applied,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DiskPlanArg {
    Ssd,
    Hdd,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProtocolArg {
    Http,
    Https,
    Tcp,
    Ping,
}

/// Name of a value as typed on the command line.
pub fn value_name<T: ValueEnum>(value: &T) -> Option<String> {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
}

// ============================================================================
// Resource commands
// ============================================================================

/// Arguments shared by every resource kind.
#[derive(Args)]
pub struct CommonArgs {
    /// Target state
    #[arg(short, long, value_enum)]
    pub state: StateArg,

    /// Id of an existing resource (omit to create)
    #[arg(long)]
    pub id: Option<String>,

    /// Name of a new resource [default: default]
    #[arg(long)]
    pub name: Option<String>,

    /// Description of a new resource
    #[arg(long)]
    pub desc: Option<String>,

    /// Icon of a new resource, looked up by name
    #[arg(long)]
    pub icon: Option<String>,

    /// Tag of a new resource (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

#[derive(Args)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// CPU cores [default: 1]
    #[arg(long)]
    pub cpu: Option<u32>,

    /// Memory in GiB [default: 1]
    #[arg(long)]
    pub mem: Option<u32>,

    /// Boot the new server once created
    #[arg(long)]
    pub boot: bool,

    /// Power off instead of shutting down
    #[arg(long)]
    pub force: bool,

    /// Archive to copy onto a boot disk created with the server
    #[arg(long, value_name = "ID")]
    pub disk_archive_id: Option<String>,

    /// Boot disk plan
    #[arg(long, value_enum, requires = "disk_archive_id")]
    pub disk_plan: Option<DiskPlanArg>,

    /// Boot disk size in GiB [default: 20]
    #[arg(long, requires = "disk_archive_id")]
    pub disk_size_gib: Option<u32>,

    /// Host name written onto the boot disk
    #[arg(long, requires = "disk_archive_id")]
    pub host_name: Option<String>,

    /// Administrator password written onto the boot disk
    #[arg(long, requires = "disk_archive_id")]
    pub password: Option<String>,

    /// Public key written onto the boot disk
    #[arg(long, requires = "disk_archive_id")]
    pub ssh_key: Option<String>,
}

#[derive(Args)]
pub struct DiskArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Server to attach to or detach from
    #[arg(long)]
    pub server_id: Option<String>,

    /// Archive to copy onto the new disk
    #[arg(long)]
    pub archive_id: Option<String>,

    /// Storage class [default: ssd]
    #[arg(long, value_enum)]
    pub plan: Option<DiskPlanArg>,

    /// Size in GiB [default: 20]
    #[arg(long)]
    pub size_gib: Option<u32>,

    /// Host name to write onto the disk
    #[arg(long)]
    pub config_host_name: Option<String>,

    /// Administrator password to write onto the disk
    #[arg(long)]
    pub config_password: Option<String>,

    /// IPv4 address to write onto the disk
    #[arg(long)]
    pub config_ip_address: Option<String>,

    /// Public key to write onto the disk
    #[arg(long)]
    pub config_ssh_key: Option<String>,

    /// Netmask length to write onto the disk
    #[arg(long)]
    pub config_network_mask_len: Option<u8>,

    /// Default route to write onto the disk
    #[arg(long)]
    pub config_default_route: Option<String>,
}

#[derive(Args)]
pub struct RouterArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Server to connect or disconnect
    #[arg(long)]
    pub server_id: Option<String>,

    /// Band width in Mbps: 100, 500 or 1000 [default: 100]
    #[arg(long)]
    pub band_width_mbps: Option<u32>,

    /// Netmask length of the new subnet: 26, 27 or 28 [default: 28]
    #[arg(long)]
    pub network_mask_len: Option<u8>,

    /// Server to connect to the new router's switch
    #[arg(long, value_name = "SERVER_ID")]
    pub connect: Option<String>,
}

#[derive(Args)]
pub struct LoadBalancerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Router whose switch the appliance joins
    #[arg(long)]
    pub router_id: Option<String>,

    /// VRRP group id
    #[arg(long)]
    pub vrid: Option<u32>,

    /// Address of the appliance (repeatable)
    #[arg(long = "real-ip", value_name = "IP")]
    pub real_ips: Vec<String>,

    /// Address clients connect to
    #[arg(long)]
    pub virtual_ip: Option<String>,

    /// Port of the virtual IP [default: 80]
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds between health checks [default: 10]
    #[arg(long)]
    pub delay_loop: Option<u32>,

    /// Address of a backend server (repeatable)
    #[arg(long = "lbserver-ip", value_name = "IP")]
    pub lbserver_ips: Vec<String>,

    /// Port of the backend servers [default: 80]
    #[arg(long)]
    pub lbserver_port: Option<u16>,

    /// Health check protocol [default: http]
    #[arg(long, value_enum)]
    pub lbserver_protocol: Option<ProtocolArg>,

    /// Health check path for http and https [default: /index.html]
    #[arg(long)]
    pub lbserver_path: Option<String>,

    /// Expected health check status for http and https [default: 200]
    #[arg(long)]
    pub lbserver_response: Option<u16>,

    /// Use the high-spec plan
    #[arg(long)]
    pub high_spec: bool,

    /// Power off instead of shutting down
    #[arg(long)]
    pub force: bool,
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// Manifest to apply [default: ~/.config/sacloud-converge/manifest.toml]
    pub manifest: Option<PathBuf>,

    /// Resources reconciled at once
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_server() {
        let cli = Cli::try_parse_from([
            "sacloud-converge",
            "--zone",
            "tk1a",
            "server",
            "--state",
            "present",
            "--cpu",
            "2",
            "--tag",
            "web",
            "--tag",
            "prod",
        ])
        .unwrap();
        assert!(matches!(cli.zone, Some(ZoneArg::Tk1a)));
        let Command::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.cpu, Some(2));
        assert_eq!(args.common.tags, vec!["web", "prod"]);
        assert!(args.common.id.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sacloud-converge",
            "lb",
            "--state",
            "stopped",
            "--id",
            "77",
            "--force",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert!(cli.json);
        assert!(matches!(cli.command, Command::LoadBalancer(_)));
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let result = Cli::try_parse_from(["sacloud-converge", "disk", "--state", "started"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_boot_disk_flags_need_archive() {
        let result = Cli::try_parse_from([
            "sacloud-converge",
            "server",
            "--state",
            "present",
            "--host-name",
            "web01",
        ]);
        assert!(result.is_err());
    }
}
