use std::process::ExitCode;

use anyhow::Result;
use converge::{Attributes, DesiredState, Engine, Outcome, Poller, adapter_for};
use sacloud::{ResourceKind, ResourceRef};
use serde_json::Value;

use crate::Context;
use crate::cli::{CommonArgs, DiskArgs, LoadBalancerArgs, RouterArgs, ServerArgs, value_name};
use crate::commands::{connect, show_progress};
use crate::config::{self, Manifest, Settings};
use crate::progress::WaitSpinner;
use crate::ui;

fn put<V: Into<Value>>(attributes: &mut Attributes, key: &str, value: Option<V>) {
    if let Some(value) = value {
        attributes.insert(key, value);
    }
}

fn put_flag(attributes: &mut Attributes, key: &str, set: bool) {
    if set {
        attributes.insert(key, true);
    }
}

fn put_list(attributes: &mut Attributes, key: &str, values: &[String]) {
    if !values.is_empty() {
        attributes.insert(key, values.to_vec());
    }
}

fn common_attributes(common: &CommonArgs) -> Attributes {
    let mut attributes = Attributes::new();
    put(&mut attributes, "name", common.name.clone());
    put(&mut attributes, "desc", common.desc.clone());
    put(&mut attributes, "icon", common.icon.clone());
    put_list(&mut attributes, "tags", &common.tags);
    attributes
}

pub fn server_attributes(args: &ServerArgs) -> Attributes {
    let mut attributes = common_attributes(&args.common);
    put(&mut attributes, "cpu", args.cpu);
    put(&mut attributes, "mem", args.mem);
    put_flag(&mut attributes, "boot", args.boot);
    put_flag(&mut attributes, "force", args.force);

    if let Some(archive_id) = &args.disk_archive_id {
        let mut disk = Attributes::new();
        disk.insert("archive_id", archive_id.as_str());
        put(&mut disk, "plan", args.disk_plan.as_ref().and_then(value_name));
        put(&mut disk, "size_gib", args.disk_size_gib);
        put(&mut disk, "host_name", args.host_name.clone());
        put(&mut disk, "password", args.password.clone());
        put(&mut disk, "ssh_key", args.ssh_key.clone());
        attributes.insert("disk", disk);
    }
    attributes
}

pub fn disk_attributes(args: &DiskArgs) -> Attributes {
    let mut attributes = common_attributes(&args.common);
    put(&mut attributes, "server_id", args.server_id.clone());
    put(&mut attributes, "archive_id", args.archive_id.clone());
    put(&mut attributes, "plan", args.plan.as_ref().and_then(value_name));
    put(&mut attributes, "size_gib", args.size_gib);
    put(&mut attributes, "host_name", args.config_host_name.clone());
    put(&mut attributes, "password", args.config_password.clone());
    put(&mut attributes, "ip_address", args.config_ip_address.clone());
    put(&mut attributes, "ssh_key", args.config_ssh_key.clone());
    put(&mut attributes, "network_mask_len", args.config_network_mask_len);
    put(&mut attributes, "default_route", args.config_default_route.clone());
    attributes
}

pub fn router_attributes(args: &RouterArgs) -> Attributes {
    let mut attributes = common_attributes(&args.common);
    put(&mut attributes, "server_id", args.server_id.clone());
    put(&mut attributes, "band_width_mbps", args.band_width_mbps);
    put(&mut attributes, "network_mask_len", args.network_mask_len);
    put(&mut attributes, "connect", args.connect.clone());
    attributes
}

pub fn load_balancer_attributes(args: &LoadBalancerArgs) -> Attributes {
    let mut attributes = common_attributes(&args.common);
    put(&mut attributes, "router_id", args.router_id.clone());
    put(&mut attributes, "vrid", args.vrid);
    put_list(&mut attributes, "real_ips", &args.real_ips);
    put(&mut attributes, "virtual_ip", args.virtual_ip.clone());
    put(&mut attributes, "port", args.port);
    put(&mut attributes, "delay_loop", args.delay_loop);
    put_list(&mut attributes, "lbserver_ips", &args.lbserver_ips);
    put(&mut attributes, "lbserver_port", args.lbserver_port);
    put(
        &mut attributes,
        "lbserver_protocol",
        args.lbserver_protocol.as_ref().and_then(value_name),
    );
    put(&mut attributes, "lbserver_path", args.lbserver_path.clone());
    put(&mut attributes, "lbserver_response", args.lbserver_response);
    put_flag(&mut attributes, "high_spec", args.high_spec);
    put_flag(&mut attributes, "force", args.force);
    attributes
}

/// Reconcile one resource described on the command line.
pub fn run(
    ctx: &Context,
    kind: ResourceKind,
    common: &CommonArgs,
    attributes: Attributes,
) -> Result<ExitCode> {
    let reference = ResourceRef::new(kind, common.id.clone());
    let outcome = match reconcile(ctx, reference.clone(), common, attributes) {
        Ok(outcome) => outcome,
        Err(err) => Outcome::from_error(&err),
    };

    if ctx.json {
        ui::json(&outcome)?;
    } else {
        ui::outcome(&reference.to_string(), &outcome, ctx.dry_run);
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn reconcile(
    ctx: &Context,
    reference: ResourceRef,
    common: &CommonArgs,
    attributes: Attributes,
) -> converge::Result<Outcome> {
    let desired =
        DesiredState::new(reference, common.state.into(), attributes)?.with_dry_run(ctx.dry_run);
    adapter_for(desired.kind()).validate(&desired)?;

    // The default manifest only contributes credentials and polling here.
    let manifest = config::default_manifest_path()
        .and_then(|path| Manifest::load_optional(&path))
        .unwrap_or_else(|e| {
            log::warn!("ignoring default manifest: {e:#}");
            None
        });
    let settings = Settings::resolve(&ctx.overrides, manifest.as_ref())?;
    let cloud = connect(&settings)?;

    let spinner = WaitSpinner::new(show_progress(ctx));
    let poller = Poller::new(settings.budget).with_observer(&spinner);
    let result = Engine::new(&cloud).with_poller(poller).reconcile(&desired);
    spinner.finish();
    Ok(Outcome::from(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["sacloud-converge"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_server_boot_disk_table() {
        let Command::Server(args) = parse(&[
            "server",
            "--state",
            "running",
            "--name",
            "web01",
            "--disk-archive-id",
            "112900000001",
            "--disk-plan",
            "hdd",
            "--host-name",
            "web01",
        ]) else {
            panic!("expected server command");
        };
        let attributes = server_attributes(&args);
        let disk = attributes.table("disk").unwrap().unwrap();

        assert_eq!(attributes.str("name").unwrap(), Some("web01"));
        assert_eq!(disk.str("archive_id").unwrap(), Some("112900000001"));
        assert_eq!(disk.str("plan").unwrap(), Some("hdd"));
        assert_eq!(disk.str("host_name").unwrap(), Some("web01"));
        assert!(!attributes.contains("boot"));
    }

    #[test]
    fn test_disk_config_flags_drop_prefix() {
        let Command::Disk(args) = parse(&[
            "disk",
            "--state",
            "present",
            "--archive-id",
            "112900000001",
            "--config-ip-address",
            "192.0.2.10",
            "--config-network-mask-len",
            "24",
        ]) else {
            panic!("expected disk command");
        };
        let attributes = disk_attributes(&args);
        assert_eq!(attributes.str("ip_address").unwrap(), Some("192.0.2.10"));
        assert_eq!(attributes.u64("network_mask_len").unwrap(), Some(24));
        assert!(!attributes.contains("config_ip_address"));
    }

    #[test]
    fn test_load_balancer_lists_and_protocol() {
        let Command::LoadBalancer(args) = parse(&[
            "lb",
            "--state",
            "present",
            "--router-id",
            "9",
            "--vrid",
            "1",
            "--real-ip",
            "192.0.2.11",
            "--real-ip",
            "192.0.2.12",
            "--lbserver-protocol",
            "tcp",
            "--high-spec",
        ]) else {
            panic!("expected lb command");
        };
        let attributes = load_balancer_attributes(&args);
        assert_eq!(
            attributes.str_list("real_ips").unwrap(),
            vec!["192.0.2.11", "192.0.2.12"]
        );
        assert_eq!(attributes.str("lbserver_protocol").unwrap(), Some("tcp"));
        assert_eq!(attributes.bool("high_spec").unwrap(), Some(true));
        assert!(!attributes.contains("lbserver_ips"));
    }

    #[test]
    fn test_router_connect() {
        let Command::Router(args) = parse(&[
            "router",
            "--state",
            "connected",
            "--id",
            "9",
            "--server-id",
            "113000000001",
        ]) else {
            panic!("expected router command");
        };
        let attributes = router_attributes(&args);
        assert_eq!(attributes.str("server_id").unwrap(), Some("113000000001"));
        assert_eq!(attributes.str("name").unwrap(), None);
    }
}
