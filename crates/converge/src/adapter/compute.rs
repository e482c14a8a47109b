//! Compute (server) adapter, including the bootstrap disk of a new server.

use log::debug;
use sacloud::{CloudApi, DiskConfig, Draft, RemoteResource, ResourceKind, ResourceRef};

use super::KindAdapter;
use super::common::{DEFAULT_NAME, common_fields, positive, validate_common};
use super::volume;
use crate::error::{Error, Result};
use crate::types::{Attributes, DesiredState, Facts, StateToken, missing};

pub const DEFAULT_CPU: u32 = 1;
pub const DEFAULT_MEMORY_GIB: u32 = 1;

/// Netmask of the shared segment.
pub const SHARED_SEGMENT_MASK_LEN: u8 = 24;

pub const FACT_SERVER_ID: &str = "sacloud_server_resource_id";
pub const FACT_IP_ADDRESS: &str = "sacloud_ip_address";

pub struct ComputeAdapter;

fn spec(attributes: &Attributes) -> Result<(u32, u32)> {
    let cpu = positive("cpu", attributes.int("cpu")?.unwrap_or(DEFAULT_CPU))?;
    let mem = positive("mem", attributes.int("mem")?.unwrap_or(DEFAULT_MEMORY_GIB))?;
    Ok((cpu, mem))
}

/// Attributes of the boot disk created along with a new server, if any.
///
/// The disk is named after the server unless it has a name of its own.
pub fn bootstrap_disk(attributes: &Attributes) -> Result<Option<Attributes>> {
    let Some(mut disk) = attributes.table("disk")? else {
        return Ok(None);
    };
    if !disk.contains("name")
        && let Some(name) = attributes.str("name")?
    {
        disk.insert("name", name);
    }
    Ok(Some(disk))
}

/// Whether the new server is booted once everything is attached.
pub fn boot_after_create(attributes: &Attributes) -> Result<bool> {
    Ok(attributes.bool("boot")?.unwrap_or(false))
}

/// Gateway of the shared segment: the NIC address with last octet 1.
fn shared_gateway(address: &str) -> Result<String> {
    address
        .rsplit_once('.')
        .map(|(network, _)| format!("{network}.1"))
        .ok_or_else(|| Error::NotFound(format!("'{address}' is not an IPv4 address")))
}

/// Guest configuration for the boot disk of a new server.
///
/// Addressing comes from the server's shared-segment NIC; host name,
/// password and key come from the disk attributes.
pub fn bootstrap_config(disk: &Attributes, nic_address: &str) -> Result<DiskConfig> {
    Ok(DiskConfig {
        host_name: disk.str("host_name")?.map(str::to_string),
        password: disk.str("password")?.map(str::to_string),
        ssh_key: disk.str("ssh_key")?.map(str::to_string),
        ip_address: Some(nic_address.to_string()),
        network_mask_len: Some(SHARED_SEGMENT_MASK_LEN),
        default_route: Some(shared_gateway(nic_address)?),
    })
}

impl KindAdapter for ComputeAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Compute
    }

    fn legal_states(&self) -> &'static [StateToken] {
        &[
            StateToken::Present,
            StateToken::Absent,
            StateToken::Stopped,
            StateToken::Running,
        ]
    }

    fn id_fact(&self) -> &'static str {
        FACT_SERVER_ID
    }

    fn validate(&self, desired: &DesiredState) -> Result<()> {
        let attributes = &desired.attributes;
        validate_common(attributes)?;
        spec(attributes)?;
        boot_after_create(attributes)?;
        self.stop_mode(attributes)?;
        if let Some(disk) = bootstrap_disk(attributes)? {
            volume::validate_attributes(&disk)?;
            if !disk.contains("archive_id") {
                return Err(missing("disk.archive_id"));
            }
        }
        Ok(())
    }

    fn build(&self, api: &dyn CloudApi, attributes: &Attributes) -> Result<Draft> {
        let (cpu, mem) = spec(attributes)?;
        let reference = ResourceRef::new(ResourceKind::Compute, None);
        let plan = api
            .find_server_plan(cpu, mem)
            .map_err(Error::lookup("find server plan", &reference))?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no server plan with {cpu} core(s) and {mem} GiB memory"
                ))
            })?;
        debug!("server plan for {cpu} core(s) / {mem} GiB: {}", plan.id);
        Ok(Draft::Server {
            common: common_fields(api, attributes, DEFAULT_NAME)?,
            plan_id: plan.id,
        })
    }

    fn extract_facts(&self, _api: &dyn CloudApi, resource: &RemoteResource) -> Result<Facts> {
        let mut facts = Facts::new();
        facts.insert(FACT_SERVER_ID.to_string(), resource.id.clone().into());
        if let Some(disk) = resource.attached_disks().first() {
            facts.insert(volume::FACT_DISK_ID.to_string(), disk.clone().into());
        }
        if let Some(address) = resource
            .interfaces()
            .iter()
            .find_map(|i| i.ip_address.clone())
        {
            facts.insert(FACT_IP_ADDRESS.to_string(), address.into());
        }
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use sacloud::memory::MemoryCloud;
    use sacloud::{ObservedStatus, Zone};
    use serde_json::json;

    #[test]
    fn test_build_uses_exact_plan() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let attrs = Attributes::new().with("cpu", 2).with("mem", 4);
        let Draft::Server { plan_id, common } = ComputeAdapter.build(&cloud, &attrs).unwrap()
        else {
            panic!("expected a server draft");
        };
        assert_eq!(plan_id, "2004");
        assert_eq!(common.name, "default");
    }

    #[test]
    fn test_missing_plan_is_not_found() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let attrs = Attributes::new().with("cpu", 3).with("mem", 3);
        let err = ComputeAdapter.build(&cloud, &attrs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_bootstrap_disk_inherits_server_name() {
        let attrs = Attributes::new()
            .with("name", "web01")
            .with("disk", json!({ "archive_id": "1" }));
        let disk = bootstrap_disk(&attrs).unwrap().unwrap();
        assert_eq!(disk.str("name").unwrap(), Some("web01"));
    }

    #[test]
    fn test_bootstrap_disk_requires_archive() {
        let desired = DesiredState::new(
            ResourceRef::new(ResourceKind::Compute, None),
            StateToken::Present,
            Attributes::new().with("disk", json!({ "size_gib": 40 })),
        )
        .unwrap();
        let err = ComputeAdapter.validate(&desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_bootstrap_config_from_nic() {
        let disk = Attributes::new()
            .with("host_name", "web01")
            .with("password", "secret");
        let config = bootstrap_config(&disk, "192.0.2.10").unwrap();
        assert_eq!(config.ip_address.as_deref(), Some("192.0.2.10"));
        assert_eq!(config.default_route.as_deref(), Some("192.0.2.1"));
        assert_eq!(config.network_mask_len, Some(24));
        assert_eq!(config.host_name.as_deref(), Some("web01"));
    }

    #[test]
    fn test_zero_cpu_is_invalid() {
        let desired = DesiredState::new(
            ResourceRef::new(ResourceKind::Compute, None),
            StateToken::Present,
            Attributes::new().with("cpu", 0),
        )
        .unwrap();
        assert!(ComputeAdapter.validate(&desired).is_err());
    }

    #[test]
    fn test_facts() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Down)
            .with_disk("2", Some("1"));
        let server = cloud.resource(ResourceKind::Compute, "1").unwrap();
        let facts = ComputeAdapter.extract_facts(&cloud, &server).unwrap();
        assert_eq!(facts[FACT_SERVER_ID], "1");
        assert_eq!(facts[volume::FACT_DISK_ID], "2");
        assert!(!facts.contains_key(FACT_IP_ADDRESS));
    }
}
