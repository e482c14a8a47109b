//! Volume (disk) adapter.

use sacloud::{
    CloudApi, DiskConfig, DiskPlan, Draft, ObservedStatus, RemoteResource, ResourceKind,
    ResourceRef,
};

use super::KindAdapter;
use super::common::{DEFAULT_NAME, common_fields, positive, validate_common};
use crate::error::{Error, Result};
use crate::types::{Attributes, DesiredState, Facts, StateToken, missing};

pub const DEFAULT_SIZE_GIB: u32 = 20;

pub const FACT_DISK_ID: &str = "sacloud_disk_resource_id";

/// Attributes written onto the disk as guest configuration.
pub const CONFIG_KEYS: [&str; 6] = [
    "host_name",
    "password",
    "ip_address",
    "ssh_key",
    "network_mask_len",
    "default_route",
];

pub struct VolumeAdapter;

/// Guest configuration from the six config attributes.
///
/// Returns an empty config when none is set; writing it is then skipped.
pub fn disk_config(attributes: &Attributes) -> Result<DiskConfig> {
    Ok(DiskConfig {
        host_name: attributes.str("host_name")?.map(str::to_string),
        password: attributes.str("password")?.map(str::to_string),
        ip_address: attributes.str("ip_address")?.map(str::to_string),
        ssh_key: attributes.str("ssh_key")?.map(str::to_string),
        network_mask_len: attributes.int("network_mask_len")?,
        default_route: attributes.str("default_route")?.map(str::to_string),
    })
}

pub fn plan(attributes: &Attributes) -> Result<DiskPlan> {
    match attributes.str("plan")? {
        Some(plan) => plan.parse().map_err(Error::Validation),
        None => Ok(DiskPlan::default()),
    }
}

/// Check volume attributes without any remote call.
pub fn validate_attributes(attributes: &Attributes) -> Result<()> {
    validate_common(attributes)?;
    plan(attributes)?;
    if let Some(size) = attributes.int::<u32>("size_gib")? {
        positive("size_gib", size)?;
    }
    attributes.str("archive_id")?;
    if let Some(len) = attributes.int::<u8>("network_mask_len")?
        && !(8..=32).contains(&len)
    {
        return Err(Error::validation(format!(
            "'network_mask_len' must be between 8 and 32, got {len}"
        )));
    }
    disk_config(attributes)?;
    Ok(())
}

/// Draft for a new disk; `default_name` applies when no name is given.
pub fn draft(api: &dyn CloudApi, attributes: &Attributes, default_name: &str) -> Result<Draft> {
    let source_archive_id = match attributes.str("archive_id")? {
        Some(id) => {
            let reference = ResourceRef::new(ResourceKind::Volume, None);
            Some(
                api.find_archive(id)
                    .map_err(Error::lookup("find archive", &reference))?
                    .id,
            )
        }
        None => None,
    };
    Ok(Draft::Disk {
        common: common_fields(api, attributes, default_name)?,
        plan: plan(attributes)?,
        size_gib: attributes.int("size_gib")?.unwrap_or(DEFAULT_SIZE_GIB),
        source_archive_id,
    })
}

impl KindAdapter for VolumeAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn legal_states(&self) -> &'static [StateToken] {
        &[
            StateToken::Present,
            StateToken::Absent,
            StateToken::Connected,
            StateToken::Disconnected,
        ]
    }

    fn id_fact(&self) -> &'static str {
        FACT_DISK_ID
    }

    fn validate(&self, desired: &DesiredState) -> Result<()> {
        validate_attributes(&desired.attributes)?;
        let server_id = desired.attributes.str("server_id")?;
        if desired.target == StateToken::Connected && server_id.is_none() {
            return Err(missing("server_id"));
        }
        Ok(())
    }

    fn build(&self, api: &dyn CloudApi, attributes: &Attributes) -> Result<Draft> {
        draft(api, attributes, DEFAULT_NAME)
    }

    fn extract_facts(&self, _api: &dyn CloudApi, resource: &RemoteResource) -> Result<Facts> {
        let mut facts = Facts::new();
        facts.insert(FACT_DISK_ID.to_string(), resource.id.clone().into());
        if let Some(server) = resource.attached_server() {
            facts.insert(super::compute::FACT_SERVER_ID.to_string(), server.into());
        }
        Ok(facts)
    }

    fn ready_status(&self) -> Option<ObservedStatus> {
        Some(ObservedStatus::Up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use sacloud::Zone;
    use sacloud::memory::MemoryCloud;

    #[test]
    fn test_disk_config_empty_without_config_keys() {
        let attrs = Attributes::new().with("size_gib", 40).with("plan", "hdd");
        assert!(disk_config(&attrs).unwrap().is_empty());
    }

    #[test]
    fn test_disk_config_picks_each_key() {
        let attrs = Attributes::new()
            .with("host_name", "web01")
            .with("network_mask_len", 24);
        let config = disk_config(&attrs).unwrap();
        assert_eq!(config.host_name.as_deref(), Some("web01"));
        assert_eq!(config.network_mask_len, Some(24));
        assert!(config.password.is_none());
    }

    #[test]
    fn test_draft_defaults() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let draft = draft(&cloud, &Attributes::new(), DEFAULT_NAME).unwrap();
        assert_eq!(
            draft,
            Draft::Disk {
                common: sacloud::CommonFields {
                    name: "default".to_string(),
                    ..Default::default()
                },
                plan: DiskPlan::Ssd,
                size_gib: 20,
                source_archive_id: None,
            }
        );
    }

    #[test]
    fn test_unknown_archive_is_not_found() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let attrs = Attributes::new().with("archive_id", "999");
        let err = draft(&cloud, &attrs, DEFAULT_NAME).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_validation_rejects_bad_plan_and_size() {
        let attrs = Attributes::new().with("plan", "nvme");
        assert!(validate_attributes(&attrs).is_err());
        let attrs = Attributes::new().with("size_gib", 0);
        assert!(validate_attributes(&attrs).is_err());
    }

    #[test]
    fn test_connected_requires_server_id() {
        let desired = DesiredState::new(
            ResourceRef::existing(ResourceKind::Volume, "45"),
            StateToken::Connected,
            Attributes::new(),
        )
        .unwrap();
        let err = VolumeAdapter.validate(&desired).unwrap_err();
        assert_eq!(err.to_string(), "invalid parameters: missing required arguments: server_id");
    }
}
