//! Load balancer adapter.
//!
//! A new load balancer lives on the switch behind a router and needs its
//! VRRP group, its real addresses and at least one health-checked backend.
//! All of these are checked before anything is sent.

use sacloud::{
    BackendServer, CloudApi, Draft, HealthCheck, HealthCheckProtocol, LoadBalancerSettings,
    ObservedStatus, RemoteResource, ResourceKind, ResourceRef, VirtualIp,
};

use super::KindAdapter;
use super::common::{DEFAULT_NAME, common_fields, validate_common};
use crate::error::{Error, Result};
use crate::types::{Attributes, DesiredState, Facts, StateToken, missing};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_DELAY_LOOP: u32 = 10;
pub const DEFAULT_LBSERVER_PORT: u16 = 80;
pub const DEFAULT_LBSERVER_PATH: &str = "/index.html";
pub const DEFAULT_LBSERVER_RESPONSE: u16 = 200;

pub const FACT_LB_ID: &str = "sacloud_lb_resource_id";

pub struct LoadBalancerAdapter;

fn protocol(attributes: &Attributes) -> Result<HealthCheckProtocol> {
    match attributes.str("lbserver_protocol")? {
        Some(p) => p.parse().map_err(Error::Validation),
        None => Ok(HealthCheckProtocol::default()),
    }
}

/// Whether settings attributes were supplied.
pub fn has_settings(attributes: &Attributes) -> bool {
    attributes.contains("virtual_ip") || attributes.contains("lbserver_ips")
}

/// Load balancing rules: one virtual IP, one backend per server address.
pub fn settings(attributes: &Attributes) -> Result<LoadBalancerSettings> {
    let address = attributes.require_str("virtual_ip")?.to_string();
    let servers = attributes.str_list("lbserver_ips")?;
    if servers.is_empty() {
        return Err(missing("lbserver_ips"));
    }

    let protocol = protocol(attributes)?;
    let (path, status) = match protocol {
        HealthCheckProtocol::Http | HealthCheckProtocol::Https => (
            Some(
                attributes
                    .str("lbserver_path")?
                    .unwrap_or(DEFAULT_LBSERVER_PATH)
                    .to_string(),
            ),
            Some(
                attributes
                    .int("lbserver_response")?
                    .unwrap_or(DEFAULT_LBSERVER_RESPONSE),
            ),
        ),
        HealthCheckProtocol::Tcp | HealthCheckProtocol::Ping => (None, None),
    };
    let port = attributes
        .int("lbserver_port")?
        .unwrap_or(DEFAULT_LBSERVER_PORT);

    let servers = servers
        .into_iter()
        .map(|ip_address| BackendServer {
            ip_address,
            port,
            health_check: HealthCheck {
                protocol,
                path: path.clone(),
                status,
            },
        })
        .collect();

    Ok(LoadBalancerSettings {
        virtual_ips: vec![VirtualIp {
            address,
            port: attributes.int("port")?.unwrap_or(DEFAULT_PORT),
            delay_loop: attributes.int("delay_loop")?.unwrap_or(DEFAULT_DELAY_LOOP),
            servers,
        }],
    })
}

fn vrid(attributes: &Attributes) -> Result<u32> {
    attributes.int("vrid")?.ok_or_else(|| missing("vrid"))
}

fn real_ips(attributes: &Attributes) -> Result<Vec<String>> {
    let ips = attributes.str_list("real_ips")?;
    if ips.is_empty() {
        return Err(missing("real_ips"));
    }
    Ok(ips)
}

impl KindAdapter for LoadBalancerAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LoadBalancer
    }

    fn legal_states(&self) -> &'static [StateToken] {
        &[
            StateToken::Present,
            StateToken::Absent,
            StateToken::Stopped,
            StateToken::Running,
            StateToken::Applied,
        ]
    }

    fn id_fact(&self) -> &'static str {
        FACT_LB_ID
    }

    fn validate(&self, desired: &DesiredState) -> Result<()> {
        let attributes = &desired.attributes;
        validate_common(attributes)?;
        self.stop_mode(attributes)?;
        attributes.bool("high_spec")?;
        protocol(attributes)?;

        let creating = desired.target == StateToken::Present && desired.reference.id.is_none();
        if creating {
            attributes.require_str("router_id")?;
            vrid(attributes)?;
            real_ips(attributes)?;
            settings(attributes)?;
        } else if desired.target == StateToken::Applied && has_settings(attributes) {
            settings(attributes)?;
        }
        Ok(())
    }

    fn build(&self, api: &dyn CloudApi, attributes: &Attributes) -> Result<Draft> {
        let router_id = attributes.require_str("router_id")?;
        let router = ResourceRef::existing(ResourceKind::Router, router_id);
        let network = api
            .router_network(router_id)
            .map_err(Error::lookup("read router network", &router))?;
        Ok(Draft::LoadBalancer {
            common: common_fields(api, attributes, DEFAULT_NAME)?,
            switch_id: network.switch_id,
            vrid: vrid(attributes)?,
            real_ips: real_ips(attributes)?,
            high_spec: attributes.bool("high_spec")?.unwrap_or(false),
            settings: settings(attributes)?,
        })
    }

    fn extract_facts(&self, _api: &dyn CloudApi, resource: &RemoteResource) -> Result<Facts> {
        let mut facts = Facts::new();
        facts.insert(FACT_LB_ID.to_string(), resource.id.clone().into());
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
    use serde_json::json;

    fn create_attrs() -> Attributes {
        Attributes::new()
            .with("router_id", "9")
            .with("vrid", 1)
            .with("real_ips", json!(["203.0.113.5", "203.0.113.6"]))
            .with("virtual_ip", "203.0.113.10")
            .with("lbserver_ips", json!(["203.0.113.20"]))
    }

    fn create(attributes: Attributes) -> DesiredState {
        DesiredState::new(
            ResourceRef::new(ResourceKind::LoadBalancer, None),
            StateToken::Present,
            attributes,
        )
        .unwrap()
    }

    #[test]
    fn test_create_requires_each_field() {
        for key in ["router_id", "vrid", "real_ips", "virtual_ip", "lbserver_ips"] {
            let mut attrs = create_attrs();
            attrs.insert(key, serde_json::Value::Null);
            let err = LoadBalancerAdapter.validate(&create(attrs)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "missing {key}");
            assert!(err.to_string().contains(key));
        }
        LoadBalancerAdapter.validate(&create(create_attrs())).unwrap();
    }

    #[test]
    fn test_settings_defaults() {
        let settings = settings(&create_attrs()).unwrap();
        let vip = &settings.virtual_ips[0];
        assert_eq!(vip.port, 80);
        assert_eq!(vip.delay_loop, 10);
        assert_eq!(vip.servers.len(), 1);
        let check = &vip.servers[0].health_check;
        assert_eq!(check.protocol, HealthCheckProtocol::Http);
        assert_eq!(check.path.as_deref(), Some("/index.html"));
        assert_eq!(check.status, Some(200));
    }

    #[test]
    fn test_tcp_check_has_no_path() {
        let attrs = create_attrs().with("lbserver_protocol", "tcp");
        let settings = settings(&attrs).unwrap();
        let check = &settings.virtual_ips[0].servers[0].health_check;
        assert_eq!(check.path, None);
        assert_eq!(check.status, None);
    }

    #[test]
    fn test_unknown_protocol_is_invalid() {
        let attrs = create_attrs().with("lbserver_protocol", "udp");
        let err = LoadBalancerAdapter.validate(&create(attrs)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_build_uses_router_switch() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_router("9", 100, 28);
        let draft = LoadBalancerAdapter.build(&cloud, &create_attrs()).unwrap();
        let Draft::LoadBalancer {
            switch_id, vrid, ..
        } = draft
        else {
            panic!("expected a load balancer draft");
        };
        assert_eq!(switch_id, "sw-9");
        assert_eq!(vrid, 1);
    }

    #[test]
    fn test_applied_without_settings_is_valid() {
        let desired = DesiredState::new(
            ResourceRef::existing(ResourceKind::LoadBalancer, "77"),
            StateToken::Applied,
            Attributes::new(),
        )
        .unwrap();
        LoadBalancerAdapter.validate(&desired).unwrap();
    }

    #[test]
    fn test_applied_with_partial_settings_is_invalid() {
        let desired = DesiredState::new(
            ResourceRef::existing(ResourceKind::LoadBalancer, "77"),
            StateToken::Applied,
            Attributes::new().with("virtual_ip", "203.0.113.10"),
        )
        .unwrap();
        let err = LoadBalancerAdapter.validate(&desired).unwrap_err();
        assert!(err.to_string().contains("lbserver_ips"));
    }
}
