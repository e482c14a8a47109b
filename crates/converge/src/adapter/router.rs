//! Router adapter.
//!
//! The band width of an existing router can be changed; its netmask cannot.

use sacloud::{
    CloudApi, Draft, ObservedStatus, RemoteResource, ResourceDetails, ResourceKind, SwitchTarget,
};

use super::KindAdapter;
use super::common::{DEFAULT_NAME, common_fields, one_of, validate_common};
use crate::error::{Error, Result};
use crate::types::{Attributes, DesiredState, Facts, StateToken, missing};

pub const BAND_WIDTHS_MBPS: [u32; 3] = [100, 500, 1000];
pub const NETWORK_MASK_LENS: [u8; 3] = [26, 27, 28];
pub const DEFAULT_BAND_WIDTH_MBPS: u32 = 100;
pub const DEFAULT_NETWORK_MASK_LEN: u8 = 28;

pub const FACT_ROUTER_ID: &str = "sacloud_router_resource_id";
pub const FACT_DEFAULT_ROUTE: &str = "sacloud_default_route";
pub const FACT_IPV4_ADDRESS: &str = "sacloud_ipv4_address";

pub struct RouterAdapter;

/// Band width asked for, if any.
pub fn requested_band_width(attributes: &Attributes) -> Result<Option<u32>> {
    attributes
        .int("band_width_mbps")?
        .map(|mbps| one_of("band_width_mbps", mbps, &BAND_WIDTHS_MBPS))
        .transpose()
}

fn requested_mask_len(attributes: &Attributes) -> Result<Option<u8>> {
    attributes
        .int("network_mask_len")?
        .map(|len| one_of("network_mask_len", len, &NETWORK_MASK_LENS))
        .transpose()
}

/// Current band width of a router.
pub fn band_width(router: &RemoteResource) -> Option<u32> {
    match router.details {
        ResourceDetails::Router {
            band_width_mbps, ..
        } => Some(band_width_mbps),
        _ => None,
    }
}

/// Ids of the server's interfaces plugged into `switch_id`.
pub fn interfaces_on_switch(server: &RemoteResource, switch_id: &str) -> Vec<String> {
    let target = SwitchTarget::Switch(switch_id.to_string());
    server
        .interfaces()
        .iter()
        .filter(|i| i.switch.as_ref() == Some(&target))
        .map(|i| i.id.clone())
        .collect()
}

impl KindAdapter for RouterAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Router
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
        FACT_ROUTER_ID
    }

    fn validate(&self, desired: &DesiredState) -> Result<()> {
        let attributes = &desired.attributes;
        validate_common(attributes)?;
        requested_band_width(attributes)?;
        requested_mask_len(attributes)?;
        attributes.str("connect")?;
        let server_id = attributes.str("server_id")?;
        if matches!(
            desired.target,
            StateToken::Connected | StateToken::Disconnected
        ) && server_id.is_none()
        {
            return Err(missing("server_id"));
        }
        Ok(())
    }

    fn build(&self, api: &dyn CloudApi, attributes: &Attributes) -> Result<Draft> {
        Ok(Draft::Router {
            common: common_fields(api, attributes, DEFAULT_NAME)?,
            network_mask_len: requested_mask_len(attributes)?.unwrap_or(DEFAULT_NETWORK_MASK_LEN),
            band_width_mbps: requested_band_width(attributes)?.unwrap_or(DEFAULT_BAND_WIDTH_MBPS),
        })
    }

    fn extract_facts(&self, api: &dyn CloudApi, resource: &RemoteResource) -> Result<Facts> {
        let mut facts = Facts::new();
        facts.insert(FACT_ROUTER_ID.to_string(), resource.id.clone().into());
        if resource.status != ObservedStatus::Up {
            return Ok(facts);
        }

        let network = api
            .router_network(&resource.id)
            .map_err(Error::lookup("read router network", &resource.reference()))?;
        if let Some(route) = network.default_route {
            facts.insert(FACT_DEFAULT_ROUTE.to_string(), route.into());
        }
        let address = network.unused_ipv4.into_iter().next().ok_or_else(|| {
            Error::NotFound(format!(
                "no unused IPv4 address left behind router {}",
                resource.id
            ))
        })?;
        facts.insert(FACT_IPV4_ADDRESS.to_string(), address.into());
        Ok(facts)
    }

    fn ready_status(&self) -> Option<ObservedStatus> {
        Some(ObservedStatus::Up)
    }
}
