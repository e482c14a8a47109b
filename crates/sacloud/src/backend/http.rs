//! SAKURA Cloud REST API backend.
//!
//! This module provides [`HttpCloud`], the [`CloudApi`] implementation that
//! talks to the zone's JSON API over HTTPS with Basic authentication.
//!
//! Catalog lookups (icons, server plans, free addresses) fetch the whole
//! collection and filter locally; the collections involved are small.

use std::net::Ipv4Addr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::backend::CloudApi;
use crate::error::{Error, Result};
use crate::types::{
    Archive, BackendServer, CommonFields, Credentials, DiskConfig, Draft, HealthCheck, Icon,
    Interface, LoadBalancerSettings, ObservedStatus, RemoteResource, ResourceDetails, ResourceKind,
    RouterNetwork, ServerPlan, StopMode, SwitchTarget, VirtualIp, Zone,
};

/// Default API endpoint; `{zone}` is substituted.
const DEFAULT_API_BASE: &str = "https://secure.sakura.ad.jp/cloud/zone/{zone}/api/cloud/1.1";

/// Load balancer appliance plans.
const LB_PLAN_STANDARD: u32 = 1;
const LB_PLAN_HIGH_SPEC: u32 = 2;

/// SAKURA Cloud REST backend bound to one zone.
///
/// # Example
///
/// ```no_run
/// use sacloud::http::HttpCloud;
/// use sacloud::{CloudApi, Credentials, ResourceKind, Zone};
///
/// let cloud = HttpCloud::new(Credentials::new("token", "secret"), Zone::Is1a);
/// cloud.check_auth().unwrap();
/// let server = cloud.find(ResourceKind::Compute, "113000000000").unwrap();
/// println!("{} is {}", server.name, server.status);
/// ```
pub struct HttpCloud {
    agent: ureq::Agent,
    api_base: String,
    authorization: String,
    zone: Zone,
}

impl HttpCloud {
    /// Create a backend for the public API of `zone`.
    #[must_use]
    pub fn new(credentials: Credentials, zone: Zone) -> Self {
        Self::with_api_base(
            credentials,
            zone,
            DEFAULT_API_BASE.replace("{zone}", zone.as_str()),
        )
    }

    /// Create a backend with a custom API base (for testing).
    #[must_use]
    pub fn with_api_base(
        credentials: Credentials,
        zone: Zone,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            api_base: api_base.into(),
            authorization: basic_auth(&credentials),
            zone,
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Verify the credentials against the zone.
    pub fn check_auth(&self) -> Result<()> {
        let url = self.url("auth-status");
        self.agent
            .get(&url)
            .header("Authorization", &self.authorization)
            .call()
            .map_err(|e| match Error::from(e) {
                Error::Api { status, message } => Error::Auth {
                    message: format!(
                        "zone {} refused the credentials ({status}: {message})",
                        self.zone
                    ),
                },
                other => other,
            })?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        self.url(&format!("{}/{}", collection(kind), id))
    }

    // =========================================================================
    // Request helpers
    // =========================================================================

    fn get(&self, url: &str, target: Option<(ResourceKind, &str)>) -> Result<Value> {
        debug!("GET {url}");
        let value = self
            .agent
            .get(url)
            .header("Authorization", &self.authorization)
            .call()
            .map_err(|e| map_error(e, target))?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value> {
        debug!("POST {url}");
        let value = self
            .agent
            .post(url)
            .header("Authorization", &self.authorization)
            .send_json(body)?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn put(
        &self,
        url: &str,
        body: Option<&Value>,
        target: Option<(ResourceKind, &str)>,
    ) -> Result<Value> {
        debug!("PUT {url}");
        let request = self
            .agent
            .put(url)
            .header("Authorization", &self.authorization);
        let mut response = match body {
            Some(body) => request.send_json(body),
            None => request.send_empty(),
        }
        .map_err(|e| map_error(e, target))?;
        Ok(response.body_mut().read_json()?)
    }

    fn delete(
        &self,
        url: &str,
        body: Option<&Value>,
        target: Option<(ResourceKind, &str)>,
    ) -> Result<()> {
        debug!("DELETE {url}");
        let request = self
            .agent
            .delete(url)
            .header("Authorization", &self.authorization);
        match body {
            Some(body) => request.force_send_body().send_json(body),
            None => request.call(),
        }
        .map_err(|e| map_error(e, target))?;
        Ok(())
    }

    fn switch(&self, switch_id: &str) -> Result<ApiSwitch> {
        let value = self.get(&self.url(&format!("switch/{switch_id}")), None)?;
        envelope(value, "Switch")
    }
}

fn basic_auth(credentials: &Credentials) -> String {
    let raw = format!("{}:{}", credentials.token, credentials.secret);
    format!("Basic {}", STANDARD.encode(raw))
}

fn map_error(err: ureq::Error, target: Option<(ResourceKind, &str)>) -> Error {
    match err {
        ureq::Error::StatusCode(code) => Error::from_status(code, target),
        other => other.into(),
    }
}

/// API collection holding a resource kind.
fn collection(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Compute => "server",
        ResourceKind::Volume => "disk",
        ResourceKind::Router => "internet",
        ResourceKind::LoadBalancer => "appliance",
    }
}

/// Key wrapping a single object of a kind in request and response bodies.
fn envelope_key(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Compute => "Server",
        ResourceKind::Volume => "Disk",
        ResourceKind::Router => "Internet",
        ResourceKind::LoadBalancer => "Appliance",
    }
}

fn envelope<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T> {
    let inner = value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| Error::Decode(format!("missing '{key}' in response")))?;
    Ok(serde_json::from_value(inner)?)
}

fn decode_resource(kind: ResourceKind, value: Value) -> Result<RemoteResource> {
    let key = envelope_key(kind);
    match kind {
        ResourceKind::Compute => Ok(envelope::<ApiServer>(value, key)?.into()),
        ResourceKind::Volume => Ok(envelope::<ApiDisk>(value, key)?.into()),
        ResourceKind::Router => Ok(envelope::<ApiInternet>(value, key)?.into()),
        ResourceKind::LoadBalancer => envelope::<ApiAppliance>(value, key)?.try_into(),
    }
}

/// IDs come back as strings for resources and as numbers for products.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Decode(format!("invalid {field} '{value}'")))
}

/// Addresses in `min..=max` not present in `used`, ascending.
fn unused_addresses(min: Ipv4Addr, max: Ipv4Addr, used: &[String]) -> Vec<String> {
    (u32::from(min)..=u32::from(max))
        .map(|n| Ipv4Addr::from(n).to_string())
        .filter(|addr| !used.contains(addr))
        .collect()
}

fn common_body(common: &CommonFields) -> Value {
    let mut body = json!({
        "Name": common.name,
        "Tags": common.tags,
    });
    if let Some(description) = &common.description {
        body["Description"] = json!(description);
    }
    if let Some(icon) = &common.icon_id {
        body["Icon"] = json!({ "ID": icon });
    }
    body
}

fn settings_body(settings: &LoadBalancerSettings) -> Value {
    let virtual_ips: Vec<Value> = settings
        .virtual_ips
        .iter()
        .map(|vip| {
            let servers: Vec<Value> = vip
                .servers
                .iter()
                .map(|s| {
                    let mut check = json!({ "Protocol": s.health_check.protocol.as_str() });
                    if let Some(path) = &s.health_check.path {
                        check["Path"] = json!(path);
                    }
                    if let Some(status) = s.health_check.status {
                        check["Status"] = json!(status.to_string());
                    }
                    json!({
                        "IPAddress": s.ip_address,
                        "Port": s.port.to_string(),
                        "HealthCheck": check,
                    })
                })
                .collect();
            json!({
                "VirtualIPAddress": vip.address,
                "Port": vip.port.to_string(),
                "DelayLoop": vip.delay_loop.to_string(),
                "Servers": servers,
            })
        })
        .collect();
    json!({ "LoadBalancer": virtual_ips })
}

fn disk_config_body(config: &DiskConfig) -> Value {
    let mut body = json!({});
    if let Some(host) = &config.host_name {
        body["HostName"] = json!(host);
    }
    if let Some(password) = &config.password {
        body["Password"] = json!(password);
    }
    if let Some(key) = &config.ssh_key {
        body["SSHKey"] = json!({ "PublicKey": key });
    }
    if let Some(ip) = &config.ip_address {
        body["UserIPAddress"] = json!(ip);
    }
    if config.default_route.is_some() || config.network_mask_len.is_some() {
        let mut subnet = json!({});
        if let Some(route) = &config.default_route {
            subnet["DefaultRoute"] = json!(route);
        }
        if let Some(len) = config.network_mask_len {
            subnet["NetworkMaskLen"] = json!(len);
        }
        body["UserSubnet"] = subnet;
    }
    body
}

impl CloudApi for HttpCloud {
    fn zone(&self) -> Zone {
        self.zone
    }

    fn find(&self, kind: ResourceKind, id: &str) -> Result<RemoteResource> {
        let value = self.get(&self.resource_url(kind, id), Some((kind, id)))?;
        decode_resource(kind, value)
    }

    fn find_server_plan(&self, cpu: u32, memory_gib: u32) -> Result<Option<ServerPlan>> {
        let value = self.get(&self.url("product/server"), None)?;
        let plans: Vec<ApiServerPlan> = envelope(value, "ServerPlans")?;
        Ok(plans
            .into_iter()
            .filter(|p| p.availability.as_deref().is_none_or(|a| a == "available"))
            .find(|p| p.cpu == cpu && p.memory_mb == memory_gib * 1024)
            .map(|p| ServerPlan {
                id: id_string(&p.id),
                cpu: p.cpu,
                memory_gib: p.memory_mb / 1024,
            }))
    }

    fn find_icons(&self, name_like: &str, limit: usize) -> Result<Vec<Icon>> {
        let value = self.get(&self.url("icon"), None)?;
        let icons: Vec<ApiNamed> = envelope(value, "Icons")?;
        let needle = name_like.to_lowercase();
        Ok(icons
            .into_iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .take(limit)
            .map(|i| Icon {
                id: id_string(&i.id),
                name: i.name,
            })
            .collect())
    }

    fn find_archive(&self, id: &str) -> Result<Archive> {
        let value = self
            .get(&self.url(&format!("archive/{id}")), None)
            .map_err(|e| match e {
                Error::Api { status: 404, .. } => Error::NoMatch {
                    what: format!("archive {id}"),
                },
                other => other,
            })?;
        let archive: ApiNamed = envelope(value, "Archive")?;
        Ok(Archive {
            id: id_string(&archive.id),
            name: archive.name,
        })
    }

    fn router_network(&self, router_id: &str) -> Result<RouterNetwork> {
        let router = self.find(ResourceKind::Router, router_id)?;
        let switch_id = router
            .switch_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Decode(format!("router {router_id} has no switch")))?;
        let switch = self.switch(&switch_id)?;
        let subnet = switch
            .subnets
            .into_iter()
            .next()
            .ok_or_else(|| Error::Decode(format!("switch {switch_id} has no subnet")))?;

        let value = self.get(&self.url("interface"), None)?;
        let interfaces: Vec<ApiInterface> = envelope(value, "Interfaces")?;
        let used: Vec<String> = interfaces
            .into_iter()
            .filter(|i| i.switch.as_ref().is_some_and(|s| id_string(&s.id) == switch_id))
            .filter_map(|i| i.user_ip_address.or(i.ip_address))
            .collect();

        let unused_ipv4 = match subnet.ip_addresses {
            Some(range) => unused_addresses(
                parse_field(&range.min, "address")?,
                parse_field(&range.max, "address")?,
                &used,
            ),
            None => Vec::new(),
        };
        Ok(RouterNetwork {
            switch_id,
            default_route: subnet.default_route,
            unused_ipv4,
        })
    }

    fn create(&self, draft: &Draft) -> Result<RemoteResource> {
        let kind = draft.kind();
        let mut inner = common_body(draft.common());
        match draft {
            Draft::Server { plan_id, .. } => {
                inner["ServerPlan"] = json!({ "ID": plan_id });
            }
            Draft::Disk {
                plan,
                size_gib,
                source_archive_id,
                ..
            } => {
                inner["Plan"] = json!({ "ID": plan.product_id() });
                inner["SizeMB"] = json!(size_gib * 1024);
                if let Some(archive) = source_archive_id {
                    inner["SourceArchive"] = json!({ "ID": archive });
                }
            }
            Draft::Router {
                network_mask_len,
                band_width_mbps,
                ..
            } => {
                inner["NetworkMaskLen"] = json!(network_mask_len);
                inner["BandWidthMbps"] = json!(band_width_mbps);
            }
            Draft::LoadBalancer {
                switch_id,
                vrid,
                real_ips,
                high_spec,
                settings,
                ..
            } => {
                let subnet = self.switch(switch_id)?.subnets.into_iter().next();
                let mask_len = subnet.as_ref().and_then(|s| s.network_mask_len);
                let default_route = subnet.and_then(|s| s.default_route);
                let servers: Vec<Value> =
                    real_ips.iter().map(|ip| json!({ "IPAddress": ip })).collect();
                let plan = if *high_spec {
                    LB_PLAN_HIGH_SPEC
                } else {
                    LB_PLAN_STANDARD
                };
                inner["Class"] = json!("loadbalancer");
                inner["Plan"] = json!({ "ID": plan });
                inner["Remark"] = json!({
                    "Switch": { "ID": switch_id },
                    "VRRP": { "VRID": vrid },
                    "Network": {
                        "NetworkMaskLen": mask_len,
                        "DefaultRoute": default_route,
                    },
                    "Servers": servers,
                });
                inner["Settings"] = settings_body(settings);
            }
        }
        let mut body = json!({});
        body[envelope_key(kind)] = inner;

        let value = self.post(&self.url(collection(kind)), &body)?;
        decode_resource(kind, value)
    }

    fn destroy(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.delete(&self.resource_url(kind, id), None, Some((kind, id)))
    }

    fn boot(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let url = format!("{}/power", self.resource_url(kind, id));
        self.put(&url, None, Some((kind, id)))?;
        Ok(())
    }

    fn stop(&self, kind: ResourceKind, id: &str, mode: StopMode) -> Result<()> {
        let url = format!("{}/power", self.resource_url(kind, id));
        match mode {
            StopMode::Graceful => self.delete(&url, None, Some((kind, id))),
            StopMode::Force => self.delete(&url, Some(&json!({ "Force": true })), Some((kind, id))),
        }
    }

    fn connect_disk(&self, disk_id: &str, server_id: &str) -> Result<()> {
        let url = self.url(&format!("disk/{disk_id}/to/server/{server_id}"));
        self.put(&url, None, Some((ResourceKind::Volume, disk_id)))?;
        Ok(())
    }

    fn disconnect_disk(&self, disk_id: &str) -> Result<()> {
        let url = self.url(&format!("disk/{disk_id}/to/server"));
        self.delete(&url, None, Some((ResourceKind::Volume, disk_id)))
    }

    fn write_disk_config(&self, disk_id: &str, config: &DiskConfig) -> Result<()> {
        let url = self.url(&format!("disk/{disk_id}/config"));
        self.put(
            &url,
            Some(&disk_config_body(config)),
            Some((ResourceKind::Volume, disk_id)),
        )?;
        Ok(())
    }

    fn add_interface(&self, server_id: &str) -> Result<Interface> {
        let body = json!({ "Interface": { "Server": { "ID": server_id } } });
        let value = self.post(&self.url("interface"), &body)?;
        Ok(envelope::<ApiInterface>(value, "Interface")?.into())
    }

    fn connect_interface(&self, interface_id: &str, target: &SwitchTarget) -> Result<Interface> {
        let path = match target {
            SwitchTarget::Shared => format!("interface/{interface_id}/to/switch/shared"),
            SwitchTarget::Switch(id) => format!("interface/{interface_id}/to/switch/{id}"),
        };
        self.put(&self.url(&path), None, None)?;
        let value = self.get(&self.url(&format!("interface/{interface_id}")), None)?;
        Ok(envelope::<ApiInterface>(value, "Interface")?.into())
    }

    fn disconnect_interface(&self, interface_id: &str) -> Result<()> {
        let url = self.url(&format!("interface/{interface_id}/to/switch"));
        self.delete(&url, None, None)
    }

    fn change_band_width(&self, router_id: &str, band_width_mbps: u32) -> Result<RemoteResource> {
        let url = self.url(&format!("internet/{router_id}/bandwidth"));
        let body = json!({ "Internet": { "BandWidthMbps": band_width_mbps } });
        let value = self.put(&url, Some(&body), Some((ResourceKind::Router, router_id)))?;
        decode_resource(ResourceKind::Router, value)
    }

    fn write_load_balancer_settings(
        &self,
        id: &str,
        settings: &LoadBalancerSettings,
    ) -> Result<()> {
        let body = json!({ "Appliance": { "Settings": settings_body(settings) } });
        self.put(
            &self.resource_url(ResourceKind::LoadBalancer, id),
            Some(&body),
            Some((ResourceKind::LoadBalancer, id)),
        )?;
        Ok(())
    }

    fn apply_settings(&self, id: &str) -> Result<()> {
        let url = format!("{}/config", self.resource_url(ResourceKind::LoadBalancer, id));
        self.put(&url, None, Some((ResourceKind::LoadBalancer, id)))?;
        Ok(())
    }
}

// =============================================================================
// API response types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiRef {
    #[serde(rename = "ID")]
    id: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiNamed {
    #[serde(rename = "ID")]
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiInstance {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiSwitchRef {
    #[serde(rename = "ID")]
    id: Value,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiInterface {
    #[serde(rename = "ID")]
    id: Value,
    #[serde(rename = "IPAddress")]
    ip_address: Option<String>,
    #[serde(rename = "UserIPAddress")]
    user_ip_address: Option<String>,
    switch: Option<ApiSwitchRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiServer {
    #[serde(rename = "ID")]
    id: Value,
    name: String,
    availability: Option<String>,
    instance: Option<ApiInstance>,
    #[serde(default)]
    disks: Vec<ApiRef>,
    #[serde(default)]
    interfaces: Vec<ApiInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiDisk {
    #[serde(rename = "ID")]
    id: Value,
    name: String,
    availability: Option<String>,
    server: Option<ApiRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiInternet {
    #[serde(rename = "ID")]
    id: Value,
    name: String,
    band_width_mbps: u32,
    network_mask_len: u8,
    switch: Option<ApiSwitchRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiIpRange {
    min: String,
    max: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiSubnet {
    default_route: Option<String>,
    network_mask_len: Option<u8>,
    #[serde(rename = "IPAddresses")]
    ip_addresses: Option<ApiIpRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiSwitch {
    #[serde(default)]
    subnets: Vec<ApiSubnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiServerPlan {
    #[serde(rename = "ID")]
    id: Value,
    #[serde(rename = "CPU")]
    cpu: u32,
    #[serde(rename = "MemoryMB")]
    memory_mb: u32,
    availability: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiHealthCheck {
    protocol: String,
    path: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiLbServer {
    #[serde(rename = "IPAddress")]
    ip_address: String,
    port: String,
    #[serde(default)]
    health_check: ApiHealthCheck,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiVirtualIp {
    #[serde(rename = "VirtualIPAddress")]
    virtual_ip_address: String,
    port: String,
    delay_loop: Option<String>,
    #[serde(default)]
    servers: Vec<ApiLbServer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiLbSettings {
    #[serde(default)]
    load_balancer: Vec<ApiVirtualIp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiRemark {
    switch: Option<ApiSwitchRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiAppliance {
    #[serde(rename = "ID")]
    id: Value,
    name: String,
    availability: Option<String>,
    instance: Option<ApiInstance>,
    #[serde(default)]
    remark: ApiRemark,
    #[serde(default)]
    settings: Option<ApiLbSettings>,
}

impl From<ApiInterface> for Interface {
    fn from(i: ApiInterface) -> Self {
        let switch = i.switch.map(|s| match s.scope.as_deref() {
            Some("shared") => SwitchTarget::Shared,
            _ => SwitchTarget::Switch(id_string(&s.id)),
        });
        Self {
            id: id_string(&i.id),
            ip_address: i.user_ip_address.or(i.ip_address),
            switch,
        }
    }
}

impl From<ApiServer> for RemoteResource {
    fn from(s: ApiServer) -> Self {
        let instance_status = s.instance.and_then(|i| i.status);
        Self {
            kind: ResourceKind::Compute,
            id: id_string(&s.id),
            name: s.name,
            status: ObservedStatus::from_api(s.availability.as_deref(), instance_status.as_deref()),
            details: ResourceDetails::Compute {
                disks: s.disks.iter().map(|d| id_string(&d.id)).collect(),
                interfaces: s.interfaces.into_iter().map(Into::into).collect(),
            },
        }
    }
}

impl From<ApiDisk> for RemoteResource {
    fn from(d: ApiDisk) -> Self {
        Self {
            kind: ResourceKind::Volume,
            id: id_string(&d.id),
            name: d.name,
            status: ObservedStatus::from_api(d.availability.as_deref(), None),
            details: ResourceDetails::Volume {
                server_id: d.server.map(|s| id_string(&s.id)),
            },
        }
    }
}

impl From<ApiInternet> for RemoteResource {
    fn from(r: ApiInternet) -> Self {
        // The switch shows up once provisioning has finished.
        let (status, switch_id) = match r.switch {
            Some(s) => (ObservedStatus::Up, id_string(&s.id)),
            None => (ObservedStatus::Creating, String::new()),
        };
        Self {
            kind: ResourceKind::Router,
            id: id_string(&r.id),
            name: r.name,
            status,
            details: ResourceDetails::Router {
                switch_id,
                band_width_mbps: r.band_width_mbps,
                network_mask_len: r.network_mask_len,
            },
        }
    }
}

impl TryFrom<ApiAppliance> for RemoteResource {
    type Error = Error;

    fn try_from(a: ApiAppliance) -> Result<Self> {
        let mut virtual_ips = Vec::new();
        for vip in a.settings.unwrap_or_default().load_balancer {
            let mut servers = Vec::new();
            for s in vip.servers {
                servers.push(BackendServer {
                    port: parse_field(&s.port, "port")?,
                    health_check: HealthCheck {
                        protocol: parse_field(&s.health_check.protocol, "health check protocol")?,
                        path: s.health_check.path,
                        status: s
                            .health_check
                            .status
                            .as_deref()
                            .map(|v| parse_field(v, "health check status"))
                            .transpose()?,
                    },
                    ip_address: s.ip_address,
                });
            }
            virtual_ips.push(VirtualIp {
                port: parse_field(&vip.port, "port")?,
                delay_loop: vip
                    .delay_loop
                    .as_deref()
                    .map(|v| parse_field(v, "delay loop"))
                    .transpose()?
                    .unwrap_or_default(),
                address: vip.virtual_ip_address,
                servers,
            });
        }
        let instance_status = a.instance.and_then(|i| i.status);
        Ok(Self {
            kind: ResourceKind::LoadBalancer,
            id: id_string(&a.id),
            name: a.name,
            status: ObservedStatus::from_api(a.availability.as_deref(), instance_status.as_deref()),
            details: ResourceDetails::LoadBalancer {
                switch_id: a.remark.switch.map(|s| id_string(&s.id)),
                settings: LoadBalancerSettings { virtual_ips },
            },
        })
    }
}
