//! Core types for the SAKURA Cloud facade.
//!
//! These are the values exchanged between callers and a [`CloudApi`](crate::CloudApi)
//! backend: resource identities, observed status, drafts for resources about
//! to be created, and the settings blocks that can be written to existing
//! resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A SAKURA Cloud zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Ishikari first zone
    #[default]
    Is1a,
    /// Ishikari second zone
    Is1b,
    /// Tokyo first zone
    Tk1a,
}

impl Zone {
    /// Zone identifier as used in API URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Is1a => "is1a",
            Self::Is1b => "is1b",
            Self::Tk1a => "tk1a",
        }
    }

    /// All known zones.
    pub fn all() -> &'static [Zone] {
        &[Zone::Is1a, Zone::Is1b, Zone::Tk1a]
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::all()
            .iter()
            .copied()
            .find(|z| z.as_str() == s)
            .ok_or_else(|| format!("unknown zone '{s}' (expected is1a, is1b or tk1a)"))
    }
}

/// API credentials: access token and its secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The resource kinds this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A compute instance (API: server)
    #[serde(alias = "server")]
    Compute,
    /// A block volume (API: disk)
    #[serde(alias = "disk")]
    Volume,
    /// A virtual router with its switch (API: internet)
    Router,
    /// A load balancer appliance
    #[serde(alias = "lb")]
    LoadBalancer,
}

impl ResourceKind {
    /// Short name used in logs, messages and fact keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compute => "server",
            Self::Volume => "disk",
            Self::Router => "router",
            Self::LoadBalancer => "load balancer",
        }
    }

    /// All kinds, in dependency order (parents before dependents).
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Router,
            ResourceKind::Compute,
            ResourceKind::Volume,
            ResourceKind::LoadBalancer,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a remote object. The id is `None` only before creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: Option<String>) -> Self {
        Self { kind, id }
    }

    /// Reference to an object that already exists remotely.
    pub fn existing(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {}", self.kind, id),
            None => write!(f, "new {}", self.kind),
        }
    }
}

/// Lifecycle status as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedStatus {
    #[default]
    Unknown,
    Up,
    Down,
    Creating,
    Migrating,
}

impl ObservedStatus {
    /// Map the API's `Availability` and `Instance.Status` fields to a status.
    ///
    /// Resources without an instance (disks, routers) are `Up` once available.
    pub fn from_api(availability: Option<&str>, instance_status: Option<&str>) -> Self {
        match availability {
            Some("migrating" | "uploading" | "transferring") => Self::Migrating,
            Some("creating" | "provisioning") => Self::Creating,
            Some("available") | None => match instance_status {
                Some("up") => Self::Up,
                Some("down" | "cleaning") => Self::Down,
                None if availability.is_some() => Self::Up,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Up => "up",
            Self::Down => "down",
            Self::Creating => "creating",
            Self::Migrating => "migrating",
        };
        f.write_str(s)
    }
}

/// A network interface of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,
    /// Assigned address, once connected to a segment
    pub ip_address: Option<String>,
    /// Switch the interface is connected to
    pub switch: Option<SwitchTarget>,
}

/// Where an interface can be plugged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchTarget {
    /// The zone-wide shared segment
    Shared,
    /// A specific switch (e.g. the one behind a router)
    Switch(String),
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared segment"),
            Self::Switch(id) => write!(f, "switch {id}"),
        }
    }
}

/// Kind-specific state of a live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceDetails {
    Compute {
        /// Ids of attached disks, in connection order
        disks: Vec<String>,
        interfaces: Vec<Interface>,
    },
    Volume {
        /// Server the disk is attached to, if any
        server_id: Option<String>,
    },
    Router {
        switch_id: String,
        band_width_mbps: u32,
        network_mask_len: u8,
    },
    LoadBalancer {
        switch_id: Option<String>,
        settings: LoadBalancerSettings,
    },
}

/// A live handle obtained from the facade. Never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub status: ObservedStatus,
    pub details: ResourceDetails,
}

impl RemoteResource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::existing(self.kind, self.id.clone())
    }

    /// Disks attached to a server (empty for other kinds).
    pub fn attached_disks(&self) -> &[String] {
        match &self.details {
            ResourceDetails::Compute { disks, .. } => disks,
            _ => &[],
        }
    }

    /// Interfaces of a server (empty for other kinds).
    pub fn interfaces(&self) -> &[Interface] {
        match &self.details {
            ResourceDetails::Compute { interfaces, .. } => interfaces,
            _ => &[],
        }
    }

    /// Server a disk is attached to.
    pub fn attached_server(&self) -> Option<&str> {
        match &self.details {
            ResourceDetails::Volume { server_id } => server_id.as_deref(),
            _ => None,
        }
    }

    /// Switch behind a router or a load balancer.
    pub fn switch_id(&self) -> Option<&str> {
        match &self.details {
            ResourceDetails::Router { switch_id, .. } => Some(switch_id),
            ResourceDetails::LoadBalancer { switch_id, .. } => switch_id.as_deref(),
            _ => None,
        }
    }
}

/// Fields shared by every draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonFields {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub icon_id: Option<String>,
}

/// Disk storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskPlan {
    #[default]
    Ssd,
    Hdd,
}

impl DiskPlan {
    /// Plan id in the API's disk product catalog.
    pub fn product_id(&self) -> u32 {
        match self {
            Self::Ssd => 4,
            Self::Hdd => 2,
        }
    }
}

impl FromStr for DiskPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssd" => Ok(Self::Ssd),
            "hdd" => Ok(Self::Hdd),
            other => Err(format!("unknown disk plan '{other}' (expected ssd or hdd)")),
        }
    }
}

/// An unsaved set of field values for a resource about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Draft {
    Server {
        common: CommonFields,
        plan_id: String,
    },
    Disk {
        common: CommonFields,
        plan: DiskPlan,
        size_gib: u32,
        source_archive_id: Option<String>,
    },
    Router {
        common: CommonFields,
        network_mask_len: u8,
        band_width_mbps: u32,
    },
    LoadBalancer {
        common: CommonFields,
        switch_id: String,
        vrid: u32,
        real_ips: Vec<String>,
        high_spec: bool,
        settings: LoadBalancerSettings,
    },
}

impl Draft {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Server { .. } => ResourceKind::Compute,
            Self::Disk { .. } => ResourceKind::Volume,
            Self::Router { .. } => ResourceKind::Router,
            Self::LoadBalancer { .. } => ResourceKind::LoadBalancer,
        }
    }

    pub fn common(&self) -> &CommonFields {
        match self {
            Self::Server { common, .. }
            | Self::Disk { common, .. }
            | Self::Router { common, .. }
            | Self::LoadBalancer { common, .. } => common,
        }
    }
}

/// Guest configuration written onto a disk before first boot.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    pub host_name: Option<String>,
    pub password: Option<String>,
    pub ip_address: Option<String>,
    pub ssh_key: Option<String>,
    pub network_mask_len: Option<u8>,
    pub default_route: Option<String>,
}

impl DiskConfig {
    /// True when no field is set; writing an empty config is skipped.
    pub fn is_empty(&self) -> bool {
        self.host_name.is_none()
            && self.password.is_none()
            && self.ip_address.is_none()
            && self.ssh_key.is_none()
            && self.network_mask_len.is_none()
            && self.default_route.is_none()
    }
}

impl fmt::Debug for DiskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskConfig")
            .field("host_name", &self.host_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ip_address", &self.ip_address)
            .field("ssh_key", &self.ssh_key.as_ref().map(|_| "<redacted>"))
            .field("network_mask_len", &self.network_mask_len)
            .field("default_route", &self.default_route)
            .finish()
    }
}

/// Health check protocol of a load balancer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckProtocol {
    #[default]
    Http,
    Https,
    Tcp,
    Ping,
}

impl HealthCheckProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
            Self::Ping => "ping",
        }
    }
}

impl FromStr for HealthCheckProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "tcp" => Ok(Self::Tcp),
            "ping" => Ok(Self::Ping),
            other => Err(format!(
                "unknown health check protocol '{other}' (expected http, https, tcp or ping)"
            )),
        }
    }
}

/// How a backend server is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: HealthCheckProtocol,
    /// Request path (http/https only)
    pub path: Option<String>,
    /// Expected response code (http/https only)
    pub status: Option<u16>,
}

/// A real server behind a virtual IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendServer {
    pub ip_address: String,
    pub port: u16,
    pub health_check: HealthCheck,
}

/// A virtual IP served by a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualIp {
    pub address: String,
    pub port: u16,
    pub delay_loop: u32,
    pub servers: Vec<BackendServer>,
}

/// Load balancing rules of a load balancer appliance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
    pub virtual_ips: Vec<VirtualIp>,
}

/// How to bring a running resource down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopMode {
    /// ACPI shutdown; the guest decides when to power off
    #[default]
    Graceful,
    /// Immediate power off
    Force,
}

/// A server plan from the product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPlan {
    pub id: String,
    pub cpu: u32,
    pub memory_gib: u32,
}

/// An icon from the icon catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub id: String,
    pub name: String,
}

/// A disk archive (OS image) usable as a disk source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub id: String,
    pub name: String,
}

/// Addressing of the segment behind a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterNetwork {
    pub switch_id: String,
    pub default_route: Option<String>,
    /// Addresses of the subnet not assigned to any interface, ascending
    pub unused_ipv4: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_round_trip() {
        for zone in Zone::all() {
            assert_eq!(zone.as_str().parse::<Zone>().unwrap(), *zone);
        }
        assert!("us-east-1".parse::<Zone>().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("token", "very-secret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("token"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_observed_status_from_api() {
        assert_eq!(
            ObservedStatus::from_api(Some("available"), Some("up")),
            ObservedStatus::Up
        );
        assert_eq!(
            ObservedStatus::from_api(Some("available"), Some("cleaning")),
            ObservedStatus::Down
        );
        assert_eq!(
            ObservedStatus::from_api(Some("available"), None),
            ObservedStatus::Up
        );
        assert_eq!(
            ObservedStatus::from_api(Some("migrating"), None),
            ObservedStatus::Migrating
        );
        assert_eq!(
            ObservedStatus::from_api(Some("failed"), None),
            ObservedStatus::Unknown
        );
        assert_eq!(ObservedStatus::from_api(None, None), ObservedStatus::Unknown);
    }

    #[test]
    fn test_resource_ref_display() {
        let r = ResourceRef::existing(ResourceKind::Compute, "123");
        assert_eq!(r.to_string(), "server 123");
        let r = ResourceRef::new(ResourceKind::Volume, None);
        assert_eq!(r.to_string(), "new disk");
    }

    #[test]
    fn test_kind_deserialize_aliases() {
        let kind: ResourceKind = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(kind, ResourceKind::Compute);
        let kind: ResourceKind = serde_json::from_str("\"lb\"").unwrap();
        assert_eq!(kind, ResourceKind::LoadBalancer);
        let kind: ResourceKind = serde_json::from_str("\"volume\"").unwrap();
        assert_eq!(kind, ResourceKind::Volume);
    }

    #[test]
    fn test_disk_config_is_empty() {
        assert!(DiskConfig::default().is_empty());
        let config = DiskConfig {
            host_name: Some("web01".to_string()),
            ..Default::default()
        };
        assert!(!config.is_empty());
    }

    #[test]
    fn test_disk_config_debug_redacts_secrets() {
        let config = DiskConfig {
            password: Some("pAssw0rd".to_string()),
            ssh_key: Some("ssh-ed25519 AAAA".to_string()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("pAssw0rd"));
        assert!(!debug.contains("AAAA"));
    }
}
