//! # sacloud
//!
//! Blocking client facade for the SAKURA Cloud API.
//!
//! This crate provides:
//! - A [`CloudApi`] trait covering lookups and mutations of servers, disks,
//!   routers and load balancer appliances
//! - [`http::HttpCloud`], the REST implementation
//! - [`memory::MemoryCloud`], an in-memory implementation that records calls
//!
//! ## Example
//!
//! ```no_run
//! use sacloud::{CloudApi, Credentials, ResourceKind, Zone};
//!
//! let cloud = sacloud::authenticate(Credentials::new("token", "secret"), Zone::Is1a)
//!     .expect("credentials rejected");
//!
//! let server = cloud.find(ResourceKind::Compute, "113000000000").expect("lookup failed");
//! println!("{} ({}) is {}", server.name, server.id, server.status);
//! ```
//!
//! Handles are stateless: every call goes to the API, and nothing returned
//! is cached. Callers that need fresh status must ask again.

#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{CloudApi, http, memory};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    Archive, BackendServer, CommonFields, Credentials, DiskConfig, DiskPlan, Draft, HealthCheck,
    HealthCheckProtocol, Icon, Interface, LoadBalancerSettings, ObservedStatus, RemoteResource,
    ResourceDetails, ResourceKind, ResourceRef, RouterNetwork, ServerPlan, StopMode, SwitchTarget,
    VirtualIp, Zone,
};

/// Open an authenticated handle on one zone.
///
/// Fails with [`Error::Auth`] when the credentials are rejected.
pub fn authenticate(credentials: Credentials, zone: Zone) -> Result<http::HttpCloud> {
    let cloud = http::HttpCloud::new(credentials, zone);
    cloud.check_auth()?;
    log::debug!("authenticated against zone {zone}");
    Ok(cloud)
}
