//! Backend abstraction for SAKURA Cloud operations.
//!
//! The [`CloudApi`] trait is the whole surface the reconciliation engine
//! talks to. It allows for different implementations:
//! - [`http::HttpCloud`]: the real REST API
//! - [`memory::MemoryCloud`]: an in-memory cloud that records every call

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::types::{
    Archive, DiskConfig, Draft, Icon, Interface, LoadBalancerSettings, ObservedStatus,
    RemoteResource, ResourceKind, RouterNetwork, ServerPlan, StopMode, SwitchTarget, Zone,
};

/// Authenticated handle to one zone of the cloud.
///
/// Implementations are stateless request/response facades and must be safe
/// to share between threads; callers never rely on hidden client state.
pub trait CloudApi: Send + Sync {
    /// Zone this handle is bound to.
    fn zone(&self) -> Zone;

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Fetch a resource by id.
    fn find(&self, kind: ResourceKind, id: &str) -> Result<RemoteResource>;

    /// Read only the observed status of a resource.
    fn status(&self, kind: ResourceKind, id: &str) -> Result<ObservedStatus> {
        Ok(self.find(kind, id)?.status)
    }

    /// Find the server plan with exactly this many cores and GiB of memory.
    fn find_server_plan(&self, cpu: u32, memory_gib: u32) -> Result<Option<ServerPlan>>;

    /// Icons whose name contains `name_like` (case-insensitive), at most `limit`.
    fn find_icons(&self, name_like: &str, limit: usize) -> Result<Vec<Icon>>;

    /// Fetch a disk archive by id.
    fn find_archive(&self, id: &str) -> Result<Archive>;

    /// Addressing of the segment behind a router.
    fn router_network(&self, router_id: &str) -> Result<RouterNetwork>;

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Save a draft as a new resource.
    fn create(&self, draft: &Draft) -> Result<RemoteResource>;

    /// Delete a resource.
    fn destroy(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Power on a server or appliance.
    fn boot(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Power off a server or appliance.
    fn stop(&self, kind: ResourceKind, id: &str, mode: StopMode) -> Result<()>;

    /// Attach a disk to a server.
    fn connect_disk(&self, disk_id: &str, server_id: &str) -> Result<()>;

    /// Detach a disk from whatever server holds it.
    fn disconnect_disk(&self, disk_id: &str) -> Result<()>;

    /// Write guest configuration (host name, addresses, keys) onto a disk.
    fn write_disk_config(&self, disk_id: &str, config: &DiskConfig) -> Result<()>;

    /// Add an unconnected interface to a server.
    fn add_interface(&self, server_id: &str) -> Result<Interface>;

    /// Plug an interface into a segment; returns it with its assigned address.
    fn connect_interface(&self, interface_id: &str, target: &SwitchTarget) -> Result<Interface>;

    /// Unplug an interface from its segment.
    fn disconnect_interface(&self, interface_id: &str) -> Result<()>;

    /// Change a router's bandwidth plan.
    ///
    /// The API replaces the router on plan change, so the returned resource
    /// may carry a new id.
    fn change_band_width(&self, router_id: &str, band_width_mbps: u32)
    -> Result<RemoteResource>;

    /// Replace the load balancing rules of an appliance (not yet active).
    fn write_load_balancer_settings(&self, id: &str, settings: &LoadBalancerSettings)
    -> Result<()>;

    /// Activate the written settings of an appliance.
    fn apply_settings(&self, id: &str) -> Result<()>;
}
