//! In-memory cloud backend.
//!
//! [`MemoryCloud`] keeps every resource in a map behind a mutex and records
//! each call it receives, in order. It enforces the same preconditions the
//! real API does (a running server cannot be destroyed, an attached disk
//! cannot be deleted, ...) so ordering mistakes surface as errors.
//!
//! Status transitions started by `boot`, `stop` and `create` can be delayed
//! by a number of status reads to exercise polling.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::CloudApi;
use crate::error::{Error, Result};
use crate::types::{
    Archive, DiskConfig, Draft, Icon, Interface, LoadBalancerSettings, ObservedStatus,
    RemoteResource, ResourceDetails, ResourceKind, RouterNetwork, ServerPlan, StopMode,
    SwitchTarget, Zone,
};

/// Addresses handed out on the shared segment.
const SHARED_SEGMENT_PREFIX: &str = "192.0.2";
/// Addresses of every router subnet.
const ROUTER_SUBNET_PREFIX: &str = "203.0.113";
/// First assignable host of a router subnet (.1 to .3 belong to the router).
const ROUTER_FIRST_HOST: u8 = 4;
/// Last assignable host of a router subnet.
const ROUTER_LAST_HOST: u8 = 13;

/// Every operation of [`CloudApi`], as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    Status,
    FindServerPlan,
    FindIcons,
    FindArchive,
    RouterNetwork,
    Create,
    Destroy,
    Boot,
    Stop,
    ConnectDisk,
    DisconnectDisk,
    WriteDiskConfig,
    AddInterface,
    ConnectInterface,
    DisconnectInterface,
    ChangeBandWidth,
    WriteLoadBalancerSettings,
    ApplySettings,
}

impl Operation {
    /// Whether the operation changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::Find
                | Self::Status
                | Self::FindServerPlan
                | Self::FindIcons
                | Self::FindArchive
                | Self::RouterNetwork
        )
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    /// What the call addressed, e.g. `"server 123"` or `"icon Ubuntu"`
    pub target: String,
}

#[derive(Debug)]
struct Entry {
    resource: RemoteResource,
    /// Status to reach and the number of status reads still showing the old one
    pending: Option<(ObservedStatus, u32)>,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<(ResourceKind, String), Entry>,
    plans: Vec<ServerPlan>,
    icons: Vec<Icon>,
    archives: Vec<Archive>,
    disk_configs: BTreeMap<String, DiskConfig>,
    applied: BTreeMap<String, LoadBalancerSettings>,
    calls: Vec<Call>,
    failing: HashSet<Operation>,
    settle_reads: u32,
    next_id: u64,
    next_shared_host: u8,
}

impl State {
    fn record(&mut self, operation: Operation, target: impl Into<String>) -> Result<()> {
        self.calls.push(Call {
            operation,
            target: target.into(),
        });
        if self.failing.contains(&operation) {
            return Err(Error::Api {
                status: 500,
                message: format!("injected failure for {operation:?}"),
            });
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("1130000{:05}", self.next_id)
    }

    fn entry(&self, kind: ResourceKind, id: &str) -> Result<&Entry> {
        self.resources
            .get(&(kind, id.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn entry_mut(&mut self, kind: ResourceKind, id: &str) -> Result<&mut Entry> {
        self.resources
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn insert(&mut self, resource: RemoteResource, pending: Option<ObservedStatus>) {
        let settle = self.settle_reads;
        let mut entry = Entry {
            resource,
            pending: None,
        };
        if let Some(target) = pending {
            transition(&mut entry, target, settle);
        }
        self.resources
            .insert((entry.resource.kind, entry.resource.id.clone()), entry);
    }

    fn transition(&mut self, kind: ResourceKind, id: &str, target: ObservedStatus) -> Result<()> {
        let settle = self.settle_reads;
        let entry = self.entry_mut(kind, id)?;
        transition(entry, target, settle);
        Ok(())
    }

    /// Server holding the interface, and the interface's index within it.
    fn locate_interface(&self, interface_id: &str) -> Result<(String, usize)> {
        for ((kind, id), entry) in &self.resources {
            if *kind != ResourceKind::Compute {
                continue;
            }
            if let Some(index) = entry
                .resource
                .interfaces()
                .iter()
                .position(|i| i.id == interface_id)
            {
                return Ok((id.clone(), index));
            }
        }
        Err(Error::NoMatch {
            what: format!("interface {interface_id}"),
        })
    }

    fn interfaces_mut(&mut self, server_id: &str) -> Result<&mut Vec<Interface>> {
        match &mut self.entry_mut(ResourceKind::Compute, server_id)?.resource.details {
            ResourceDetails::Compute { interfaces, .. } => Ok(interfaces),
            _ => Err(Error::Decode(format!("server {server_id} has no interfaces"))),
        }
    }

    fn used_addresses(&self, target: &SwitchTarget) -> Vec<String> {
        self.resources
            .values()
            .flat_map(|e| e.resource.interfaces().iter())
            .filter(|i| i.switch.as_ref() == Some(target))
            .filter_map(|i| i.ip_address.clone())
            .collect()
    }

    fn router_by_switch(&self, switch_id: &str) -> Option<&RemoteResource> {
        self.resources
            .values()
            .map(|e| &e.resource)
            .find(|r| r.kind == ResourceKind::Router && r.switch_id() == Some(switch_id))
    }

    fn unused_router_addresses(&self, switch_id: &str) -> Vec<String> {
        let used = self.used_addresses(&SwitchTarget::Switch(switch_id.to_string()));
        (ROUTER_FIRST_HOST..=ROUTER_LAST_HOST)
            .map(|host| format!("{ROUTER_SUBNET_PREFIX}.{host}"))
            .filter(|addr| !used.contains(addr))
            .collect()
    }
}

fn transition(entry: &mut Entry, target: ObservedStatus, settle: u32) {
    if settle == 0 {
        entry.resource.status = target;
        entry.pending = None;
    } else {
        entry.pending = Some((target, settle));
    }
}

fn conflict(message: impl Into<String>) -> Error {
    Error::Api {
        status: 409,
        message: message.into(),
    }
}

/// An in-memory cloud that records every call it receives.
///
/// # Example
///
/// ```
/// use sacloud::memory::{MemoryCloud, Operation};
/// use sacloud::{CloudApi, ObservedStatus, ResourceKind, StopMode, Zone};
///
/// let cloud = MemoryCloud::new(Zone::Is1a).with_server("123", ObservedStatus::Up);
/// cloud.stop(ResourceKind::Compute, "123", StopMode::Force).unwrap();
///
/// assert_eq!(cloud.operations(), vec![Operation::Stop]);
/// assert_eq!(
///     cloud.status(ResourceKind::Compute, "123").unwrap(),
///     ObservedStatus::Down
/// );
/// ```
#[derive(Debug)]
pub struct MemoryCloud {
    zone: Zone,
    state: Mutex<State>,
}

impl MemoryCloud {
    /// Create an empty cloud with a catalog of common server plans.
    pub fn new(zone: Zone) -> Self {
        let mut plans = Vec::new();
        for cpu in [1, 2, 4, 8] {
            for memory_gib in [1, 2, 4, 8, 16] {
                if memory_gib >= cpu {
                    plans.push(ServerPlan {
                        id: format!("{cpu}{memory_gib:03}"),
                        cpu,
                        memory_gib,
                    });
                }
            }
        }
        Self {
            zone,
            state: Mutex::new(State {
                plans,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seed(&mut self) -> &mut State {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add a server with no disks and no interfaces.
    pub fn with_server(mut self, id: &str, status: ObservedStatus) -> Self {
        self.seed().insert(
            RemoteResource {
                kind: ResourceKind::Compute,
                id: id.to_string(),
                name: format!("server-{id}"),
                status,
                details: ResourceDetails::Compute {
                    disks: Vec::new(),
                    interfaces: Vec::new(),
                },
            },
            None,
        );
        self
    }

    /// Add a disk, optionally attached to an already seeded server.
    pub fn with_disk(mut self, id: &str, server_id: Option<&str>) -> Self {
        let state = self.seed();
        if let Some(server_id) = server_id
            && let Ok(entry) = state.entry_mut(ResourceKind::Compute, server_id)
            && let ResourceDetails::Compute { disks, .. } = &mut entry.resource.details
        {
            disks.push(id.to_string());
        }
        state.insert(
            RemoteResource {
                kind: ResourceKind::Volume,
                id: id.to_string(),
                name: format!("disk-{id}"),
                status: ObservedStatus::Up,
                details: ResourceDetails::Volume {
                    server_id: server_id.map(str::to_string),
                },
            },
            None,
        );
        self
    }

    /// Add an available router. Its switch id is `sw-<id>`.
    pub fn with_router(mut self, id: &str, band_width_mbps: u32, network_mask_len: u8) -> Self {
        self.seed().insert(
            RemoteResource {
                kind: ResourceKind::Router,
                id: id.to_string(),
                name: format!("router-{id}"),
                status: ObservedStatus::Up,
                details: ResourceDetails::Router {
                    switch_id: format!("sw-{id}"),
                    band_width_mbps,
                    network_mask_len,
                },
            },
            None,
        );
        self
    }

    /// Add a load balancer with empty settings.
    pub fn with_load_balancer(mut self, id: &str, status: ObservedStatus) -> Self {
        self.seed().insert(
            RemoteResource {
                kind: ResourceKind::LoadBalancer,
                id: id.to_string(),
                name: format!("lb-{id}"),
                status,
                details: ResourceDetails::LoadBalancer {
                    switch_id: None,
                    settings: LoadBalancerSettings::default(),
                },
            },
            None,
        );
        self
    }

    /// Add an icon to the catalog.
    pub fn with_icon(mut self, id: &str, name: &str) -> Self {
        self.seed().icons.push(Icon {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add a disk archive.
    pub fn with_archive(mut self, id: &str, name: &str) -> Self {
        self.seed().archives.push(Archive {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Delay every status transition by `reads` status reads.
    pub fn with_settle_reads(mut self, reads: u32) -> Self {
        self.seed().settle_reads = reads;
        self
    }

    /// Make every call of `operation` fail with an API error.
    pub fn failing_on(mut self, operation: Operation) -> Self {
        self.seed().failing.insert(operation);
        self
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Mutating calls received so far, in order.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutating())
            .cloned()
            .collect()
    }

    /// Operations of the mutating calls, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.mutating_calls()
            .into_iter()
            .map(|c| c.operation)
            .collect()
    }

    /// Number of calls of one operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Current state of a resource, without recording a call.
    pub fn resource(&self, kind: ResourceKind, id: &str) -> Option<RemoteResource> {
        self.lock()
            .resources
            .get(&(kind, id.to_string()))
            .map(|e| e.resource.clone())
    }

    /// All resources of one kind, without recording a call.
    pub fn resources(&self, kind: ResourceKind) -> Vec<RemoteResource> {
        self.lock()
            .resources
            .values()
            .filter(|e| e.resource.kind == kind)
            .map(|e| e.resource.clone())
            .collect()
    }

    /// Guest configuration last written to a disk.
    pub fn disk_config(&self, disk_id: &str) -> Option<DiskConfig> {
        self.lock().disk_configs.get(disk_id).cloned()
    }

    /// Settings last applied on a load balancer.
    pub fn applied_settings(&self, id: &str) -> Option<LoadBalancerSettings> {
        self.lock().applied.get(id).cloned()
    }
}

impl CloudApi for MemoryCloud {
    fn zone(&self) -> Zone {
        self.zone
    }

    fn find(&self, kind: ResourceKind, id: &str) -> Result<RemoteResource> {
        let mut state = self.lock();
        state.record(Operation::Find, format!("{kind} {id}"))?;
        Ok(state.entry(kind, id)?.resource.clone())
    }

    fn status(&self, kind: ResourceKind, id: &str) -> Result<ObservedStatus> {
        let mut state = self.lock();
        state.record(Operation::Status, format!("{kind} {id}"))?;
        let entry = state.entry_mut(kind, id)?;
        match entry.pending {
            Some((target, 0)) => {
                entry.resource.status = target;
                entry.pending = None;
            }
            Some((target, remaining)) => entry.pending = Some((target, remaining - 1)),
            None => {}
        }
        Ok(entry.resource.status)
    }

    fn find_server_plan(&self, cpu: u32, memory_gib: u32) -> Result<Option<ServerPlan>> {
        let mut state = self.lock();
        state.record(Operation::FindServerPlan, format!("{cpu}core-{memory_gib}GB"))?;
        Ok(state
            .plans
            .iter()
            .find(|p| p.cpu == cpu && p.memory_gib == memory_gib)
            .cloned())
    }

    fn find_icons(&self, name_like: &str, limit: usize) -> Result<Vec<Icon>> {
        let mut state = self.lock();
        state.record(Operation::FindIcons, format!("icon {name_like}"))?;
        let needle = name_like.to_lowercase();
        Ok(state
            .icons
            .iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_archive(&self, id: &str) -> Result<Archive> {
        let mut state = self.lock();
        state.record(Operation::FindArchive, format!("archive {id}"))?;
        state
            .archives
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::NoMatch {
                what: format!("archive {id}"),
            })
    }

    fn router_network(&self, router_id: &str) -> Result<RouterNetwork> {
        let mut state = self.lock();
        state.record(Operation::RouterNetwork, format!("router {router_id}"))?;
        let router = &state.entry(ResourceKind::Router, router_id)?.resource;
        let switch_id = router
            .switch_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Decode(format!("router {router_id} has no switch")))?;
        Ok(RouterNetwork {
            unused_ipv4: state.unused_router_addresses(&switch_id),
            switch_id,
            default_route: Some(format!("{ROUTER_SUBNET_PREFIX}.1")),
        })
    }

    fn create(&self, draft: &Draft) -> Result<RemoteResource> {
        let mut state = self.lock();
        let kind = draft.kind();
        state.record(Operation::Create, format!("{kind} {}", draft.common().name))?;
        let id = state.allocate_id();
        let name = draft.common().name.clone();

        let (status, pending, details) = match draft {
            Draft::Server { plan_id, .. } => {
                if !state.plans.iter().any(|p| &p.id == plan_id) {
                    return Err(conflict(format!("unknown server plan {plan_id}")));
                }
                (
                    ObservedStatus::Down,
                    None,
                    ResourceDetails::Compute {
                        disks: Vec::new(),
                        interfaces: Vec::new(),
                    },
                )
            }
            Draft::Disk {
                source_archive_id, ..
            } => {
                if let Some(archive) = source_archive_id
                    && !state.archives.iter().any(|a| &a.id == archive)
                {
                    return Err(conflict(format!("unknown archive {archive}")));
                }
                (
                    ObservedStatus::Migrating,
                    Some(ObservedStatus::Up),
                    ResourceDetails::Volume { server_id: None },
                )
            }
            Draft::Router {
                network_mask_len,
                band_width_mbps,
                ..
            } => (
                ObservedStatus::Creating,
                Some(ObservedStatus::Up),
                ResourceDetails::Router {
                    switch_id: format!("sw-{id}"),
                    band_width_mbps: *band_width_mbps,
                    network_mask_len: *network_mask_len,
                },
            ),
            Draft::LoadBalancer {
                switch_id,
                settings,
                ..
            } => {
                if state.router_by_switch(switch_id).is_none() {
                    return Err(conflict(format!("unknown switch {switch_id}")));
                }
                (
                    ObservedStatus::Creating,
                    Some(ObservedStatus::Up),
                    ResourceDetails::LoadBalancer {
                        switch_id: Some(switch_id.clone()),
                        settings: settings.clone(),
                    },
                )
            }
        };

        let resource = RemoteResource {
            kind,
            id,
            name,
            status,
            details,
        };
        state.insert(resource.clone(), pending);
        Ok(resource)
    }

    fn destroy(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::Destroy, format!("{kind} {id}"))?;
        let resource = &state.entry(kind, id)?.resource;
        if resource.status == ObservedStatus::Up
            && matches!(kind, ResourceKind::Compute | ResourceKind::LoadBalancer)
        {
            return Err(conflict(format!("{kind} {id} is running")));
        }
        if !resource.attached_disks().is_empty() {
            return Err(conflict(format!("{kind} {id} still has disks attached")));
        }
        if let Some(server) = resource.attached_server() {
            return Err(conflict(format!("disk {id} is attached to server {server}")));
        }
        state.resources.remove(&(kind, id.to_string()));
        Ok(())
    }

    fn boot(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::Boot, format!("{kind} {id}"))?;
        if state.entry(kind, id)?.resource.status == ObservedStatus::Up {
            return Err(conflict(format!("{kind} {id} is already up")));
        }
        state.transition(kind, id, ObservedStatus::Up)
    }

    fn stop(&self, kind: ResourceKind, id: &str, _mode: StopMode) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::Stop, format!("{kind} {id}"))?;
        if state.entry(kind, id)?.resource.status == ObservedStatus::Down {
            return Err(conflict(format!("{kind} {id} is already down")));
        }
        state.transition(kind, id, ObservedStatus::Down)
    }

    fn connect_disk(&self, disk_id: &str, server_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::ConnectDisk,
            format!("disk {disk_id} -> server {server_id}"),
        )?;
        if let Some(current) = state
            .entry(ResourceKind::Volume, disk_id)?
            .resource
            .attached_server()
        {
            return Err(conflict(format!(
                "disk {disk_id} is attached to server {current}"
            )));
        }
        let server = state.entry_mut(ResourceKind::Compute, server_id)?;
        if server.resource.status == ObservedStatus::Up {
            return Err(conflict(format!("server {server_id} is running")));
        }
        if let ResourceDetails::Compute { disks, .. } = &mut server.resource.details {
            disks.push(disk_id.to_string());
        }
        let disk = state.entry_mut(ResourceKind::Volume, disk_id)?;
        disk.resource.details = ResourceDetails::Volume {
            server_id: Some(server_id.to_string()),
        };
        Ok(())
    }

    fn disconnect_disk(&self, disk_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::DisconnectDisk, format!("disk {disk_id}"))?;
        let Some(server_id) = state
            .entry(ResourceKind::Volume, disk_id)?
            .resource
            .attached_server()
            .map(str::to_string)
        else {
            return Err(conflict(format!("disk {disk_id} is not attached")));
        };
        if let Ok(server) = state.entry_mut(ResourceKind::Compute, &server_id)
            && let ResourceDetails::Compute { disks, .. } = &mut server.resource.details
        {
            disks.retain(|d| d != disk_id);
        }
        state.entry_mut(ResourceKind::Volume, disk_id)?.resource.details =
            ResourceDetails::Volume { server_id: None };
        Ok(())
    }

    fn write_disk_config(&self, disk_id: &str, config: &DiskConfig) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::WriteDiskConfig, format!("disk {disk_id}"))?;
        state.entry(ResourceKind::Volume, disk_id)?;
        state
            .disk_configs
            .insert(disk_id.to_string(), config.clone());
        Ok(())
    }

    fn add_interface(&self, server_id: &str) -> Result<Interface> {
        let mut state = self.lock();
        state.record(Operation::AddInterface, format!("server {server_id}"))?;
        let id = state.allocate_id();
        let interface = Interface {
            id,
            ip_address: None,
            switch: None,
        };
        state.interfaces_mut(server_id)?.push(interface.clone());
        Ok(interface)
    }

    fn connect_interface(&self, interface_id: &str, target: &SwitchTarget) -> Result<Interface> {
        let mut state = self.lock();
        state.record(
            Operation::ConnectInterface,
            format!("interface {interface_id} -> {target}"),
        )?;
        let (server_id, index) = state.locate_interface(interface_id)?;
        let address = match target {
            SwitchTarget::Shared => {
                state.next_shared_host = state.next_shared_host.wrapping_add(1).max(10);
                format!("{SHARED_SEGMENT_PREFIX}.{}", state.next_shared_host)
            }
            SwitchTarget::Switch(switch_id) => {
                if state.router_by_switch(switch_id).is_none() {
                    return Err(conflict(format!("unknown switch {switch_id}")));
                }
                state
                    .unused_router_addresses(switch_id)
                    .into_iter()
                    .next()
                    .ok_or_else(|| conflict(format!("switch {switch_id} has no free address")))?
            }
        };
        let interfaces = state.interfaces_mut(&server_id)?;
        let interface = &mut interfaces[index];
        interface.switch = Some(target.clone());
        interface.ip_address = Some(address);
        Ok(interface.clone())
    }

    fn disconnect_interface(&self, interface_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::DisconnectInterface,
            format!("interface {interface_id}"),
        )?;
        let (server_id, index) = state.locate_interface(interface_id)?;
        let interface = &mut state.interfaces_mut(&server_id)?[index];
        interface.switch = None;
        interface.ip_address = None;
        Ok(())
    }

    fn change_band_width(&self, router_id: &str, band_width_mbps: u32) -> Result<RemoteResource> {
        let mut state = self.lock();
        state.record(
            Operation::ChangeBandWidth,
            format!("router {router_id} -> {band_width_mbps}Mbps"),
        )?;
        let old = state
            .resources
            .remove(&(ResourceKind::Router, router_id.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind: ResourceKind::Router,
                id: router_id.to_string(),
            })?;
        let mut resource = old.resource;
        resource.id = state.allocate_id();
        resource.status = ObservedStatus::Creating;
        if let ResourceDetails::Router {
            band_width_mbps: current,
            ..
        } = &mut resource.details
        {
            *current = band_width_mbps;
        }
        state.insert(resource.clone(), Some(ObservedStatus::Up));
        Ok(resource)
    }

    fn write_load_balancer_settings(
        &self,
        id: &str,
        settings: &LoadBalancerSettings,
    ) -> Result<()> {
        let mut state = self.lock();
        state.record(
            Operation::WriteLoadBalancerSettings,
            format!("load balancer {id}"),
        )?;
        let entry = state.entry_mut(ResourceKind::LoadBalancer, id)?;
        if let ResourceDetails::LoadBalancer {
            settings: current, ..
        } = &mut entry.resource.details
        {
            *current = settings.clone();
        }
        Ok(())
    }

    fn apply_settings(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(Operation::ApplySettings, format!("load balancer {id}"))?;
        let settings = match &state.entry(ResourceKind::LoadBalancer, id)?.resource.details {
            ResourceDetails::LoadBalancer { settings, .. } => settings.clone(),
            _ => LoadBalancerSettings::default(),
        };
        state.applied.insert(id.to_string(), settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_settles_after_reads() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Down)
            .with_settle_reads(2);
        cloud.boot(ResourceKind::Compute, "1").unwrap();

        let reads: Vec<_> = (0..3)
            .map(|_| cloud.status(ResourceKind::Compute, "1").unwrap())
            .collect();
        assert_eq!(
            reads,
            vec![ObservedStatus::Down, ObservedStatus::Down, ObservedStatus::Up]
        );
    }

    #[test]
    fn test_band_width_change_provisions_a_new_router() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_router("9", 100, 28)
            .with_settle_reads(1);
        let router = cloud.change_band_width("9", 500).unwrap();

        assert_ne!(router.id, "9");
        assert!(cloud.resource(ResourceKind::Router, "9").is_none());
        assert_eq!(
            cloud.status(ResourceKind::Router, &router.id).unwrap(),
            ObservedStatus::Creating
        );
        assert_eq!(
            cloud.status(ResourceKind::Router, &router.id).unwrap(),
            ObservedStatus::Up
        );
    }

    #[test]
    fn test_destroy_running_server_is_rejected() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Up);
        let err = cloud.destroy(ResourceKind::Compute, "1").unwrap_err();
        assert!(matches!(err, Error::Api { status: 409, .. }));
        assert!(cloud.resource(ResourceKind::Compute, "1").is_some());
    }

    #[test]
    fn test_destroy_attached_disk_is_rejected() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Down)
            .with_disk("2", Some("1"));
        assert!(cloud.destroy(ResourceKind::Volume, "2").is_err());
        assert!(cloud.destroy(ResourceKind::Compute, "1").is_err());

        cloud.disconnect_disk("2").unwrap();
        cloud.destroy(ResourceKind::Volume, "2").unwrap();
        cloud.destroy(ResourceKind::Compute, "1").unwrap();
    }

    #[test]
    fn test_connect_disk_updates_both_sides() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Down)
            .with_disk("2", None);
        cloud.connect_disk("2", "1").unwrap();

        let server = cloud.resource(ResourceKind::Compute, "1").unwrap();
        assert_eq!(server.attached_disks(), ["2".to_string()]);
        let disk = cloud.resource(ResourceKind::Volume, "2").unwrap();
        assert_eq!(disk.attached_server(), Some("1"));
    }

    #[test]
    fn test_router_addresses_are_consumed() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_router("9", 100, 28)
            .with_server("1", ObservedStatus::Down);
        let before = cloud.router_network("9").unwrap();
        assert_eq!(before.unused_ipv4.first().map(String::as_str), Some("203.0.113.4"));

        let nic = cloud.add_interface("1").unwrap();
        let nic = cloud
            .connect_interface(&nic.id, &SwitchTarget::Switch("sw-9".to_string()))
            .unwrap();
        assert_eq!(nic.ip_address.as_deref(), Some("203.0.113.4"));

        let after = cloud.router_network("9").unwrap();
        assert_eq!(after.unused_ipv4.first().map(String::as_str), Some("203.0.113.5"));
    }

    #[test]
    fn test_change_band_width_replaces_router() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_router("9", 100, 28);
        let replaced = cloud.change_band_width("9", 500).unwrap();
        assert_ne!(replaced.id, "9");
        assert!(cloud.resource(ResourceKind::Router, "9").is_none());
        assert!(matches!(
            replaced.details,
            ResourceDetails::Router {
                band_width_mbps: 500,
                ..
            }
        ));
    }

    #[test]
    fn test_injected_failure_is_recorded() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Down)
            .failing_on(Operation::Boot);
        assert!(cloud.boot(ResourceKind::Compute, "1").is_err());
        assert_eq!(cloud.operations(), vec![Operation::Boot]);
        assert_eq!(
            cloud.resource(ResourceKind::Compute, "1").unwrap().status,
            ObservedStatus::Down
        );
    }

    #[test]
    fn test_icon_lookup_is_fuzzy() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_icon("1", "Ubuntu Server")
            .with_icon("2", "CentOS");
        let icons = cloud.find_icons("ubuntu", 1).unwrap();
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].id, "1");
        assert!(cloud.find_icons("debian", 1).unwrap().is_empty());
    }
}
