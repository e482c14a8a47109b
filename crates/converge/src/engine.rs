//! Reconciliation engine - drives one resource to its target state.
//!
//! The engine validates, observes, asks the planner for steps and runs
//! them in order against a [`CloudApi`]. It stops at the first failing
//! step and never undoes earlier ones.

use log::{debug, info, warn};
use sacloud::{CloudApi, ObservedStatus, RemoteResource, ResourceKind, ResourceRef, SwitchTarget};

use crate::adapter::common::DEFAULT_NAME;
use crate::adapter::{KindAdapter, adapter_for, compute, id_facts, load_balancer, volume};
use crate::error::{Error, Result};
use crate::planner::{self, Plan, Step};
use crate::poller::Poller;
use crate::types::{DesiredState, Facts, ReconciliationResult, StateToken, missing};

/// Reconciles desired states against one zone of the cloud.
#[derive(Clone, Copy)]
pub struct Engine<'a> {
    api: &'a dyn CloudApi,
    poller: Poller<'a>,
}

/// Progress of one reconciliation.
struct Run {
    /// The subject; gets its id once created
    reference: ResourceRef,
    changed: bool,
    destroyed: bool,
    /// Address of the new server's shared-segment NIC
    nic_address: Option<String>,
    /// Boot disk created along with a new server
    boot_volume: Option<String>,
}

impl Run {
    fn new(reference: &ResourceRef) -> Self {
        Self {
            reference: reference.clone(),
            changed: false,
            destroyed: false,
            nic_address: None,
            boot_volume: None,
        }
    }

    fn id(&self) -> Result<String> {
        self.reference
            .id()
            .map(str::to_string)
            .ok_or_else(|| missing("id"))
    }

    fn boot_volume(&self) -> Result<(String, ResourceRef)> {
        let id = self.boot_volume.clone().ok_or_else(|| missing("disk"))?;
        let reference = ResourceRef::existing(ResourceKind::Volume, id.as_str());
        Ok((id, reference))
    }

    /// Facts known without asking the API: the ids created so far.
    fn known_facts(&self, adapter: &dyn KindAdapter) -> Facts {
        let mut facts = self
            .reference
            .id()
            .map(|id| id_facts(adapter, id))
            .unwrap_or_default();
        if let Some(disk) = &self.boot_volume {
            facts.insert(volume::FACT_DISK_ID.to_string(), disk.clone().into());
        }
        facts
    }
}

impl<'a> Engine<'a> {
    pub fn new(api: &'a dyn CloudApi) -> Self {
        Self {
            api,
            poller: Poller::default(),
        }
    }

    #[must_use]
    pub fn with_poller(mut self, poller: Poller<'a>) -> Self {
        self.poller = poller;
        self
    }

    pub fn api(&self) -> &'a dyn CloudApi {
        self.api
    }

    /// Bring the resource named by `desired` to its target state.
    ///
    /// Never panics and never returns early on error: failures end up in
    /// [`ReconciliationResult::error`] together with whether anything was
    /// changed before the failure.
    pub fn reconcile(&self, desired: &DesiredState) -> ReconciliationResult {
        let adapter = adapter_for(desired.kind());
        let mut run = Run::new(&desired.reference);
        match self.drive(desired, adapter, &mut run) {
            Ok(facts) => ReconciliationResult {
                changed: run.changed,
                facts,
                error: None,
            },
            Err(err) => {
                debug!("{desired} failed: {err}");
                ReconciliationResult::failed(run.changed, run.known_facts(adapter), err)
            }
        }
    }

    /// Compute the plan for `desired` without running it.
    ///
    /// Performs lookups only. `Ok(None)` means the resource is already
    /// absent.
    pub fn plan(&self, desired: &DesiredState) -> Result<Option<(Plan, Option<RemoteResource>)>> {
        adapter_for(desired.kind()).validate(desired)?;
        let Some(subject) = self.observe(desired)? else {
            if desired.reference.id().is_some() {
                return Ok(None);
            }
            return Ok(Some((planner::plan(desired, None, None)?, None)));
        };
        let peer = self.peer(desired)?;
        let plan = planner::plan(desired, Some(&subject), peer.as_ref())?;
        Ok(Some((plan, Some(subject))))
    }

    fn drive(
        &self,
        desired: &DesiredState,
        adapter: &dyn KindAdapter,
        run: &mut Run,
    ) -> Result<Facts> {
        let Some((plan, subject)) = self.plan(desired)? else {
            debug!("{} is already absent", desired.reference);
            return Ok(Facts::new());
        };

        if plan.is_empty() {
            debug!("{desired}: already satisfied");
            return match &subject {
                Some(resource) => adapter.extract_facts(self.api, resource),
                None => Ok(Facts::new()),
            };
        }

        if desired.dry_run {
            if plan.creates() {
                self.build_drafts(desired, adapter)?;
            }
            warn!("dry run: {} would {plan}", desired.reference);
            run.changed = true;
            return Ok(subject
                .map(|resource| id_facts(adapter, &resource.id))
                .unwrap_or_default());
        }

        for step in &plan.steps {
            self.execute(step, desired, adapter, run)?;
        }

        if run.destroyed {
            return Ok(run.known_facts(adapter));
        }
        let id = run.id()?;
        let resource = self
            .api
            .find(desired.kind(), &id)
            .map_err(Error::lookup("find", &run.reference))?;
        adapter.extract_facts(self.api, &resource)
    }

    /// The subject, or `None` when it has no id or no longer exists.
    fn observe(&self, desired: &DesiredState) -> Result<Option<RemoteResource>> {
        let Some(id) = desired.reference.id() else {
            return Ok(None);
        };
        match self.api.find(desired.kind(), id) {
            Ok(resource) => {
                debug!("{}: observed {}", desired.reference, resource.status);
                Ok(Some(resource))
            }
            Err(e) if e.is_not_found() && desired.target == StateToken::Absent => Ok(None),
            Err(e) => Err(Error::lookup("find", &desired.reference)(e)),
        }
    }

    /// The server a router is connected to or disconnected from.
    fn peer(&self, desired: &DesiredState) -> Result<Option<RemoteResource>> {
        let wants_peer = desired.kind() == ResourceKind::Router
            && matches!(
                desired.target,
                StateToken::Connected | StateToken::Disconnected
            );
        if !wants_peer {
            return Ok(None);
        }
        let server_id = desired.attributes.require_str("server_id")?;
        let server = ResourceRef::existing(ResourceKind::Compute, server_id);
        self.api
            .find(ResourceKind::Compute, server_id)
            .map(Some)
            .map_err(Error::lookup("find server", &server))
    }

    /// Run the read-only part of a create so missing catalog entries
    /// surface in a dry run too.
    fn build_drafts(&self, desired: &DesiredState, adapter: &dyn KindAdapter) -> Result<()> {
        adapter.build(self.api, &desired.attributes)?;
        if desired.kind() == ResourceKind::Compute
            && let Some(disk) = compute::bootstrap_disk(&desired.attributes)?
        {
            volume::draft(self.api, &disk, DEFAULT_NAME)?;
        }
        Ok(())
    }

    fn execute(
        &self,
        step: &Step,
        desired: &DesiredState,
        adapter: &dyn KindAdapter,
        run: &mut Run,
    ) -> Result<()> {
        let api = self.api;
        let kind = desired.kind();
        let attributes = &desired.attributes;
        if step.is_mutating() {
            info!("{}: {step}", run.reference);
        }

        match step {
            Step::Create => {
                let draft = adapter.build(api, attributes)?;
                let created = api
                    .create(&draft)
                    .map_err(Error::remote("create", &run.reference))?;
                run.changed = true;
                run.reference = created.reference();
                info!("created {}", run.reference);
            }
            Step::AwaitStatus(status) => {
                self.poller.await_status(api, &run.reference, *status)?;
            }
            Step::Stop(mode) => {
                api.stop(kind, &run.id()?, *mode)
                    .map_err(Error::remote("stop", &run.reference))?;
                run.changed = true;
            }
            Step::Boot => {
                api.boot(kind, &run.id()?)
                    .map_err(Error::remote("boot", &run.reference))?;
                run.changed = true;
            }
            Step::DetachVolume { volume_id } => {
                let disk = ResourceRef::existing(ResourceKind::Volume, volume_id.as_str());
                api.disconnect_disk(volume_id)
                    .map_err(Error::remote("detach disk", &disk))?;
                run.changed = true;
            }
            Step::Destroy => {
                api.destroy(kind, &run.id()?)
                    .map_err(Error::remote("destroy", &run.reference))?;
                run.changed = true;
                run.destroyed = true;
            }
            Step::ConnectVolume { server_id } => {
                api.connect_disk(&run.id()?, server_id)
                    .map_err(Error::remote("attach disk", &run.reference))?;
                run.changed = true;
            }
            Step::DisconnectVolume => {
                api.disconnect_disk(&run.id()?)
                    .map_err(Error::remote("detach disk", &run.reference))?;
                run.changed = true;
            }
            Step::WriteVolumeConfig => {
                let config = volume::disk_config(attributes)?;
                api.write_disk_config(&run.id()?, &config)
                    .map_err(Error::remote("write disk configuration", &run.reference))?;
                run.changed = true;
            }
            Step::ConnectRouter { server_id } => {
                self.connect_router(server_id, run)?;
            }
            Step::DisconnectInterfaces { interface_ids } => {
                for interface_id in interface_ids {
                    api.disconnect_interface(interface_id)
                        .map_err(Error::remote("disconnect interface", &run.reference))?;
                    run.changed = true;
                }
            }
            Step::ChangeBandWidth { band_width_mbps } => {
                let router = api
                    .change_band_width(&run.id()?, *band_width_mbps)
                    .map_err(Error::remote("change band width", &run.reference))?;
                run.changed = true;
                if router.id != run.id()? {
                    info!("{} replaced by router {}", run.reference, router.id);
                }
                run.reference = router.reference();
            }
            Step::WriteSettings => {
                let settings = load_balancer::settings(attributes)?;
                api.write_load_balancer_settings(&run.id()?, &settings)
                    .map_err(Error::remote("write settings", &run.reference))?;
                run.changed = true;
            }
            Step::ApplySettings => {
                api.apply_settings(&run.id()?)
                    .map_err(Error::remote("apply settings", &run.reference))?;
                run.changed = true;
            }
            Step::ConnectSharedSegment => {
                let id = run.id()?;
                let nic = api
                    .add_interface(&id)
                    .map_err(Error::remote("add interface", &run.reference))?;
                run.changed = true;
                let nic = api
                    .connect_interface(&nic.id, &SwitchTarget::Shared)
                    .map_err(Error::remote("connect to shared segment", &run.reference))?;
                let address = nic.ip_address.ok_or_else(|| Error::RemoteOperation {
                    operation: "connect to shared segment",
                    resource: run.reference.clone(),
                    cause: sacloud::Error::Decode(format!("interface {} has no address", nic.id)),
                })?;
                debug!("{}: shared segment address {address}", run.reference);
                run.nic_address = Some(address);
            }
            Step::CreateBootVolume => {
                let disk = compute::bootstrap_disk(attributes)?.ok_or_else(|| missing("disk"))?;
                let draft = volume::draft(api, &disk, DEFAULT_NAME)?;
                let created = api
                    .create(&draft)
                    .map_err(Error::remote("create boot disk", &run.reference))?;
                run.changed = true;
                info!("created {} for {}", created.reference(), run.reference);
                run.boot_volume = Some(created.id);
            }
            Step::AwaitBootVolume => {
                let (_, boot_volume) = run.boot_volume()?;
                self.poller
                    .await_status(api, &boot_volume, ObservedStatus::Up)?;
            }
            Step::WriteBootVolumeConfig => {
                let disk = compute::bootstrap_disk(attributes)?.ok_or_else(|| missing("disk"))?;
                let address = run.nic_address.as_deref().ok_or_else(|| {
                    Error::precondition(&run.reference, "no shared segment address")
                })?;
                let config = compute::bootstrap_config(&disk, address)?;
                let (disk_id, boot_volume) = run.boot_volume()?;
                api.write_disk_config(&disk_id, &config)
                    .map_err(Error::remote("write disk configuration", &boot_volume))?;
                run.changed = true;
            }
            Step::AttachBootVolume => {
                let (disk_id, boot_volume) = run.boot_volume()?;
                api.connect_disk(&disk_id, &run.id()?)
                    .map_err(Error::remote("attach disk", &boot_volume))?;
                run.changed = true;
            }
        }
        Ok(())
    }

    /// Plug a new interface of `server_id` into the subject router's switch.
    fn connect_router(&self, server_id: &str, run: &mut Run) -> Result<()> {
        let router_id = run.id()?;
        let network = self
            .api
            .router_network(&router_id)
            .map_err(Error::lookup("read router network", &run.reference))?;
        let server = ResourceRef::existing(ResourceKind::Compute, server_id);
        let nic = self
            .api
            .add_interface(server_id)
            .map_err(Error::remote("add interface", &server))?;
        run.changed = true;
        let nic = self
            .api
            .connect_interface(&nic.id, &SwitchTarget::Switch(network.switch_id))
            .map_err(Error::remote("connect interface", &run.reference))?;
        info!(
            "{server} connected to {} as {}",
            run.reference,
            nic.ip_address.as_deref().unwrap_or("<unassigned>")
        );
        Ok(())
    }
}
