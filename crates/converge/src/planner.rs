//! Reconciliation planner - maps a target state and the observed resource
//! onto an ordered list of steps.
//!
//! Planning is pure: it reads the resources handed in and never talks to
//! the remote API. An empty plan means the target is already satisfied.

use std::fmt;

use log::debug;
use sacloud::{ObservedStatus, RemoteResource, ResourceKind, StopMode};

use crate::adapter::{adapter_for, compute, load_balancer, router};
use crate::error::{Error, Result};
use crate::types::{DesiredState, StateToken};

/// One remote operation of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Build the draft and create the resource
    Create,
    /// Wait for the subject to reach a status
    AwaitStatus(ObservedStatus),
    Stop(StopMode),
    Boot,
    /// Detach a volume from the subject server
    DetachVolume { volume_id: String },
    Destroy,
    /// Attach the subject volume to a server
    ConnectVolume { server_id: String },
    /// Detach the subject volume from its server
    DisconnectVolume,
    /// Write guest configuration onto the subject volume
    WriteVolumeConfig,
    /// Plug a new interface of a server into the subject router's switch
    ConnectRouter { server_id: String },
    /// Unplug interfaces of a server from the subject router's switch
    DisconnectInterfaces { interface_ids: Vec<String> },
    ChangeBandWidth { band_width_mbps: u32 },
    WriteSettings,
    ApplySettings,
    /// Plug a new interface of the subject server into the shared segment
    ConnectSharedSegment,
    CreateBootVolume,
    AwaitBootVolume,
    WriteBootVolumeConfig,
    AttachBootVolume,
}

impl Step {
    /// Whether the step changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::AwaitStatus(_) | Self::AwaitBootVolume)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::AwaitStatus(status) => write!(f, "wait until {status}"),
            Self::Stop(StopMode::Graceful) => f.write_str("shut down"),
            Self::Stop(StopMode::Force) => f.write_str("stop"),
            Self::Boot => f.write_str("boot"),
            Self::DetachVolume { volume_id } => write!(f, "detach disk {volume_id}"),
            Self::Destroy => f.write_str("destroy"),
            Self::ConnectVolume { server_id } => write!(f, "attach to server {server_id}"),
            Self::DisconnectVolume => f.write_str("detach from server"),
            Self::WriteVolumeConfig => f.write_str("write disk configuration"),
            Self::ConnectRouter { server_id } => write!(f, "connect server {server_id}"),
            Self::DisconnectInterfaces { interface_ids } => {
                write!(f, "disconnect interface(s) {}", interface_ids.join(", "))
            }
            Self::ChangeBandWidth { band_width_mbps } => {
                write!(f, "change band width to {band_width_mbps} Mbps")
            }
            Self::WriteSettings => f.write_str("write settings"),
            Self::ApplySettings => f.write_str("apply settings"),
            Self::ConnectSharedSegment => f.write_str("connect to shared segment"),
            Self::CreateBootVolume => f.write_str("create boot disk"),
            Self::AwaitBootVolume => f.write_str("wait for boot disk"),
            Self::WriteBootVolumeConfig => f.write_str("write boot disk configuration"),
            Self::AttachBootVolume => f.write_str("attach boot disk"),
        }
    }
}

/// Ordered steps that bring a resource to its target state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Nothing to do: the target is already satisfied.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn creates(&self) -> bool {
        self.steps.first() == Some(&Step::Create)
    }

    pub fn destroys(&self) -> bool {
        self.steps.contains(&Step::Destroy)
    }

    /// First step that would change remote state.
    pub fn first_mutation(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_mutating())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("nothing to do");
        }
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        f.write_str(&steps.join(" -> "))
    }
}

/// Plan the steps for `desired`.
///
/// `subject` is the resource named by the desired state (`None` only for a
/// create). `peer` is the server of a router connect/disconnect.
pub fn plan(
    desired: &DesiredState,
    subject: Option<&RemoteResource>,
    peer: Option<&RemoteResource>,
) -> Result<Plan> {
    let Some(subject) = subject else {
        return match desired.target {
            StateToken::Present => plan_create(desired),
            StateToken::Absent => Ok(Plan::default()),
            _ => Err(crate::types::missing("id")),
        };
    };

    let kind = desired.kind();
    let attributes = &desired.attributes;
    let steps = match desired.target {
        StateToken::Present => plan_update(desired, subject)?,
        StateToken::Absent => plan_destroy(subject)?,
        StateToken::Stopped => match subject.status {
            ObservedStatus::Down => Vec::new(),
            ObservedStatus::Up => vec![
                Step::Stop(adapter_for(kind).stop_mode(attributes)?),
                Step::AwaitStatus(ObservedStatus::Down),
            ],
            other => return Err(not_settled(subject, other, "stop")),
        },
        StateToken::Running => match subject.status {
            ObservedStatus::Up => Vec::new(),
            ObservedStatus::Down => vec![Step::Boot, Step::AwaitStatus(ObservedStatus::Up)],
            other => return Err(not_settled(subject, other, "boot")),
        },
        StateToken::Connected => plan_connect(desired, subject, peer)?,
        StateToken::Disconnected => plan_disconnect(subject, peer)?,
        StateToken::Applied => {
            if subject.status != ObservedStatus::Down {
                return Err(Error::precondition(
                    &subject.reference(),
                    format!(
                        "settings can only be applied while stopped (currently {})",
                        subject.status
                    ),
                ));
            }
            let mut steps = Vec::new();
            if load_balancer::has_settings(attributes) {
                steps.push(Step::WriteSettings);
            }
            steps.push(Step::ApplySettings);
            steps
        }
    };

    let plan = Plan::new(steps);
    debug!("plan for {desired}: {plan}");
    Ok(plan)
}

fn not_settled(subject: &RemoteResource, status: ObservedStatus, action: &str) -> Error {
    Error::precondition(
        &subject.reference(),
        format!("cannot {action} while {status}"),
    )
}

fn plan_create(desired: &DesiredState) -> Result<Plan> {
    let adapter = adapter_for(desired.kind());
    let attributes = &desired.attributes;
    let mut steps = vec![Step::Create];
    if let Some(status) = adapter.ready_status() {
        steps.push(Step::AwaitStatus(status));
    }

    match desired.kind() {
        ResourceKind::Compute => {
            if compute::bootstrap_disk(attributes)?.is_some() {
                steps.extend([
                    Step::ConnectSharedSegment,
                    Step::CreateBootVolume,
                    Step::AwaitBootVolume,
                    Step::WriteBootVolumeConfig,
                    Step::AttachBootVolume,
                ]);
            }
            if compute::boot_after_create(attributes)? {
                steps.extend([Step::Boot, Step::AwaitStatus(ObservedStatus::Up)]);
            }
        }
        ResourceKind::Volume => {
            if !crate::adapter::volume::disk_config(attributes)?.is_empty() {
                steps.push(Step::WriteVolumeConfig);
            }
        }
        ResourceKind::Router => {
            if let Some(server_id) = attributes.str("connect")? {
                steps.push(Step::ConnectRouter {
                    server_id: server_id.to_string(),
                });
            }
        }
        ResourceKind::LoadBalancer => {}
    }

    let plan = Plan::new(steps);
    debug!("plan for {desired}: {plan}");
    Ok(plan)
}

/// `Present` on an existing resource: only a router's band width may change.
fn plan_update(desired: &DesiredState, subject: &RemoteResource) -> Result<Vec<Step>> {
    if subject.kind != ResourceKind::Router {
        return Ok(Vec::new());
    }
    if desired.attributes.contains("network_mask_len") {
        debug!(
            "{}: network_mask_len cannot change after creation, ignoring it",
            subject.reference()
        );
    }
    let requested = router::requested_band_width(&desired.attributes)?;
    Ok(match (requested, router::band_width(subject)) {
        (Some(wanted), Some(current)) if wanted != current => vec![
            Step::ChangeBandWidth {
                band_width_mbps: wanted,
            },
            Step::AwaitStatus(ObservedStatus::Up),
        ],
        _ => Vec::new(),
    })
}

/// Stop if running, detach dependents, then destroy.
fn plan_destroy(subject: &RemoteResource) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    match subject.kind {
        ResourceKind::Compute | ResourceKind::LoadBalancer => {
            match subject.status {
                ObservedStatus::Down => {}
                ObservedStatus::Up => {
                    steps.push(Step::Stop(StopMode::Force));
                    steps.push(Step::AwaitStatus(ObservedStatus::Down));
                }
                other => return Err(not_settled(subject, other, "destroy")),
            }
            for volume_id in subject.attached_disks() {
                steps.push(Step::DetachVolume {
                    volume_id: volume_id.clone(),
                });
            }
        }
        ResourceKind::Volume => {
            if let Some(server) = subject.attached_server() {
                return Err(Error::precondition(
                    &subject.reference(),
                    format!("still attached to server {server}; disconnect it first"),
                ));
            }
        }
        ResourceKind::Router => {}
    }
    steps.push(Step::Destroy);
    Ok(steps)
}

fn plan_connect(
    desired: &DesiredState,
    subject: &RemoteResource,
    peer: Option<&RemoteResource>,
) -> Result<Vec<Step>> {
    let server_id = desired.attributes.require_str("server_id")?;
    match subject.kind {
        ResourceKind::Volume => match subject.attached_server() {
            Some(current) if current == server_id => Ok(Vec::new()),
            Some(current) => Err(Error::precondition(
                &subject.reference(),
                format!("attached to server {current}, not {server_id}"),
            )),
            None => Ok(vec![Step::ConnectVolume {
                server_id: server_id.to_string(),
            }]),
        },
        ResourceKind::Router => {
            let connected = peer.zip(subject.switch_id()).is_some_and(|(server, switch)| {
                !router::interfaces_on_switch(server, switch).is_empty()
            });
            if connected {
                Ok(Vec::new())
            } else {
                Ok(vec![Step::ConnectRouter {
                    server_id: server_id.to_string(),
                }])
            }
        }
        _ => Err(Error::validation(format!(
            "state 'connected' is not supported for {}",
            subject.kind
        ))),
    }
}

fn plan_disconnect(subject: &RemoteResource, peer: Option<&RemoteResource>) -> Result<Vec<Step>> {
    match subject.kind {
        ResourceKind::Volume => Ok(if subject.attached_server().is_some() {
            vec![Step::DisconnectVolume]
        } else {
            Vec::new()
        }),
        ResourceKind::Router => {
            let interface_ids = peer
                .zip(subject.switch_id())
                .map(|(server, switch)| router::interfaces_on_switch(server, switch))
                .unwrap_or_default();
            Ok(if interface_ids.is_empty() {
                Vec::new()
            } else {
                vec![Step::DisconnectInterfaces { interface_ids }]
            })
        }
        _ => Err(Error::validation(format!(
            "state 'disconnected' is not supported for {}",
            subject.kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Attributes;
    use sacloud::{Interface, LoadBalancerSettings, ResourceDetails, ResourceRef, SwitchTarget};
    use serde_json::json;

    fn server(status: ObservedStatus, disks: &[&str]) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::Compute,
            id: "123".to_string(),
            name: "web".to_string(),
            status,
            details: ResourceDetails::Compute {
                disks: disks.iter().map(ToString::to_string).collect(),
                interfaces: Vec::new(),
            },
        }
    }

    fn volume(attached: Option<&str>) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::Volume,
            id: "45".to_string(),
            name: "data".to_string(),
            status: ObservedStatus::Up,
            details: ResourceDetails::Volume {
                server_id: attached.map(str::to_string),
            },
        }
    }

    fn router(band_width_mbps: u32) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::Router,
            id: "9".to_string(),
            name: "gw".to_string(),
            status: ObservedStatus::Up,
            details: ResourceDetails::Router {
                switch_id: "sw-9".to_string(),
                band_width_mbps,
                network_mask_len: 28,
            },
        }
    }

    fn load_balancer(status: ObservedStatus) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::LoadBalancer,
            id: "77".to_string(),
            name: "lb".to_string(),
            status,
            details: ResourceDetails::LoadBalancer {
                switch_id: Some("sw-9".to_string()),
                settings: LoadBalancerSettings::default(),
            },
        }
    }

    fn desired(
        resource: &RemoteResource,
        target: StateToken,
        attributes: Attributes,
    ) -> DesiredState {
        DesiredState::new(resource.reference(), target, attributes).unwrap()
    }

    #[test]
    fn test_destroy_running_server_orders_stop_detach_destroy() {
        let subject = server(ObservedStatus::Up, &["45", "46"]);
        let plan = plan(
            &desired(&subject, StateToken::Absent, Attributes::new()),
            Some(&subject),
            None,
        )
        .unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::Stop(StopMode::Force),
                Step::AwaitStatus(ObservedStatus::Down),
                Step::DetachVolume {
                    volume_id: "45".to_string()
                },
                Step::DetachVolume {
                    volume_id: "46".to_string()
                },
                Step::Destroy,
            ]
        );
    }

    #[test]
    fn test_destroy_stopped_server_skips_stop() {
        let subject = server(ObservedStatus::Down, &[]);
        let plan = plan(
            &desired(&subject, StateToken::Absent, Attributes::new()),
            Some(&subject),
            None,
        )
        .unwrap();
        assert_eq!(plan.steps, vec![Step::Destroy]);
    }

    #[test]
    fn test_destroy_unsettled_is_precondition() {
        for status in [
            ObservedStatus::Creating,
            ObservedStatus::Migrating,
            ObservedStatus::Unknown,
        ] {
            for subject in [server(status, &["45"]), load_balancer(status)] {
                let err = plan(
                    &desired(&subject, StateToken::Absent, Attributes::new()),
                    Some(&subject),
                    None,
                )
                .unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Precondition, "{status}");
            }
        }
    }

    #[test]
    fn test_destroy_attached_volume_is_precondition() {
        let subject = volume(Some("123"));
        let err = plan(
            &desired(&subject, StateToken::Absent, Attributes::new()),
            Some(&subject),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_absent_and_missing_is_empty() {
        let reference = ResourceRef::existing(ResourceKind::Compute, "123");
        let desired = DesiredState::new(reference, StateToken::Absent, Attributes::new()).unwrap();
        assert!(plan(&desired, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_power_transitions() {
        let up = server(ObservedStatus::Up, &[]);
        let down = server(ObservedStatus::Down, &[]);

        let stop = desired(&up, StateToken::Stopped, Attributes::new());
        assert_eq!(
            plan(&stop, Some(&up), None).unwrap().steps,
            vec![
                Step::Stop(StopMode::Graceful),
                Step::AwaitStatus(ObservedStatus::Down)
            ]
        );
        assert!(plan(&stop, Some(&down), None).unwrap().is_empty());

        let run = desired(&down, StateToken::Running, Attributes::new());
        assert_eq!(
            plan(&run, Some(&down), None).unwrap().steps,
            vec![Step::Boot, Step::AwaitStatus(ObservedStatus::Up)]
        );
        assert!(plan(&run, Some(&up), None).unwrap().is_empty());
    }

    #[test]
    fn test_force_stop() {
        let subject = load_balancer(ObservedStatus::Up);
        let stop = desired(
            &subject,
            StateToken::Stopped,
            Attributes::new().with("force", true),
        );
        assert_eq!(
            plan(&stop, Some(&subject), None).unwrap().steps[0],
            Step::Stop(StopMode::Force)
        );
    }

    #[test]
    fn test_transitional_status_is_precondition() {
        let subject = server(ObservedStatus::Migrating, &[]);
        let stop = desired(&subject, StateToken::Stopped, Attributes::new());
        let err = plan(&stop, Some(&subject), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_create_with_bootstrap_attaches_before_boot() {
        let reference = ResourceRef::new(ResourceKind::Compute, None);
        let attributes = Attributes::new()
            .with("disk", json!({ "archive_id": "1" }))
            .with("boot", true);
        let desired = DesiredState::new(reference, StateToken::Present, attributes).unwrap();
        let steps = plan(&desired, None, None).unwrap().steps;

        let attach = steps
            .iter()
            .position(|s| *s == Step::AttachBootVolume)
            .unwrap();
        let boot = steps.iter().position(|s| *s == Step::Boot).unwrap();
        assert!(attach < boot);
        assert_eq!(steps.first(), Some(&Step::Create));
        assert_eq!(steps.last(), Some(&Step::AwaitStatus(ObservedStatus::Up)));
    }

    #[test]
    fn test_create_volume_writes_config_only_when_given() {
        let reference = ResourceRef::new(ResourceKind::Volume, None);
        let plain =
            DesiredState::new(reference.clone(), StateToken::Present, Attributes::new()).unwrap();
        assert_eq!(
            plan(&plain, None, None).unwrap().steps,
            vec![Step::Create, Step::AwaitStatus(ObservedStatus::Up)]
        );

        let configured = DesiredState::new(
            reference,
            StateToken::Present,
            Attributes::new().with("host_name", "web01"),
        )
        .unwrap();
        assert_eq!(
            plan(&configured, None, None).unwrap().steps.last(),
            Some(&Step::WriteVolumeConfig)
        );
    }

    #[test]
    fn test_router_update_ignores_mask_and_changes_band_width() {
        let subject = router(100);
        let mask_only = desired(
            &subject,
            StateToken::Present,
            Attributes::new().with("network_mask_len", 27),
        );
        assert!(plan(&mask_only, Some(&subject), None).unwrap().is_empty());

        let same = desired(
            &subject,
            StateToken::Present,
            Attributes::new().with("band_width_mbps", 100),
        );
        assert!(plan(&same, Some(&subject), None).unwrap().is_empty());

        let faster = desired(
            &subject,
            StateToken::Present,
            Attributes::new()
                .with("network_mask_len", 27)
                .with("band_width_mbps", 500),
        );
        assert_eq!(
            plan(&faster, Some(&subject), None).unwrap().steps,
            vec![
                Step::ChangeBandWidth {
                    band_width_mbps: 500
                },
                Step::AwaitStatus(ObservedStatus::Up),
            ]
        );
    }

    #[test]
    fn test_volume_connect() {
        let attrs = || Attributes::new().with("server_id", "123");
        let free = volume(None);
        assert_eq!(
            plan(&desired(&free, StateToken::Connected, attrs()), Some(&free), None)
                .unwrap()
                .steps,
            vec![Step::ConnectVolume {
                server_id: "123".to_string()
            }]
        );

        let same = volume(Some("123"));
        assert!(
            plan(&desired(&same, StateToken::Connected, attrs()), Some(&same), None)
                .unwrap()
                .is_empty()
        );

        let other = volume(Some("999"));
        let err = plan(&desired(&other, StateToken::Connected, attrs()), Some(&other), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_volume_disconnect() {
        let attached = volume(Some("123"));
        assert_eq!(
            plan(
                &desired(&attached, StateToken::Disconnected, Attributes::new()),
                Some(&attached),
                None
            )
            .unwrap()
            .steps,
            vec![Step::DisconnectVolume]
        );
        let free = volume(None);
        assert!(
            plan(
                &desired(&free, StateToken::Disconnected, Attributes::new()),
                Some(&free),
                None
            )
            .unwrap()
            .is_empty()
        );
    }

    #[test]
    fn test_router_connect_checks_peer_interfaces() {
        let subject = router(100);
        let attrs = || Attributes::new().with("server_id", "123");
        let mut peer = server(ObservedStatus::Up, &[]);

        let connect = desired(&subject, StateToken::Connected, attrs());
        assert_eq!(
            plan(&connect, Some(&subject), Some(&peer)).unwrap().steps,
            vec![Step::ConnectRouter {
                server_id: "123".to_string()
            }]
        );

        peer.details = ResourceDetails::Compute {
            disks: Vec::new(),
            interfaces: vec![Interface {
                id: "nic-1".to_string(),
                ip_address: Some("203.0.113.4".to_string()),
                switch: Some(SwitchTarget::Switch("sw-9".to_string())),
            }],
        };
        assert!(plan(&connect, Some(&subject), Some(&peer)).unwrap().is_empty());

        let disconnect = desired(&subject, StateToken::Disconnected, attrs());
        assert_eq!(
            plan(&disconnect, Some(&subject), Some(&peer)).unwrap().steps,
            vec![Step::DisconnectInterfaces {
                interface_ids: vec!["nic-1".to_string()]
            }]
        );
    }

    #[test]
    fn test_applied_requires_down() {
        let up = load_balancer(ObservedStatus::Up);
        let err = plan(
            &desired(&up, StateToken::Applied, Attributes::new()),
            Some(&up),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let down = load_balancer(ObservedStatus::Down);
        let attrs = Attributes::new()
            .with("virtual_ip", "203.0.113.10")
            .with("lbserver_ips", json!(["203.0.113.20"]));
        assert_eq!(
            plan(&desired(&down, StateToken::Applied, attrs), Some(&down), None)
                .unwrap()
                .steps,
            vec![Step::WriteSettings, Step::ApplySettings]
        );
        assert_eq!(
            plan(
                &desired(&down, StateToken::Applied, Attributes::new()),
                Some(&down),
                None
            )
            .unwrap()
            .steps,
            vec![Step::ApplySettings]
        );
    }

    #[test]
    fn test_plan_display() {
        let plan = Plan::new(vec![Step::Stop(StopMode::Force), Step::Destroy]);
        assert_eq!(plan.to_string(), "stop -> destroy");
        assert_eq!(Plan::default().to_string(), "nothing to do");
        assert_eq!(plan.first_mutation(), Some(&Step::Stop(StopMode::Force)));
    }
}
