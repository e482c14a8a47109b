//! Per-kind resource model adapters.
//!
//! An adapter knows everything kind-specific that is not sequencing: which
//! target states the kind supports, which attributes are valid, how to turn
//! attributes into a [`Draft`], and which facts to report afterwards. The
//! engine and planner stay generic over kinds.

pub mod common;
pub mod compute;
pub mod load_balancer;
pub mod router;
pub mod volume;

use sacloud::{CloudApi, Draft, ObservedStatus, RemoteResource, ResourceKind, StopMode};

use crate::error::Result;
use crate::types::{Attributes, DesiredState, Facts, StateToken};

pub use compute::ComputeAdapter;
pub use load_balancer::LoadBalancerAdapter;
pub use router::RouterAdapter;
pub use volume::VolumeAdapter;

/// Kind-specific knowledge used by the reconciliation engine.
pub trait KindAdapter: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Target states the kind supports.
    fn legal_states(&self) -> &'static [StateToken];

    /// Name of the fact carrying the resource id.
    fn id_fact(&self) -> &'static str;

    /// Check attributes for the requested transition.
    ///
    /// Runs before any remote call; a failure here guarantees that nothing
    /// was sent.
    fn validate(&self, desired: &DesiredState) -> Result<()>;

    /// Turn attributes into a draft, resolving catalog references.
    ///
    /// Only read-only lookups are allowed here.
    fn build(&self, api: &dyn CloudApi, attributes: &Attributes) -> Result<Draft>;

    /// Facts to report for a resource after a successful run.
    fn extract_facts(&self, api: &dyn CloudApi, resource: &RemoteResource) -> Result<Facts>;

    /// Status reached once an asynchronous create has finished, if any.
    fn ready_status(&self) -> Option<ObservedStatus> {
        None
    }

    /// How the `Stopped` target brings the resource down.
    fn stop_mode(&self, attributes: &Attributes) -> Result<StopMode> {
        Ok(if attributes.bool("force")?.unwrap_or(false) {
            StopMode::Force
        } else {
            StopMode::Graceful
        })
    }
}

/// Look up the adapter for a kind.
pub fn adapter_for(kind: ResourceKind) -> &'static dyn KindAdapter {
    match kind {
        ResourceKind::Compute => &ComputeAdapter,
        ResourceKind::Volume => &VolumeAdapter,
        ResourceKind::Router => &RouterAdapter,
        ResourceKind::LoadBalancer => &LoadBalancerAdapter,
    }
}

/// Facts holding only the id of a resource.
pub fn id_facts(adapter: &dyn KindAdapter, id: &str) -> Facts {
    let mut facts = Facts::new();
    facts.insert(adapter.id_fact().to_string(), id.into());
    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_table_matches_kind() {
        for kind in ResourceKind::all() {
            assert_eq!(adapter_for(*kind).kind(), *kind);
            assert!(adapter_for(*kind).legal_states().contains(&StateToken::Present));
            assert!(adapter_for(*kind).legal_states().contains(&StateToken::Absent));
        }
    }

    #[test]
    fn test_only_load_balancer_accepts_applied() {
        for kind in ResourceKind::all() {
            let accepts = adapter_for(*kind)
                .legal_states()
                .contains(&StateToken::Applied);
            assert_eq!(accepts, *kind == ResourceKind::LoadBalancer);
        }
    }

    #[test]
    fn test_id_facts() {
        let facts = id_facts(adapter_for(ResourceKind::Router), "9");
        assert_eq!(facts["sacloud_router_resource_id"], "9");
    }
}
