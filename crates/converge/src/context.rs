//! Callback traits for batch execution
//!
//! These keep the converge crate free of any terminal or UI dependency.

use sacloud::ResourceRef;

use crate::types::ReconciliationResult;

/// Progress callback for batch execution
///
/// Implement this trait to receive progress updates while a batch runs.
pub trait ProgressCallback: Send {
    /// Called once before the first resource
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting to reconcile a single resource
    fn on_resource_start(&mut self, resource: &ResourceRef, description: &str);

    /// Called when a resource completes, successfully or not
    fn on_resource_complete(&mut self, resource: &ResourceRef, result: &ReconciliationResult);

    /// Called once after the last resource
    fn on_batch_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _resource: &ResourceRef, _description: &str) {}
    fn on_resource_complete(&mut self, _resource: &ResourceRef, _result: &ReconciliationResult) {}
    fn on_batch_complete(&mut self) {}
}
