//! Progress reporting hooks
//!
//! These traits let the engine report progress without depending on a
//! specific UI.

use crate::status::Status;
use crate::types::ResourceRef;

/// Progress callback for a transaction
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called before a resource is evaluated
    fn on_resource_start(&mut self, resource: &ResourceRef);

    /// Called with the status of every evaluated or skipped resource
    fn on_resource_complete(&mut self, status: &Status);

    /// Called when a resource added `count` new resources to the run
    fn on_generated(&mut self, parent: &ResourceRef, count: usize);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&mut self, _resource: &ResourceRef) {}
    fn on_resource_complete(&mut self, _status: &Status) {}
    fn on_generated(&mut self, _parent: &ResourceRef, _count: usize) {}
}
