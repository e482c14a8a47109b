//! Batch execution - reconciles many resources on a thread pool

use std::collections::HashSet;

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::context::{NoProgress, ProgressCallback};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{DesiredState, ReconciliationResult};

/// Options for [`execute_batch`].
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Number of resources reconciled at once
    pub jobs: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

/// Counts of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ReconciliationResult) {
        if !result.is_success() {
            self.failed += 1;
        } else if result.changed {
            self.changed += 1;
        } else {
            self.unchanged += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Results of a batch, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<ReconciliationResult>,
    pub summary: BatchSummary,
}

/// Reject two entries naming the same existing object.
///
/// New resources (no id) never collide.
fn check_disjoint(desired: &[DesiredState]) -> Result<()> {
    let mut seen = HashSet::new();
    for state in desired {
        if state.reference.id.is_some() && !seen.insert(&state.reference) {
            return Err(Error::validation(format!(
                "{} appears more than once in the batch",
                state.reference
            )));
        }
    }
    Ok(())
}

/// Reconcile every desired state, `options.jobs` at a time.
///
/// Each resource runs independently: a failure is recorded in its result
/// and does not stop the others. The only batch-level error is a
/// [`Error::Validation`] for duplicate references, raised before any
/// remote call.
pub fn execute_batch<P: ProgressCallback>(
    engine: &Engine<'_>,
    desired: &[DesiredState],
    options: BatchOptions,
    progress: &mut P,
) -> Result<BatchReport> {
    check_disjoint(desired)?;

    progress.on_batch_start(desired.len());
    let results = if options.jobs <= 1 || desired.len() <= 1 {
        execute_sequential(engine, desired, progress)
    } else {
        execute_parallel(engine, desired, options.jobs, progress)
    };
    progress.on_batch_complete();

    let mut summary = BatchSummary::default();
    for result in &results {
        summary.add_result(result);
    }
    Ok(BatchReport { results, summary })
}

fn execute_sequential<P: ProgressCallback>(
    engine: &Engine<'_>,
    desired: &[DesiredState],
    progress: &mut P,
) -> Vec<ReconciliationResult> {
    let mut results = Vec::with_capacity(desired.len());
    for state in desired {
        progress.on_resource_start(&state.reference, &state.to_string());
        let result = engine.reconcile(state);
        progress.on_resource_complete(&state.reference, &result);
        results.push(result);
    }
    results
}

/// Execute resources in parallel using rayon
fn execute_parallel<P: ProgressCallback>(
    engine: &Engine<'_>,
    desired: &[DesiredState],
    jobs: usize,
    progress: &mut P,
) -> Vec<ReconciliationResult> {
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool,
        Err(e) => {
            warn!("cannot start {jobs} worker threads ({e}), running sequentially");
            return execute_sequential(engine, desired, progress);
        }
    };
    debug!("reconciling {} resources on {jobs} threads", desired.len());

    // The callback is not shared across threads; starts are announced up
    // front and completions reported after the pool finishes.
    for state in desired {
        progress.on_resource_start(&state.reference, &state.to_string());
    }
    let results: Vec<ReconciliationResult> =
        pool.install(|| desired.par_iter().map(|state| engine.reconcile(state)).collect());
    for (state, result) in desired.iter().zip(&results) {
        progress.on_resource_complete(&state.reference, result);
    }
    results
}

/// Batch execution without callbacks
pub fn execute_batch_simple(
    engine: &Engine<'_>,
    desired: &[DesiredState],
    options: BatchOptions,
) -> Result<BatchReport> {
    execute_batch(engine, desired, options, &mut NoProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::poller::{PollBudget, Poller};
    use crate::types::{Attributes, StateToken};
    use sacloud::memory::{MemoryCloud, Operation};
    use sacloud::{ObservedStatus, ResourceKind, ResourceRef, Zone};
    use std::time::Duration;

    fn stop(id: &str) -> DesiredState {
        DesiredState::new(
            ResourceRef::existing(ResourceKind::Compute, id),
            StateToken::Stopped,
            Attributes::new(),
        )
        .unwrap()
    }

    fn cloud() -> MemoryCloud {
        MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Up)
            .with_server("2", ObservedStatus::Down)
            .with_server("3", ObservedStatus::Up)
    }

    fn engine(cloud: &MemoryCloud) -> Engine<'_> {
        Engine::new(cloud).with_poller(Poller::new(PollBudget::new(Duration::ZERO, 5)))
    }

    #[derive(Default)]
    struct Recorder {
        started: usize,
        completed: Vec<String>,
        batches: usize,
    }

    impl ProgressCallback for Recorder {
        fn on_batch_start(&mut self, _count: usize) {
            self.batches += 1;
        }
        fn on_resource_start(&mut self, _resource: &ResourceRef, _description: &str) {
            self.started += 1;
        }
        fn on_resource_complete(&mut self, resource: &ResourceRef, _result: &ReconciliationResult) {
            self.completed.push(resource.to_string());
        }
        fn on_batch_complete(&mut self) {}
    }

    #[test]
    fn test_parallel_batch_keeps_input_order() {
        let cloud = cloud();
        let desired = [stop("1"), stop("2"), stop("3"), stop("404")];
        let mut recorder = Recorder::default();
        let report = execute_batch(
            &engine(&cloud),
            &desired,
            BatchOptions { jobs: 3 },
            &mut recorder,
        )
        .unwrap();

        let changed: Vec<bool> = report.results.iter().map(|r| r.changed).collect();
        assert_eq!(changed, vec![true, false, true, false]);
        assert_eq!(
            report.results[3].error.as_ref().map(Error::kind),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(
            report.summary,
            BatchSummary {
                changed: 2,
                unchanged: 1,
                failed: 1
            }
        );
        assert_eq!(cloud.count(Operation::Stop), 2);
        assert_eq!(recorder.batches, 1);
        assert_eq!(recorder.started, 4);
        assert_eq!(
            recorder.completed,
            vec!["server 1", "server 2", "server 3", "server 404"]
        );
    }

    #[test]
    fn test_sequential_batch() {
        let cloud = cloud();
        let report =
            execute_batch_simple(&engine(&cloud), &[stop("1"), stop("2")], BatchOptions { jobs: 1 })
                .unwrap();
        assert_eq!(report.summary.total(), 2);
        assert!(report.summary.is_success());
    }

    #[test]
    fn test_duplicate_refs_rejected_before_any_call() {
        let cloud = cloud();
        let err = execute_batch_simple(
            &engine(&cloud),
            &[stop("1"), stop("2"), stop("1")],
            BatchOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_new_resources_never_collide() {
        let create = || {
            DesiredState::new(
                ResourceRef::new(ResourceKind::Router, None),
                StateToken::Present,
                Attributes::new(),
            )
            .unwrap()
        };
        assert!(check_disjoint(&[create(), create()]).is_ok());
    }
}
