//! Blocking wait for a resource to reach an observed status.
//!
//! The poller only reads. It re-fetches the status at a fixed interval and
//! gives up after a fixed number of observations, so every wait is bounded
//! by `max_attempts x interval`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;
use sacloud::{CloudApi, ObservedStatus, ResourceRef};

use crate::error::{Error, Result};

/// How long to keep observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Pause between two observations
    pub interval: Duration,
    /// Number of observations before giving up
    pub max_attempts: u32,
}

impl PollBudget {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound of the time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 120)
    }
}

/// Shared flag that stops waits between two observations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives every observation made while waiting.
pub trait PollObserver: Sync {
    fn on_observation(
        &self,
        resource: &ResourceRef,
        attempt: u32,
        observed: ObservedStatus,
        expected: ObservedStatus,
    );
}

/// Observer that ignores everything.
pub struct NoObserver;

impl PollObserver for NoObserver {
    fn on_observation(&self, _: &ResourceRef, _: u32, _: ObservedStatus, _: ObservedStatus) {}
}

/// Waits for resources to reach a status within a [`PollBudget`].
#[derive(Clone, Copy)]
pub struct Poller<'a> {
    budget: PollBudget,
    cancel: Option<&'a CancelToken>,
    observer: &'a dyn PollObserver,
}

impl Default for Poller<'_> {
    fn default() -> Self {
        Self::new(PollBudget::default())
    }
}

impl<'a> Poller<'a> {
    pub fn new(budget: PollBudget) -> Self {
        Self {
            budget,
            cancel: None,
            observer: &NoObserver,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn PollObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn budget(&self) -> PollBudget {
        self.budget
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Block until `resource` is observed in `expected` status.
    ///
    /// Makes at most `max_attempts` observations and sleeps only between
    /// them. Returns [`Error::Timeout`] with the last observed status when
    /// the budget runs out or the wait is cancelled.
    pub fn await_status(
        &self,
        api: &dyn CloudApi,
        resource: &ResourceRef,
        expected: ObservedStatus,
    ) -> Result<()> {
        let Some(id) = resource.id() else {
            return Err(Error::validation(format!("cannot wait for {resource} without an id")));
        };

        let mut last_observed = None;
        let mut attempts = 0;
        while attempts < self.budget.max_attempts {
            if attempts > 0 {
                if self.cancelled() {
                    debug!("wait for {resource} cancelled after {attempts} observation(s)");
                    break;
                }
                thread::sleep(self.budget.interval);
            }
            attempts += 1;

            let observed = api
                .status(resource.kind, id)
                .map_err(Error::lookup("status", resource))?;
            debug!(
                "{resource}: observed {observed}, waiting for {expected} ({attempts}/{})",
                self.budget.max_attempts
            );
            self.observer
                .on_observation(resource, attempts, observed, expected);

            if observed == expected {
                return Ok(());
            }
            last_observed = Some(observed);
        }

        Err(Error::Timeout {
            resource: resource.clone(),
            expected,
            last_observed,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use sacloud::memory::{MemoryCloud, Operation};
    use sacloud::{ResourceKind, StopMode, Zone};
    use std::sync::Mutex;

    fn instant(max_attempts: u32) -> Poller<'static> {
        Poller::new(PollBudget::new(Duration::ZERO, max_attempts))
    }

    fn server() -> ResourceRef {
        ResourceRef::existing(ResourceKind::Compute, "1")
    }

    #[test]
    fn test_returns_on_first_match() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Up);
        instant(5)
            .await_status(&cloud, &server(), ObservedStatus::Up)
            .unwrap();
        assert_eq!(cloud.count(Operation::Status), 1);
    }

    #[test]
    fn test_waits_for_transition() {
        let cloud = MemoryCloud::new(Zone::Is1a)
            .with_server("1", ObservedStatus::Up)
            .with_settle_reads(3);
        cloud
            .stop(ResourceKind::Compute, "1", StopMode::Force)
            .unwrap();

        instant(10)
            .await_status(&cloud, &server(), ObservedStatus::Down)
            .unwrap();
        assert_eq!(cloud.count(Operation::Status), 4);
    }

    #[test]
    fn test_timeout_makes_exactly_max_attempts_observations() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Up);
        let err = instant(7)
            .await_status(&cloud, &server(), ObservedStatus::Down)
            .unwrap_err();

        assert_eq!(cloud.count(Operation::Status), 7);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        match err {
            Error::Timeout {
                last_observed,
                attempts,
                expected,
                ..
            } => {
                assert_eq!(last_observed, Some(ObservedStatus::Up));
                assert_eq!(attempts, 7);
                assert_eq!(expected, ObservedStatus::Down);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_polling_never_mutates() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Down);
        let _ = instant(3).await_status(&cloud, &server(), ObservedStatus::Up);
        assert!(cloud.mutating_calls().is_empty());
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let cloud = MemoryCloud::new(Zone::Is1a);
        let err = instant(3)
            .await_status(&cloud, &server(), ObservedStatus::Up)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(cloud.count(Operation::Status), 1);
    }

    #[test]
    fn test_cancel_stops_between_attempts() {
        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Up);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = instant(50)
            .with_cancel(&cancel)
            .await_status(&cloud, &server(), ObservedStatus::Down)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(cloud.count(Operation::Status), 1);
    }

    #[test]
    fn test_observer_sees_every_attempt() {
        struct Recorder(Mutex<Vec<u32>>);
        impl PollObserver for Recorder {
            fn on_observation(
                &self,
                _: &ResourceRef,
                attempt: u32,
                _: ObservedStatus,
                _: ObservedStatus,
            ) {
                self.0.lock().unwrap().push(attempt);
            }
        }

        let cloud = MemoryCloud::new(Zone::Is1a).with_server("1", ObservedStatus::Up);
        let recorder = Recorder(Mutex::new(Vec::new()));
        let _ = instant(3)
            .with_observer(&recorder)
            .await_status(&cloud, &server(), ObservedStatus::Down);
        assert_eq!(*recorder.0.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_default_budget() {
        let budget = PollBudget::default();
        assert_eq!(budget.interval, Duration::from_secs(5));
        assert_eq!(budget.max_attempts, 120);
        assert_eq!(budget.max_wait(), Duration::from_secs(595));
    }
}
