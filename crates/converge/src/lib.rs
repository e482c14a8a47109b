//! # Converge
//!
//! Desired-state reconciliation for SAKURA Cloud resources.
//!
//! Given a resource kind, an optional id, a target [`StateToken`] and a set
//! of attributes, the engine observes the remote object, decides which
//! operations are needed, runs them in a fixed safe order and waits for the
//! asynchronous ones to settle.
//!
//! ## Core Concepts
//!
//! - **DesiredState**: what one resource should look like
//! - **KindAdapter**: per-kind validation, drafts and facts
//! - **Plan**: ordered steps from the observed state to the target
//! - **Engine**: runs a plan, stops at the first failure, never rolls back
//! - **Poller**: bounded wait for an observed status
//! - **Outcome**: the `{changed, facts, error}` report
//!
//! ## Example
//!
//! ```
//! use converge::{Attributes, DesiredState, Engine, Outcome, StateToken};
//! use sacloud::memory::MemoryCloud;
//! use sacloud::{ObservedStatus, ResourceKind, ResourceRef, Zone};
//!
//! let cloud = MemoryCloud::new(Zone::Is1a).with_server("123", ObservedStatus::Down);
//! let desired = DesiredState::new(
//!     ResourceRef::existing(ResourceKind::Compute, "123"),
//!     StateToken::Stopped,
//!     Attributes::new(),
//! )
//! .unwrap();
//!
//! let outcome = Outcome::from(Engine::new(&cloud).reconcile(&desired));
//! assert!(!outcome.changed);
//! ```
//!
//! ## Guarantees
//!
//! - Invalid parameters fail before any remote call.
//! - A dry run issues lookups only, yet reports the `changed` a real run
//!   would report.
//! - Servers are stopped and observed down before disks are detached, and
//!   disks are detached before the server is destroyed.

#![warn(clippy::all)]

pub mod adapter;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod planner;
pub mod poller;
pub mod report;
pub mod types;

// Re-export main types at crate root
pub use adapter::{KindAdapter, adapter_for};
pub use context::{NoProgress, ProgressCallback};
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use executor::{BatchOptions, BatchReport, BatchSummary, execute_batch, execute_batch_simple};
pub use planner::{Plan, Step};
pub use poller::{CancelToken, NoObserver, PollBudget, PollObserver, Poller};
pub use report::{ErrorInfo, Outcome};
pub use types::{Attributes, DesiredState, Facts, ReconciliationResult, StateToken};
