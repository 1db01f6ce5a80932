//! # Declarative
//!
//! A graph engine for declarative resource management.
//!
//! Resources declare desired state; the engine orders them, expands them,
//! converges each one and records what happened.
//!
//! ## Core Concepts
//!
//! - **Resource**: a value with a fixed capability set (retrieve, sync, and
//!   optionally autorequire, generate, refresh)
//! - **Catalog**: the declared resources, their explicit relationships and
//!   their containment
//! - **RelationshipGraph**: the execution graph, with containers spliced into
//!   `admissible`/`completed` sentinel pairs and a priority on every vertex
//! - **ResourceGenerator**: adds resources produced by other resources, before
//!   or during the walk
//! - **ResourceHarness**: syncs one resource and produces its [`Status`]
//! - **Transaction**: walks the graph and collects a [`Report`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Catalog, MemoryStore, NoProgress, Relationship, ResourceRef};
//! use declarative::{Transaction, TransactionOptions};
//! use std::sync::Arc;
//!
//! let mut catalog = Catalog::new("example");
//! catalog.add_resource(Arc::new(Marker { path: "/tmp/a".into() }))?;
//! catalog.add_resource(Arc::new(Marker { path: "/tmp/b".into() }))?;
//! catalog.add_relationship(Relationship::new(
//!     ResourceRef::new("marker", "/tmp/a"),
//!     ResourceRef::new("marker", "/tmp/b"),
//! ))?;
//!
//! let store = MemoryStore::new();
//! let mut transaction = Transaction::new(catalog, &store, TransactionOptions::default());
//! transaction.evaluate(&mut NoProgress)?;
//! println!("{} changed", transaction.report().summary.changed);
//! ```
//!
//! ## Provider Traits
//!
//! - [`StateStore`]: persists system values and check times between runs
//! - [`ProgressCallback`]: receives progress updates
//!
//! Neither is tied to a particular UI or storage format.

pub mod builtin;
pub mod catalog;
pub mod context;
pub mod error;
pub mod generator;
pub mod graph;
pub mod harness;
pub mod relationship;
pub mod report;
pub mod resource;
pub mod schedule;
pub mod status;
pub mod store;
pub mod transaction;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use builtin::{Container, WHIT, Whit};
pub use catalog::Catalog;
pub use context::{NoProgress, ProgressCallback};
pub use error::{Error, Result, SyncError};
pub use generator::ResourceGenerator;
pub use graph::ResourceGraph;
pub use harness::{ApplicationContext, PropertySync, ResourceHarness};
pub use relationship::RelationshipGraph;
pub use report::{Report, ReportSummary};
pub use resource::{Resource, ResourceExt, ResourceHandle, same_resource};
pub use schedule::{Period, Schedule};
pub use status::{Event, EventStatus, Status};
pub use store::{FileStore, MemoryStore, StateStore};
pub use transaction::{Transaction, TransactionOptions};
pub use types::{
    CurrentValues, EdgeLabel, Priority, Property, Relationship, ResourceKind, ResourceRef, Value,
};
