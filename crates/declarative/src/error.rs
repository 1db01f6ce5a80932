//! Error types for the declarative crate

use crate::status::Status;
use crate::types::ResourceRef;
use thiserror::Error;

/// Structural errors raised while building or walking a resource graph
#[derive(Error, Debug)]
pub enum Error {
    /// A distinct resource already occupies the same reference
    #[error("duplicate declaration: {reference} is already declared")]
    DuplicateResource { reference: ResourceRef },

    /// An alias would point at a key owned by another resource
    #[error("cannot alias {reference} to {alias}: {existing} is already declared")]
    AliasConflict {
        reference: ResourceRef,
        alias: ResourceRef,
        existing: ResourceRef,
    },

    /// A relationship names a resource that is not in the catalog
    #[error("could not find {endpoint} for relationship {from} -> {to}")]
    UnresolvedEdge {
        from: ResourceRef,
        to: ResourceRef,
        endpoint: ResourceRef,
    },

    /// Graph-aware generation was requested for a depth-first resource
    #[error("{resource}: depth-first resources are not supported by eval_generate")]
    DepthFirstEvalGenerate { resource: ResourceRef },

    /// A resource refers to a schedule the catalog does not contain
    #[error("{resource}: could not find schedule {schedule}")]
    MissingSchedule {
        resource: ResourceRef,
        schedule: String,
    },

    /// The relationship graph contains at least one cycle
    #[error("found {} dependency cycle(s): {}", .0.len(), format_cycles(.0))]
    DependencyCycle(Vec<Vec<ResourceRef>>),

    /// A string could not be parsed as `Type[title]`
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// A property sync failed in a way that must abort the resource
    #[error("{resource}: unrecoverable failure: {message}")]
    Unrecoverable {
        resource: ResourceRef,
        message: String,
        status: Box<Status>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_cycles(cycles: &[Vec<ResourceRef>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            format!("({})", names.join(" => "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised by a property sync
///
/// `Recoverable` failures become a failed event and evaluation continues
/// with the next property. `Fatal` failures are recorded and then abort the
/// whole resource evaluation.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0:#}")]
    Recoverable(anyhow::Error),

    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

impl SyncError {
    /// Build a fatal error from a message
    pub fn fatal(message: impl std::fmt::Display) -> Self {
        Self::Fatal(anyhow::anyhow!("{message}"))
    }

    /// Whether this failure must abort the resource
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        Self::Recoverable(err)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Recoverable(err.into())
    }
}
