//! Built-in structural resource types

use crate::resource::{Resource, ResourceHandle};
use crate::types::{ResourceKind, ResourceRef};
use std::sync::Arc;

/// Type name of sentinel resources
pub const WHIT: &str = "Whit";

/// A zero-behavior sentinel used only inside the relationship graph
#[derive(Debug, Clone)]
pub struct Whit {
    name: String,
}

impl Whit {
    /// Create a sentinel with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// "Work on `container` may begin"
    pub fn admissible(container: &ResourceRef) -> ResourceHandle {
        Arc::new(Self::new(format!("admissible_{container}")))
    }

    /// "`resource` and everything it contains or generated are done"
    pub fn completed(resource: &ResourceRef) -> ResourceHandle {
        Arc::new(Self::new(format!("completed_{resource}")))
    }

    /// Reference of the admissible sentinel for `container`
    pub fn admissible_ref(container: &ResourceRef) -> ResourceRef {
        ResourceRef::new(WHIT, &format!("admissible_{container}"))
    }

    /// Reference of the completed sentinel for `resource`
    pub fn completed_ref(resource: &ResourceRef) -> ResourceRef {
        ResourceRef::new(WHIT, &format!("completed_{resource}"))
    }
}

impl Resource for Whit {
    fn reference(&self) -> ResourceRef {
        ResourceRef::new(WHIT, &self.name)
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Whit
    }

    fn refreshable(&self) -> bool {
        true
    }
}

/// A structural grouping: stage, class or defined-type instance
#[derive(Debug, Clone)]
pub struct Container {
    reference: ResourceRef,
    tags: Vec<String>,
}

impl Container {
    /// A container of any type
    pub fn new(type_name: &str, title: &str) -> Self {
        Self {
            reference: ResourceRef::new(type_name, title),
            tags: Vec::new(),
        }
    }

    /// `Stage[title]`
    pub fn stage(title: &str) -> Self {
        Self::new("Stage", title)
    }

    /// `Class[title]`
    pub fn class(title: &str) -> Self {
        Self::new("Class", title)
    }

    /// Attach tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

impl Resource for Container {
    fn reference(&self) -> ResourceRef {
        self.reference.clone()
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Container
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }
}
