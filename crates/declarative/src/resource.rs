//! Resource trait for declarative state management
//!
//! A Resource is a value with a fixed capability set: it names itself,
//! lists the properties it manages, reports their current values, and can
//! sync each one. Optional capabilities (autorequire, generation, refresh,
//! flush) have no-op defaults.

use crate::catalog::Catalog;
use crate::error::SyncError;
use crate::schedule::Schedule;
use crate::types::{ABSENT, CurrentValues, Property, Relationship, ResourceKind, ResourceRef, Value};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Core trait for declarative resources
///
/// # Example
///
/// ```ignore
/// use declarative::{Property, Resource, ResourceRef, SyncError, CurrentValues};
///
/// #[derive(Debug)]
/// struct Marker { path: String }
///
/// impl Resource for Marker {
///     fn reference(&self) -> ResourceRef {
///         ResourceRef::new("marker", &self.path)
///     }
///
///     fn properties(&self) -> Vec<Property> {
///         vec![Property::new("ensure", "present")]
///     }
///
///     fn retrieve(&self) -> anyhow::Result<CurrentValues> {
///         let state = if std::path::Path::new(&self.path).exists() { "present" } else { "absent" };
///         Ok(CurrentValues::from([("ensure".to_string(), state.into())]))
///     }
///
///     fn sync(&self, _property: &Property) -> Result<(), SyncError> {
///         std::fs::write(&self.path, "")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Canonical `Type[title]` identity
    fn reference(&self) -> ResourceRef;

    /// Uniqueness key, when it differs from the title (e.g. a path declared under a friendly title)
    fn name(&self) -> Option<String> {
        None
    }

    /// Whether the resource may be looked up by its uniqueness key as well as its title
    fn isomorphic(&self) -> bool {
        true
    }

    /// Structural role
    fn kind(&self) -> ResourceKind {
        ResourceKind::Managed
    }

    /// Managed properties with their desired values, `ensure` first when present
    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }

    /// Current real-world values of the managed properties
    fn retrieve(&self) -> Result<CurrentValues> {
        Ok(CurrentValues::new())
    }

    /// Whether the resource exists, judged from retrieved values
    fn present(&self, current: &CurrentValues) -> bool {
        !matches!(current.get("ensure"), Some(Value::String(s)) if s == ABSENT)
    }

    /// Whether a property's current value already satisfies the desired one
    fn insync(&self, property: &Property, current: &Value) -> bool {
        property.insync(current)
    }

    /// Bring one property to its desired value
    fn sync(&self, property: &Property) -> std::result::Result<(), SyncError> {
        Err(SyncError::Recoverable(anyhow::anyhow!(
            "{} does not know how to sync {}",
            self.reference(),
            property.name
        )))
    }

    /// Called once after properties changed, for providers that batch writes
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the resource reacts to refresh events
    fn refreshable(&self) -> bool {
        false
    }

    /// React to an upstream change (restart a service, rerun a command)
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Report changes without applying them
    fn noop(&self) -> bool {
        false
    }

    /// Name of the schedule gating this resource
    fn schedule(&self) -> Option<String> {
        None
    }

    /// Declared tags
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Implicit dependency edges inferred from the resource's own configuration
    fn autorequire(&self, _catalog: &Catalog) -> Vec<Relationship> {
        Vec::new()
    }

    /// Eagerly produce additional resources
    fn generate(&self) -> Result<Vec<ResourceHandle>> {
        Ok(Vec::new())
    }

    /// Whether the resource supports graph-aware generation
    fn eval_generates(&self) -> bool {
        false
    }

    /// Produce resources that are spliced into the graph while it is being walked
    fn eval_generate(&self) -> Result<Vec<ResourceHandle>> {
        Ok(Vec::new())
    }

    /// Generated children run before this resource instead of after it
    fn depthfirst(&self) -> bool {
        false
    }

    /// References of resources this one was generated beneath, nearest first
    fn ancestors(&self) -> Vec<ResourceRef> {
        Vec::new()
    }

    /// Schedule behavior, for resources of the schedule type
    fn as_schedule(&self) -> Option<&Schedule> {
        None
    }
}

/// A shared, type-erased resource
pub type ResourceHandle = Arc<dyn Resource>;

/// Extension trait for working with resources
pub trait ResourceExt {
    /// Whether the resource is a container
    fn is_container(&self) -> bool;

    /// Whether the resource is a sentinel
    fn is_whit(&self) -> bool;

    /// The alias key derived from the uniqueness key, if it differs from the reference
    fn alias_key(&self) -> Option<ResourceRef>;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn is_container(&self) -> bool {
        self.kind() == ResourceKind::Container
    }

    fn is_whit(&self) -> bool {
        self.kind() == ResourceKind::Whit
    }

    fn alias_key(&self) -> Option<ResourceRef> {
        if !self.isomorphic() {
            return None;
        }
        let reference = self.reference();
        let name = self.name()?;
        (name != reference.title()).then(|| ResourceRef::new(reference.type_name(), &name))
    }
}

/// Whether two handles are the same instance
pub fn same_resource(a: &ResourceHandle, b: &ResourceHandle) -> bool {
    Arc::ptr_eq(a, b)
}
