//! The catalog: every declared resource, its explicit relationships and containment
//!
//! The catalog is the user-visible model of a run. Execution happens on a
//! separate [`RelationshipGraph`] derived from it, so automatic edges and
//! sentinels never leak back into the catalog.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::relationship::RelationshipGraph;
use crate::resource::{ResourceExt, ResourceHandle, same_resource};
use crate::types::{Relationship, ResourceRef};

/// Declared resources plus the edges between them
#[derive(Debug, Default)]
pub struct Catalog {
    name: String,
    /// Canonical references and aliases, each mapping to one instance
    resource_table: HashMap<ResourceRef, ResourceHandle>,
    /// Alias keys registered for each canonical reference
    aliases: HashMap<ResourceRef, Vec<ResourceRef>>,
    /// Canonical references in declaration order
    resources: Vec<ResourceRef>,
    /// Explicit dependency edges
    graph: ResourceGraph,
    /// Container -> content edges
    containment: ResourceGraph,
    classes: BTreeSet<String>,
    tags: BTreeSet<String>,
    /// Tags picked up at runtime (copied from a generating parent)
    merged_tags: HashMap<ResourceRef, BTreeSet<String>>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Catalog name (usually the host it was compiled for)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a resource at the end of the declaration order
    ///
    /// Adding the same instance twice is a no-op; adding a distinct instance
    /// under an occupied reference is a duplicate declaration.
    pub fn add_resource(&mut self, resource: ResourceHandle) -> Result<()> {
        let at = self.resources.len();
        self.insert_resource(resource, at).map(|_| ())
    }

    /// Add a resource directly after `anchor` in the declaration order
    pub fn add_resource_after(&mut self, anchor: &ResourceRef, resource: ResourceHandle) -> Result<bool> {
        let at = self
            .position(anchor)
            .map_or(self.resources.len(), |p| p + 1);
        self.insert_resource(resource, at)
    }

    /// Add a resource directly before `anchor` in the declaration order
    pub fn add_resource_before(&mut self, anchor: &ResourceRef, resource: ResourceHandle) -> Result<bool> {
        let at = self.position(anchor).unwrap_or(self.resources.len());
        self.insert_resource(resource, at)
    }

    fn position(&self, reference: &ResourceRef) -> Option<usize> {
        let canonical = self.canonical(reference)?;
        self.resources.iter().position(|r| *r == canonical)
    }

    /// Insert at `at`; returns `false` if the same instance was already present
    fn insert_resource(&mut self, resource: ResourceHandle, at: usize) -> Result<bool> {
        let reference = resource.reference();
        if let Some(existing) = self.resource_table.get(&reference) {
            if same_resource(existing, &resource) {
                return Ok(false);
            }
            return Err(Error::DuplicateResource { reference });
        }

        let alias = resource.alias_key();
        if let Some(alias) = &alias
            && let Some(existing) = self.resource_table.get(alias)
        {
            return Err(Error::AliasConflict {
                reference,
                alias: alias.clone(),
                existing: existing.reference(),
            });
        }

        log::trace!("{}: adding to catalog {}", reference, self.name);
        self.resource_table.insert(reference.clone(), resource.clone());
        if let Some(alias) = alias {
            self.resource_table.insert(alias.clone(), resource);
            self.aliases.entry(reference.clone()).or_default().push(alias);
        }
        self.resources.insert(at.min(self.resources.len()), reference.clone());
        self.graph.add_vertex(&reference);
        Ok(true)
    }

    /// Register an additional lookup key for a declared resource
    pub fn alias(&mut self, reference: &ResourceRef, key: ResourceRef) -> Result<()> {
        let resource = self
            .lookup(reference)
            .ok_or_else(|| Error::InvalidReference(reference.to_string()))?;
        if let Some(existing) = self.resource_table.get(&key) {
            if same_resource(existing, &resource) {
                return Ok(());
            }
            return Err(Error::AliasConflict {
                reference: resource.reference(),
                alias: key,
                existing: existing.reference(),
            });
        }
        self.resource_table.insert(key.clone(), resource.clone());
        self.aliases.entry(resource.reference()).or_default().push(key);
        Ok(())
    }

    /// Remove resources, their aliases, their vertices and every incident edge
    pub fn remove_resource(&mut self, references: &[ResourceRef]) {
        for reference in references {
            let Some(canonical) = self.canonical(reference) else {
                continue;
            };
            self.resource_table.remove(&canonical);
            for alias in self.aliases.remove(&canonical).unwrap_or_default() {
                self.resource_table.remove(&alias);
            }
            self.resources.retain(|r| *r != canonical);
            self.graph.remove_vertex(&canonical);
            self.containment.remove_vertex(&canonical);
            self.merged_tags.remove(&canonical);
            log::trace!("{}: removed from catalog {}", canonical, self.name);
        }
    }

    /// Find a resource by type and title, falling back to its uniqueness key
    pub fn resource(&self, type_name: &str, title: &str) -> Option<ResourceHandle> {
        let key = ResourceRef::new(type_name, title);
        if let Some(found) = self.resource_table.get(&key) {
            return Some(found.clone());
        }
        self.resources
            .iter()
            .filter(|r| r.type_name() == key.type_name())
            .filter_map(|r| self.resource_table.get(r))
            .find(|r| r.name().as_deref() == Some(title))
            .cloned()
    }

    /// Find a resource by reference (canonical or alias)
    pub fn lookup(&self, reference: &ResourceRef) -> Option<ResourceHandle> {
        self.resource(reference.type_name(), reference.title())
    }

    /// Resolve a reference or alias to the canonical reference
    pub fn canonical(&self, reference: &ResourceRef) -> Option<ResourceRef> {
        self.lookup(reference).map(|r| r.reference())
    }

    /// Whether a resource is declared under this reference
    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.lookup(reference).is_some()
    }

    /// Canonical references in declaration order
    pub fn resource_refs(&self) -> &[ResourceRef] {
        &self.resources
    }

    /// Resources in declaration order
    pub fn resources(&self) -> Vec<ResourceHandle> {
        self.resources
            .iter()
            .filter_map(|r| self.resource_table.get(r).cloned())
            .collect()
    }

    /// Number of declared resources (aliases not counted)
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Add an explicit relationship; both endpoints must be declared
    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<()> {
        let source = self.resolve_endpoint(&relationship, &relationship.source)?;
        let target = self.resolve_endpoint(&relationship, &relationship.target)?;
        self.graph.add_edge(&source, &target, relationship.label);
        Ok(())
    }

    fn resolve_endpoint(&self, relationship: &Relationship, endpoint: &ResourceRef) -> Result<ResourceRef> {
        self.canonical(endpoint).ok_or_else(|| Error::UnresolvedEdge {
            from: relationship.source.clone(),
            to: relationship.target.clone(),
            endpoint: endpoint.clone(),
        })
    }

    /// Explicit relationships
    pub fn relationships(&self) -> Vec<Relationship> {
        self.graph.edges()
    }

    /// The explicit dependency graph
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Place `child` inside `container`, replacing any previous container
    pub fn contain(&mut self, container: &ResourceRef, child: &ResourceRef) -> Result<()> {
        let relationship = Relationship::new(container.clone(), child.clone());
        let container = self.resolve_endpoint(&relationship, container)?;
        let child = self.resolve_endpoint(&relationship, child)?;
        for previous in self.containment.dependencies(&child) {
            self.containment.remove_edge(&previous, &child);
        }
        self.containment.add_edge(&container, &child, None);
        Ok(())
    }

    /// The container directly holding a resource
    pub fn container_of(&self, reference: &ResourceRef) -> Option<ResourceRef> {
        let canonical = self.canonical(reference)?;
        self.containment.dependencies(&canonical).into_iter().next()
    }

    /// Resources directly held by a container
    pub fn contents(&self, container: &ResourceRef) -> Vec<ResourceRef> {
        self.containment.dependents(container)
    }

    /// The containment graph
    pub fn containment(&self) -> &ResourceGraph {
        &self.containment
    }

    /// Containers, outermost first
    pub fn containers(&self) -> Result<Vec<ResourceRef>> {
        let mut order = self
            .containment
            .topsort()
            .map_err(|at| Error::DependencyCycle(vec![vec![at]]))?;
        // Containers with no containment edges at all are not in the containment graph
        for reference in &self.resources {
            if !self.containment.has_vertex(reference) {
                order.push(reference.clone());
            }
        }
        Ok(order
            .into_iter()
            .filter(|r| self.lookup(r).is_some_and(|res| res.is_container()))
            .collect())
    }

    /// Record a class as declared
    pub fn add_class(&mut self, name: &str) {
        self.classes.insert(name.to_lowercase());
    }

    /// Declared class names
    pub fn classes(&self) -> &BTreeSet<String> {
        &self.classes
    }

    /// Tag the catalog itself
    pub fn tag(&mut self, tag: &str) {
        self.tags.insert(tag.to_lowercase());
    }

    /// Catalog-level tags
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Add runtime tags to a resource
    pub fn merge_tags(&mut self, reference: &ResourceRef, tags: impl IntoIterator<Item = String>) {
        self.merged_tags
            .entry(reference.clone())
            .or_default()
            .extend(tags);
    }

    /// All tags of a resource: its type, its declared tags and any merged ones
    pub fn tags_of(&self, reference: &ResourceRef) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        let Some(resource) = self.lookup(reference) else {
            return tags;
        };
        let canonical = resource.reference();
        tags.insert(canonical.type_name().to_lowercase());
        tags.extend(resource.tags().into_iter().map(|t| t.to_lowercase()));
        if let Some(merged) = self.merged_tags.get(&canonical) {
            tags.extend(merged.iter().cloned());
        }
        tags
    }

    /// Resources carrying a tag, in declaration order
    pub fn tagged(&self, tag: &str) -> Vec<ResourceRef> {
        let tag = tag.to_lowercase();
        self.resources
            .iter()
            .filter(|r| self.tags_of(r).contains(&tag))
            .cloned()
            .collect()
    }

    /// Build the execution graph for this catalog
    ///
    /// The result is a fresh graph each call; callers that need it for the
    /// whole run keep it themselves.
    pub fn relationship_graph(&self) -> Result<RelationshipGraph> {
        RelationshipGraph::from_catalog(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::Container;
    use crate::testing::{MockResource, mock};
    use std::sync::Arc;

    fn r(title: &str) -> ResourceRef {
        ResourceRef::new("mock", title)
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("a")).unwrap();

        let err = catalog.add_resource(mock("a")).unwrap_err();
        assert!(matches!(err, Error::DuplicateResource { reference } if reference == r("a")));
    }

    #[test]
    fn test_same_instance_twice_is_noop() {
        let mut catalog = Catalog::new("test");
        let a = mock("a");
        catalog.add_resource(a.clone()).unwrap();
        catalog.add_resource(a).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_alias_by_uniqueness_key() {
        let mut catalog = Catalog::new("test");
        let motd: ResourceHandle = Arc::new(MockResource::new("motd").with_name("/etc/motd"));
        catalog.add_resource(motd.clone()).unwrap();

        let found = catalog.resource("mock", "/etc/motd").unwrap();
        assert!(same_resource(&found, &motd));
        assert_eq!(catalog.canonical(&r("/etc/motd")), Some(r("motd")));

        // Another resource whose title collides with the alias
        let err = catalog.add_resource(mock("/etc/motd")).unwrap_err();
        assert!(matches!(err, Error::DuplicateResource { .. }));

        // Another resource whose own alias collides
        let other: ResourceHandle = Arc::new(MockResource::new("banner").with_name("/etc/motd"));
        let err = catalog.add_resource(other).unwrap_err();
        assert!(matches!(err, Error::AliasConflict { .. }));
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let catalog = Catalog::new("test");
        assert!(catalog.resource("mock", "nope").is_none());
    }

    #[test]
    fn test_remove_resource_clears_edges_and_aliases() {
        let mut catalog = Catalog::new("test");
        catalog
            .add_resource(Arc::new(MockResource::new("motd").with_name("/etc/motd")))
            .unwrap();
        catalog.add_resource(mock("b")).unwrap();
        catalog
            .add_relationship(Relationship::new(r("motd"), r("b")))
            .unwrap();

        catalog.remove_resource(&[r("/etc/motd")]);
        assert!(!catalog.contains(&r("motd")));
        assert!(!catalog.contains(&r("/etc/motd")));
        assert_eq!(catalog.graph().edge_count(), 0);
        assert_eq!(catalog.resource_refs(), &[r("b")]);
    }

    #[test]
    fn test_unresolved_edge() {
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("a")).unwrap();
        let err = catalog
            .add_relationship(Relationship::new(r("a"), r("ghost")))
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedEdge { endpoint, .. } if endpoint == r("ghost")));
    }

    #[test]
    fn test_declaration_order_with_anchors() {
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("a")).unwrap();
        catalog.add_resource(mock("c")).unwrap();
        catalog.add_resource_after(&r("a"), mock("b")).unwrap();
        catalog.add_resource_before(&r("a"), mock("first")).unwrap();
        assert_eq!(
            catalog.resource_refs(),
            &[r("first"), r("a"), r("b"), r("c")]
        );
    }

    #[test]
    fn test_containment() {
        let mut catalog = Catalog::new("test");
        let main: ResourceHandle = Arc::new(Container::stage("main"));
        let base: ResourceHandle = Arc::new(Container::class("base"));
        catalog.add_resource(main.clone()).unwrap();
        catalog.add_resource(base.clone()).unwrap();
        catalog.add_resource(mock("a")).unwrap();
        catalog.contain(&main.reference(), &base.reference()).unwrap();
        catalog.contain(&base.reference(), &r("a")).unwrap();

        assert_eq!(catalog.container_of(&r("a")), Some(base.reference()));
        assert_eq!(catalog.contents(&main.reference()), vec![base.reference()]);
        assert_eq!(
            catalog.containers().unwrap(),
            vec![main.reference(), base.reference()]
        );

        // Moving a resource replaces its container
        catalog.contain(&main.reference(), &r("a")).unwrap();
        assert_eq!(catalog.container_of(&r("a")), Some(main.reference()));
        assert!(catalog.contents(&base.reference()).is_empty());
    }

    #[test]
    fn test_tags() {
        let mut catalog = Catalog::new("test");
        catalog
            .add_resource(Arc::new(MockResource::new("a").with_tags(&["web"])))
            .unwrap();
        catalog.add_resource(mock("b")).unwrap();
        catalog.merge_tags(&r("b"), vec!["web".to_string()]);

        assert_eq!(catalog.tagged("web"), vec![r("a"), r("b")]);
        assert!(catalog.tags_of(&r("a")).contains("mock"));
    }
}
