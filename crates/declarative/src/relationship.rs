//! The relationship graph: the execution view of a catalog
//!
//! Built from a catalog by copying its vertices and explicit edges, adding
//! automatic relationships, and splicing containers into sentinel pairs.
//! Every vertex carries a priority that breaks ties between independent
//! vertices, so a run visits them in declaration order.

use std::collections::{BTreeSet, HashMap};

use crate::builtin::Whit;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::resource::{Resource, ResourceHandle};
use crate::types::{EdgeLabel, Priority, Relationship, ResourceRef};

/// Execution graph with priorities and sentinels
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    graph: ResourceGraph,
    resources: HashMap<ResourceRef, ResourceHandle>,
    priorities: HashMap<ResourceRef, Priority>,
    next_priority: u64,
    /// Last child index handed out per containing vertex
    contained: HashMap<ResourceRef, u64>,
}

impl RelationshipGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the execution graph for a catalog
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let mut graph = Self::new();
        let resources = catalog.resources();
        for resource in &resources {
            graph.add_vertex(resource.clone());
        }
        for relationship in catalog.relationships() {
            graph.graph.add_relationship(&relationship);
        }
        for resource in &resources {
            for relationship in resource.autorequire(catalog) {
                graph.add_automatic_relationship(catalog, &resource.reference(), relationship);
            }
        }
        graph.splice(catalog)?;
        Ok(graph)
    }

    /// Add an automatically inferred edge unless it conflicts with an existing one
    ///
    /// Returns whether the edge was added. Endpoints that are not declared are
    /// ignored.
    pub fn add_automatic_relationship(
        &mut self,
        catalog: &Catalog,
        vertex: &ResourceRef,
        relationship: Relationship,
    ) -> bool {
        let (Some(source), Some(target)) = (
            catalog.canonical(&relationship.source),
            catalog.canonical(&relationship.target),
        ) else {
            log::debug!("{vertex}: ignoring automatic relationship {relationship} to undeclared resource");
            return false;
        };
        if !self.graph.has_vertex(&source) || !self.graph.has_vertex(&target) {
            return false;
        }
        if self.graph.has_edge(&source, &target) {
            return false;
        }
        if self.graph.has_edge(&target, &source) {
            log::debug!("{vertex}: skipping automatic relationship {source} -> {target}");
            return false;
        }
        log::debug!("{vertex}: adding automatic relationship {source} -> {target}");
        self.graph.add_edge(&source, &target, relationship.label);
        true
    }

    /// Add a vertex, assigning the next top-level priority if it is new
    pub fn add_vertex(&mut self, resource: ResourceHandle) -> Priority {
        let reference = resource.reference();
        if let Some(priority) = self.priorities.get(&reference) {
            return priority.clone();
        }
        self.next_priority += 1;
        let priority = Priority::top(self.next_priority);
        self.insert(reference, resource, priority.clone());
        priority
    }

    /// Add a vertex with an explicit priority; an existing vertex keeps its own
    pub fn add_vertex_with_priority(&mut self, resource: ResourceHandle, priority: Priority) -> Priority {
        let reference = resource.reference();
        if let Some(existing) = self.priorities.get(&reference) {
            return existing.clone();
        }
        self.insert(reference, resource, priority.clone());
        priority
    }

    fn insert(&mut self, reference: ResourceRef, resource: ResourceHandle, priority: Priority) {
        self.graph.add_vertex(&reference);
        self.resources.insert(reference.clone(), resource);
        self.priorities.insert(reference, priority);
    }

    /// Next priority for a resource contained in (generated by) `container`
    pub fn contained_priority(&mut self, container: &ResourceRef) -> Priority {
        let base = match self.priorities.get(container) {
            Some(priority) => priority.clone(),
            None => {
                self.next_priority += 1;
                Priority::top(self.next_priority)
            }
        };
        let counter = self.contained.entry(container.clone()).or_insert(0);
        *counter += 1;
        base.child(*counter)
    }

    /// Remove a vertex and its edges; its priority is never handed out again
    pub fn remove_vertex(&mut self, reference: &ResourceRef) -> bool {
        self.resources.remove(reference);
        self.priorities.remove(reference);
        self.graph.remove_vertex(reference)
    }

    /// Priority of a vertex
    pub fn priority(&self, reference: &ResourceRef) -> Option<&Priority> {
        self.priorities.get(reference)
    }

    /// The resource behind a vertex
    pub fn resource(&self, reference: &ResourceRef) -> Option<&ResourceHandle> {
        self.resources.get(reference)
    }

    /// Whether the vertex is present
    pub fn has_vertex(&self, reference: &ResourceRef) -> bool {
        self.graph.has_vertex(reference)
    }

    /// Add an edge between two vertices already in the graph
    ///
    /// Returns `false`, leaving the graph untouched, when either endpoint is
    /// unknown: a vertex must come with its resource and priority.
    pub fn add_edge(&mut self, source: &ResourceRef, target: &ResourceRef, label: Option<EdgeLabel>) -> bool {
        for endpoint in [source, target] {
            if !self.priorities.contains_key(endpoint) {
                log::debug!("ignoring edge {source} -> {target}: {endpoint} is not in the graph");
                return false;
            }
        }
        self.graph.add_edge(source, target, label);
        true
    }

    /// Remove an edge, returning its label if it existed
    pub fn remove_edge(&mut self, source: &ResourceRef, target: &ResourceRef) -> Option<Option<EdgeLabel>> {
        self.graph.remove_edge(source, target)
    }

    /// Whether the edge `source -> target` exists
    pub fn has_edge(&self, source: &ResourceRef, target: &ResourceRef) -> bool {
        self.graph.has_edge(source, target)
    }

    /// Direct dependencies of a vertex
    pub fn dependencies(&self, reference: &ResourceRef) -> Vec<ResourceRef> {
        self.graph.dependencies(reference)
    }

    /// Direct dependents of a vertex
    pub fn dependents(&self, reference: &ResourceRef) -> Vec<ResourceRef> {
        self.graph.dependents(reference)
    }

    /// Incoming edges of a vertex
    pub fn in_edges(&self, reference: &ResourceRef) -> Vec<Relationship> {
        self.graph.in_edges(reference)
    }

    /// Outgoing edges of a vertex
    pub fn out_edges(&self, reference: &ResourceRef) -> Vec<Relationship> {
        self.graph.out_edges(reference)
    }

    /// The underlying graph
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.graph.vertex_count()
    }

    /// Fail if the graph contains a cycle
    pub fn check_cycles(&self) -> Result<()> {
        let cycles = self.graph.cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(Error::DependencyCycle(cycles))
        }
    }

    /// Replace every container with an admissible/completed sentinel pair
    ///
    /// For a container `X`:
    /// - `admissible_X -> admissible_v` and `completed_v -> completed_X` for each content `v`
    ///   (or `admissible_X -> completed_X` when `X` is empty)
    /// - `Y -> X` becomes `completed_Y -> admissible_X`
    /// - `X -> Z` becomes `completed_X -> admissible_Z`
    ///
    /// Containers are then removed. A vertex that is not a container stands
    /// in for its own sentinels, so nested containers resolve without
    /// recursion. A graph without containers is left untouched.
    pub fn splice(&mut self, catalog: &Catalog) -> Result<()> {
        let containers: Vec<ResourceRef> = catalog
            .containers()?
            .into_iter()
            .filter(|c| self.graph.has_vertex(c))
            .collect();
        if containers.is_empty() {
            return Ok(());
        }

        let mut sentinels = Sentinels::default();
        for container in &containers {
            let priority = self
                .priority(container)
                .cloned()
                .unwrap_or_else(|| Priority::top(0));
            let admissible = Whit::admissible(container);
            let completed = Whit::completed(container);
            sentinels
                .admissible
                .insert(container.clone(), admissible.reference());
            sentinels
                .completed
                .insert(container.clone(), completed.reference());
            self.add_vertex_with_priority(admissible, priority.clone());
            self.add_vertex_with_priority(completed, priority);
        }

        for container in &containers {
            let admissible = sentinels.admissible_of(container);
            let completed = sentinels.completed_of(container);

            let contents: Vec<ResourceRef> = catalog
                .contents(container)
                .into_iter()
                .filter(|v| self.graph.has_vertex(v))
                .collect();
            if contents.is_empty() {
                self.graph.add_edge(&admissible, &completed, None);
            }
            for content in &contents {
                self.graph.add_edge(
                    &admissible,
                    &sentinels.admissible_of(content),
                    Some(EdgeLabel::refresh()),
                );
                self.graph.add_edge(
                    &sentinels.completed_of(content),
                    &completed,
                    Some(EdgeLabel::refresh()),
                );
            }

            for edge in self.graph.in_edges(container) {
                self.graph
                    .add_edge(&sentinels.completed_of(&edge.source), &admissible, edge.label);
                self.graph.remove_edge(&edge.source, container);
            }
            for edge in self.graph.out_edges(container) {
                self.graph
                    .add_edge(&completed, &sentinels.admissible_of(&edge.target), edge.label);
                self.graph.remove_edge(container, &edge.target);
            }
        }

        for container in &containers {
            self.remove_vertex(container);
        }
        log::debug!(
            "spliced {} container(s) into sentinel pairs",
            containers.len()
        );
        Ok(())
    }

    /// Order in which a run would visit the vertices, ignoring generation
    ///
    /// Vertices become ready once all their dependencies are visited; among
    /// ready vertices the lowest priority goes first.
    pub fn evaluation_order(&self) -> Vec<ResourceRef> {
        let mut blockers: HashMap<&ResourceRef, usize> = HashMap::new();
        let mut ready: BTreeSet<(&Priority, &ResourceRef)> = BTreeSet::new();
        for (reference, priority) in &self.priorities {
            let count = self.graph.dependencies(reference).len();
            blockers.insert(reference, count);
            if count == 0 {
                ready.insert((priority, reference));
            }
        }

        let mut order = Vec::with_capacity(self.priorities.len());
        while let Some((_, reference)) = ready.pop_first() {
            order.push(reference.clone());
            for dependent in self.graph.dependents(reference) {
                let Some((key, priority)) = self.priorities.get_key_value(&dependent) else {
                    continue;
                };
                if let Some(count) = blockers.get_mut(key) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((priority, key));
                    }
                }
            }
        }
        order
    }
}

/// Sentinel lookup: containers map to their whits, everything else to itself
#[derive(Debug, Default)]
struct Sentinels {
    admissible: HashMap<ResourceRef, ResourceRef>,
    completed: HashMap<ResourceRef, ResourceRef>,
}

impl Sentinels {
    fn admissible_of(&self, vertex: &ResourceRef) -> ResourceRef {
        self.admissible
            .get(vertex)
            .cloned()
            .unwrap_or_else(|| vertex.clone())
    }

    fn completed_of(&self, vertex: &ResourceRef) -> ResourceRef {
        self.completed
            .get(vertex)
            .cloned()
            .unwrap_or_else(|| vertex.clone())
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

    fn stage(title: &str) -> ResourceRef {
        ResourceRef::new("stage", title)
    }

    fn path_exists(graph: &RelationshipGraph, from: &ResourceRef, to: &ResourceRef) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = std::collections::HashSet::new();
        while let Some(v) = stack.pop() {
            if &v == to {
                return true;
            }
            if seen.insert(v.clone()) {
                stack.extend(graph.dependents(&v));
            }
        }
        false
    }

    #[test]
    fn test_priority_monotonic_and_stable() {
        let mut graph = RelationshipGraph::new();
        let a = graph.add_vertex(mock("a"));
        let b = graph.add_vertex(mock("b"));
        let c = graph.add_vertex(mock("c"));
        assert!(a < b && b < c);

        // Re-adding keeps the original priority
        assert_eq!(graph.add_vertex(mock("a")), a);

        // Removal frees the priority without reusing it
        graph.remove_vertex(&r("b"));
        let d = graph.add_vertex(mock("d"));
        assert!(d > c);
        assert!(graph.priority(&r("b")).is_none());
    }

    #[test]
    fn test_contained_priority_sorts_after_parent() {
        let mut graph = RelationshipGraph::new();
        let parent = graph.add_vertex(mock("parent"));
        let next = graph.add_vertex(mock("next"));
        let first = graph.contained_priority(&r("parent"));
        let second = graph.contained_priority(&r("parent"));
        assert!(parent < first && first < second && second < next);
    }

    #[test]
    fn test_add_edge_requires_known_vertices() {
        let mut graph = RelationshipGraph::new();
        graph.add_vertex(mock("a"));

        assert!(!graph.add_edge(&r("a"), &r("ghost"), None));
        assert!(!graph.add_edge(&r("ghost"), &r("a"), None));
        assert!(!graph.has_vertex(&r("ghost")));
        assert_eq!(graph.vertex_count(), 1);

        graph.add_vertex(mock("b"));
        assert!(graph.add_edge(&r("a"), &r("b"), None));
        assert_eq!(graph.dependencies(&r("b")), vec![r("a")]);
    }

    #[test]
    fn test_autorequire_does_not_override_manual_edges() {
        let mut catalog = Catalog::new("test");
        catalog
            .add_resource(Arc::new(MockResource::new("dir")))
            .unwrap();
        catalog
            .add_resource(Arc::new(
                MockResource::new("file").with_autorequire(&["dir", "undeclared"]),
            ))
            .unwrap();
        catalog
            .add_resource(Arc::new(MockResource::new("reverse").with_autorequire(&["file"])))
            .unwrap();
        // Manual edge in the opposite direction of reverse's autorequire
        catalog
            .add_relationship(Relationship::new(r("reverse"), r("file")))
            .unwrap();

        let graph = catalog.relationship_graph().unwrap();
        assert!(graph.has_edge(&r("dir"), &r("file")));
        assert!(graph.has_edge(&r("reverse"), &r("file")));
        assert!(!graph.has_edge(&r("file"), &r("reverse")));
        assert!(graph.check_cycles().is_ok());
    }

    #[test]
    fn test_splice_container_between_dependency_and_dependent() {
        // E -> C -> D, C contains v1 and v2
        let mut catalog = Catalog::new("test");
        let container: ResourceHandle = Arc::new(Container::new("Class", "c"));
        let c = container.reference();
        catalog.add_resource(mock("e")).unwrap();
        catalog.add_resource(container).unwrap();
        catalog.add_resource(mock("v1")).unwrap();
        catalog.add_resource(mock("v2")).unwrap();
        catalog.add_resource(mock("d")).unwrap();
        catalog.contain(&c, &r("v1")).unwrap();
        catalog.contain(&c, &r("v2")).unwrap();
        catalog.add_relationship(Relationship::new(r("e"), c.clone())).unwrap();
        catalog.add_relationship(Relationship::new(c.clone(), r("d"))).unwrap();

        let graph = catalog.relationship_graph().unwrap();
        let admissible = Whit::admissible_ref(&c);
        let completed = Whit::completed_ref(&c);

        assert!(!graph.has_vertex(&c));
        assert!(graph.has_edge(&r("e"), &admissible));
        assert!(graph.has_edge(&admissible, &r("v1")));
        assert!(graph.has_edge(&admissible, &r("v2")));
        assert!(graph.has_edge(&r("v1"), &completed));
        assert!(graph.has_edge(&r("v2"), &completed));
        assert!(graph.has_edge(&completed, &r("d")));
        assert!(path_exists(&graph, &r("e"), &r("v1")));
        assert!(path_exists(&graph, &r("v2"), &r("d")));
        assert_eq!(graph.priority(&admissible), graph.priority(&completed));
    }

    #[test]
    fn test_splice_empty_container() {
        let mut catalog = Catalog::new("test");
        let empty: ResourceHandle = Arc::new(Container::class("empty"));
        let empty_ref = empty.reference();
        catalog.add_resource(empty).unwrap();
        catalog.add_resource(mock("after")).unwrap();
        catalog
            .add_relationship(Relationship::new(empty_ref.clone(), r("after")))
            .unwrap();

        let graph = catalog.relationship_graph().unwrap();
        assert!(graph.has_edge(
            &Whit::admissible_ref(&empty_ref),
            &Whit::completed_ref(&empty_ref)
        ));
        assert!(graph.has_edge(&Whit::completed_ref(&empty_ref), &r("after")));
    }

    #[test]
    fn test_splice_nested_containers() {
        let mut catalog = Catalog::new("test");
        let main = stage("main");
        let inner = ResourceRef::new("class", "inner");
        catalog.add_resource(Arc::new(Container::stage("main"))).unwrap();
        catalog.add_resource(Arc::new(Container::class("inner"))).unwrap();
        catalog.add_resource(mock("leaf")).unwrap();
        catalog.contain(&main, &inner).unwrap();
        catalog.contain(&inner, &r("leaf")).unwrap();

        let graph = catalog.relationship_graph().unwrap();
        assert!(graph.has_edge(&Whit::admissible_ref(&main), &Whit::admissible_ref(&inner)));
        assert!(graph.has_edge(&Whit::admissible_ref(&inner), &r("leaf")));
        assert!(graph.has_edge(&r("leaf"), &Whit::completed_ref(&inner)));
        assert!(graph.has_edge(&Whit::completed_ref(&inner), &Whit::completed_ref(&main)));
        assert!(!graph.has_vertex(&main));
        assert!(!graph.has_vertex(&inner));
    }

    #[test]
    fn test_splice_without_containers_is_noop() {
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("a")).unwrap();
        catalog.add_resource(mock("b")).unwrap();
        catalog.add_relationship(Relationship::new(r("a"), r("b"))).unwrap();

        let mut graph = catalog.relationship_graph().unwrap();
        let before = graph.graph().edges();
        graph.splice(&catalog).unwrap();
        assert_eq!(graph.graph().edges(), before);
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn test_explicit_edge_orders_evaluation() {
        // b declared first, but requires a
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("b")).unwrap();
        catalog.add_resource(mock("a")).unwrap();
        catalog.add_relationship(Relationship::new(r("a"), r("b"))).unwrap();

        let order = catalog.relationship_graph().unwrap().evaluation_order();
        assert_eq!(order, vec![r("a"), r("b")]);
    }

    #[test]
    fn test_stage_contents_follow_declaration_order() {
        let mut catalog = Catalog::new("test");
        let main = stage("main");
        catalog.add_resource(Arc::new(Container::stage("main"))).unwrap();
        for title in ["x", "y", "z"] {
            catalog.add_resource(mock(title)).unwrap();
            catalog.contain(&main, &r(title)).unwrap();
        }

        let order: Vec<ResourceRef> = catalog
            .relationship_graph()
            .unwrap()
            .evaluation_order()
            .into_iter()
            .filter(|v| !v.is_type("whit"))
            .collect();
        assert_eq!(order, vec![r("x"), r("y"), r("z")]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut catalog = Catalog::new("test");
        catalog.add_resource(mock("a")).unwrap();
        catalog.add_resource(mock("b")).unwrap();
        catalog.add_relationship(Relationship::new(r("a"), r("b"))).unwrap();
        catalog.add_relationship(Relationship::new(r("b"), r("a"))).unwrap();

        let err = catalog.relationship_graph().unwrap().check_cycles().unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(cycles) if cycles == vec![vec![r("a"), r("b")]]));
    }
}
