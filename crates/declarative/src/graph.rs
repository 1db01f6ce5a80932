//! Directed graph over resource references
//!
//! A thin layer over a petgraph `StableDiGraph` that indexes vertices by
//! [`ResourceRef`] and keeps at most one edge per ordered pair of vertices.
//! No policy lives here; the catalog and the relationship graph decide what
//! the edges mean.

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::types::{EdgeLabel, Relationship, ResourceRef};

/// A directed graph whose vertices are resource references
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: StableDiGraph<ResourceRef, Option<EdgeLabel>>,
    index: HashMap<ResourceRef, NodeIndex>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex; returns `false` if it was already present
    pub fn add_vertex(&mut self, vertex: &ResourceRef) -> bool {
        if self.index.contains_key(vertex) {
            return false;
        }
        let idx = self.graph.add_node(vertex.clone());
        self.index.insert(vertex.clone(), idx);
        true
    }

    /// Remove a vertex and every incident edge; returns `false` if it was absent
    pub fn remove_vertex(&mut self, vertex: &ResourceRef) -> bool {
        match self.index.remove(vertex) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }

    /// Whether the vertex is present
    pub fn has_vertex(&self, vertex: &ResourceRef) -> bool {
        self.index.contains_key(vertex)
    }

    /// Add an edge, adding missing endpoints as vertices
    ///
    /// An existing edge between the same pair keeps its label unless it had
    /// none and the new edge carries one.
    pub fn add_edge(&mut self, source: &ResourceRef, target: &ResourceRef, label: Option<EdgeLabel>) {
        self.add_vertex(source);
        self.add_vertex(target);
        let (s, t) = (self.index[source], self.index[target]);
        match self.graph.find_edge(s, t) {
            Some(edge) => {
                if let Some(existing) = self.graph.edge_weight_mut(edge)
                    && existing.is_none()
                {
                    *existing = label;
                }
            }
            None => {
                self.graph.add_edge(s, t, label);
            }
        }
    }

    /// Add a [`Relationship`] as an edge
    pub fn add_relationship(&mut self, relationship: &Relationship) {
        self.add_edge(
            &relationship.source,
            &relationship.target,
            relationship.label.clone(),
        );
    }

    /// Remove the edge `source -> target`, returning its label if it existed
    pub fn remove_edge(
        &mut self,
        source: &ResourceRef,
        target: &ResourceRef,
    ) -> Option<Option<EdgeLabel>> {
        let edge = self.graph.find_edge(*self.index.get(source)?, *self.index.get(target)?)?;
        self.graph.remove_edge(edge)
    }

    /// Whether the edge `source -> target` exists
    pub fn has_edge(&self, source: &ResourceRef, target: &ResourceRef) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&s), Some(&t)) => self.graph.find_edge(s, t).is_some(),
            _ => false,
        }
    }

    /// Direct dependencies of a vertex (sources of its incoming edges)
    pub fn dependencies(&self, vertex: &ResourceRef) -> Vec<ResourceRef> {
        self.adjacent(vertex, Direction::Incoming)
    }

    /// Direct dependents of a vertex (targets of its outgoing edges)
    pub fn dependents(&self, vertex: &ResourceRef) -> Vec<ResourceRef> {
        self.adjacent(vertex, Direction::Outgoing)
    }

    fn adjacent(&self, vertex: &ResourceRef, direction: Direction) -> Vec<ResourceRef> {
        let Some(&idx) = self.index.get(vertex) else {
            return Vec::new();
        };
        // petgraph walks adjacency newest-first
        let mut out: Vec<ResourceRef> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        out.reverse();
        out
    }

    /// Incoming edges of a vertex
    pub fn in_edges(&self, vertex: &ResourceRef) -> Vec<Relationship> {
        self.edges_of(vertex, Direction::Incoming)
    }

    /// Outgoing edges of a vertex
    pub fn out_edges(&self, vertex: &ResourceRef) -> Vec<Relationship> {
        self.edges_of(vertex, Direction::Outgoing)
    }

    fn edges_of(&self, vertex: &ResourceRef, direction: Direction) -> Vec<Relationship> {
        let Some(&idx) = self.index.get(vertex) else {
            return Vec::new();
        };
        let mut out: Vec<Relationship> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| Relationship {
                source: self.graph[e.source()].clone(),
                target: self.graph[e.target()].clone(),
                label: e.weight().clone(),
            })
            .collect();
        out.reverse();
        out
    }

    /// Label of the edge `source -> target`, if the edge exists
    pub fn edge_label(&self, source: &ResourceRef, target: &ResourceRef) -> Option<&Option<EdgeLabel>> {
        let edge = self.graph.find_edge(*self.index.get(source)?, *self.index.get(target)?)?;
        self.graph.edge_weight(edge)
    }

    /// All vertices
    pub fn vertices(&self) -> impl Iterator<Item = &ResourceRef> {
        self.graph.node_indices().map(move |n| &self.graph[n])
    }

    /// All edges
    pub fn edges(&self) -> Vec<Relationship> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (s, t) = self.graph.edge_endpoints(e)?;
                Some(Relationship {
                    source: self.graph[s].clone(),
                    target: self.graph[t].clone(),
                    label: self.graph[e].clone(),
                })
            })
            .collect()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Vertices in topological order, or the vertex where a cycle was found
    pub fn topsort(&self) -> Result<Vec<ResourceRef>, ResourceRef> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|cycle| self.graph[cycle.node_id()].clone())
    }

    /// Every cycle in the graph, as the members of each strongly connected component
    pub fn cycles(&self) -> Vec<Vec<ResourceRef>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .find_edge(component[0], component[0])
                        .is_some()
            })
            .map(|component| {
                let mut members: Vec<ResourceRef> =
                    component.into_iter().map(|n| self.graph[n].clone()).collect();
                members.sort();
                members
            })
            .collect()
    }

    /// Render the graph in Graphviz DOT format
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{name}\" {{");
        let _ = writeln!(out, "    label = \"{name}\";");
        let mut vertices: Vec<&ResourceRef> = self.vertices().collect();
        vertices.sort();
        for vertex in vertices {
            let _ = writeln!(out, "    \"{vertex}\" [fontsize = 8, label = \"{vertex}\"];");
        }
        let mut edges = self.edges();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        for edge in edges {
            let attrs = match &edge.label {
                Some(label) => format!(" [label = \"{}\"]", label.callback),
                None => String::new(),
            };
            let _ = writeln!(out, "    \"{}\" -> \"{}\"{};", edge.source, edge.target, attrs);
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(title: &str) -> ResourceRef {
        ResourceRef::new("notify", title)
    }

    #[test]
    fn test_add_and_remove_vertex() {
        let mut g = ResourceGraph::new();
        assert!(g.add_vertex(&r("a")));
        assert!(!g.add_vertex(&r("a")));
        assert_eq!(g.vertex_count(), 1);

        g.add_edge(&r("a"), &r("b"), None);
        assert!(g.has_vertex(&r("b")));
        assert!(g.remove_vertex(&r("a")));
        assert_eq!(g.edge_count(), 0);
        assert!(!g.remove_vertex(&r("a")));
    }

    #[test]
    fn test_single_edge_per_pair() {
        let mut g = ResourceGraph::new();
        g.add_edge(&r("a"), &r("b"), None);
        g.add_edge(&r("a"), &r("b"), Some(EdgeLabel::refresh()));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(
            g.edge_label(&r("a"), &r("b")),
            Some(&Some(EdgeLabel::refresh()))
        );
    }

    #[test]
    fn test_adjacency_in_insertion_order() {
        let mut g = ResourceGraph::new();
        g.add_edge(&r("a"), &r("x"), None);
        g.add_edge(&r("a"), &r("y"), None);
        g.add_edge(&r("a"), &r("z"), None);
        assert_eq!(g.dependents(&r("a")), vec![r("x"), r("y"), r("z")]);
        assert_eq!(g.dependencies(&r("y")), vec![r("a")]);
        assert_eq!(g.out_edges(&r("a")).len(), 3);
        assert!(g.dependents(&r("missing")).is_empty());
    }

    #[test]
    fn test_remove_edge() {
        let mut g = ResourceGraph::new();
        g.add_edge(&r("a"), &r("b"), Some(EdgeLabel::refresh()));
        assert_eq!(g.remove_edge(&r("a"), &r("b")), Some(Some(EdgeLabel::refresh())));
        assert!(!g.has_edge(&r("a"), &r("b")));
        assert_eq!(g.remove_edge(&r("a"), &r("b")), None);
        assert_eq!(g.vertex_count(), 2);
    }

    #[test]
    fn test_cycles() {
        let mut g = ResourceGraph::new();
        g.add_edge(&r("a"), &r("b"), None);
        g.add_edge(&r("b"), &r("c"), None);
        assert!(g.cycles().is_empty());
        assert!(g.topsort().is_ok());

        g.add_edge(&r("c"), &r("a"), None);
        let cycles = g.cycles();
        assert_eq!(cycles, vec![vec![r("a"), r("b"), r("c")]]);
        assert!(g.topsort().is_err());
    }

    #[test]
    fn test_to_dot() {
        let mut g = ResourceGraph::new();
        g.add_edge(&r("a"), &r("b"), Some(EdgeLabel::refresh()));
        let dot = g.to_dot("relationships");
        assert!(dot.starts_with("digraph \"relationships\""));
        assert!(dot.contains("\"Notify[a]\" -> \"Notify[b]\" [label = \"refresh\"];"));
    }
}
