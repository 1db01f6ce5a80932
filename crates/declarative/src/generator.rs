//! Dynamic expansion of the graph by resources that produce other resources
//!
//! Two flavors exist. Eager generation (`generate`) adds children next to
//! their parent and recurses into them. Graph-aware generation
//! (`eval_generate`) inserts children between the parent and everything that
//! depended on it, using a `completed_<parent>` sentinel.

use std::collections::HashSet;

use crate::builtin::Whit;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::relationship::RelationshipGraph;
use crate::resource::{Resource, ResourceHandle};
use crate::types::{EdgeLabel, ResourceRef};

/// Tracks which resources already generated so nothing is expanded twice
#[derive(Debug, Default)]
pub struct ResourceGenerator {
    generated: HashSet<ResourceRef>,
    eval_generated: HashSet<ResourceRef>,
}

impl ResourceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly expand `resource` and, recursively, what it produces
    ///
    /// Returns the references of resources added to the relationship graph.
    /// A failing `generate()` is logged and expansion continues.
    pub fn generate(
        &mut self,
        catalog: &mut Catalog,
        graph: &mut RelationshipGraph,
        resource: &ResourceHandle,
    ) -> Vec<ResourceRef> {
        let mut added = Vec::new();
        self.generate_into(catalog, graph, resource, &mut added);
        added
    }

    fn generate_into(
        &mut self,
        catalog: &mut Catalog,
        graph: &mut RelationshipGraph,
        resource: &ResourceHandle,
        added: &mut Vec<ResourceRef>,
    ) {
        let parent = resource.reference();
        if !self.generated.insert(parent.clone()) {
            return;
        }

        let made = match resource.generate() {
            Ok(made) if made.is_empty() => return,
            Ok(made) => made,
            Err(err) => {
                log::warn!("{parent}: failed to generate additional resources: {err:#}");
                return;
            }
        };
        let made = replace_duplicates_with_catalog_resources(catalog, made);
        log::debug!("{parent}: generated {} resource(s)", made.len());

        let depthfirst = resource.depthfirst();
        let mut anchor = parent.clone();
        for child in &made {
            let child_ref = child.reference();
            if add_resource(catalog, graph, child, &parent, &anchor, depthfirst) {
                added.push(child_ref.clone());
            }
            if !depthfirst {
                anchor = child_ref.clone();
            }
            if depthfirst {
                add_conditional_directed_dependency(catalog, graph, &child_ref, &parent, None);
            } else {
                add_conditional_directed_dependency(catalog, graph, &parent, &child_ref, None);
            }
            self.generate_into(catalog, graph, child, added);
        }
    }

    /// Expand `resource` in place while the graph is being walked
    ///
    /// Returns whether anything was added. Generation failures are logged and
    /// reported as `false`; a depth-first resource is a structural error.
    pub fn eval_generate(
        &mut self,
        catalog: &mut Catalog,
        graph: &mut RelationshipGraph,
        resource: &ResourceHandle,
    ) -> Result<bool> {
        if !resource.eval_generates() {
            return Ok(false);
        }
        let parent = resource.reference();
        if resource.depthfirst() {
            return Err(Error::DepthFirstEvalGenerate { resource: parent });
        }
        if !self.eval_generated.insert(parent.clone()) {
            return Ok(false);
        }

        let made = match resource.eval_generate() {
            Ok(made) => made,
            Err(err) => {
                log::warn!("{parent}: failed to generate additional resources: {err:#}");
                return Ok(false);
            }
        };
        let made = replace_duplicates_with_catalog_resources(catalog, made);
        if made.is_empty() {
            return Ok(false);
        }
        log::debug!("{parent}: eval_generate produced {} resource(s)", made.len());

        let children: Vec<ResourceRef> = made.iter().map(|r| r.reference()).collect();

        let mut anchor = parent.clone();
        for (child, child_ref) in made.iter().zip(&children) {
            add_resource(catalog, graph, child, &parent, &anchor, false);
            anchor = child_ref.clone();
        }

        let sentinel = Whit::completed(&parent);
        let sentinel_ref = sentinel.reference();
        let priority = graph
            .priority(&parent)
            .cloned()
            .unwrap_or_else(|| graph.contained_priority(&parent));
        graph.add_vertex_with_priority(sentinel, priority);

        redirect_edges_to_sentinel(graph, &parent, &sentinel_ref, &children);

        for child in &children {
            add_conditional_directed_dependency(catalog, graph, child, &sentinel_ref, Some(EdgeLabel::refresh()));
        }
        add_conditional_directed_dependency(catalog, graph, &parent, &sentinel_ref, Some(EdgeLabel::refresh()));

        for (child, child_ref) in made.iter().zip(&children) {
            let source = child
                .ancestors()
                .into_iter()
                .find(|ancestor| ancestor != child_ref && children.contains(ancestor))
                .unwrap_or_else(|| parent.clone());
            add_conditional_directed_dependency(catalog, graph, &source, child_ref, None);
        }
        Ok(true)
    }

    /// Whether `reference` already went through eager generation
    pub fn has_generated(&self, reference: &ResourceRef) -> bool {
        self.generated.contains(reference)
    }
}

/// Swap generated resources for catalog instances sharing their reference
///
/// Also drops repeats within the generated list itself.
fn replace_duplicates_with_catalog_resources(
    catalog: &Catalog,
    made: Vec<ResourceHandle>,
) -> Vec<ResourceHandle> {
    let mut seen = HashSet::new();
    made.into_iter()
        .map(|resource| catalog.lookup(&resource.reference()).unwrap_or(resource))
        .filter(|resource| seen.insert(resource.reference()))
        .collect()
}

/// Put a generated resource into the catalog and the relationship graph
///
/// Resources already in the catalog are left untouched. Returns whether the
/// resource was new.
fn add_resource(
    catalog: &mut Catalog,
    graph: &mut RelationshipGraph,
    resource: &ResourceHandle,
    parent: &ResourceRef,
    anchor: &ResourceRef,
    before: bool,
) -> bool {
    let reference = resource.reference();
    if catalog.contains(&reference) {
        return false;
    }

    let inserted = if before {
        catalog.add_resource_before(parent, resource.clone())
    } else {
        catalog.add_resource_after(anchor, resource.clone())
    };
    match inserted {
        Ok(true) => {}
        Ok(false) => return false,
        Err(err) => {
            log::warn!("{parent}: could not add generated resource {reference}: {err}");
            return false;
        }
    }

    let parent_tags = catalog.tags_of(parent);
    catalog.merge_tags(&reference, parent_tags);
    if let Some(container) = catalog.container_of(parent)
        && let Err(err) = catalog.contain(&container, &reference)
    {
        log::warn!("{reference}: could not place in {container}: {err}");
    }

    let priority = graph.contained_priority(parent);
    graph.add_vertex_with_priority(resource.clone(), priority);
    true
}

/// Add `source -> target` unless the opposite edge already exists
///
/// Endpoints missing from the graph are added first, with the resource the
/// catalog holds for them. Edges that would close a two-vertex cycle are
/// skipped.
fn add_conditional_directed_dependency(
    catalog: &Catalog,
    graph: &mut RelationshipGraph,
    source: &ResourceRef,
    target: &ResourceRef,
    label: Option<EdgeLabel>,
) {
    for endpoint in [source, target] {
        if graph.has_vertex(endpoint) {
            continue;
        }
        let Some(resource) = catalog.lookup(endpoint) else {
            log::warn!("skipping dependency {source} -> {target}: {endpoint} is not in the catalog");
            return;
        };
        graph.add_vertex(resource);
    }
    if graph.has_edge(target, source) {
        log::debug!("{target}: skipping dependency on {source}, {source} already depends on it");
        return;
    }
    graph.add_edge(source, target, label);
}

/// Move the parent's outgoing edges to non-children so they leave the sentinel instead
fn redirect_edges_to_sentinel(
    graph: &mut RelationshipGraph,
    parent: &ResourceRef,
    sentinel: &ResourceRef,
    children: &[ResourceRef],
) {
    for edge in graph.out_edges(parent) {
        if children.contains(&edge.target) || &edge.target == sentinel {
            continue;
        }
        graph.remove_edge(parent, &edge.target);
        graph.add_edge(sentinel, &edge.target, edge.label);
    }
}
