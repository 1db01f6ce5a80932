//! Walking the relationship graph
//!
//! A transaction owns the catalog for one run. It builds the relationship
//! graph once, then visits vertices from a priority-ordered worklist: a vertex
//! is ready when every dependency is done, and among ready vertices the lowest
//! priority goes first. Visiting a resource may generate new resources, which
//! join the graph while it is being walked.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::catalog::Catalog;
use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::generator::ResourceGenerator;
use crate::harness::ResourceHarness;
use crate::relationship::RelationshipGraph;
use crate::report::Report;
use crate::resource::{ResourceExt, ResourceHandle};
use crate::status::{Event, EventStatus, Status};
use crate::store::StateStore;
use crate::types::{ALL_EVENTS, Priority, REFRESH, ResourceRef};

/// Options for a run
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Report changes without applying them
    pub noop: bool,
    /// Evaluate resources regardless of their schedule
    pub ignore_schedules: bool,
    /// Only evaluate resources carrying one of these tags (all when empty)
    pub tags: Vec<String>,
}

/// One run over a catalog
pub struct Transaction<'a> {
    catalog: Catalog,
    store: &'a dyn StateStore,
    options: TransactionOptions,
    graph: Option<RelationshipGraph>,
    generator: ResourceGenerator,
    report: Report,
}

/// Bookkeeping for one traversal
#[derive(Default)]
struct Traversal {
    ready: BTreeSet<(Priority, ResourceRef)>,
    done: HashSet<ResourceRef>,
    /// Failed, or skipped because a dependency failed
    failed: HashSet<ResourceRef>,
    /// Events waiting to be processed by their target
    queued: HashMap<ResourceRef, Vec<Event>>,
}

impl Traversal {
    fn unfinished_dependencies(&self, graph: &RelationshipGraph, vertex: &ResourceRef) -> usize {
        graph
            .dependencies(vertex)
            .iter()
            .filter(|d| !self.done.contains(*d))
            .count()
    }

    fn enqueue_if_ready(&mut self, graph: &RelationshipGraph, vertex: &ResourceRef) {
        if self.done.contains(vertex) || self.unfinished_dependencies(graph, vertex) > 0 {
            return;
        }
        if let Some(priority) = graph.priority(vertex) {
            self.ready.insert((priority.clone(), vertex.clone()));
        }
    }

    /// Mark a vertex done and enqueue dependents that became ready
    fn finish(&mut self, graph: &RelationshipGraph, vertex: &ResourceRef) {
        self.done.insert(vertex.clone());
        for dependent in graph.dependents(vertex) {
            self.enqueue_if_ready(graph, &dependent);
        }
    }

    fn dependency_failed(&self, graph: &RelationshipGraph, vertex: &ResourceRef) -> bool {
        graph
            .dependencies(vertex)
            .iter()
            .any(|d| self.failed.contains(d))
    }

    /// Queue events on every labelled out-edge whose filter matches
    fn queue_events(&mut self, graph: &RelationshipGraph, source: &ResourceRef, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        for edge in graph.out_edges(source) {
            let Some(label) = edge.label else {
                continue;
            };
            let matching: Vec<Event> = events
                .iter()
                .filter(|e| label.event == ALL_EVENTS || e.property.as_deref() == Some(label.event.as_str()))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            log::debug!(
                "{source}: queueing {} event(s) for {} ({})",
                matching.len(),
                edge.target,
                label.callback
            );
            self.queued.entry(edge.target).or_default().extend(matching);
        }
    }
}

impl<'a> Transaction<'a> {
    pub fn new(catalog: Catalog, store: &'a dyn StateStore, options: TransactionOptions) -> Self {
        let report = Report::new(catalog.name(), options.noop);
        Self {
            catalog,
            store,
            options,
            graph: None,
            generator: ResourceGenerator::new(),
            report,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Add a resource to the catalog and, once built, the relationship graph
    pub fn add_resource(&mut self, resource: ResourceHandle) -> Result<()> {
        self.catalog.add_resource(resource.clone())?;
        if let Some(graph) = self.graph.as_mut() {
            graph.add_vertex(resource);
        }
        Ok(())
    }

    /// Remove a resource from the catalog and, once built, the relationship graph
    ///
    /// Returns whether the catalog knew the resource.
    pub fn remove_resource(&mut self, reference: &ResourceRef) -> bool {
        let Some(canonical) = self.catalog.canonical(reference) else {
            return false;
        };
        self.catalog.remove_resource(std::slice::from_ref(&canonical));
        if let Some(graph) = self.graph.as_mut() {
            graph.remove_vertex(&canonical);
        }
        true
    }

    /// The relationship graph for this run, built on first use
    pub fn relationship_graph(&mut self) -> Result<&RelationshipGraph> {
        let graph = match self.graph.take() {
            Some(graph) => graph,
            None => self.catalog.relationship_graph()?,
        };
        Ok(self.graph.insert(graph))
    }

    /// Statuses recorded so far
    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    /// Evaluate every resource
    ///
    /// Per-resource failures end up in the report. Structural errors and
    /// unrecoverable sync failures stop the run; the statuses recorded up to
    /// that point stay available through [`Transaction::report`].
    pub fn evaluate(&mut self, progress: &mut dyn ProgressCallback) -> Result<()> {
        let mut graph = match self.graph.take() {
            Some(graph) => graph,
            None => self.catalog.relationship_graph()?,
        };
        let result = self.traverse(&mut graph, progress);
        self.graph = Some(graph);
        result
    }

    fn traverse(&mut self, graph: &mut RelationshipGraph, progress: &mut dyn ProgressCallback) -> Result<()> {
        graph.check_cycles()?;

        let mut state = Traversal::default();
        let vertices: Vec<ResourceRef> = graph.graph().vertices().cloned().collect();
        for vertex in &vertices {
            state.enqueue_if_ready(graph, vertex);
        }

        while let Some((_, vertex)) = state.ready.pop_first() {
            if state.done.contains(&vertex) || state.unfinished_dependencies(graph, &vertex) > 0 {
                continue;
            }
            let Some(resource) = graph.resource(&vertex).cloned() else {
                log::debug!("{vertex}: no resource behind this vertex");
                state.finish(graph, &vertex);
                continue;
            };

            if resource.is_whit() {
                self.visit_whit(graph, &mut state, &vertex);
                continue;
            }

            if let Some(status) = self.skip(graph, &state, &resource)? {
                if status.failed || status.failed_dependencies {
                    state.failed.insert(vertex.clone());
                }
                progress.on_resource_complete(&status);
                self.report.add_status(status);
                state.finish(graph, &vertex);
                continue;
            }

            let added = self.generator.generate(&mut self.catalog, graph, &resource);
            let eval_generated = self
                .generator
                .eval_generate(&mut self.catalog, graph, &resource)?;
            if !added.is_empty() || eval_generated {
                progress.on_generated(&vertex, added.len());
                for child in &added {
                    state.enqueue_if_ready(graph, child);
                }
            }
            if state.unfinished_dependencies(graph, &vertex) > 0 {
                log::debug!("{vertex}: deferred until its generated dependencies finish");
                continue;
            }

            progress.on_resource_start(&vertex);
            let mut status = self.apply(&resource)?;
            self.process_events(&mut state, &resource, &mut status);

            let mut outgoing: Vec<Event> = status
                .events
                .iter()
                .filter(|e| e.status != EventStatus::Failure)
                .cloned()
                .collect();
            if status.restarted {
                let mut restarted = Event::new(vertex.clone(), None, EventStatus::Success);
                restarted.message = "restarted".to_string();
                outgoing.push(restarted);
            }
            state.queue_events(graph, &vertex, &outgoing);

            if status.failed || status.failed_to_restart {
                state.failed.insert(vertex.clone());
            }
            progress.on_resource_complete(&status);
            self.report.add_status(status);
            state.finish(graph, &vertex);
        }

        self.fail_stranded(graph, &state, progress)
    }

    /// Fail every resource the walk never reached
    ///
    /// Only a cycle wired in by generation can strand vertices; it is reported
    /// once every stranded resource has a status.
    fn fail_stranded(
        &mut self,
        graph: &RelationshipGraph,
        state: &Traversal,
        progress: &mut dyn ProgressCallback,
    ) -> Result<()> {
        let stranded: Vec<ResourceRef> = graph
            .graph()
            .vertices()
            .filter(|v| !state.done.contains(*v))
            .cloned()
            .collect();
        if stranded.is_empty() {
            return Ok(());
        }

        for vertex in &stranded {
            if graph.resource(vertex).is_none_or(|r| r.is_whit()) {
                continue;
            }
            let mut status = Status::new(vertex.clone());
            status.failed_because("not evaluated, its dependencies never finished");
            progress.on_resource_complete(&status);
            self.report.add_status(status);
        }

        let cycles = graph.graph().cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(Error::DependencyCycle(cycles))
        }
    }

    /// Sentinels carry no behavior: forward failures and events
    fn visit_whit(&self, graph: &RelationshipGraph, state: &mut Traversal, vertex: &ResourceRef) {
        if state.dependency_failed(graph, vertex) {
            state.failed.insert(vertex.clone());
        }
        if let Some(events) = state.queued.remove(vertex) {
            state.queue_events(graph, vertex, &events);
        }
        state.finish(graph, vertex);
    }

    /// A status for a resource that must not be evaluated, if any
    fn skip(&self, graph: &RelationshipGraph, state: &Traversal, resource: &ResourceHandle) -> Result<Option<Status>> {
        let reference = resource.reference();

        if state.dependency_failed(graph, &reference) {
            log::warn!("{reference}: skipping because of failed dependencies");
            let mut status = Status::skipped(reference);
            status.failed_dependencies = true;
            return Ok(Some(status));
        }

        if !self.options.tags.is_empty() {
            let tags = self.catalog.tags_of(&reference);
            if !self
                .options
                .tags
                .iter()
                .any(|t| tags.contains(&t.to_lowercase()))
            {
                log::debug!("{reference}: skipping, not tagged with {}", self.options.tags.join(", "));
                return Ok(Some(Status::skipped(reference)));
            }
        }

        match self.harness().scheduled(&self.catalog, resource.as_ref()) {
            Ok(true) => Ok(None),
            Ok(false) => {
                log::debug!("{reference}: skipping, not scheduled");
                Ok(Some(Status::skipped(reference)))
            }
            Err(err @ Error::MissingSchedule { .. }) => {
                let mut status = Status::new(reference);
                status.failed_because(&err.to_string());
                Ok(Some(status))
            }
            Err(err) => Err(err),
        }
    }

    fn harness(&self) -> ResourceHarness<'a> {
        ResourceHarness::new(self.store)
            .noop(self.options.noop)
            .ignore_schedules(self.options.ignore_schedules)
    }

    fn apply(&mut self, resource: &ResourceHandle) -> Result<Status> {
        match self.harness().evaluate(resource.as_ref()) {
            Ok(status) => Ok(status),
            Err(Error::Unrecoverable {
                resource,
                message,
                status,
            }) => {
                self.report.add_status((*status).clone());
                Err(Error::Unrecoverable {
                    resource,
                    message,
                    status,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Run `refresh` when changes upstream notified this resource
    fn process_events(&self, state: &mut Traversal, resource: &ResourceHandle, status: &mut Status) {
        let reference = resource.reference();
        let Some(events) = state.queued.remove(&reference) else {
            return;
        };
        if !resource.refreshable() {
            return;
        }
        if status.failed {
            log::warn!("{reference}: not refreshing, the resource failed");
            return;
        }

        let triggering = events.iter().filter(|e| e.is_success()).count();
        if triggering == 0 || self.options.noop || resource.noop() {
            log::info!(
                "{reference}: would have triggered '{REFRESH}' from {} event(s)",
                events.len()
            );
            return;
        }

        match resource.refresh() {
            Ok(()) => {
                log::info!("{reference}: triggered '{REFRESH}' from {triggering} event(s)");
                status.restarted = true;
            }
            Err(err) => {
                log::error!("{reference}: failed to call {REFRESH}: {err:#}");
                status.failed_to_restart = true;
            }
        }
    }
}
