//! Configurable mock resource shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::catalog::Catalog;
use crate::error::SyncError;
use crate::resource::{Resource, ResourceHandle};
use crate::types::{CurrentValues, Property, Relationship, ResourceRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Recoverable,
    Fatal,
}

#[derive(Debug)]
pub struct MockResource {
    reference: ResourceRef,
    name: Option<String>,
    tags: Vec<String>,
    properties: Vec<Property>,
    current: Mutex<CurrentValues>,
    retrieve_error: Option<String>,
    sync_failures: Vec<(String, Failure)>,
    autorequire: Vec<String>,
    children: Vec<ResourceHandle>,
    eval_children: Vec<ResourceHandle>,
    generate_error: Option<String>,
    eval_generate_error: Option<String>,
    eval_generates: bool,
    depthfirst: bool,
    ancestors: Vec<ResourceRef>,
    refreshable: bool,
    refresh_error: bool,
    noop: bool,
    schedule: Option<String>,
    pub synced: Mutex<Vec<String>>,
    pub refreshes: AtomicUsize,
    pub flushes: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub eval_generate_calls: AtomicUsize,
}

impl MockResource {
    pub fn new(title: &str) -> Self {
        Self {
            reference: ResourceRef::new("mock", title),
            name: None,
            tags: Vec::new(),
            properties: Vec::new(),
            current: Mutex::new(CurrentValues::new()),
            retrieve_error: None,
            sync_failures: Vec::new(),
            autorequire: Vec::new(),
            children: Vec::new(),
            eval_children: Vec::new(),
            generate_error: None,
            eval_generate_error: None,
            eval_generates: false,
            depthfirst: false,
            ancestors: Vec::new(),
            refreshable: false,
            refresh_error: false,
            noop: false,
            schedule: None,
            synced: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            eval_generate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }

    /// Manage `name`, desired `should`, currently `current`
    pub fn with_property(mut self, property: Property, current: impl Into<Value>) -> Self {
        self.current
            .get_mut()
            .unwrap()
            .insert(property.name.clone(), current.into());
        self.properties.push(property);
        self
    }

    pub fn with_retrieve_error(mut self, message: &str) -> Self {
        self.retrieve_error = Some(message.to_string());
        self
    }

    pub fn with_sync_failure(mut self, property: &str, failure: Failure) -> Self {
        self.sync_failures.push((property.to_string(), failure));
        self
    }

    /// Autorequire `Mock[title]` for each title
    pub fn with_autorequire(mut self, titles: &[&str]) -> Self {
        self.autorequire = titles.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_children(mut self, children: Vec<ResourceHandle>) -> Self {
        self.children = children;
        self
    }

    pub fn with_eval_children(mut self, children: Vec<ResourceHandle>) -> Self {
        self.eval_children = children;
        self.eval_generates = true;
        self
    }

    pub fn with_generate_error(mut self, message: &str) -> Self {
        self.generate_error = Some(message.to_string());
        self
    }

    pub fn with_eval_generate_error(mut self, message: &str) -> Self {
        self.eval_generate_error = Some(message.to_string());
        self.eval_generates = true;
        self
    }

    pub fn with_depthfirst(mut self) -> Self {
        self.depthfirst = true;
        self
    }

    pub fn with_ancestors(mut self, ancestors: Vec<ResourceRef>) -> Self {
        self.ancestors = ancestors;
        self
    }

    pub fn with_refresh(mut self) -> Self {
        self.refreshable = true;
        self
    }

    pub fn with_failing_refresh(mut self) -> Self {
        self.refreshable = true;
        self.refresh_error = true;
        self
    }

    pub fn with_noop(mut self) -> Self {
        self.noop = true;
        self
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.schedule = Some(schedule.to_string());
        self
    }

    /// Change the real-world value behind the harness's back
    pub fn drift(&self, property: &str, value: impl Into<Value>) {
        self.current
            .lock()
            .unwrap()
            .insert(property.to_string(), value.into());
    }

    pub fn synced_properties(&self) -> Vec<String> {
        self.synced.lock().unwrap().clone()
    }
}

impl Resource for MockResource {
    fn reference(&self) -> ResourceRef {
        self.reference.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn properties(&self) -> Vec<Property> {
        self.properties.clone()
    }

    fn retrieve(&self) -> anyhow::Result<CurrentValues> {
        if let Some(message) = &self.retrieve_error {
            anyhow::bail!("{message}");
        }
        Ok(self.current.lock().unwrap().clone())
    }

    fn sync(&self, property: &Property) -> Result<(), SyncError> {
        if let Some((_, failure)) = self.sync_failures.iter().find(|(p, _)| *p == property.name) {
            let err = anyhow::anyhow!("cannot set {}", property.name);
            return Err(match failure {
                Failure::Recoverable => SyncError::Recoverable(err),
                Failure::Fatal => SyncError::Fatal(err),
            });
        }
        let value = property.should.clone().unwrap_or(Value::Null);
        self.current
            .lock()
            .unwrap()
            .insert(property.name.clone(), value);
        self.synced.lock().unwrap().push(property.name.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn refreshable(&self) -> bool {
        self.refreshable
    }

    fn refresh(&self) -> anyhow::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_error {
            anyhow::bail!("restart failed");
        }
        Ok(())
    }

    fn noop(&self) -> bool {
        self.noop
    }

    fn schedule(&self) -> Option<String> {
        self.schedule.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    fn autorequire(&self, _catalog: &Catalog) -> Vec<Relationship> {
        self.autorequire
            .iter()
            .map(|title| Relationship::new(ResourceRef::new("mock", title), self.reference()))
            .collect()
    }

    fn generate(&self) -> anyhow::Result<Vec<ResourceHandle>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.generate_error {
            anyhow::bail!("{message}");
        }
        Ok(self.children.clone())
    }

    fn eval_generates(&self) -> bool {
        self.eval_generates
    }

    fn eval_generate(&self) -> anyhow::Result<Vec<ResourceHandle>> {
        self.eval_generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.eval_generate_error {
            anyhow::bail!("{message}");
        }
        Ok(self.eval_children.clone())
    }

    fn depthfirst(&self) -> bool {
        self.depthfirst
    }

    fn ancestors(&self) -> Vec<ResourceRef> {
        self.ancestors.clone()
    }
}

/// A plain mock handle
pub fn mock(title: &str) -> ResourceHandle {
    Arc::new(MockResource::new(title))
}

/// `Mock[title]`
pub fn mock_ref(title: &str) -> ResourceRef {
    ResourceRef::new("mock", title)
}
