//! Evaluation of a single resource
//!
//! The harness compares each managed property with the real system, syncs
//! what is out of date (or only reports it in noop mode), and turns the
//! outcome into [`Event`]s on a [`Status`]. It also records the applied
//! ("system") values in the [`StateStore`] so a later run can tell when
//! something drifted.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;

use crate::catalog::Catalog;
use crate::error::{Error, Result, SyncError};
use crate::resource::Resource;
use crate::status::{Event, EventStatus, Status};
use crate::store::StateStore;
use crate::types::{CurrentValues, Property, REDACTED, ResourceRef, Value, format_value, wrap_value};

/// Outcome of syncing one property
#[derive(Debug)]
pub enum PropertySync {
    /// The property was in sync and nothing was recorded
    InSync,
    /// An event was recorded; evaluation continues
    Recorded(Event),
    /// The sync failed unrecoverably; the event is recorded and evaluation stops
    Fatal { event: Event, error: SyncError },
}

/// Everything the harness knows about a resource while evaluating it
#[derive(Debug)]
pub struct ApplicationContext {
    pub resource: ResourceRef,
    pub current_values: CurrentValues,
    /// Properties whose applied values are persisted
    pub system_value_params: Vec<Property>,
    /// Persisted values from the previous run
    pub historical_values: HashMap<String, Value>,
    pub status: Status,
}

impl ApplicationContext {
    /// Snapshot the resource's current state
    pub fn from_resource(resource: &dyn Resource, store: &dyn StateStore, status: Status) -> anyhow::Result<Self> {
        let reference = resource.reference();
        let current_values = resource.retrieve()?;
        let properties = resource.properties();
        let historical_values = properties
            .iter()
            .filter_map(|p| {
                store
                    .system_value(&reference, &p.name)
                    .map(|v| (p.name.clone(), v))
            })
            .collect();
        let system_value_params = properties
            .into_iter()
            .filter(|p| !p.sensitive && p.should.is_some())
            .collect();
        Ok(Self {
            resource: reference,
            current_values,
            system_value_params,
            historical_values,
            status,
        })
    }

    /// Current value of a property; unknown properties count as absent
    pub fn current_value(&self, name: &str) -> Value {
        self.current_values.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn record(&mut self, event: Event) {
        self.status.add_event(event);
    }
}

/// Applies resources and records their state
pub struct ResourceHarness<'a> {
    store: &'a dyn StateStore,
    noop: bool,
    ignore_schedules: bool,
}

impl<'a> ResourceHarness<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self {
            store,
            noop: false,
            ignore_schedules: false,
        }
    }

    /// Report changes for every resource without applying them
    pub fn noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    pub fn ignore_schedules(mut self, ignore: bool) -> Self {
        self.ignore_schedules = ignore;
        self
    }

    /// Evaluate one resource
    ///
    /// Failures to retrieve, flush or sync a property end up on the returned
    /// status. Only an unrecoverable sync failure is returned as an error, and
    /// it still carries the status recorded so far.
    pub fn evaluate(&self, resource: &dyn Resource) -> Result<Status> {
        let start = Instant::now();
        let reference = resource.reference();
        let status = Status::new(reference.clone());

        let mut context = match ApplicationContext::from_resource(resource, self.store, status) {
            Ok(context) => context,
            Err(err) => {
                let mut status = Status::new(reference);
                status.failed_because(&format!("could not evaluate: {err:#}"));
                status.evaluation_time = start.elapsed();
                return Ok(status);
            }
        };

        if let Err(error) = self.perform_changes(resource, &mut context) {
            let mut status = context.status;
            status.evaluation_time = start.elapsed();
            log::error!("{reference}: aborting evaluation: {error}");
            return Err(Error::Unrecoverable {
                resource: reference,
                message: error.to_string(),
                status: Box::new(status),
            });
        }

        if context.status.changed && !self.is_noop(resource) {
            self.store.set_synced(&reference, Utc::now());
            if let Err(err) = resource.flush() {
                context
                    .status
                    .failed_because(&format!("could not flush: {err:#}"));
            }
        }

        let mut status = context.status;
        status.evaluation_time = start.elapsed();
        Ok(status)
    }

    /// Whether the resource's schedule allows evaluating it now
    pub fn scheduled(&self, catalog: &Catalog, resource: &dyn Resource) -> Result<bool> {
        if self.ignore_schedules {
            return Ok(true);
        }
        let Some(name) = resource.schedule() else {
            return Ok(true);
        };
        let reference = resource.reference();
        let schedule = catalog.resource("Schedule", &name);
        let Some(schedule) = schedule.as_deref().and_then(|s| s.as_schedule()) else {
            return Err(Error::MissingSchedule {
                resource: reference,
                schedule: name,
            });
        };
        Ok(schedule.matches(self.store.checked(&reference), Utc::now()))
    }

    fn is_noop(&self, resource: &dyn Resource) -> bool {
        self.noop || resource.noop()
    }

    fn perform_changes(&self, resource: &dyn Resource, context: &mut ApplicationContext) -> std::result::Result<(), SyncError> {
        self.store.set_checked(&context.resource, Utc::now());

        let properties = resource.properties();
        let ensure = properties
            .iter()
            .find(|p| p.is_ensure() && p.should.is_some());

        let ensure_outcome = match ensure {
            Some(ensure) => self.sync_if_needed(resource, ensure, context),
            None => PropertySync::InSync,
        };

        match ensure_outcome {
            PropertySync::Fatal { error, .. } => return Err(error),
            PropertySync::Recorded(_) => {}
            PropertySync::InSync => {
                if resource.present(&context.current_values) {
                    for property in properties.iter().filter(|p| !p.is_ensure()) {
                        if let PropertySync::Fatal { error, .. } =
                            self.sync_if_needed(resource, property, context)
                        {
                            return Err(error);
                        }
                    }
                } else {
                    log::debug!(
                        "{}: nothing to manage: no ensure and the resource doesn't exist",
                        context.resource
                    );
                }
            }
        }

        self.persist_system_values(context);
        Ok(())
    }

    /// Sync one property if it is out of sync, recording the event
    pub fn sync_if_needed(
        &self,
        resource: &dyn Resource,
        property: &Property,
        context: &mut ApplicationContext,
    ) -> PropertySync {
        let Some(should) = &property.should else {
            return PropertySync::InSync;
        };
        let current = context.current_value(&property.name);
        if resource.insync(property, &current) {
            return PropertySync::InSync;
        }

        let mut event = Event::new(
            context.resource.clone(),
            Some(&property.name),
            EventStatus::Success,
        );
        if property.sensitive {
            event.previous_value = Some(Value::String(REDACTED.to_string()));
            event.desired_value = Some(Value::String(REDACTED.to_string()));
        } else {
            event.previous_value = Some(current.clone());
            event.desired_value = Some(should.clone());
            event.historical_value = context.historical_values.get(&property.name).cloned();
        }

        let mut fatal = None;
        if self.is_noop(resource) {
            event.status = EventStatus::Noop;
            event.message = if property.sensitive {
                format!("current_value {REDACTED}, should be {REDACTED} (noop)")
            } else {
                format!(
                    "current_value {}, should be {} (noop)",
                    format_value(&current),
                    format_value(should)
                )
            };
        } else {
            match resource.sync(property) {
                Ok(()) => {
                    event.status = EventStatus::Success;
                    event.message = property.change_message(&current);
                }
                Err(error) => {
                    event.status = EventStatus::Failure;
                    event.message = if property.sensitive {
                        format!("change from {REDACTED} to {REDACTED} failed: {error}")
                    } else {
                        format!(
                            "change from {} to {} failed: {error}",
                            format_value(&current),
                            format_value(should)
                        )
                    };
                    if error.is_fatal() {
                        fatal = Some(error);
                    }
                }
            }
        }

        let old_system_value = self.store.system_value(&context.resource, &property.name);
        event.corrective_change = corrective_change(resource, property, old_system_value, &current);
        if event.corrective_change {
            event.message.push_str(" (corrective)");
        }

        match event.status {
            EventStatus::Failure => log::error!("{}: {}", context.resource, event.message),
            _ => log::info!("{}: {}", context.resource, event.message),
        }

        context.record(event.clone());
        match fatal {
            Some(error) => PropertySync::Fatal { event, error },
            None => PropertySync::Recorded(event),
        }
    }

    /// Store the applied value of each persistable property
    ///
    /// A property whose event did not succeed keeps its previous system
    /// value, or the pre-change value if none was stored yet. Everything else
    /// stores the desired value.
    fn persist_system_values(&self, context: &ApplicationContext) {
        let events: HashMap<&str, &Event> = context
            .status
            .events
            .iter()
            .filter_map(|e| e.property.as_deref().map(|p| (p, e)))
            .collect();

        for property in &context.system_value_params {
            let Some(should) = &property.should else {
                continue;
            };
            let value = match events.get(property.name.as_str()) {
                Some(event) if event.status != EventStatus::Success => self
                    .store
                    .system_value(&context.resource, &property.name)
                    .unwrap_or_else(|| {
                        Value::Array(wrap_value(
                            event.previous_value.as_ref().unwrap_or(&Value::Null),
                        ))
                    }),
                _ => Value::Array(wrap_value(should)),
            };
            self.store
                .set_system_value(&context.resource, &property.name, value);
        }
    }
}

/// Whether the system drifted from the last applied value before this change
fn corrective_change(
    resource: &dyn Resource,
    property: &Property,
    old_system_value: Option<Value>,
    previous: &Value,
) -> bool {
    if property.sensitive || property.should.is_none() {
        return false;
    }
    let Some(old) = old_system_value else {
        return false;
    };
    let applied = Property {
        should: Some(old),
        ..property.clone()
    };
    !resource.insync(&applied, previous)
}
