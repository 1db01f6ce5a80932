//! Per-resource evaluation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{ResourceRef, Value};

/// Outcome of one property transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
    Noop,
}

/// A single property transition, or a resource-level failure when `property` is `None`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub resource: ResourceRef,
    pub property: Option<String>,
    pub previous_value: Option<Value>,
    pub desired_value: Option<Value>,
    /// The persisted value from the previous run, if any
    pub historical_value: Option<Value>,
    pub status: EventStatus,
    pub message: String,
    /// The value drifted away from what was last applied
    pub corrective_change: bool,
    pub time: DateTime<Utc>,
}

impl Event {
    /// Start an event for `property` of `resource`
    pub fn new(resource: ResourceRef, property: Option<&str>, status: EventStatus) -> Self {
        Self {
            resource,
            property: property.map(str::to_string),
            previous_value: None,
            desired_value: None,
            historical_value: None,
            status,
            message: String::new(),
            corrective_change: false,
            time: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EventStatus::Success
    }
}

/// Aggregated result of evaluating one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub resource: ResourceRef,
    pub events: Vec<Event>,
    pub changed: bool,
    pub failed: bool,
    pub skipped: bool,
    pub out_of_sync: bool,
    pub corrective_change: bool,
    pub change_count: usize,
    pub out_of_sync_count: usize,
    /// Dependencies failed so the resource was not evaluated
    pub failed_dependencies: bool,
    /// `refresh()` ran successfully
    pub restarted: bool,
    pub failed_to_restart: bool,
    /// Why the resource failed, if it failed outside a property sync
    pub failure_reason: Option<String>,
    #[serde(with = "duration_secs")]
    pub evaluation_time: Duration,
    pub time: DateTime<Utc>,
}

impl Status {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            events: Vec::new(),
            changed: false,
            failed: false,
            skipped: false,
            out_of_sync: false,
            corrective_change: false,
            change_count: 0,
            out_of_sync_count: 0,
            failed_dependencies: false,
            restarted: false,
            failed_to_restart: false,
            failure_reason: None,
            evaluation_time: Duration::ZERO,
            time: Utc::now(),
        }
    }

    /// A status for a resource that was not evaluated
    pub fn skipped(resource: ResourceRef) -> Self {
        let mut status = Self::new(resource);
        status.skipped = true;
        status
    }

    /// Record an event and update the aggregate flags
    pub fn add_event(&mut self, event: Event) {
        match event.status {
            EventStatus::Failure => self.failed = true,
            EventStatus::Success => {
                self.changed = true;
                self.change_count += 1;
            }
            EventStatus::Noop => {}
        }
        self.out_of_sync = true;
        self.out_of_sync_count += 1;
        if event.corrective_change {
            self.corrective_change = true;
        }
        self.events.push(event);
    }

    /// Mark the resource failed for a reason outside a property sync
    pub fn failed_because(&mut self, reason: &str) {
        log::error!("{}: {reason}", self.resource);
        let mut event = Event::new(self.resource.clone(), None, EventStatus::Failure);
        event.message = reason.to_string();
        self.failure_reason = Some(reason.to_string());
        self.add_event(event);
    }

    /// Events whose status is neither failure nor noop
    pub fn successful_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_success())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r() -> ResourceRef {
        ResourceRef::new("file", "/tmp/a")
    }

    #[test]
    fn test_add_event_flags() {
        let mut status = Status::new(r());
        status.add_event(Event::new(r(), Some("content"), EventStatus::Noop));
        assert!(status.out_of_sync);
        assert!(!status.changed);
        assert!(!status.failed);

        let mut success = Event::new(r(), Some("ensure"), EventStatus::Success);
        success.corrective_change = true;
        status.add_event(success);
        assert!(status.changed);
        assert!(status.corrective_change);
        assert_eq!(status.change_count, 1);
        assert_eq!(status.out_of_sync_count, 2);
    }

    #[test]
    fn test_failed_because_records_event() {
        let mut status = Status::new(r());
        status.failed_because("could not retrieve");
        assert!(status.failed);
        assert_eq!(status.failure_reason.as_deref(), Some("could not retrieve"));
        assert_eq!(status.events.len(), 1);
        assert!(status.events[0].property.is_none());
    }

    #[test]
    fn test_status_serializes() {
        let mut status = Status::skipped(r());
        status.evaluation_time = Duration::from_millis(1500);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["resource"], "File[/tmp/a]");
        assert_eq!(json["skipped"], true);
        assert_eq!(json["evaluation_time"], 1.5);
    }
}
