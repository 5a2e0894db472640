//! Events emitted by the example operations and the reporters that consume them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use jevis_api::{PrimitiveType, SampleValue};
use serde::Serialize;
use tracing::{error, info};

/// Severity of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// Something observable that happened while running an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The application user was authenticated.
    Connected { user: String },
    /// The connection failed its liveness probe.
    NotAlive { operation: &'static str },
    ClassNotFound { class: String },
    ObjectNotFound { id: i64 },
    AttributeNotFound { object_id: i64, attribute: String },
    /// An object listed by class.
    Object { id: i64, name: String },
    /// Latest sample of an attribute of a listed object.
    AttributeValue {
        object_id: i64,
        attribute: String,
        timestamp: Option<DateTime<Utc>>,
        value: Option<SampleValue>,
    },
    ClassName { name: String },
    ClassUnique { unique: bool },
    ValidParentsHeader,
    ValidParent { name: String },
    TypesHeader,
    TypeInfo {
        name: String,
        primitive_type: PrimitiveType,
        description: String,
        unit: Option<String>,
    },
    /// Target object of a measurement write was resolved.
    ObjectResolved { id: i64, name: String },
    AttributeResolved { object_id: i64, attribute: String },
    /// Capacity of one filesystem root.
    DiskRoot {
        root: String,
        usable_bytes: u64,
        total_bytes: u64,
    },
    DiskRootFailed { root: String, error: String },
    SampleCommitted {
        object_id: i64,
        attribute: String,
        timestamp: DateTime<Utc>,
        value: SampleValue,
    },
    ParentNotAccessible { id: i64 },
    ChildNotAllowed { parent_id: i64, class: String },
    ObjectCreated { id: i64, name: String },
    /// A data source call failed.
    RemoteFailure {
        operation: &'static str,
        error: String,
    },
}

impl Event {
    pub fn severity(&self) -> Severity {
        match self {
            Event::NotAlive { .. }
            | Event::ClassNotFound { .. }
            | Event::ObjectNotFound { .. }
            | Event::AttributeNotFound { .. }
            | Event::DiskRootFailed { .. }
            | Event::ParentNotAccessible { .. }
            | Event::ChildNotAllowed { .. }
            | Event::RemoteFailure { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Connected { user } => write!(f, "Connection was successful (user: {user})"),
            Event::NotAlive { .. } => write!(f, "Connection to the JEVis server is not alive"),
            Event::ClassNotFound { class } => {
                write!(f, "Requested JEVis class does not exist: {class}")
            }
            Event::ObjectNotFound { id } => write!(f, "Could not find the object with the id: {id}"),
            Event::AttributeNotFound { attribute, .. } => {
                write!(f, "Could not find the attribute with the name: {attribute}")
            }
            Event::Object { id, name } => write!(f, "JEVisObject: [{id}] {name}"),
            Event::AttributeValue {
                attribute,
                timestamp,
                value,
                ..
            } => match (timestamp, value) {
                (Some(ts), Some(value)) => {
                    write!(f, "    JEVisAttribute: {attribute} [{ts}] - {value}")
                }
                _ => write!(f, "    JEVisAttribute: {attribute} [-] - no samples"),
            },
            Event::ClassName { name } => write!(f, "Name: {name}"),
            Event::ClassUnique { unique } => write!(f, "isUnique: {unique}"),
            Event::ValidParentsHeader => write!(f, "Valid Parents:"),
            Event::ValidParent { name } => write!(f, "Name: {name}"),
            Event::TypesHeader => write!(f, "Types:"),
            Event::TypeInfo {
                name,
                primitive_type,
                description,
                unit,
            } => write!(
                f,
                "  Name: {name}, Type: {primitive_type}, Description: {description}, Unit: {}",
                unit.as_deref().unwrap_or("-")
            ),
            Event::ObjectResolved { id, name } => write!(f, "JEVisObject: [{id}] {name}"),
            Event::AttributeResolved { attribute, .. } => write!(f, "JEVisAttribute: {attribute}"),
            Event::DiskRoot {
                root,
                usable_bytes,
                total_bytes,
            } => write!(f, "{root}: available={usable_bytes}, total={total_bytes}"),
            Event::DiskRootFailed { root, error } => {
                write!(f, "There was an error while reading the free space of {root}: {error}")
            }
            Event::SampleCommitted {
                attribute,
                timestamp,
                value,
                ..
            } => write!(f, "Committed sample {value} at {timestamp} to {attribute}"),
            Event::ParentNotAccessible { .. } => {
                write!(f, "Cannot create object because the parent is not accessible")
            }
            Event::ChildNotAllowed { class, .. } => write!(
                f,
                "Cannot create object because the parent class does not allow the child class {class}"
            ),
            Event::ObjectCreated { id, .. } => write!(f, "New ID: {id}"),
            Event::RemoteFailure { operation, error } => write!(f, "{operation} failed: {error}"),
        }
    }
}

/// Receives the events of the example operations.
pub trait Reporter: Send + Sync {
    fn report(&self, event: Event);
}

/// Forwards events to `tracing` at their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: Event) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        match event.severity() {
            Severity::Info => info!(event = %payload, "{}", event),
            Severity::Error => error!(event = %payload, "{}", event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events reported at error severity.
    pub fn errors(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.severity() == Severity::Error)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(
            Event::ClassNotFound {
                class: "Data".to_string()
            }
            .severity(),
            Severity::Error
        );
        assert_eq!(
            Event::ObjectCreated {
                id: 1,
                name: "x".to_string()
            }
            .severity(),
            Severity::Info
        );
    }

    #[test]
    fn test_display_matches_console_format() {
        let event = Event::Object {
            id: 1588,
            name: "Disk usage".to_string(),
        };
        assert_eq!(event.to_string(), "JEVisObject: [1588] Disk usage");

        let empty = Event::AttributeValue {
            object_id: 1588,
            attribute: "Value".to_string(),
            timestamp: None,
            value: None,
        };
        assert_eq!(empty.to_string(), "    JEVisAttribute: Value [-] - no samples");
    }

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingReporter::new();
        reporter.report(Event::ValidParentsHeader);
        reporter.report(Event::ObjectNotFound { id: 1 });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.errors(), vec![Event::ObjectNotFound { id: 1 }]);

        reporter.clear();
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(Event::NotAlive {
            operation: "list_objects",
        })
        .unwrap();
        assert_eq!(json["event"], "not_alive");
        assert_eq!(json["operation"], "list_objects");
    }
}
