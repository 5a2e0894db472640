//! Example operations against a seeded in-memory JEVis tree.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{
    CLEAN_DISK_USAGE_ID, DIRECTORY_ID, DISK_USAGE_ID, FakeStores, Fixture, MAIL_SERVER_ID,
    seeded_source,
};
use jevis_api::{Commit, PrimitiveType, SampleValue};
use jevis_sysreader::config::ExamplesConfig;
use jevis_sysreader::{Event, OperationError, RunSummary};

const NOTE: &str = "This is an note, imported via SysReader";

#[tokio::test]
async fn test_not_alive_makes_no_remote_calls() {
    let fixture = Fixture::new().await;
    fixture.source.set_alive(false);
    let before = fixture.source.call_count();

    let runner = &fixture.runner;
    assert!(matches!(
        runner.list_objects_by_class("Data").await,
        Err(OperationError::NotAlive)
    ));
    assert!(matches!(
        runner.describe_class("Email Plugin").await,
        Err(OperationError::NotAlive)
    ));
    assert!(matches!(
        runner.write_measurement(DISK_USAGE_ID, "Value", NOTE).await,
        Err(OperationError::NotAlive)
    ));
    assert!(matches!(
        runner.create_object(DIRECTORY_ID, "Data", "New").await,
        Err(OperationError::NotAlive)
    ));

    assert_eq!(fixture.source.call_count(), before);
    assert!(fixture.source.commits().await.is_empty());
    assert_eq!(
        fixture.reporter.events(),
        vec![
            Event::NotAlive {
                operation: "list_objects_by_class"
            },
            Event::NotAlive {
                operation: "describe_class"
            },
            Event::NotAlive {
                operation: "write_measurement"
            },
            Event::NotAlive {
                operation: "create_object"
            },
        ]
    );
}

#[tokio::test]
async fn test_list_objects_includes_subclasses_and_latest_values() {
    let fixture = Fixture::new().await;

    let objects = fixture.runner.list_objects_by_class("Data").await.unwrap();
    let ids: Vec<i64> = objects.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![DISK_USAGE_ID, CLEAN_DISK_USAGE_ID]);

    let events = fixture.reporter.events();
    assert_eq!(events.len(), 4);
    assert_eq!(
        events[0],
        Event::Object {
            id: DISK_USAGE_ID,
            name: "Disk usage".to_string()
        }
    );
    assert!(matches!(
        &events[1],
        Event::AttributeValue {
            object_id: DISK_USAGE_ID,
            value: Some(SampleValue::Double(v)),
            timestamp: Some(_),
            ..
        } if (*v - 42.5).abs() < f64::EPSILON
    ));
    assert!(matches!(
        &events[3],
        Event::AttributeValue {
            object_id: CLEAN_DISK_USAGE_ID,
            value: None,
            timestamp: None,
            ..
        }
    ));
    assert!(fixture.reporter.errors().is_empty());
}

#[tokio::test]
async fn test_list_objects_hides_inaccessible_objects() {
    let source = seeded_source(true).await;
    source.hide_object(CLEAN_DISK_USAGE_ID).await;
    let fixture = Fixture::with_source(source).await;

    let objects = fixture.runner.list_objects_by_class("Data").await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].id, DISK_USAGE_ID);
}

#[tokio::test]
async fn test_list_objects_missing_class() {
    let fixture = Fixture::new().await;

    let result = fixture.runner.list_objects_by_class("Weather Station").await;
    assert!(matches!(result, Err(OperationError::ClassNotFound(ref c)) if c == "Weather Station"));
    assert_eq!(
        fixture.reporter.events(),
        vec![Event::ClassNotFound {
            class: "Weather Station".to_string()
        }]
    );
}

#[tokio::test]
async fn test_describe_class_reports_parents_in_order() {
    let fixture = Fixture::new().await;

    let description = fixture.runner.describe_class("Email Plugin").await.unwrap();
    assert_eq!(description.class.name, "Email Plugin");
    assert!(!description.class.unique);

    let parents: Vec<String> = fixture
        .reporter
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::ValidParent { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(parents, vec!["Plugin Directory", "Email Server"]);

    let types: Vec<(String, PrimitiveType)> = description
        .types
        .iter()
        .map(|t| (t.name.clone(), t.primitive_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("Enabled".to_string(), PrimitiveType::Boolean),
            ("Recipient".to_string(), PrimitiveType::String),
        ]
    );

    let events = fixture.reporter.events();
    assert_eq!(
        events[..3],
        [
            Event::ClassName {
                name: "Email Plugin".to_string()
            },
            Event::ClassUnique { unique: false },
            Event::ValidParentsHeader,
        ]
    );
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let fixture = Fixture::new().await;

    fixture.runner.describe_class("Email Plugin").await.unwrap();
    fixture.runner.list_objects_by_class("Data").await.unwrap();
    let first = fixture.reporter.events();
    fixture.reporter.clear();

    fixture.runner.describe_class("Email Plugin").await.unwrap();
    fixture.runner.list_objects_by_class("Data").await.unwrap();
    assert_eq!(fixture.reporter.events(), first);
    assert!(fixture.source.commits().await.is_empty());
}

#[tokio::test]
async fn test_write_measurement_commits_one_sample() {
    let fixture = Fixture::new().await;

    let start = Utc::now();
    let sample = fixture
        .runner
        .write_measurement(DISK_USAGE_ID, "Value", NOTE)
        .await
        .unwrap();
    let end = Utc::now();

    assert_eq!(sample.value, SampleValue::Long(300));
    assert_eq!(sample.note.as_deref(), Some(NOTE));

    let commits = fixture.source.commits().await;
    assert_eq!(commits.len(), 1);
    let Commit::Sample(draft) = &commits[0] else {
        panic!("expected a sample commit, got {:?}", commits[0]);
    };
    assert_eq!(draft.object_id, DISK_USAGE_ID);
    assert_eq!(draft.attribute, "Value");
    assert!(draft.sample.timestamp >= start);
    assert!(draft.sample.timestamp <= end);

    assert!(fixture.reporter.events().contains(&Event::SampleCommitted {
        object_id: DISK_USAGE_ID,
        attribute: "Value".to_string(),
        timestamp: sample.timestamp,
        value: SampleValue::Long(300),
    }));
}

#[tokio::test]
async fn test_write_measurement_tolerates_failed_root() {
    let fixture = Fixture::new().await;
    let runner = fixture
        .runner
        .with_stores(Arc::new(FakeStores(vec![("A", Some(100)), ("B", None)])));

    let sample = runner
        .write_measurement(DISK_USAGE_ID, "Value", NOTE)
        .await
        .unwrap();
    assert_eq!(sample.value, SampleValue::Long(100));

    let events = fixture.reporter.events();
    assert!(events.contains(&Event::DiskRoot {
        root: "A".to_string(),
        usable_bytes: 100,
        total_bytes: 100,
    }));
    assert!(events.contains(&Event::DiskRootFailed {
        root: "B".to_string(),
        error: "query failed".to_string(),
    }));
    assert_eq!(fixture.source.commits().await.len(), 1);
}

#[tokio::test]
async fn test_write_measurement_missing_object_or_attribute() {
    let fixture = Fixture::new().await;

    let missing_object = fixture.runner.write_measurement(9999, "Value", NOTE).await;
    assert!(matches!(missing_object, Err(OperationError::ObjectNotFound(9999))));

    let missing_attribute = fixture
        .runner
        .write_measurement(DISK_USAGE_ID, "Humidity", NOTE)
        .await;
    assert!(matches!(
        missing_attribute,
        Err(OperationError::AttributeNotFound { object_id: DISK_USAGE_ID, ref attribute })
            if attribute == "Humidity"
    ));

    assert!(fixture.source.commits().await.is_empty());
    assert_eq!(fixture.reporter.errors().len(), 2);
}

#[tokio::test]
async fn test_create_object_disallowed_class() {
    let fixture = Fixture::with_source(seeded_source(false).await).await;

    let result = fixture
        .runner
        .create_object(DIRECTORY_ID, "Data", "My new Data Object")
        .await;
    assert!(matches!(
        result,
        Err(OperationError::ChildNotAllowed { parent_id: DIRECTORY_ID, .. })
    ));
    assert!(fixture.source.commits().await.is_empty());
    assert_eq!(
        fixture.reporter.errors(),
        vec![Event::ChildNotAllowed {
            parent_id: DIRECTORY_ID,
            class: "Data".to_string()
        }]
    );
}

#[tokio::test]
async fn test_create_object_allowed_class() {
    let fixture = Fixture::new().await;

    let created = fixture
        .runner
        .create_object(DIRECTORY_ID, "Data", "My new Data Object")
        .await
        .unwrap()
        .expect("object should be created");

    assert_eq!(created.id, MAIL_SERVER_ID + 1);
    assert_eq!(created.class_name, "Data");
    assert_eq!(
        fixture.source.commits().await,
        vec![Commit::Object(created.clone())]
    );
    assert_eq!(
        fixture.reporter.events(),
        vec![Event::ObjectCreated {
            id: created.id,
            name: "My new Data Object".to_string()
        }]
    );
}

#[tokio::test]
async fn test_create_object_missing_class_is_silent() {
    let fixture = Fixture::new().await;

    let result = fixture
        .runner
        .create_object(DIRECTORY_ID, "Weather Station", "Station")
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(fixture.reporter.events().is_empty());
    assert!(fixture.source.commits().await.is_empty());
}

#[tokio::test]
async fn test_create_object_missing_parent() {
    let fixture = Fixture::new().await;

    let result = fixture.runner.create_object(4242, "Data", "Orphan").await;
    assert!(matches!(result, Err(OperationError::ParentNotAccessible(4242))));
    assert_eq!(
        fixture.reporter.events(),
        vec![Event::ParentNotAccessible { id: 4242 }]
    );
}

#[tokio::test]
async fn test_create_unique_class_only_once() {
    let fixture = Fixture::new().await;

    let first = fixture
        .runner
        .create_object(DIRECTORY_ID, "Report", "Monthly")
        .await
        .unwrap();
    assert!(first.is_some());

    let second = fixture
        .runner
        .create_object(DIRECTORY_ID, "Report", "Monthly again")
        .await;
    assert!(matches!(second, Err(OperationError::ChildNotAllowed { .. })));
    assert_eq!(fixture.source.commits().await.len(), 1);
}

#[tokio::test]
async fn test_run_all_continues_past_failures() {
    let fixture = Fixture::with_source(seeded_source(false).await).await;

    let summary = fixture.runner.run_all(&ExamplesConfig::default()).await;
    assert_eq!(
        summary,
        RunSummary {
            succeeded: 3,
            failed: 1
        }
    );

    assert_eq!(
        fixture.reporter.errors(),
        vec![Event::ChildNotAllowed {
            parent_id: DIRECTORY_ID,
            class: "Data".to_string()
        }]
    );
    assert_eq!(fixture.source.commits().await.len(), 1);
}

#[tokio::test]
async fn test_connection_is_announced_once() {
    let fixture = Fixture::new().await;

    fixture.runner.report_connected();
    assert_eq!(
        fixture.reporter.events(),
        vec![Event::Connected {
            user: common::USER.to_string()
        }]
    );
    assert_eq!(
        fixture.reporter.events()[0].to_string(),
        "Connection was successful (user: myUser)"
    );
}
