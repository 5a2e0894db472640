//! Test utilities and common setup.
#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use jevis_api::{
    JevisClass, JevisObject, JevisType, MemoryDataSource, PrimitiveType, Sample, SampleValue,
};
use jevis_sysreader::disk::{FileStores, StoreCapacity};
use jevis_sysreader::{ExampleRunner, RecordingReporter, Session};

pub const USER: &str = "myUser";
pub const PASSWORD: &str = "myPW";

pub const DIRECTORY_ID: i64 = 1587;
pub const DISK_USAGE_ID: i64 = 1588;
pub const CLEAN_DISK_USAGE_ID: i64 = 1589;
pub const MAIL_SERVER_ID: i64 = 1600;

/// Filesystem roots with fixed totals; `None` makes the query fail.
pub struct FakeStores(pub Vec<(&'static str, Option<u64>)>);

impl FileStores for FakeStores {
    fn roots(&self) -> Vec<PathBuf> {
        self.0.iter().map(|(root, _)| PathBuf::from(root)).collect()
    }

    fn capacity(&self, root: &Path) -> io::Result<StoreCapacity> {
        self.0
            .iter()
            .find(|(name, _)| Path::new(name) == root)
            .and_then(|(_, total)| *total)
            .map(|total| StoreCapacity {
                usable_bytes: total,
                total_bytes: total,
            })
            .ok_or_else(|| io::Error::other("query failed"))
    }
}

fn declared(name: &str, primitive_type: PrimitiveType, unit: Option<&str>) -> JevisType {
    JevisType {
        name: name.to_string(),
        primitive_type,
        description: format!("{name} of the object"),
        unit: unit.map(str::to_string),
    }
}

fn object(id: i64, name: &str, class_name: &str) -> JevisObject {
    JevisObject {
        id,
        name: name.to_string(),
        class_name: class_name.to_string(),
    }
}

/// A small object tree:
///
/// ```text
/// [1587] Data Directory (Data Directory)
///   [1588] Disk usage (Data)              Value = 42.5 kWh
///   [1589] Clean disk usage (Clean Data)  Value has no samples
/// [1600] Mail Server (Email Server)
/// ```
///
/// `Data` is only allowed under `Data Directory` when `allow_data` is set.
pub async fn seeded_source(allow_data: bool) -> Arc<MemoryDataSource> {
    let source = Arc::new(MemoryDataSource::new());
    source.add_user(USER, PASSWORD).await;

    source.add_class(JevisClass::new("Data Directory")).await;
    source.add_class(JevisClass::new("Data")).await;
    source
        .add_class(JevisClass::new("Clean Data").inheriting("Data"))
        .await;
    source.add_class(JevisClass::new("Email Server")).await;
    source.add_class(JevisClass::new("Plugin Directory")).await;
    source
        .add_class(JevisClass::new("Email Plugin").with_description("Sends reports by mail"))
        .await;
    source
        .add_class(JevisClass::new("Report").unique())
        .await;

    source
        .add_type("Data", declared("Value", PrimitiveType::Double, Some("kWh")))
        .await;
    source
        .add_type("Email Plugin", declared("Enabled", PrimitiveType::Boolean, None))
        .await;
    source
        .add_type("Email Plugin", declared("Recipient", PrimitiveType::String, None))
        .await;

    source.allow_parent("Email Plugin", "Plugin Directory").await;
    source.allow_parent("Email Plugin", "Email Server").await;
    source.allow_parent("Report", "Data Directory").await;
    if allow_data {
        source.allow_parent("Data", "Data Directory").await;
    }

    source
        .add_object(object(DIRECTORY_ID, "Data Directory", "Data Directory"), None)
        .await;
    source
        .add_object(object(DISK_USAGE_ID, "Disk usage", "Data"), Some(DIRECTORY_ID))
        .await;
    source
        .add_object(
            object(CLEAN_DISK_USAGE_ID, "Clean disk usage", "Clean Data"),
            Some(DIRECTORY_ID),
        )
        .await;
    source
        .add_object(object(MAIL_SERVER_ID, "Mail Server", "Email Server"), None)
        .await;

    source
        .add_sample(
            DISK_USAGE_ID,
            "Value",
            Sample {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
                value: SampleValue::Double(42.5),
                note: None,
            },
        )
        .await;

    source
}

/// A runner over a seeded source, recording every reported event.
pub struct Fixture {
    pub source: Arc<MemoryDataSource>,
    pub reporter: Arc<RecordingReporter>,
    pub runner: ExampleRunner,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_source(seeded_source(true).await).await
    }

    pub async fn with_source(source: Arc<MemoryDataSource>) -> Self {
        let session = Session::establish(source.clone(), USER, PASSWORD)
            .await
            .expect("Failed to establish session");
        let reporter = Arc::new(RecordingReporter::new());
        let runner = ExampleRunner::new(session, reporter.clone()).with_stores(Arc::new(
            FakeStores(vec![("/a", Some(100)), ("/b", Some(200))]),
        ));

        Self {
            source,
            reporter,
            runner,
        }
    }
}
