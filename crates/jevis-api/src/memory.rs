//! In-process data source.
//!
//! Holds a small JEVis object tree in memory. Used by tests and offline
//! runs; it keeps a log of every call and every commit so callers can check
//! exactly which remote side effects an operation produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{JevisError, JevisResult};
use crate::hierarchy;
use crate::model::{
    JevisAttribute, JevisClass, JevisObject, JevisType, ObjectDraft, Sample, SampleDraft,
};
use crate::source::DataSource;

/// A commit received by the memory data source.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Sample(SampleDraft),
    Object(JevisObject),
}

#[derive(Debug, Default)]
struct Tables {
    classes: Vec<JevisClass>,
    types: HashMap<String, Vec<JevisType>>,
    valid_parents: HashMap<String, Vec<String>>,
    objects: Vec<(JevisObject, Option<i64>)>,
    attributes: Vec<JevisAttribute>,
    samples: HashMap<(i64, String), Vec<Sample>>,
    users: HashMap<String, String>,
    hidden: Vec<i64>,
    commits: Vec<Commit>,
    next_id: i64,
}

/// Data source backed by in-memory tables.
#[derive(Debug)]
pub struct MemoryDataSource {
    tables: Mutex<Tables>,
    alive: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_id: 1,
                ..Default::default()
            }),
            alive: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Register a user with a plain-text password.
    pub async fn add_user(&self, login: &str, password: &str) {
        let mut tables = self.tables.lock().await;
        tables.users.insert(login.to_string(), password.to_string());
    }

    pub async fn add_class(&self, class: JevisClass) {
        self.tables.lock().await.classes.push(class);
    }

    /// Declare an attribute type on a class.
    pub async fn add_type(&self, class: &str, declared: JevisType) {
        let mut tables = self.tables.lock().await;
        tables
            .types
            .entry(class.to_string())
            .or_default()
            .push(declared);
    }

    /// Allow objects of `child` under objects of `parent`.
    pub async fn allow_parent(&self, child: &str, parent: &str) {
        let mut tables = self.tables.lock().await;
        tables
            .valid_parents
            .entry(child.to_string())
            .or_default()
            .push(parent.to_string());
    }

    /// Insert an object with a fixed ID, creating its declared attributes.
    pub async fn add_object(&self, object: JevisObject, parent: Option<i64>) {
        let mut tables = self.tables.lock().await;
        tables.next_id = tables.next_id.max(object.id + 1);
        insert_object(&mut tables, object, parent);
    }

    /// Make an object invisible to the authenticated user.
    pub async fn hide_object(&self, id: i64) {
        self.tables.lock().await.hidden.push(id);
    }

    /// Append a stored sample to an attribute.
    pub async fn add_sample(&self, object_id: i64, attribute: &str, sample: Sample) {
        let mut tables = self.tables.lock().await;
        tables
            .samples
            .entry((object_id, attribute.to_string()))
            .or_default()
            .push(sample);
    }

    /// Switch the liveness probe result.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Number of calls made against this data source, liveness probes excluded.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Commits received so far, in order.
    pub async fn commits(&self) -> Vec<Commit> {
        self.tables.lock().await.commits.clone()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn insert_object(tables: &mut Tables, object: JevisObject, parent: Option<i64>) {
    for class_name in hierarchy::with_ancestors(&object.class_name, &tables.classes) {
        let declared = tables.types.get(&class_name).cloned().unwrap_or_default();
        for t in declared {
            let exists = tables
                .attributes
                .iter()
                .any(|a| a.object_id == object.id && a.name == t.name);
            if !exists {
                tables.attributes.push(JevisAttribute {
                    object_id: object.id,
                    name: t.name,
                    primitive_type: t.primitive_type,
                    unit: t.unit,
                });
            }
        }
    }
    tables.objects.push((object, parent));
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn authenticate(&self, login: &str, password: &str) -> JevisResult<bool> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables.users.get(login).is_some_and(|stored| stored == password))
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn object(&self, id: i64) -> JevisResult<Option<JevisObject>> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables
            .objects
            .iter()
            .find(|(o, _)| o.id == id && !tables.hidden.contains(&id))
            .map(|(o, _)| o.clone()))
    }

    async fn class(&self, name: &str) -> JevisResult<Option<JevisClass>> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables.classes.iter().find(|c| c.name == name).cloned())
    }

    async fn objects_of_class(
        &self,
        class: &JevisClass,
        include_subclasses: bool,
    ) -> JevisResult<Vec<JevisObject>> {
        self.record_call();
        let tables = self.tables.lock().await;
        let names = if include_subclasses {
            hierarchy::with_subclasses(&class.name, &tables.classes)
        } else {
            vec![class.name.clone()]
        };

        Ok(tables
            .objects
            .iter()
            .map(|(o, _)| o)
            .filter(|o| names.contains(&o.class_name) && !tables.hidden.contains(&o.id))
            .cloned()
            .collect())
    }

    async fn attribute(
        &self,
        object: &JevisObject,
        name: &str,
    ) -> JevisResult<Option<JevisAttribute>> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables
            .attributes
            .iter()
            .find(|a| a.object_id == object.id && a.name == name)
            .cloned())
    }

    async fn attributes(&self, object: &JevisObject) -> JevisResult<Vec<JevisAttribute>> {
        self.record_call();
        let tables = self.tables.lock().await;
        let mut found: Vec<JevisAttribute> = tables
            .attributes
            .iter()
            .filter(|a| a.object_id == object.id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn latest_sample(&self, attribute: &JevisAttribute) -> JevisResult<Option<Sample>> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables
            .samples
            .get(&(attribute.object_id, attribute.name.clone()))
            .and_then(|samples| samples.iter().max_by_key(|s| s.timestamp))
            .cloned())
    }

    async fn valid_parents(&self, class: &JevisClass) -> JevisResult<Vec<JevisClass>> {
        self.record_call();
        let tables = self.tables.lock().await;
        let names = tables
            .valid_parents
            .get(&class.name)
            .cloned()
            .unwrap_or_default();

        Ok(names
            .iter()
            .filter_map(|name| tables.classes.iter().find(|c| &c.name == name))
            .cloned()
            .collect())
    }

    async fn types(&self, class: &JevisClass) -> JevisResult<Vec<JevisType>> {
        self.record_call();
        let tables = self.tables.lock().await;
        Ok(tables.types.get(&class.name).cloned().unwrap_or_default())
    }

    async fn is_allowed_under(&self, child: &JevisClass, parent: &JevisObject) -> JevisResult<bool> {
        self.record_call();
        let tables = self.tables.lock().await;
        let parent_classes = hierarchy::with_ancestors(&parent.class_name, &tables.classes);
        let allowed = tables
            .valid_parents
            .get(&child.name)
            .is_some_and(|valid| valid.iter().any(|v| parent_classes.contains(v)));

        if !allowed {
            return Ok(false);
        }

        if child.unique {
            let taken = tables
                .objects
                .iter()
                .any(|(o, p)| *p == Some(parent.id) && o.class_name == child.name);
            return Ok(!taken);
        }

        Ok(true)
    }

    async fn commit_sample(&self, draft: &SampleDraft) -> JevisResult<()> {
        self.record_call();
        let mut tables = self.tables.lock().await;
        tables
            .samples
            .entry((draft.object_id, draft.attribute.clone()))
            .or_default()
            .push(draft.sample.clone());
        tables.commits.push(Commit::Sample(draft.clone()));
        Ok(())
    }

    async fn commit_object(&self, draft: &ObjectDraft) -> JevisResult<JevisObject> {
        self.record_call();
        let mut tables = self.tables.lock().await;
        if !tables.objects.iter().any(|(o, _)| o.id == draft.parent_id) {
            return Err(JevisError::NotFound(format!(
                "parent object {}",
                draft.parent_id
            )));
        }

        let object = JevisObject {
            id: tables.next_id,
            name: draft.name.clone(),
            class_name: draft.class_name.clone(),
        };
        tables.next_id += 1;
        insert_object(&mut tables, object.clone(), Some(draft.parent_id));
        tables.commits.push(Commit::Object(object.clone()));

        Ok(object)
    }
}
