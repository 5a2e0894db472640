//! The example operations run against a JEVis session.

use std::sync::Arc;

use chrono::Utc;
use jevis_api::{JevisClass, JevisError, JevisObject, JevisType, Sample};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ExamplesConfig;
use crate::disk::{self, FileStores, SystemStores};
use crate::report::{Event, Reporter};
use crate::session::Session;

const LIST_OBJECTS: &str = "list_objects_by_class";
const DESCRIBE_CLASS: &str = "describe_class";
const WRITE_MEASUREMENT: &str = "write_measurement";
const CREATE_OBJECT: &str = "create_object";

/// Reasons an example operation stopped early.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Connection to the JEVis server is not alive")]
    NotAlive,

    #[error("Requested JEVis class does not exist: {0}")]
    ClassNotFound(String),

    #[error("Could not find the object with the id: {0}")]
    ObjectNotFound(i64),

    #[error("Could not find the attribute '{attribute}' on object {object_id}")]
    AttributeNotFound { object_id: i64, attribute: String },

    #[error("Cannot create object because the parent {0} is not accessible")]
    ParentNotAccessible(i64),

    #[error("Class '{class}' is not allowed under object {parent_id}")]
    ChildNotAllowed { parent_id: i64, class: String },

    #[error(transparent)]
    Remote(#[from] JevisError),
}

impl OperationError {
    fn event(&self, operation: &'static str) -> Event {
        match self {
            OperationError::NotAlive => Event::NotAlive { operation },
            OperationError::ClassNotFound(class) => Event::ClassNotFound {
                class: class.clone(),
            },
            OperationError::ObjectNotFound(id) => Event::ObjectNotFound { id: *id },
            OperationError::AttributeNotFound {
                object_id,
                attribute,
            } => Event::AttributeNotFound {
                object_id: *object_id,
                attribute: attribute.clone(),
            },
            OperationError::ParentNotAccessible(id) => Event::ParentNotAccessible { id: *id },
            OperationError::ChildNotAllowed { parent_id, class } => Event::ChildNotAllowed {
                parent_id: *parent_id,
                class: class.clone(),
            },
            OperationError::Remote(e) => Event::RemoteFailure {
                operation,
                error: e.to_string(),
            },
        }
    }
}

/// Everything printed about a class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDescription {
    pub class: JevisClass,
    pub valid_parents: Vec<JevisClass>,
    pub types: Vec<JevisType>,
}

/// How many operations of a run finished without error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record<T>(&mut self, result: &Result<T, OperationError>) {
        if result.is_ok() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Runs the example operations against one session.
///
/// Every operation probes the connection first and stops at the first
/// failed lookup. Failures are reported as error events and returned; they
/// never end the process.
pub struct ExampleRunner {
    session: Session,
    reporter: Arc<dyn Reporter>,
    stores: Arc<dyn FileStores>,
}

impl ExampleRunner {
    pub fn new(session: Session, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            session,
            reporter,
            stores: Arc::new(SystemStores),
        }
    }

    /// Use a different source of filesystem capacity for measurements.
    pub fn with_stores(mut self, stores: Arc<dyn FileStores>) -> Self {
        self.stores = stores;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Announce the established session once.
    pub fn report_connected(&self) {
        self.reporter.report(Event::Connected {
            user: self.session.user().to_string(),
        });
    }

    /// Run the four examples in order, continuing past failures.
    pub async fn run_all(&self, examples: &ExamplesConfig) -> RunSummary {
        let mut summary = RunSummary::default();

        summary.record(&self.list_objects_by_class(&examples.list_class).await);
        summary.record(&self.describe_class(&examples.describe_class).await);
        summary.record(
            &self
                .write_measurement(
                    examples.measurement.object_id,
                    &examples.measurement.attribute,
                    &examples.measurement.note,
                )
                .await,
        );
        summary.record(
            &self
                .create_object(
                    examples.create.parent_id,
                    &examples.create.class,
                    &examples.create.name,
                )
                .await,
        );

        debug!(?summary, "Finished example run");
        summary
    }

    /// Report every visible object of a class (and its subclasses) together
    /// with the latest sample of each of its attributes.
    #[instrument(skip(self))]
    pub async fn list_objects_by_class(
        &self,
        class_name: &str,
    ) -> Result<Vec<JevisObject>, OperationError> {
        let result = self.try_list_objects(class_name).await;
        self.finish(LIST_OBJECTS, result)
    }

    async fn try_list_objects(&self, class_name: &str) -> Result<Vec<JevisObject>, OperationError> {
        self.ensure_alive().await?;
        let source = self.session.source();

        let class = source
            .class(class_name)
            .await?
            .ok_or_else(|| OperationError::ClassNotFound(class_name.to_string()))?;

        let objects = source.objects_of_class(&class, true).await?;
        for object in &objects {
            self.reporter.report(Event::Object {
                id: object.id,
                name: object.name.clone(),
            });

            for attribute in source.attributes(object).await? {
                let latest = source.latest_sample(&attribute).await?;
                self.reporter.report(Event::AttributeValue {
                    object_id: object.id,
                    attribute: attribute.name.clone(),
                    timestamp: latest.as_ref().map(|s| s.timestamp),
                    value: latest.map(|s| s.value),
                });
            }
        }

        Ok(objects)
    }

    /// Report the name, unique flag, valid parents and attribute types of a class.
    #[instrument(skip(self))]
    pub async fn describe_class(&self, class_name: &str) -> Result<ClassDescription, OperationError> {
        let result = self.try_describe_class(class_name).await;
        self.finish(DESCRIBE_CLASS, result)
    }

    async fn try_describe_class(&self, class_name: &str) -> Result<ClassDescription, OperationError> {
        self.ensure_alive().await?;
        let source = self.session.source();

        let class = source
            .class(class_name)
            .await?
            .ok_or_else(|| OperationError::ClassNotFound(class_name.to_string()))?;

        self.reporter.report(Event::ClassName {
            name: class.name.clone(),
        });
        self.reporter.report(Event::ClassUnique {
            unique: class.unique,
        });

        let valid_parents = source.valid_parents(&class).await?;
        self.reporter.report(Event::ValidParentsHeader);
        for parent in &valid_parents {
            self.reporter.report(Event::ValidParent {
                name: parent.name.clone(),
            });
        }

        let types = source.types(&class).await?;
        self.reporter.report(Event::TypesHeader);
        for declared in &types {
            self.reporter.report(Event::TypeInfo {
                name: declared.name.clone(),
                primitive_type: declared.primitive_type,
                description: declared.description.clone(),
                unit: declared.unit.clone(),
            });
        }

        Ok(ClassDescription {
            class,
            valid_parents,
            types,
        })
    }

    /// Write the local filesystem capacity as a new sample of an attribute.
    #[instrument(skip(self, note))]
    pub async fn write_measurement(
        &self,
        object_id: i64,
        attribute_name: &str,
        note: &str,
    ) -> Result<Sample, OperationError> {
        let result = self.try_write_measurement(object_id, attribute_name, note).await;
        self.finish(WRITE_MEASUREMENT, result)
    }

    async fn try_write_measurement(
        &self,
        object_id: i64,
        attribute_name: &str,
        note: &str,
    ) -> Result<Sample, OperationError> {
        self.ensure_alive().await?;
        let source = self.session.source();

        let object = source
            .object(object_id)
            .await?
            .ok_or(OperationError::ObjectNotFound(object_id))?;
        self.reporter.report(Event::ObjectResolved {
            id: object.id,
            name: object.name.clone(),
        });

        let attribute = source.attribute(&object, attribute_name).await?.ok_or_else(|| {
            OperationError::AttributeNotFound {
                object_id,
                attribute: attribute_name.to_string(),
            }
        })?;
        self.reporter.report(Event::AttributeResolved {
            object_id,
            attribute: attribute.name.clone(),
        });

        let total = disk::total_capacity(self.stores.as_ref(), self.reporter.as_ref());
        let draft = attribute.build_sample(Utc::now(), total, note);
        source.commit_sample(&draft).await?;

        self.reporter.report(Event::SampleCommitted {
            object_id,
            attribute: attribute.name.clone(),
            timestamp: draft.sample.timestamp,
            value: draft.sample.value.clone(),
        });

        Ok(draft.sample)
    }

    /// Create a new object of `class_name` under an existing parent object.
    ///
    /// Returns `Ok(None)` without reporting anything when the class does not
    /// exist.
    #[instrument(skip(self))]
    pub async fn create_object(
        &self,
        parent_id: i64,
        class_name: &str,
        name: &str,
    ) -> Result<Option<JevisObject>, OperationError> {
        let result = self.try_create_object(parent_id, class_name, name).await;
        self.finish(CREATE_OBJECT, result)
    }

    async fn try_create_object(
        &self,
        parent_id: i64,
        class_name: &str,
        name: &str,
    ) -> Result<Option<JevisObject>, OperationError> {
        self.ensure_alive().await?;
        let source = self.session.source();

        let parent = source
            .object(parent_id)
            .await?
            .ok_or(OperationError::ParentNotAccessible(parent_id))?;

        let Some(class) = source.class(class_name).await? else {
            return Ok(None);
        };

        if !source.is_allowed_under(&class, &parent).await? {
            return Err(OperationError::ChildNotAllowed {
                parent_id,
                class: class.name,
            });
        }

        let created = source.commit_object(&parent.build_object(name, &class)).await?;
        self.reporter.report(Event::ObjectCreated {
            id: created.id,
            name: created.name.clone(),
        });

        Ok(Some(created))
    }

    async fn ensure_alive(&self) -> Result<(), OperationError> {
        if self.session.is_alive().await {
            Ok(())
        } else {
            Err(OperationError::NotAlive)
        }
    }

    fn finish<T>(
        &self,
        operation: &'static str,
        result: Result<T, OperationError>,
    ) -> Result<T, OperationError> {
        if let Err(e) = &result {
            self.reporter.report(e.event(operation));
        }
        result
    }
}
