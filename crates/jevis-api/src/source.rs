//! Data source trait definitions.

use async_trait::async_trait;

use crate::error::JevisResult;
use crate::model::{
    JevisAttribute, JevisClass, JevisObject, JevisType, ObjectDraft, Sample, SampleDraft,
};

/// Connection to a JEVis system.
///
/// Lookups return `Ok(None)` when the entity does not exist or is not
/// visible to the authenticated user. Every call is a single round trip to
/// the backing store.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Authenticate the application user. Returns `false` on bad credentials.
    async fn authenticate(&self, login: &str, password: &str) -> JevisResult<bool>;

    /// Cheap liveness probe.
    async fn is_alive(&self) -> bool;

    /// Get an object by ID.
    async fn object(&self, id: i64) -> JevisResult<Option<JevisObject>>;

    /// Get a class by name.
    async fn class(&self, name: &str) -> JevisResult<Option<JevisClass>>;

    /// List the visible objects of a class, optionally including subclasses.
    async fn objects_of_class(
        &self,
        class: &JevisClass,
        include_subclasses: bool,
    ) -> JevisResult<Vec<JevisObject>>;

    /// Get an attribute of an object by name.
    async fn attribute(&self, object: &JevisObject, name: &str)
    -> JevisResult<Option<JevisAttribute>>;

    /// List all attributes of an object.
    async fn attributes(&self, object: &JevisObject) -> JevisResult<Vec<JevisAttribute>>;

    /// Latest sample of an attribute, if it has any.
    async fn latest_sample(&self, attribute: &JevisAttribute) -> JevisResult<Option<Sample>>;

    /// Classes under whose objects the given class may be created.
    async fn valid_parents(&self, class: &JevisClass) -> JevisResult<Vec<JevisClass>>;

    /// Attribute types declared by a class.
    async fn types(&self, class: &JevisClass) -> JevisResult<Vec<JevisType>>;

    /// Whether an object of `child` may be created under `parent`.
    ///
    /// Covers both the valid-parent relation and the unique constraint.
    async fn is_allowed_under(&self, child: &JevisClass, parent: &JevisObject) -> JevisResult<bool>;

    /// Persist a sample built with [`JevisAttribute::build_sample`].
    async fn commit_sample(&self, draft: &SampleDraft) -> JevisResult<()>;

    /// Persist an object built with [`JevisObject::build_object`] and return
    /// it with its assigned ID.
    async fn commit_object(&self, draft: &ObjectDraft) -> JevisResult<JevisObject>;
}
