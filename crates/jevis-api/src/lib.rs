//! JEVis client API.
//!
//! Models the JEVis object tree (classes, objects, attributes, samples) and
//! provides the [`DataSource`] trait with a MySQL implementation and an
//! in-memory one.

pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod model;
pub mod source;
pub mod sql;

pub use error::{JevisError, JevisResult};
pub use memory::{Commit, MemoryDataSource};
pub use model::{
    JevisAttribute, JevisClass, JevisObject, JevisType, ObjectDraft, PrimitiveType, Sample,
    SampleDraft, SampleValue,
};
pub use source::DataSource;
pub use sql::{SqlConnectOptions, SqlDataSource};
