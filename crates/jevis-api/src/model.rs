//! JEVis data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JevisError, JevisResult};

/// Kind of value an attribute type expects.
///
/// The numeric codes are the ones stored in the `type.primitivetype` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    String,
    Double,
    Long,
    File,
    Boolean,
    Selection,
    MultiSelection,
    Password,
}

impl PrimitiveType {
    /// Stored code of this primitive type.
    pub fn code(self) -> i32 {
        match self {
            PrimitiveType::String => 0,
            PrimitiveType::Double => 1,
            PrimitiveType::Long => 2,
            PrimitiveType::File => 3,
            PrimitiveType::Boolean => 4,
            PrimitiveType::Selection => 5,
            PrimitiveType::MultiSelection => 6,
            PrimitiveType::Password => 7,
        }
    }
}

impl TryFrom<i32> for PrimitiveType {
    type Error = JevisError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PrimitiveType::String),
            1 => Ok(PrimitiveType::Double),
            2 => Ok(PrimitiveType::Long),
            3 => Ok(PrimitiveType::File),
            4 => Ok(PrimitiveType::Boolean),
            5 => Ok(PrimitiveType::Selection),
            6 => Ok(PrimitiveType::MultiSelection),
            7 => Ok(PrimitiveType::Password),
            other => Err(JevisError::UnknownPrimitiveType(other)),
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveType::String => write!(f, "String"),
            PrimitiveType::Double => write!(f, "Double"),
            PrimitiveType::Long => write!(f, "Long"),
            PrimitiveType::File => write!(f, "File"),
            PrimitiveType::Boolean => write!(f, "Boolean"),
            PrimitiveType::Selection => write!(f, "Selection"),
            PrimitiveType::MultiSelection => write!(f, "MultiSelection"),
            PrimitiveType::Password => write!(f, "Password"),
        }
    }
}

/// A JEVis class: the schema an object is an instance of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JevisClass {
    /// Unique class name (e.g. "Data").
    pub name: String,
    pub description: String,
    /// At most one object of a unique class may exist under the same parent.
    pub unique: bool,
    /// Name of the class this one inherits from.
    pub inherits: Option<String>,
}

impl JevisClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unique: false,
            inherits: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn inheriting(mut self, parent: impl Into<String>) -> Self {
        self.inherits = Some(parent.into());
        self
    }
}

/// Declared attribute type of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JevisType {
    pub name: String,
    pub primitive_type: PrimitiveType,
    pub description: String,
    /// Unit the stored values are expected in, if any.
    pub unit: Option<String>,
}

/// A node in the remote object tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JevisObject {
    pub id: i64,
    pub name: String,
    /// Name of the class this object is an instance of.
    pub class_name: String,
}

impl JevisObject {
    /// Prepare a new child object locally. Nothing is written until the
    /// draft is passed to [`crate::DataSource::commit_object`].
    pub fn build_object(&self, name: impl Into<String>, class: &JevisClass) -> ObjectDraft {
        ObjectDraft {
            parent_id: self.id,
            name: name.into(),
            class_name: class.name.clone(),
        }
    }
}

impl std::fmt::Display for JevisObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.class_name)
    }
}

/// An object that has been built locally but not committed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDraft {
    pub parent_id: i64,
    pub name: String,
    pub class_name: String,
}

/// Named data channel on an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JevisAttribute {
    pub object_id: i64,
    pub name: String,
    pub primitive_type: PrimitiveType,
    pub unit: Option<String>,
}

impl JevisAttribute {
    /// Prepare a sample for this attribute locally. Nothing is written until
    /// the draft is passed to [`crate::DataSource::commit_sample`].
    pub fn build_sample(
        &self,
        timestamp: DateTime<Utc>,
        value: impl Into<SampleValue>,
        note: impl Into<String>,
    ) -> SampleDraft {
        SampleDraft {
            object_id: self.object_id,
            attribute: self.name.clone(),
            primitive_type: self.primitive_type,
            sample: Sample {
                timestamp,
                value: value.into(),
                note: Some(note.into()),
            },
        }
    }
}

impl std::fmt::Display for JevisAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.object_id, self.name, self.primitive_type)
    }
}

/// Value carried by a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Long(i64),
    Double(f64),
    Boolean(bool),
    Text(String),
}

impl SampleValue {
    /// Parse the stored textual form according to the attribute's type.
    pub fn parse(raw: &str, primitive_type: PrimitiveType, attribute: &str) -> JevisResult<Self> {
        let invalid = |reason: String| JevisError::InvalidValue {
            attribute: attribute.to_string(),
            value: raw.to_string(),
            reason,
        };

        match primitive_type {
            PrimitiveType::Long => raw
                .trim()
                .parse::<i64>()
                .map(SampleValue::Long)
                .map_err(|e| invalid(e.to_string())),
            PrimitiveType::Double => raw
                .trim()
                .parse::<f64>()
                .map(SampleValue::Double)
                .map_err(|e| invalid(e.to_string())),
            PrimitiveType::Boolean => match raw.trim() {
                "1" | "true" => Ok(SampleValue::Boolean(true)),
                "0" | "false" => Ok(SampleValue::Boolean(false)),
                other => Err(invalid(format!("'{other}' is not a boolean"))),
            },
            _ => Ok(SampleValue::Text(raw.to_string())),
        }
    }

    /// Whether this value matches what an attribute of `primitive_type` expects.
    pub fn fits(&self, primitive_type: PrimitiveType) -> bool {
        match self {
            SampleValue::Long(_) => {
                matches!(primitive_type, PrimitiveType::Long | PrimitiveType::Double)
            }
            SampleValue::Double(_) => primitive_type == PrimitiveType::Double,
            SampleValue::Boolean(_) => primitive_type == PrimitiveType::Boolean,
            SampleValue::Text(_) => matches!(
                primitive_type,
                PrimitiveType::String
                    | PrimitiveType::File
                    | PrimitiveType::Selection
                    | PrimitiveType::MultiSelection
                    | PrimitiveType::Password
            ),
        }
    }
}

impl std::fmt::Display for SampleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleValue::Long(v) => write!(f, "{v}"),
            SampleValue::Double(v) => write!(f, "{v}"),
            SampleValue::Boolean(v) => write!(f, "{v}"),
            SampleValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(value: i64) -> Self {
        SampleValue::Long(value)
    }
}

impl From<u64> for SampleValue {
    fn from(value: u64) -> Self {
        SampleValue::Long(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        SampleValue::Double(value)
    }
}

impl From<bool> for SampleValue {
    fn from(value: bool) -> Self {
        SampleValue::Boolean(value)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        SampleValue::Text(value.to_string())
    }
}

impl From<String> for SampleValue {
    fn from(value: String) -> Self {
        SampleValue::Text(value)
    }
}

/// One timestamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
    pub note: Option<String>,
}

/// A sample that has been built locally but not committed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDraft {
    pub object_id: i64,
    pub attribute: String,
    pub primitive_type: PrimitiveType,
    pub sample: Sample,
}
