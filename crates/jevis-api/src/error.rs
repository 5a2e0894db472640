//! JEVis client error types.

use thiserror::Error;

/// Result type for JEVis data source operations.
pub type JevisResult<T> = Result<T, JevisError>;

/// Errors that can occur while talking to a JEVis data source.
#[derive(Debug, Error)]
pub enum JevisError {
    /// The backing store could not be reached.
    #[error("Failed to connect to {target}: {message}")]
    Connection { target: String, message: String },

    /// A query was issued before a user was authenticated.
    #[error("No JEVis user is authenticated on this data source")]
    NotAuthenticated,

    /// Query or transaction failure reported by the database.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hash could not be checked.
    #[error("Password verification failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    /// A stored primitive type code is not known to this client.
    #[error("Unknown primitive type code: {0}")]
    UnknownPrimitiveType(i32),

    /// A stored sample value does not parse as the attribute's type.
    #[error("Invalid value '{value}' for attribute {attribute}: {reason}")]
    InvalidValue {
        attribute: String,
        value: String,
        reason: String,
    },

    /// A referenced entity vanished between lookup and write.
    #[error("Not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JevisError::Connection {
            target: "openjevis.org:13306/jevis".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect to openjevis.org:13306/jevis: connection refused"
        );
        assert_eq!(
            JevisError::UnknownPrimitiveType(42).to_string(),
            "Unknown primitive type code: 42"
        );
    }
}
