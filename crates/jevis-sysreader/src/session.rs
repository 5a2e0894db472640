//! Authenticated connection to a JEVis system.

use std::sync::Arc;

use jevis_api::{DataSource, JevisError, SqlConnectOptions, SqlDataSource};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ConnectionConfig;

/// Errors that prevent a session from being established.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The database could not be reached.
    #[error("There was an error while connecting to the JEVis server")]
    Connect(#[source] JevisError),

    /// The data source answered but refused the credentials.
    #[error("Connection was not successful: user '{user}' was rejected")]
    Rejected { user: String },

    /// Authentication could not be carried out.
    #[error("Failed to authenticate user '{user}'")]
    Authenticate {
        user: String,
        #[source]
        source: JevisError,
    },
}

/// One authenticated connection, shared by every example operation.
#[derive(Clone)]
pub struct Session {
    source: Arc<dyn DataSource>,
    user: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("user", &self.user).finish()
    }
}

impl Session {
    /// Connect to the JEVis database and authenticate the application user.
    #[instrument(skip(config), fields(host = %config.host, port = config.port, schema = %config.schema))]
    pub async fn open(config: &ConnectionConfig) -> Result<Self, SessionError> {
        let options = SqlConnectOptions {
            host: config.host.clone(),
            port: config.port,
            schema: config.schema.clone(),
            user: config.db_user.clone(),
            password: config.db_password.clone(),
        };

        let source = SqlDataSource::connect(&options)
            .await
            .map_err(SessionError::Connect)?;

        Self::establish(Arc::new(source), &config.app_user, &config.app_password).await
    }

    /// Authenticate the application user on an already connected data source.
    pub async fn establish(
        source: Arc<dyn DataSource>,
        user: &str,
        password: &str,
    ) -> Result<Self, SessionError> {
        let accepted = source
            .authenticate(user, password)
            .await
            .map_err(|source| SessionError::Authenticate {
                user: user.to_string(),
                source,
            })?;

        if !accepted {
            return Err(SessionError::Rejected {
                user: user.to_string(),
            });
        }

        debug!(user = %user, "Authenticated application user");
        Ok(Self {
            source,
            user: user.to_string(),
        })
    }

    /// Cheap liveness probe.
    pub async fn is_alive(&self) -> bool {
        self.source.is_alive().await
    }

    /// The underlying data source.
    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    /// Name of the authenticated application user.
    pub fn user(&self) -> &str {
        &self.user
    }
}
