//! Configuration loading.
//!
//! The config file is TOML; every key can be overridden through environment
//! variables prefixed with `JEVIS_SYSREADER__`, e.g.
//! `JEVIS_SYSREADER__CONNECTION__HOST=localhost`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "jevis-sysreader";

const REDACTED: &str = "********";

/// Prefix of environment variables overriding config keys.
const ENV_PREFIX: &str = "JEVIS_SYSREADER";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub connection: ConnectionConfig,
    pub examples: ExamplesConfig,
}

impl AppConfig {
    /// Copy of this config with all passwords masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.connection.db_password = REDACTED.to_string();
        copy.connection.app_password = REDACTED.to_string();
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Where the JEVis database lives and who to log in as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Address of the MySQL server
    pub host: String,
    /// Port of the MySQL server
    pub port: u16,
    /// Database schema of the JEVis database
    pub schema: String,
    /// MySQL user for the connection
    pub db_user: String,
    /// MySQL password for the connection
    pub db_password: String,
    /// Name of the JEVis user
    pub app_user: String,
    /// Password of the JEVis user
    pub app_password: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "openjevis.org".to_string(),
            port: 13306,
            schema: "jevis".to_string(),
            db_user: "jevis".to_string(),
            db_password: "jevistest".to_string(),
            app_user: "myUser".to_string(),
            app_password: "myPW".to_string(),
        }
    }
}

/// Arguments of the four example operations run by `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamplesConfig {
    /// Class whose objects are listed
    pub list_class: String,
    /// Class whose metadata is printed
    pub describe_class: String,
    pub measurement: MeasurementConfig,
    pub create: CreateObjectConfig,
}

impl Default for ExamplesConfig {
    fn default() -> Self {
        Self {
            list_class: "Data".to_string(),
            describe_class: "Email Plugin".to_string(),
            measurement: MeasurementConfig::default(),
            create: CreateObjectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub object_id: i64,
    pub attribute: String,
    /// Note attached to every written sample
    pub note: String,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            object_id: 1588,
            attribute: "Value".to_string(),
            note: "This is an note, imported via SysReader".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateObjectConfig {
    pub parent_id: i64,
    pub class: String,
    pub name: String,
}

impl Default for CreateObjectConfig {
    fn default() -> Self {
        Self {
            parent_id: 1587,
            class: "Data".to_string(),
            name: "My new Data Object".to_string(),
        }
    }
}

/// Resolve the config file path from an optional `--config` override.
pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let config_file = match override_path {
        Some(path) => {
            let expanded = expand(&path.to_string_lossy())?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if config_file.parent().is_none() {
        return Err(anyhow!("invalid config file path: {config_file:?}"));
    }

    Ok(config_file)
}

/// Load the configuration, writing a default file first if none exists.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        write_default_config(path)?;
    }
    load_config(path)
}

/// Load the configuration from `path` (if present) and the environment.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let defaults = ConnectionConfig::default();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("connection.host", defaults.host)?
        .set_default("connection.port", i64::from(defaults.port))?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
        .build()
        .with_context(|| format!("reading config file {}", path.display()))?;

    let mut config: AppConfig = built
        .try_deserialize()
        .context("parsing configuration")?;

    if let Some(ref file) = config.logging.file {
        let expanded = expand(file)?;
        config.logging.file = Some(expanded.display().to_string());
    }

    Ok(config)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let body = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let header = format!(
        "# {APP_NAME} configuration ({})\n\
         # Any key can be overridden with {ENV_PREFIX}__<SECTION>__<KEY>.\n\n",
        path.display()
    );
    fs::write(path, header + &body)
        .with_context(|| format!("writing config file to {}", path.display()))
}

/// Expand `~` and environment variables in a user-supplied path.
fn expand(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).with_context(|| format!("expanding path {text}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_names_env_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("JEVIS_SYSREADER__<SECTION>__<KEY>"));
        assert_eq!(load_config(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_init_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, AppConfig::default());

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# jevis-sysreader configuration"));
        assert!(body.contains("[connection]"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[connection]
host = "localhost"
port = 3306

[examples]
list_class = "Clean Data"

[examples.create]
parent_id = 42
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 3306);
        assert_eq!(config.connection.schema, "jevis");
        assert_eq!(config.examples.list_class, "Clean Data");
        assert_eq!(config.examples.create.parent_id, 42);
        assert_eq!(config.examples.create.class, "Data");
        assert_eq!(config.examples.measurement.object_id, 1588);
    }

    #[test]
    fn test_redacted_masks_passwords() {
        let shown = AppConfig::default().redacted();
        assert_eq!(shown.connection.db_password, REDACTED);
        assert_eq!(shown.connection.app_password, REDACTED);
        assert_eq!(shown.connection.db_user, "jevis");
    }

    #[test]
    fn test_resolve_config_path_accepts_directory() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_config_path(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(resolved, dir.path().join("config.toml"));
    }
}
