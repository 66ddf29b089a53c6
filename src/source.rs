//! External configuration sources.
//!
//! Credential resolution falls back to a [`ConfigSource`] when nothing was
//! configured explicitly. A source is a lookup of top-level keys, each of
//! which may hold a database block shaped like [`ConnectOptions`].

use crate::error::{PoolError, PoolResult};
use crate::models::ConnectOptions;
use config::{Config, ConfigError, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Prefix of environment variables overriding file configuration, e.g.
/// `POOL_KEEPER_RDB__HOST=db.internal`.
pub const ENV_PREFIX: &str = "POOL_KEEPER";
/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Only nested variables reach the source layer; flat ones such as
/// `POOL_KEEPER_DATABASE` belong to the command line.
fn nested_env_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> config::Map<String, String> {
    let prefix = format!("{ENV_PREFIX}_");
    vars.into_iter()
        .filter(|(name, _)| {
            name.strip_prefix(&prefix)
                .is_some_and(|rest| rest.contains(ENV_SEPARATOR))
        })
        .collect()
}

/// Lookup interface over an external configuration store.
pub trait ConfigSource: Send + Sync {
    /// Whether the key is present at all, even if its value is empty.
    fn has(&self, key: &str) -> bool;

    /// The database block stored under `key`.
    ///
    /// `Ok(None)` when the key is missing or holds no block; an error when the
    /// block exists but cannot be read as connection options.
    fn get(&self, key: &str) -> PoolResult<Option<ConnectOptions>>;
}

/// A source with no keys. Resolution against it always fails with
/// `ConfigurationNotFound`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySource;

impl ConfigSource for EmptySource {
    fn has(&self, _key: &str) -> bool {
        false
    }

    fn get(&self, _key: &str) -> PoolResult<Option<ConnectOptions>> {
        Ok(None)
    }
}

/// In-memory source. A key mapped to `None` is present but empty.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    entries: HashMap<String, Option<ConnectOptions>>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, options: ConnectOptions) -> Self {
        self.entries.insert(key.into(), Some(options));
        self
    }

    pub fn with_empty_entry(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), None);
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &str) -> PoolResult<Option<ConnectOptions>> {
        Ok(self.entries.get(key).cloned().flatten())
    }
}

/// Layered JSON configuration.
///
/// `from_dir` loads `default.json`, then `<environment>.json`, then
/// `POOL_KEEPER_*` environment variables. Later layers are deep-merged over
/// earlier ones, so an environment file may override a single field of a
/// block and keep the rest.
#[derive(Debug, Clone, Default)]
pub struct JsonConfigSource {
    config: Config,
}

impl JsonConfigSource {
    /// Parse a single JSON document.
    pub fn from_json_str(s: &str) -> PoolResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(s, FileFormat::Json))
            .build()
            .map_err(|e| PoolError::config_source(format!("Invalid JSON: {e}")))?;
        Ok(Self { config })
    }

    /// Load a single JSON file, which must exist.
    pub fn from_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Json))
            .build()
            .map_err(|e| PoolError::config_source(format!("{}: {e}", path.display())))?;
        Ok(Self { config })
    }

    /// Load `default.json` and `<environment>.json` from `dir`, then apply
    /// environment variable overrides.
    ///
    /// Missing files are skipped; a directory with neither file yields a
    /// source holding only what the environment provides.
    pub fn from_dir(dir: impl AsRef<Path>, environment: &str) -> PoolResult<Self> {
        Self::layered(dir.as_ref(), environment, std::env::vars())
    }

    /// `from_dir` with the environment layer read from `env_vars` instead of
    /// the process environment.
    pub(crate) fn layered(
        dir: &Path,
        environment: &str,
        env_vars: impl IntoIterator<Item = (String, String)>,
    ) -> PoolResult<Self> {
        let mut builder = Config::builder();
        for name in ["default", environment] {
            let path = dir.join(format!("{name}.json"));
            debug!(path = %path.display(), "Adding configuration file layer");
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .source(Some(nested_env_vars(env_vars))),
            )
            .build()
            .map_err(|e| {
                PoolError::config_source(format!(
                    "Failed to load configuration from {}: {e}",
                    dir.display()
                ))
            })?;
        Ok(Self { config })
    }
}

impl ConfigSource for JsonConfigSource {
    fn has(&self, key: &str) -> bool {
        self.config.get::<config::Value>(key).is_ok()
    }

    fn get(&self, key: &str) -> PoolResult<Option<ConnectOptions>> {
        match self.config.get::<Option<ConnectOptions>>(key) {
            Ok(options) => Ok(options),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(PoolError::config_source(format!(
                "Invalid database block under '{key}': {e}"
            ))),
        }
    }
}
