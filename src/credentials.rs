//! Credential resolution and caching.
//!
//! Explicitly configured credentials always win. Without them the resolver
//! consults the external [`ConfigSource`], probing [`SOURCE_KEYS`] in order,
//! and caches what it finds so later resolutions do not hit the source again.

use crate::error::{PoolError, PoolResult};
use crate::models::{ConnectOptions, Credentials};
use crate::source::ConfigSource;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use zeroize::Zeroize;

/// Recognized top-level keys of a configuration source, highest priority first.
pub const SOURCE_KEYS: [&str; 3] = ["rdb", "database", "mysql"];

/// Holds the credential cache and the fallback source.
pub struct CredentialResolver {
    source: Arc<dyn ConfigSource>,
    /// Uses std::sync::Mutex; never held across an await point.
    cache: Mutex<Option<Credentials>>,
}

impl CredentialResolver {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    /// Validate explicit options and overwrite the cache with them.
    pub fn set(&self, options: &ConnectOptions) -> PoolResult<()> {
        let creds = Credentials::from_explicit(options)?;
        debug!(
            host = %creds.host,
            port = creds.port,
            user = %creds.user,
            database = %creds.database,
            "Explicit credentials cached"
        );
        *self.lock() = Some(creds);
        Ok(())
    }

    /// Return the cached credentials, falling back to the configuration source.
    pub fn resolve(&self) -> PoolResult<Credentials> {
        let mut cache = self.lock();
        if let Some(creds) = cache.as_ref() {
            return Ok(creds.clone());
        }

        let key = SOURCE_KEYS
            .iter()
            .copied()
            .find(|key| self.source.has(key))
            .ok_or_else(|| PoolError::configuration_not_found(&SOURCE_KEYS))?;

        let options = self
            .source
            .get(key)?
            .ok_or_else(|| PoolError::missing_database_config(key))?;
        let creds = Credentials::from_source(&options)?;

        debug!(
            source_key = key,
            host = %creds.host,
            port = creds.port,
            user = %creds.user,
            database = %creds.database,
            has_password = creds.password.is_some(),
            "Credentials resolved from configuration source"
        );

        *cache = Some(creds.clone());
        Ok(creds)
    }

    /// Scrub and drop the cached credentials.
    pub fn clear(&self) {
        let mut cache = self.lock();
        if let Some(creds) = cache.as_mut() {
            creds.zeroize();
            debug!("Cached credentials scrubbed");
        }
        *cache = None;
    }

    /// A copy of the cached credentials, if any.
    pub fn cached(&self) -> Option<Credentials> {
        self.lock().clone()
    }

    pub fn is_cached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credentials>> {
        // A poisoned cache still holds a consistent Option.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("cached", &self.is_cached())
            .finish_non_exhaustive()
    }
}
