//! The public lifecycle: configure, touch, release, drain.
//!
//! [`PoolKeeper`] composes the credential resolver and the pool manager. Build
//! one per process and share it by reference (or behind an `Arc`); every
//! operation takes `&self`.
//!
//! # States
//!
//! ```text
//! Unconfigured --set_config / resolve--> Configured --touch--> Pooled
//!       \                                    ^                   |
//!        `-------------- drain -------> Drained <---- drain -----'
//! ```
//!
//! A failed acquisition drops out of `Pooled` back to `Configured`, because
//! the pool was discarded but the credentials are still cached.
//!
//! # Drain vs. touch
//!
//! `touch` holds a shared gate for the whole resolve-and-acquire; `drain`
//! takes it exclusively. A drain therefore waits for in-flight acquisitions to
//! settle, and touches issued after a queued drain wait for it to finish and
//! then build a fresh pool.

use crate::config::PoolOptions;
use crate::credentials::CredentialResolver;
use crate::driver::{Driver, DriverConn, MySqlDriver};
use crate::error::{PoolError, PoolResult};
use crate::handle::ConnectionHandle;
use crate::models::{ConnectOptions, Credentials};
use crate::pool::PoolManager;
use crate::source::ConfigSource;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Unconfigured,
    Configured,
    Pooled,
    Drained,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::Configured => write!(f, "configured"),
            Self::Pooled => write!(f, "pooled"),
            Self::Drained => write!(f, "drained"),
        }
    }
}

/// Success confirmations of the lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    OptionsSet,
    Released,
    Drained,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OptionsSet => write!(f, "Options set successfully"),
            Self::Released => write!(f, "Connection released"),
            Self::Drained => write!(f, "Drained"),
        }
    }
}

/// Handle type issued by a keeper over driver `D`.
pub type Handle<D> = ConnectionHandle<DriverConn<D>>;

pub struct PoolKeeper<D: Driver> {
    resolver: CredentialResolver,
    pools: PoolManager<D>,
    lifecycle: Mutex<Lifecycle>,
    gate: RwLock<()>,
}

impl PoolKeeper<MySqlDriver> {
    /// Keeper over sqlx MySQL pools.
    pub fn mysql(pool_options: PoolOptions, source: Arc<dyn ConfigSource>) -> Self {
        Self::new(MySqlDriver::new(pool_options), source)
    }
}

impl<D: Driver> PoolKeeper<D> {
    pub fn new(driver: D, source: Arc<dyn ConfigSource>) -> Self {
        Self {
            resolver: CredentialResolver::new(source),
            pools: PoolManager::new(driver),
            lifecycle: Mutex::new(Lifecycle::default()),
            gate: RwLock::new(()),
        }
    }

    /// Store explicit credentials, replacing any cached ones.
    ///
    /// While a pool exists it stays in use; the new credentials take effect
    /// once it has been drained.
    pub fn set_config(&self, options: Option<ConnectOptions>) -> PoolResult<Status> {
        let options = options.ok_or(PoolError::MissingOptions)?;
        self.resolver.set(&options)?;

        let mut lifecycle = self.lock_lifecycle();
        if !(*lifecycle == Lifecycle::Pooled && self.pools.has_pool()) {
            *lifecycle = Lifecycle::Configured;
        }
        Ok(Status::OptionsSet)
    }

    /// Resolve credentials and borrow a connection, creating the pool on
    /// first use.
    ///
    /// A failed acquisition discards the pool, so a keeper that was `Pooled`
    /// is left `Configured`.
    pub async fn touch(&self) -> PoolResult<Handle<D>> {
        let _gate = self.gate.read().await;

        let credentials = Zeroizing::new(self.resolver.resolve()?);
        {
            let mut lifecycle = self.lock_lifecycle();
            if matches!(*lifecycle, Lifecycle::Unconfigured | Lifecycle::Drained) {
                *lifecycle = Lifecycle::Configured;
            }
        }

        match self.pools.acquire(&credentials).await {
            Ok(handle) => {
                *self.lock_lifecycle() = Lifecycle::Pooled;
                Ok(handle)
            }
            Err(e) => {
                debug!(error = %e, "touch failed");
                let mut lifecycle = self.lock_lifecycle();
                if !self.pools.has_pool() {
                    *lifecycle = Lifecycle::Configured;
                }
                Err(e)
            }
        }
    }

    /// Return a handle to the pool.
    ///
    /// Works in every state, including after a drain. Handles issued by a
    /// different keeper are rejected (and dropped, which returns them to their
    /// own pool).
    pub fn release(&self, handle: Option<Handle<D>>) -> PoolResult<Status> {
        let handle = handle.ok_or(PoolError::InvalidConnectionHandle)?;
        if handle.manager_id() != self.pools.id() {
            debug!(
                handle_manager = %handle.manager_id(),
                keeper = %self.pools.id(),
                "Rejecting handle issued by another keeper"
            );
            return Err(PoolError::UnknownConnectionHandle);
        }
        handle.release()?;
        Ok(Status::Released)
    }

    /// Tear the pool down, scrubbing cached credentials first when
    /// `clear_credentials` is set.
    pub async fn drain(&self, clear_credentials: bool) -> PoolResult<Status> {
        let _gate = self.gate.write().await;

        if clear_credentials {
            self.resolver.clear();
        }
        let result = self.pools.teardown().await;
        *self.lock_lifecycle() = Lifecycle::Drained;

        info!(clear_credentials, ok = result.is_ok(), "Drain complete");
        result.map(|()| Status::Drained)
    }

    /// `drain(true)`: tear down and forget credentials.
    pub async fn close(&self) -> PoolResult<Status> {
        self.drain(true).await
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lock_lifecycle()
    }

    /// Copy of the cached credentials, for inspection.
    pub fn cached_credentials(&self) -> Option<Credentials> {
        self.resolver.cached()
    }

    pub fn has_pool(&self) -> bool {
        self.pools.has_pool()
    }

    /// Identifier stamped on the handles this keeper issues.
    pub fn id(&self) -> Uuid {
        self.pools.id()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<D: Driver> std::fmt::Debug for PoolKeeper<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolKeeper")
            .field("lifecycle", &self.lifecycle())
            .field("pools", &self.pools)
            .field("resolver", &self.resolver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::source::{EmptySource, MapConfigSource};

    fn keeper() -> PoolKeeper<FakeDriver> {
        PoolKeeper::new(FakeDriver::default(), Arc::new(EmptySource))
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(Status::OptionsSet.to_string(), "Options set successfully");
        assert_eq!(Status::Released.to_string(), "Connection released");
        assert_eq!(Status::Drained.to_string(), "Drained");
    }

    #[test]
    fn test_set_config_validation() {
        let keeper = keeper();
        assert_eq!(keeper.set_config(None), Err(PoolError::MissingOptions));
        assert_eq!(
            keeper.set_config(Some(ConnectOptions::default())),
            Err(PoolError::MissingUser)
        );
        assert_eq!(keeper.lifecycle(), Lifecycle::Unconfigured);

        assert_eq!(
            keeper.set_config(Some(ConnectOptions::for_user("u"))),
            Ok(Status::OptionsSet)
        );
        assert_eq!(keeper.lifecycle(), Lifecycle::Configured);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let keeper = keeper();
        keeper.set_config(Some(ConnectOptions::for_user("u"))).unwrap();

        let handle = keeper.touch().await.unwrap();
        assert_eq!(keeper.lifecycle(), Lifecycle::Pooled);
        assert_eq!(keeper.release(Some(handle)), Ok(Status::Released));
        assert_eq!(keeper.lifecycle(), Lifecycle::Pooled);

        assert_eq!(keeper.drain(false).await, Ok(Status::Drained));
        assert_eq!(keeper.lifecycle(), Lifecycle::Drained);
        assert!(!keeper.has_pool());
    }

    #[tokio::test]
    async fn test_resolution_failure_keeps_state() {
        let keeper = keeper();
        let err = keeper.touch().await.unwrap_err();
        assert!(matches!(err, PoolError::ConfigurationNotFound { .. }));
        assert_eq!(keeper.lifecycle(), Lifecycle::Unconfigured);
    }

    #[tokio::test]
    async fn test_resolution_from_source_moves_to_configured() {
        let driver = FakeDriver::default();
        driver
            .script
            .fail_create
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let source = MapConfigSource::new().with_entry("rdb", ConnectOptions::for_user("u"));
        let keeper = PoolKeeper::new(driver, Arc::new(source));

        let err = keeper.touch().await.unwrap_err();
        assert!(matches!(err, PoolError::PoolCreationFailed { .. }));
        assert_eq!(keeper.lifecycle(), Lifecycle::Configured);
        assert!(keeper.cached_credentials().is_some());
    }

    #[tokio::test]
    async fn test_release_rejects_absent_and_foreign_handles() {
        let keeper = keeper();
        let other = self::keeper();
        other.set_config(Some(ConnectOptions::for_user("u"))).unwrap();
        let foreign = other.touch().await.unwrap();

        assert_eq!(keeper.release(None), Err(PoolError::InvalidConnectionHandle));
        assert_eq!(
            keeper.release(Some(foreign)),
            Err(PoolError::UnknownConnectionHandle)
        );
    }

    #[tokio::test]
    async fn test_drain_with_clear_scrubs_cache() {
        let keeper = keeper();
        keeper.set_config(Some(ConnectOptions::for_user("u"))).unwrap();
        keeper.close().await.unwrap();
        assert!(keeper.cached_credentials().is_none());
        assert_eq!(keeper.lifecycle(), Lifecycle::Drained);
    }
}
