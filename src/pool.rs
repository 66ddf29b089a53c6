//! Single-pool management.
//!
//! [`PoolManager`] owns at most one driver pool. The pool is created lazily on
//! the first acquisition and reused afterwards.
//!
//! # Invalidation
//!
//! Any failure while using the pool discards it, so the next acquisition
//! rebuilds from scratch:
//! - the pool reports itself closed: `InvalidPool`
//! - the driver fails to hand out a connection: `ConnectionAcquisitionFailed`
//! - the connection cannot run statements: `InvalidConnection`
//! - teardown fails: `TeardownFailed`
//!
//! Pool creation failure records nothing and is not retried.
//!
//! # Concurrency
//!
//! The "is there a pool, otherwise create one" step runs inside one
//! `std::sync::Mutex` critical section, so concurrent first acquisitions share
//! a single pool. The lock is never held across an await point. Each pool gets
//! a generation number; an acquisition failure only discards the pool it
//! borrowed from, never a newer one built in the meantime.

use crate::driver::{Driver, DriverConn, DriverPool};
use crate::error::{PoolError, PoolResult};
use crate::handle::ConnectionHandle;
use crate::models::Credentials;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct PoolSlot<P> {
    pool: Arc<P>,
    generation: u64,
}

struct PoolState<P> {
    current: Option<PoolSlot<P>>,
    /// Bumped on every successful pool creation.
    generation: u64,
}

pub struct PoolManager<D: Driver> {
    id: Uuid,
    driver: D,
    state: Mutex<PoolState<D::Pool>>,
}

impl<D: Driver> PoolManager<D> {
    pub fn new(driver: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            state: Mutex::new(PoolState {
                current: None,
                generation: 0,
            }),
        }
    }

    /// Identifier stamped on every handle this manager issues.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a pool currently exists.
    pub fn has_pool(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Generation of the current pool, or of the last one if none exists.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Borrow a connection, creating the pool from `credentials` if needed.
    pub async fn acquire(
        &self,
        credentials: &Credentials,
    ) -> PoolResult<ConnectionHandle<DriverConn<D>>> {
        let (pool, generation) = self.current_or_create(credentials)?;

        if pool.is_closed() {
            self.discard(generation, "pool reports closed");
            return Err(PoolError::InvalidPool);
        }

        let raw = match pool.get_connection().await {
            Ok(raw) => raw,
            Err(e) => {
                self.discard(generation, "connection acquisition failed");
                return Err(PoolError::acquisition_failed(e.to_string()));
            }
        };

        match ConnectionHandle::wrap(raw, self.id, generation) {
            Ok(handle) => {
                debug!(generation, "Connection acquired");
                Ok(handle)
            }
            Err(e) => {
                self.discard(generation, "connection cannot run statements");
                Err(e)
            }
        }
    }

    /// Shut the pool down. Succeeds immediately when there is no pool.
    ///
    /// The pool reference is gone after this call whatever the outcome.
    pub async fn teardown(&self) -> PoolResult<()> {
        let slot = {
            let mut state = self.lock();
            match state.current.take() {
                Some(slot) => slot,
                None => {
                    debug!("No pool to drain");
                    return Ok(());
                }
            }
        };

        if slot.pool.is_closed() {
            warn!(
                generation = slot.generation,
                "Pool was already closed, discarding"
            );
            return Err(PoolError::InvalidPool);
        }

        match slot.pool.end().await {
            Ok(()) => {
                info!(generation = slot.generation, "Connection pool drained");
                Ok(())
            }
            Err(e) => {
                warn!(generation = slot.generation, error = %e, "Pool teardown failed");
                Err(PoolError::teardown_failed(e.to_string()))
            }
        }
    }

    fn current_or_create(&self, credentials: &Credentials) -> PoolResult<(Arc<D::Pool>, u64)> {
        let mut state = self.lock();
        if let Some(slot) = &state.current {
            return Ok((Arc::clone(&slot.pool), slot.generation));
        }

        let pool = self.driver.create_pool(credentials).map_err(|e| {
            warn!(target_db = %credentials.masked(), error = %e, "Pool creation failed");
            PoolError::pool_creation_failed(e.to_string())
        })?;

        state.generation += 1;
        let generation = state.generation;
        let pool = Arc::new(pool);
        state.current = Some(PoolSlot {
            pool: Arc::clone(&pool),
            generation,
        });

        info!(target_db = %credentials.masked(), generation, "Connection pool created");
        Ok((pool, generation))
    }

    /// Drop the current pool if it is still the one from `generation`.
    fn discard(&self, generation: u64, reason: &str) {
        let mut state = self.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
        {
            state.current = None;
            warn!(generation, reason, "Discarding connection pool");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<D::Pool>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<D: Driver> std::fmt::Debug for PoolManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PoolManager")
            .field("id", &self.id)
            .field("has_pool", &state.current.is_some())
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
