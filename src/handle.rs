//! Caller-facing connection handles.

use crate::driver::DriverConnection;
use crate::error::{PoolError, PoolResult};
use crate::models::QueryParam;
use tracing::warn;
use uuid::Uuid;

/// One connection borrowed from the pool.
///
/// The handle owns its connection until [`ConnectionHandle::release`] (or
/// `PoolKeeper::release`) hands it back. Dropping an unreleased handle falls
/// back to the driver's own drop behaviour and logs a warning.
pub struct ConnectionHandle<C: DriverConnection> {
    conn: Option<C>,
    manager_id: Uuid,
    generation: u64,
}

impl<C: DriverConnection> ConnectionHandle<C> {
    /// Wrap a raw connection. Connections that cannot run statements are
    /// returned to the pool and rejected.
    pub(crate) fn wrap(raw: C, manager_id: Uuid, generation: u64) -> PoolResult<Self> {
        if !raw.supports_query() {
            raw.release();
            return Err(PoolError::InvalidConnection);
        }
        Ok(Self {
            conn: Some(raw),
            manager_id,
            generation,
        })
    }

    /// Run `statement` with `params` on the underlying connection and return
    /// the driver's result untouched.
    pub async fn query(&mut self, statement: &str, params: &[QueryParam]) -> PoolResult<C::Output> {
        let conn = self.conn.as_mut().ok_or(PoolError::InvalidConnectionHandle)?;
        conn.query(statement, params).await.map_err(Into::into)
    }

    /// Hand the connection back to its pool.
    pub fn release(mut self) -> PoolResult<()> {
        let conn = self.conn.take().ok_or(PoolError::UnknownConnectionHandle)?;
        conn.release();
        Ok(())
    }

    /// Id of the keeper that issued this handle.
    pub fn manager_id(&self) -> Uuid {
        self.manager_id
    }

    /// Pool generation the connection was borrowed from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<C: DriverConnection> std::fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("manager_id", &self.manager_id)
            .field("generation", &self.generation)
            .field("released", &self.conn.is_none())
            .finish()
    }
}

impl<C: DriverConnection> Drop for ConnectionHandle<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.release();
            warn!(
                manager_id = %self.manager_id,
                generation = self.generation,
                "Connection handle dropped without release - consider using explicit release()"
            );
        }
    }
}
