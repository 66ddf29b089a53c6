//! Database driver abstraction.
//!
//! The pool keeper never talks to a database directly. It drives three
//! capabilities supplied by a driver:
//! - [`Driver`] creates a pool from resolved credentials
//! - [`DriverPool`] hands out connections and shuts down
//! - [`DriverConnection`] runs statements and goes back to its pool
//!
//! `mysql` implements them on top of sqlx.

pub mod mysql;

use crate::error::PoolError;
use crate::models::{Credentials, QueryParam};
use std::future::Future;

pub use mysql::MySqlDriver;

/// Creates pools.
pub trait Driver: Send + Sync + 'static {
    type Pool: DriverPool;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build a pool for `credentials`. Must not block on I/O; connections are
    /// expected to be opened lazily on first acquisition.
    fn create_pool(&self, credentials: &Credentials) -> Result<Self::Pool, Self::Error>;
}

/// A pool of reusable connections.
pub trait DriverPool: Send + Sync + 'static {
    type Connection: DriverConnection;
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_connection(&self)
    -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Close the pool and every idle connection.
    fn end(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// A closed pool can no longer hand out connections.
    fn is_closed(&self) -> bool;
}

/// One connection borrowed from a [`DriverPool`].
pub trait DriverConnection: Send + 'static {
    /// The driver's native result shape.
    type Output: Send;
    type Error: std::error::Error + Into<PoolError> + Send + Sync + 'static;

    fn query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Return the connection to the pool it came from.
    fn release(self);

    /// Whether the connection can run statements at all.
    fn supports_query(&self) -> bool {
        true
    }
}

/// Connection type produced by a driver's pool.
pub type DriverConn<D> = <<D as Driver>::Pool as DriverPool>::Connection;
