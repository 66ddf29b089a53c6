//! Pool Keeper Library
//!
//! A lazily created, single MySQL connection pool with a small explicit
//! lifecycle: configure credentials (or let them resolve from configuration
//! files), touch to borrow a connection, release it, drain to tear down.

pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod models;
pub mod pool;
pub mod source;
pub mod types;

pub use config::{Config, PoolOptions};
pub use driver::MySqlDriver;
pub use error::{PoolError, PoolResult};
pub use handle::ConnectionHandle;
pub use lifecycle::{Handle, Lifecycle, PoolKeeper, Status};
pub use models::{ConnectOptions, Credentials, QueryParam};
pub use source::{ConfigSource, EmptySource, JsonConfigSource, MapConfigSource};
