//! Data models for the pool keeper.

pub mod connection;
pub mod query;

pub use connection::{ConnectOptions, Credentials, DEFAULT_HOST, DEFAULT_PORT};
pub use query::QueryParam;
