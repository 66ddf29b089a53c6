//! MySQL driver backed by sqlx.
//!
//! Pools are created with `connect_lazy_with`, so building one never touches
//! the network; the first acquisition opens the first connection.

use super::{Driver, DriverConnection, DriverPool};
use crate::config::PoolOptions;
use crate::models::{Credentials, QueryParam};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};
use std::time::Duration;
use tracing::debug;

/// Driver producing sqlx MySQL pools.
#[derive(Debug, Clone, Default)]
pub struct MySqlDriver {
    pool_options: PoolOptions,
}

impl MySqlDriver {
    pub fn new(pool_options: PoolOptions) -> Self {
        Self { pool_options }
    }

    /// Translate resolved credentials into sqlx connect options.
    ///
    /// An absent password is left unset and an empty database selects none.
    pub fn connect_options(credentials: &Credentials) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.user)
            .charset("utf8mb4");

        if let Some(password) = &credentials.password {
            options = options.password(password);
        }
        if !credentials.database.is_empty() {
            options = options.database(&credentials.database);
        }
        options
    }
}

impl Driver for MySqlDriver {
    type Pool = MySqlPool;
    type Error = sqlx::Error;

    fn create_pool(&self, credentials: &Credentials) -> Result<MySqlPool, sqlx::Error> {
        let pool_opts = &self.pool_options;
        pool_opts.validate().map_err(|e| sqlx::Error::Configuration(e.into()))?;

        debug!(
            host = %credentials.host,
            port = credentials.port,
            max_connections = pool_opts.max_connections_or_default(),
            "Creating lazy MySQL pool"
        );

        let pool = MySqlPoolOptions::new()
            .min_connections(pool_opts.min_connections_or_default())
            .max_connections(pool_opts.max_connections_or_default())
            .idle_timeout(Some(Duration::from_secs(
                pool_opts.idle_timeout_or_default(),
            )))
            .test_before_acquire(pool_opts.test_before_acquire_or_default())
            .connect_lazy_with(Self::connect_options(credentials));
        Ok(pool)
    }
}

impl DriverPool for MySqlPool {
    type Connection = PoolConnection<MySql>;
    type Error = sqlx::Error;

    async fn get_connection(&self) -> Result<PoolConnection<MySql>, sqlx::Error> {
        self.acquire().await
    }

    async fn end(&self) -> Result<(), sqlx::Error> {
        self.close().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        sqlx::Pool::is_closed(self)
    }
}

impl DriverConnection for PoolConnection<MySql> {
    type Output = Vec<MySqlRow>;
    type Error = sqlx::Error;

    async fn query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Vec<MySqlRow>, sqlx::Error> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        query.fetch_all(&mut **self).await
    }

    fn release(self) {
        // Dropping a PoolConnection hands it back to its pool.
        drop(self);
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectOptions;

    #[test]
    fn test_connect_options_carry_credentials() {
        let creds = Credentials::from_explicit(
            &ConnectOptions::for_user("app")
                .with_host("db.internal")
                .with_port(3307)
                .with_database("sales"),
        )
        .unwrap();
        let options = MySqlDriver::connect_options(&creds);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("sales"));
    }

    #[test]
    fn test_empty_database_selects_none() {
        let creds = Credentials::from_explicit(&ConnectOptions::for_user("app")).unwrap();
        let options = MySqlDriver::connect_options(&creds);
        assert_eq!(options.get_database(), None);
    }

    #[test]
    fn test_invalid_pool_options_fail_creation() {
        let driver = MySqlDriver::new(PoolOptions {
            max_connections: Some(0),
            ..PoolOptions::default()
        });
        let creds = Credentials::from_explicit(&ConnectOptions::for_user("app")).unwrap();
        let result = driver.create_pool(&creds);
        assert!(matches!(result, Err(sqlx::Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        // Nothing listens here; a lazy pool must still be created.
        let creds = Credentials::from_explicit(
            &ConnectOptions::for_user("app").with_host("127.0.0.1").with_port(1),
        )
        .unwrap();
        let driver = MySqlDriver::new(PoolOptions {
            min_connections: Some(0),
            ..PoolOptions::default()
        });
        let pool = driver.create_pool(&creds).unwrap();
        assert!(!DriverPool::is_closed(&pool));
        pool.end().await.unwrap();
        assert!(DriverPool::is_closed(&pool));
    }
}
