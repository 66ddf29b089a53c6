//! Scripted driver and configuration sources shared by the integration tests.

#![allow(dead_code)]

use pool_keeper::driver::{Driver, DriverConnection, DriverPool};
use pool_keeper::{ConfigSource, ConnectOptions, Credentials, PoolError, PoolResult, QueryParam};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, thiserror::Error)]
#[error("scripted driver: {0}")]
pub struct ScriptedError(pub String);

impl From<ScriptedError> for PoolError {
    fn from(err: ScriptedError) -> Self {
        PoolError::query(err.to_string(), Some("42000".to_string()))
    }
}

/// Knobs and counters shared between a test and the driver it hands out.
#[derive(Default)]
pub struct Script {
    pub created: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub ended: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_acquire: AtomicBool,
    pub fail_end: AtomicBool,
    pub fail_query: AtomicBool,
    pub unqueryable: AtomicBool,
    /// Every pool reports itself closed while set.
    pub pools_closed: AtomicBool,
    /// Acquisitions park until `proceed` is notified while set.
    pub hold_acquire: AtomicBool,
    /// Signalled when a held acquisition has started.
    pub acquiring: Notify,
    pub proceed: Notify,
    pub credentials: Mutex<Vec<Credentials>>,
    pub queries: Mutex<Vec<(String, Vec<QueryParam>)>>,
}

impl Script {
    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Credentials of the most recently created pool.
    pub fn last_credentials(&self) -> Option<Credentials> {
        self.credentials.lock().unwrap().last().cloned()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    pub script: Arc<Script>,
}

pub struct ScriptedPool {
    script: Arc<Script>,
    closed: AtomicBool,
}

pub struct ScriptedConnection {
    script: Arc<Script>,
}

/// What a scripted query returns: the statement and params it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Echo {
    pub statement: String,
    pub params: Vec<QueryParam>,
}

impl Driver for ScriptedDriver {
    type Pool = ScriptedPool;
    type Error = ScriptedError;

    fn create_pool(&self, credentials: &Credentials) -> Result<ScriptedPool, ScriptedError> {
        if self.script.fail_create.load(Ordering::SeqCst) {
            return Err(ScriptedError("access denied".to_string()));
        }
        self.script.created.fetch_add(1, Ordering::SeqCst);
        self.script
            .credentials
            .lock()
            .unwrap()
            .push(credentials.clone());
        Ok(ScriptedPool {
            script: Arc::clone(&self.script),
            closed: AtomicBool::new(false),
        })
    }
}

impl DriverPool for ScriptedPool {
    type Connection = ScriptedConnection;
    type Error = ScriptedError;

    async fn get_connection(&self) -> Result<ScriptedConnection, ScriptedError> {
        if self.script.hold_acquire.load(Ordering::SeqCst) {
            self.script.acquiring.notify_one();
            self.script.proceed.notified().await;
        } else {
            tokio::task::yield_now().await;
        }
        if self.script.fail_acquire.load(Ordering::SeqCst) {
            return Err(ScriptedError("too many connections".to_string()));
        }
        self.script.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            script: Arc::clone(&self.script),
        })
    }

    async fn end(&self) -> Result<(), ScriptedError> {
        self.script.ended.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.script.fail_end.load(Ordering::SeqCst) {
            return Err(ScriptedError("broken pipe".to_string()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.script.pools_closed.load(Ordering::SeqCst)
    }
}

impl DriverConnection for ScriptedConnection {
    type Output = Echo;
    type Error = ScriptedError;

    async fn query(
        &mut self,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Echo, ScriptedError> {
        if self.script.fail_query.load(Ordering::SeqCst) {
            return Err(ScriptedError(format!("syntax error near '{statement}'")));
        }
        self.script
            .queries
            .lock()
            .unwrap()
            .push((statement.to_string(), params.to_vec()));
        Ok(Echo {
            statement: statement.to_string(),
            params: params.to_vec(),
        })
    }

    fn release(self) {
        self.script.released.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_query(&self) -> bool {
        !self.script.unqueryable.load(Ordering::SeqCst)
    }
}

/// Map-backed source that counts how often it is consulted.
#[derive(Default)]
pub struct CountingSource {
    entries: HashMap<String, Option<ConnectOptions>>,
    pub lookups: AtomicUsize,
}

impl CountingSource {
    pub fn with_entry(mut self, key: &str, options: ConnectOptions) -> Self {
        self.entries.insert(key.to_string(), Some(options));
        self
    }

    pub fn with_null_entry(mut self, key: &str) -> Self {
        self.entries.insert(key.to_string(), None);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ConfigSource for CountingSource {
    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &str) -> PoolResult<Option<ConnectOptions>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(key).cloned().flatten())
    }
}

/// Credentials a bare `{ user: "u" }` resolves to through `set_config`.
pub fn default_explicit_credentials() -> Credentials {
    Credentials {
        host: "localhost".to_string(),
        port: 3306,
        user: "u".to_string(),
        password: Some(String::new()),
        database: String::new(),
    }
}
