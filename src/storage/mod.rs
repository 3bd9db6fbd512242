//! Counter table access for the rate limiter.
//! This module wraps the remote table service behind the [`CounterStore`]
//! trait and owns the process-wide, lazily built client handle.

mod connection_string;
mod credential;
mod table_client;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageConfig;

pub use connection_string::{ConnectionString, DEV_STORAGE_ACCOUNT};
pub use credential::{sign_shared_key_lite, ManagedIdentityCredential, TableAuth};
pub use table_client::{escape_key, TableClient, API_VERSION};

/// One counter row, addressed by `(partition, key)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRow {
    /// Day the counter belongs to (`YYYY-MM-DD`)
    pub partition: String,
    /// Subject of the counter: the global marker or a sanitized caller
    pub key: String,
    /// Requests counted so far
    pub count: i64,
}

/// Errors raised by counter store clients
#[derive(Error, Debug)]
pub enum StoreError {
    /// Neither an endpoint nor a connection string is configured
    #[error("counter store is not configured")]
    NotConfigured,

    /// Configuration is present but unusable
    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// Transport-level failure
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("storage returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    /// An access token could not be obtained
    #[error("storage authentication failed: {0}")]
    Auth(String),

    /// A row came back without a usable count
    #[error("malformed counter row: {0}")]
    MalformedRow(String),
}

/// Result type for counter store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value access to daily counters, atomic per row and nothing more
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Create the backing table; an existing table counts as success
    async fn ensure_table_exists(&self) -> StoreResult<()>;

    /// Read a row; `Ok(None)` only when the row is absent
    async fn get_row(&self, partition: &str, key: &str) -> StoreResult<Option<CounterRow>>;

    /// Insert a new row
    async fn create_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()>;

    /// Replace an existing row's count unconditionally
    async fn update_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()>;
}

type Connector = Box<dyn Fn() -> StoreResult<Arc<dyn CounterStore>> + Send + Sync>;

/// Process-lifetime store handle, built on first use
///
/// Only a successful construction is cached. A failed one is logged and
/// retried on the next call.
pub struct LazyStore {
    cell: OnceLock<Arc<dyn CounterStore>>,
    connect: Connector,
}

impl LazyStore {
    /// Create a handle that runs `connect` the first time it is needed
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> StoreResult<Arc<dyn CounterStore>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            connect: Box::new(connect),
        }
    }

    /// Handle backed by a [`TableClient`] built from settings
    pub fn from_config(config: StorageConfig) -> Self {
        Self::new(move || {
            let client = TableClient::from_config(&config)?;
            Ok(Arc::new(client) as Arc<dyn CounterStore>)
        })
    }

    /// Handle around an already constructed store
    pub fn ready(store: Arc<dyn CounterStore>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(store);
        Self {
            cell,
            connect: Box::new(|| Err(StoreError::NotConfigured)),
        }
    }

    /// Handle that never yields a store
    pub fn unavailable() -> Self {
        Self::new(|| Err(StoreError::NotConfigured))
    }

    /// Return the store, constructing it if this is the first use
    pub fn get(&self) -> Option<Arc<dyn CounterStore>> {
        if let Some(store) = self.cell.get() {
            return Some(Arc::clone(store));
        }

        match (self.connect)() {
            Ok(store) => {
                // Another request may have won the race; keep whichever landed first.
                let _ = self.cell.set(store);
                self.cell.get().cloned()
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to initialize counter store client");
                None
            }
        }
    }
}
