#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockall::mock;

use attack_compare_service::config::RateLimitConfig;
use attack_compare_service::core::RateLimiter;
use attack_compare_service::model::{CompletionModel, ModelError};
use attack_compare_service::storage::{CounterRow, CounterStore, LazyStore, StoreResult};

/// Counter store kept in memory, counting every call it receives
#[derive(Default)]
pub struct MemoryCounterStore {
    rows: Mutex<HashMap<(String, String), i64>>,
    calls: AtomicUsize,
}

impl MemoryCounterStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current count of a row, `None` if it was never created
    pub fn count(&self, partition: &str, key: &str) -> Option<i64> {
        self.rows
            .lock()
            .unwrap()
            .get(&(partition.to_string(), key.to_string()))
            .copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn ensure_table_exists(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_row(&self, partition: &str, key: &str) -> StoreResult<Option<CounterRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.count(partition, key).map(|count| CounterRow {
            partition: partition.to_string(),
            key: key.to_string(),
            count,
        }))
    }

    async fn create_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert((partition.to_string(), key.to_string()), count);
        Ok(())
    }

    async fn update_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert((partition.to_string(), key.to_string()), count);
        Ok(())
    }
}

/// Model that answers with a fixed reply and remembers every prompt
pub struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for RecordingModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl CounterStore for Store {
        async fn ensure_table_exists(&self) -> StoreResult<()>;
        async fn get_row(&self, partition: &str, key: &str) -> StoreResult<Option<CounterRow>>;
        async fn create_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()>;
        async fn update_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()>;
    }
}

mock! {
    pub Model {}

    #[async_trait]
    impl CompletionModel for Model {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
    }
}

/// Rate limiter over `store` with the given ceilings
pub fn limiter_over(store: Arc<dyn CounterStore>, global: i64, caller: i64) -> RateLimiter {
    RateLimiter::new(
        LazyStore::ready(store),
        RateLimitConfig {
            global_daily_limit: global,
            caller_daily_limit: caller,
        },
    )
}

/// Generate a random IP address for testing
pub fn random_ip() -> String {
    format!(
        "{}.{}.{}.{}",
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>()
    )
}

/// Setup test environment
pub fn setup_test_env() {
    attack_compare_service::utils::init_logging();
}

/// Serve `app` on an ephemeral local port and return its address
pub fn spawn_fake_server(app: axum::Router) -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}
