//! Persistence for users, watchlists and query history
//!
//! `PgStore` is used when `DATABASE_URL` points at Postgres; otherwise
//! everything lives in process memory and is lost on restart.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::WatchlistItem;
use crate::Result;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub const SUMMARY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
}

/// Which unique field an attempted signup collides with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Email,
    Username,
}

impl UserConflict {
    pub fn message(&self) -> &'static str {
        match self {
            UserConflict::Email => "Email already registered",
            UserConflict::Username => "Username already taken",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewWatchlistItem {
    pub user_id: i64,
    pub ticker: String,
    pub company_name: Option<String>,
    pub notes: Option<String>,
    pub alert_threshold: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRecord {
    pub id: i64,
    pub user_id: i64,
    pub query_type: String,
    pub query_params: Value,
    pub agent_response: Value,
    pub response_summary: String,
    pub execution_time_ms: i64,
    pub response_digest: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQueryRecord {
    pub user_id: i64,
    pub query_type: String,
    pub query_params: Value,
    pub agent_response: Value,
    pub response_summary: String,
    pub execution_time_ms: i64,
}

impl NewQueryRecord {
    /// Summary cut to the stored length
    pub fn truncated_summary(&self) -> String {
        self.response_summary.chars().take(SUMMARY_LIMIT).collect()
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    fn backend(&self) -> &'static str;

    // Users
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_user_conflict(&self, email: &str, username: &str) -> Result<Option<UserConflict>>;
    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    // Watchlist
    async fn add_watchlist_item(&self, item: NewWatchlistItem) -> Result<WatchlistItem>;
    async fn find_watchlist_ticker(&self, user_id: i64, ticker: &str) -> Result<Option<WatchlistItem>>;
    async fn list_watchlist(&self, user_id: i64) -> Result<Vec<WatchlistItem>>;
    async fn get_watchlist_item(&self, user_id: i64, item_id: i64) -> Result<Option<WatchlistItem>>;
    async fn delete_watchlist_item(&self, item_id: i64) -> Result<bool>;

    // Query history
    async fn insert_query(&self, record: NewQueryRecord) -> Result<QueryRecord>;
    async fn list_queries(&self, user_id: i64, limit: i64) -> Result<Vec<QueryRecord>>;
    async fn get_query(&self, user_id: i64, query_id: i64) -> Result<Option<QueryRecord>>;
}

/// Postgres when `DATABASE_URL` is a postgres URL, in-memory otherwise
pub fn build_store(settings: &Settings) -> Arc<dyn Repository> {
    if let Some(url) = settings
        .database_url
        .as_deref()
        .filter(|u| u.starts_with("postgres://") || u.starts_with("postgresql://"))
    {
        match PgStore::connect_lazy(url) {
            Ok(store) => {
                info!("Storage backend: postgres");
                return Arc::new(store);
            }
            Err(e) => {
                warn!("Failed to initialize postgres store, falling back to in-memory: {}", e);
            }
        }
    } else if settings.database_url.is_some() {
        warn!("DATABASE_URL is not a postgres URL, falling back to in-memory");
    }

    warn!("Storage backend: in-memory (data is lost on restart)");
    Arc::new(InMemoryStore::new())
}

/// Record the persisted id inside the stored agent response
pub fn stamp_query_id(mut agent_response: Value, id: i64) -> Value {
    if let Some(map) = agent_response.as_object_mut() {
        map.insert("query_id".to_string(), Value::from(id));
    }
    agent_response
}

/// SHA-256 of the JSON serialization, hex encoded
pub fn response_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
