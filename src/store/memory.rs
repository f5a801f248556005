//! In-memory repository for development and tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    response_digest, stamp_query_id, NewQueryRecord, NewUser, NewWatchlistItem, QueryRecord, Repository, User,
    UserConflict,
};
use crate::error::PlatformError;
use crate::models::WatchlistItem;
use crate::Result;

pub struct InMemoryStore {
    users: Arc<RwLock<BTreeMap<i64, User>>>,
    watchlist: Arc<RwLock<BTreeMap<i64, WatchlistItem>>>,
    queries: Arc<RwLock<BTreeMap<i64, QueryRecord>>>,
    user_ids: AtomicI64,
    watchlist_ids: AtomicI64,
    query_ids: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(BTreeMap::new())),
            watchlist: Arc::new(RwLock::new(BTreeMap::new())),
            queries: Arc::new(RwLock::new(BTreeMap::new())),
            user_ids: AtomicI64::new(1),
            watchlist_ids: AtomicI64::new(1),
            query_ids: AtomicI64::new(1),
        }
    }

    /// Flip a user's active flag (admin tooling and tests)
    pub async fn set_active(&self, user_id: i64, active: bool) -> bool {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict_in<'a>(
    users: impl Iterator<Item = &'a User>,
    email: &str,
    username: &str,
) -> Option<UserConflict> {
    let mut username_taken = false;
    for user in users {
        if user.email == email {
            return Some(UserConflict::Email);
        }
        if user.username == username {
            username_taken = true;
        }
    }
    username_taken.then_some(UserConflict::Username)
}

#[async_trait]
impl Repository for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;

        // Checked under the write lock so two signups cannot both win
        if let Some(conflict) = conflict_in(users.values(), &user.email, &user.username) {
            return Err(PlatformError::Conflict(conflict.message().to_string()));
        }

        let id = self.user_ids.fetch_add(1, Ordering::SeqCst);
        let created = User {
            id,
            email: user.email,
            username: user.username,
            hashed_password: user.hashed_password,
            full_name: user.full_name,
            is_active: true,
            created_at: Utc::now(),
        };

        users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_conflict(&self, email: &str, username: &str) -> Result<Option<UserConflict>> {
        let users = self.users.read().await;
        Ok(conflict_in(users.values(), email, username))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).cloned())
    }

    async fn add_watchlist_item(&self, item: NewWatchlistItem) -> Result<WatchlistItem> {
        let mut watchlist = self.watchlist.write().await;

        if watchlist
            .values()
            .any(|w| w.user_id == item.user_id && w.ticker == item.ticker)
        {
            return Err(PlatformError::Conflict("Ticker already in watchlist".to_string()));
        }

        let id = self.watchlist_ids.fetch_add(1, Ordering::SeqCst);
        let created = WatchlistItem {
            id,
            user_id: item.user_id,
            ticker: item.ticker,
            company_name: item.company_name,
            notes: item.notes,
            alert_threshold: item.alert_threshold,
            added_at: Utc::now(),
        };

        watchlist.insert(id, created.clone());
        Ok(created)
    }

    async fn find_watchlist_ticker(&self, user_id: i64, ticker: &str) -> Result<Option<WatchlistItem>> {
        let watchlist = self.watchlist.read().await;
        Ok(watchlist
            .values()
            .find(|w| w.user_id == user_id && w.ticker == ticker)
            .cloned())
    }

    async fn list_watchlist(&self, user_id: i64) -> Result<Vec<WatchlistItem>> {
        let watchlist = self.watchlist.read().await;
        Ok(watchlist
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_watchlist_item(&self, user_id: i64, item_id: i64) -> Result<Option<WatchlistItem>> {
        let watchlist = self.watchlist.read().await;
        Ok(watchlist
            .get(&item_id)
            .filter(|w| w.user_id == user_id)
            .cloned())
    }

    async fn delete_watchlist_item(&self, item_id: i64) -> Result<bool> {
        let mut watchlist = self.watchlist.write().await;
        Ok(watchlist.remove(&item_id).is_some())
    }

    async fn insert_query(&self, record: NewQueryRecord) -> Result<QueryRecord> {
        let id = self.query_ids.fetch_add(1, Ordering::SeqCst);
        let agent_response = stamp_query_id(record.agent_response.clone(), id);
        let stored = QueryRecord {
            id,
            user_id: record.user_id,
            query_type: record.query_type.clone(),
            response_summary: record.truncated_summary(),
            response_digest: response_digest(&agent_response),
            query_params: record.query_params,
            agent_response,
            execution_time_ms: record.execution_time_ms,
            created_at: Utc::now(),
        };

        let mut queries = self.queries.write().await;
        queries.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_queries(&self, user_id: i64, limit: i64) -> Result<Vec<QueryRecord>> {
        let queries = self.queries.read().await;
        Ok(queries
            .values()
            .rev()
            .filter(|q| q.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_query(&self, user_id: i64, query_id: i64) -> Result<Option<QueryRecord>> {
        let queries = self.queries.read().await;
        Ok(queries
            .get(&query_id)
            .filter(|q| q.user_id == user_id)
            .cloned())
    }
}
