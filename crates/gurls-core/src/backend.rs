//! Backend port: the remote link-shortening service as the bot sees it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::UserId;

/// Closed failure taxonomy for backend calls.
///
/// Adapters reduce every transport/remote error to one of these; nothing
/// downstream inspects raw status objects.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("alias already exists")]
    AliasConflict,

    #[error("link not found")]
    NotFound,

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Request to create one short link. Built fresh per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    pub owner: UserId,
    pub original_url: String,
    pub title: Option<String>,
    pub custom_alias: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LinkRequest {
    pub fn new(owner: UserId, original_url: impl Into<String>) -> Self {
        Self {
            owner,
            original_url: original_url.into(),
            title: None,
            custom_alias: None,
            expires_at: None,
        }
    }
}

/// Result of a successful CreateLink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedLink {
    pub alias: String,
    /// `{base_url}/{alias}`.
    pub short_url: String,
}

/// One entry of a user's link list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSummary {
    pub alias: String,
    pub original_url: String,
    pub title: Option<String>,
    pub click_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Snapshot of a link's statistics. Re-fetched on every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStats {
    pub original_url: String,
    pub title: Option<String>,
    pub click_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    /// Clicks per category label (device type today); ordered by label.
    pub clicks_by_category: BTreeMap<String, i64>,
}

/// Join a public base URL and an alias into a short link.
pub fn short_url(base_url: &str, alias: &str) -> String {
    format!("{}/{alias}", base_url.trim_end_matches('/'))
}

/// Hexagonal port for the shortening service.
///
/// Each call is attempted exactly once; retries are the caller's business
/// (and the caller does not retry).
#[async_trait]
pub trait LinkBackend: Send + Sync {
    async fn create_link(&self, req: LinkRequest) -> BackendResult<CreatedLink>;

    async fn get_stats(&self, alias: &str) -> BackendResult<LinkStats>;

    async fn delete_link(&self, alias: &str) -> BackendResult<()>;

    /// Links owned by `user`, in the order the service returns them.
    async fn list_user_links(&self, user: UserId) -> BackendResult<Vec<LinkSummary>>;
}
