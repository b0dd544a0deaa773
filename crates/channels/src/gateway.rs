use std::fmt;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{Result, target::Target};

/// Remote identifier of a managed item (a message id on the platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item as seen on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: ItemId,
    pub content: String,
}

/// Operations against remote items at a target.
///
/// Implementations own transport, auth and rate limiting. They must report
/// a missing item as [`crate::Error::NotFound`] and keep it distinct from
/// transient failures.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Whether the target currently resolves (channel exists, endpoint reachable).
    async fn resolve(&self, target: &Target) -> bool;

    /// List every item at the target, including ones not managed by us.
    async fn list_items(&self, target: &Target) -> Result<Vec<RemoteItem>>;

    async fn fetch_item(&self, target: &Target, id: ItemId) -> Result<RemoteItem>;

    async fn create_item(&self, target: &Target, content: &str) -> Result<ItemId>;

    async fn edit_item(&self, target: &Target, id: ItemId, content: &str) -> Result<()>;

    async fn delete_item(&self, target: &Target, id: ItemId) -> Result<()>;
}
