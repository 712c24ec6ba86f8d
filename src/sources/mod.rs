//! Outbound collaborators: the indexing API and the blockchain node.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::ClubError;
use crate::models::{ActivityRow, EventKind, Post, Window};

pub mod node;
pub mod sds;

pub use node::NodeClient;
pub use sds::SdsClient;

/// Supplies account-activity rows for a subject account and window.
#[async_trait::async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch_activity(
        &self,
        username: &str,
        kind: EventKind,
        window: &Window,
    ) -> Result<Vec<ActivityRow>, ClubError>;
}

/// Supplies the author reward accrued in a window, in VESTS.
#[async_trait::async_trait]
pub trait RewardFetcher: Send + Sync {
    async fn author_reward_vests(
        &self,
        username: &str,
        window: &Window,
    ) -> Result<Decimal, ClubError>;
}

/// Converts VESTS into STEEM POWER using current network parameters.
#[async_trait::async_trait]
pub trait VestsConverter: Send + Sync {
    async fn vests_to_power(&self, vests: Decimal) -> Result<Decimal, ClubError>;
}

#[async_trait::async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `Ok(false)` when the account does not exist.
    async fn account_exists(&self, username: &str) -> Result<bool, ClubError>;

    /// Accounts receiving outgoing vesting delegations.
    async fn delegatees(&self, username: &str) -> Result<Vec<String>, ClubError>;
}

/// Newest-first community posts, one page at a time.
#[async_trait::async_trait]
pub trait CommunityFeed: Send + Sync {
    /// Returns up to `limit` posts older than `after` (or the newest when `None`).
    /// An empty page means the feed is exhausted.
    async fn fetch_page(
        &self,
        community: &str,
        after: Option<&Post>,
        limit: u32,
    ) -> Result<Vec<Post>, ClubError>;
}

/// Parses a JSON number or string into a decimal amount.
pub(crate) fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Parses a chain asset string such as `"123.456 STEEM"`.
pub(crate) fn parse_asset(text: &str) -> Option<Decimal> {
    let amount = text.split_whitespace().next()?;
    Decimal::from_str(amount).ok()
}
