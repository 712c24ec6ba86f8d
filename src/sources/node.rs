//! JSON-RPC client for a Steem node (condenser API).

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDateTime;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::cache::{CacheKey, MemoCache};
use crate::error::ClubError;
use crate::models::Post;
use crate::sources::{parse_asset, AccountDirectory, CommunityFeed, VestsConverter};

const SOURCE: &str = "steem node";

pub const DEFAULT_NODE_URL: &str = "https://api.steemit.com";

const DELEGATION_PAGE: u32 = 1000;

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct AccountRecord {
    name: String,
}

#[derive(Deserialize)]
struct DelegationRecord {
    delegatee: String,
}

#[derive(Deserialize)]
struct GlobalProperties {
    total_vesting_fund_steem: String,
    total_vesting_shares: String,
}

#[derive(Deserialize)]
struct DiscussionRecord {
    author: String,
    permlink: String,
    created: String,
    #[serde(default)]
    json_metadata: String,
}

#[derive(Deserialize, Default)]
struct PostMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

pub struct NodeClient {
    client: Client,
    url: Url,
    /// (total_vesting_fund_steem, total_vesting_shares)
    vesting: MemoCache<(Decimal, Decimal)>,
}

impl NodeClient {
    /// `props_ttl` bounds how long global vesting totals are reused.
    pub fn new(url: Url, timeout: Duration, props_ttl: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("club-check/0.1")
            .build()
            .context("failed to build node HTTP client")?;

        Ok(Self {
            client,
            url,
            vesting: MemoCache::new(Some(props_ttl)),
        })
    }

    async fn vesting_totals(&self) -> Result<(Decimal, Decimal), ClubError> {
        let props: GlobalProperties = self
            .call("condenser_api.get_dynamic_global_properties", serde_json::json!([]))
            .await?;

        let fund = parse_asset(&props.total_vesting_fund_steem)
            .ok_or_else(|| ClubError::upstream(SOURCE, "unreadable total_vesting_fund_steem"))?;
        let shares = parse_asset(&props.total_vesting_shares)
            .ok_or_else(|| ClubError::upstream(SOURCE, "unreadable total_vesting_shares"))?;

        if shares.is_zero() {
            return Err(ClubError::upstream(SOURCE, "total_vesting_shares is zero"));
        }
        Ok((fund, shares))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ClubError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        tracing::debug!("rpc {} on {}", method, self.url);

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClubError::upstream(SOURCE, e))?;

        if !response.status().is_success() {
            return Err(ClubError::upstream(
                SOURCE,
                format!("{method} returned {}", response.status()),
            ));
        }

        let rpc: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ClubError::upstream(SOURCE, format!("invalid {method} payload: {e}")))?;

        match (rpc.result, rpc.error) {
            (_, Some(error)) => Err(ClubError::upstream(
                SOURCE,
                format!("{method} failed: {}", error.message),
            )),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ClubError::upstream(
                SOURCE,
                format!("{method} returned no result"),
            )),
        }
    }
}

fn parse_post(record: DiscussionRecord) -> Result<Post, ClubError> {
    let created = NaiveDateTime::parse_from_str(&record.created, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| {
            ClubError::MalformedFeed(format!(
                "post @{}/{} has bad timestamp {:?}: {e}",
                record.author, record.permlink, record.created
            ))
        })?
        .and_utc();

    // Posts with unreadable metadata simply carry no tags.
    let metadata: PostMetadata = serde_json::from_str(&record.json_metadata).unwrap_or_default();

    Ok(Post {
        author: record.author,
        permlink: record.permlink,
        created,
        tags: metadata.tags,
    })
}

#[async_trait::async_trait]
impl AccountDirectory for NodeClient {
    async fn account_exists(&self, username: &str) -> Result<bool, ClubError> {
        let accounts: Vec<AccountRecord> = self
            .call("condenser_api.get_accounts", serde_json::json!([[username]]))
            .await?;
        Ok(accounts.iter().any(|account| account.name == username))
    }

    async fn delegatees(&self, username: &str) -> Result<Vec<String>, ClubError> {
        let delegations: Vec<DelegationRecord> = self
            .call(
                "condenser_api.get_vesting_delegations",
                serde_json::json!([username, "", DELEGATION_PAGE]),
            )
            .await?;
        Ok(delegations.into_iter().map(|d| d.delegatee).collect())
    }
}

#[async_trait::async_trait]
impl VestsConverter for NodeClient {
    async fn vests_to_power(&self, vests: Decimal) -> Result<Decimal, ClubError> {
        let (fund, shares) = self
            .vesting
            .get_or_fetch(CacheKey::new("dynamic_global_properties", ""), || {
                self.vesting_totals()
            })
            .await?;

        Ok(vests * fund / shares)
    }
}

#[async_trait::async_trait]
impl CommunityFeed for NodeClient {
    async fn fetch_page(
        &self,
        community: &str,
        after: Option<&Post>,
        limit: u32,
    ) -> Result<Vec<Post>, ClubError> {
        // The node repeats the start post at the head of the next page.
        let params = match after {
            Some(post) => serde_json::json!([{
                "tag": community,
                "limit": limit + 1,
                "start_author": post.author,
                "start_permlink": post.permlink,
            }]),
            None => serde_json::json!([{ "tag": community, "limit": limit }]),
        };

        let records: Vec<DiscussionRecord> = self
            .call("condenser_api.get_discussions_by_created", params)
            .await?;

        let mut posts = records
            .into_iter()
            .map(parse_post)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(post) = after {
            if posts
                .first()
                .is_some_and(|p| p.author == post.author && p.permlink == post.permlink)
            {
                posts.remove(0);
            }
        }

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    fn client(server: &MockServer) -> NodeClient {
        NodeClient::new(
            server.base_url().parse().unwrap(),
            Duration::from_secs(5),
            Duration::from_secs(600),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_account_is_not_an_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("condenser_api.get_accounts");
            then.status(200)
                .json_body(serde_json::json!({"jsonrpc": "2.0", "result": [], "id": 1}));
        });

        let exists = client(&server).account_exists("doesnotexist123").await.unwrap();

        mock.assert();
        assert!(!exists);
    }

    #[tokio::test]
    async fn lists_delegatees() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_vesting_delegations");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [
                    {
                        "delegator": "alice",
                        "delegatee": "bidbot",
                        "vesting_shares": "1000.000000 VESTS"
                    },
                    {
                        "delegator": "alice",
                        "delegatee": "steemcurator01",
                        "vesting_shares": "5.000000 VESTS"
                    }
                ],
                "id": 1
            }));
        });

        let delegatees = client(&server).delegatees("alice").await.unwrap();
        assert_eq!(delegatees, vec!["bidbot".to_string(), "steemcurator01".to_string()]);
    }

    #[tokio::test]
    async fn converts_vests_with_global_properties() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_dynamic_global_properties");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {
                    "total_vesting_fund_steem": "500.000 STEEM",
                    "total_vesting_shares": "1000000.000000 VESTS"
                },
                "id": 1
            }));
        });

        let node = client(&server);
        assert_eq!(node.vests_to_power(dec!(2000)).await.unwrap(), dec!(1));
        assert_eq!(node.vests_to_power(dec!(4000)).await.unwrap(), dec!(2));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn rpc_errors_are_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32000, "message": "Unable to acquire database lock"},
                "id": 1
            }));
        });

        let err = client(&server).delegatees("alice").await.unwrap_err();
        assert!(err.to_string().contains("database lock"));
    }

    #[tokio::test]
    async fn pages_skip_the_repeated_start_post() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).body_contains("start_permlink");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [
                    {"author": "alice", "permlink": "day-1", "created": "2026-03-15T08:00:00",
                     "json_metadata": "{\"tags\":[\"hive-161179\",\"club5050\"]}"},
                    {"author": "bob", "permlink": "hello", "created": "2026-03-15T07:30:00",
                     "json_metadata": "not json"}
                ],
                "id": 1
            }));
        });

        let start = Post {
            author: "alice".to_string(),
            permlink: "day-1".to_string(),
            created: Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap(),
            tags: vec![],
        };
        let posts = client(&server)
            .fetch_page("hive-161179", Some(&start), 1)
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, "bob");
        assert!(posts[0].tags.is_empty());
        assert_eq!(posts[0].created, Utc.with_ymd_and_hms(2026, 3, 15, 7, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn bad_post_timestamp_is_a_malformed_feed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [{"author": "alice", "permlink": "x", "created": "yesterday"}],
                "id": 1
            }));
        });

        let err = client(&server).fetch_page("hive-161179", None, 20).await.unwrap_err();
        assert!(matches!(err, ClubError::MalformedFeed(_)));
    }
}
