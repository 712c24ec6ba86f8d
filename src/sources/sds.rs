//! Client for the SteemWorld SDS indexing API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use crate::error::ClubError;
use crate::models::{ActivityRow, EventKind, Window};
use crate::sources::{decimal_from_json, EventFetcher, RewardFetcher};

const SOURCE: &str = "sds";

pub const DEFAULT_SDS_URL: &str = "https://sds.steemworld.org";

#[derive(Deserialize)]
struct RowsEnvelope {
    result: RowsResult,
}

#[derive(Deserialize)]
struct RowsResult {
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct RewardsEnvelope {
    result: RewardsResult,
}

#[derive(Deserialize)]
struct RewardsResult {
    author_reward: RewardSums,
}

#[derive(Deserialize)]
struct RewardSums {
    vests: serde_json::Value,
}

pub struct SdsClient {
    client: Client,
    base_url: Url,
}

impl SdsClient {
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("club-check/0.1")
            .build()
            .context("failed to build SDS HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClubError::upstream(SOURCE, "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ClubError> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ClubError::upstream(SOURCE, e))?;

        if !response.status().is_success() {
            return Err(ClubError::upstream(
                SOURCE,
                format!("{} returned {}", url.path(), response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClubError::upstream(SOURCE, format!("invalid payload: {e}")))
    }
}

/// Turns one `[time, from, to, amount, unit, ...]` row into an [`ActivityRow`].
/// Rows without a numeric time are dated at the window start.
fn parse_row(
    kind: EventKind,
    row: &[serde_json::Value],
    window: &Window,
) -> Result<ActivityRow, ClubError> {
    if row.len() < 4 {
        return Err(ClubError::upstream(
            SOURCE,
            format!("row has {} columns, expected at least 4", row.len()),
        ));
    }

    let account = |index: usize| {
        row[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClubError::upstream(SOURCE, format!("column {index} is not an account")))
    };

    let amount = decimal_from_json(&row[3])
        .ok_or_else(|| ClubError::upstream(SOURCE, "column 3 is not an amount"))?;

    let timestamp = row[0]
        .as_i64()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(window.start);

    Ok(ActivityRow {
        operation: kind,
        timestamp,
        from: account(1)?,
        to: account(2)?,
        amount,
        unit: row.get(4).and_then(|v| v.as_str()).map(str::to_string),
    })
}

/// Row counts per currency unit, e.g. `SBD=1 STEEM=2`. Amounts are summed
/// across units, so a mix is worth seeing in the logs.
fn unit_mix(rows: &[ActivityRow]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.unit.as_deref().unwrap_or("?")).or_default() += 1;
    }
    counts
        .iter()
        .map(|(unit, count)| format!("{unit}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait::async_trait]
impl EventFetcher for SdsClient {
    async fn fetch_activity(
        &self,
        username: &str,
        kind: EventKind,
        window: &Window,
    ) -> Result<Vec<ActivityRow>, ClubError> {
        let query = serde_json::json!({
            "type": kind.op_name(),
            "from": username,
            "fromTime": window.start_epoch(),
            "toTime": window.stop_epoch(),
        });
        let url = self.endpoint(&["transfers_api", "getTransfers", &query.to_string()])?;
        let envelope: RowsEnvelope = self.get_json(url).await?;

        let rows = envelope
            .result
            .rows
            .iter()
            .map(|row| parse_row(kind, row, window))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "{} {} rows for {} over {} days ({})",
            rows.len(),
            kind.op_name(),
            username,
            window.duration_days,
            unit_mix(&rows)
        );
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl RewardFetcher for SdsClient {
    async fn author_reward_vests(
        &self,
        username: &str,
        window: &Window,
    ) -> Result<Decimal, ClubError> {
        let range = format!("{}-{}", window.start_epoch(), window.stop_epoch());
        let url = self.endpoint(&["rewards_api", "getAllRewardsSums", username, &range])?;
        let envelope: RewardsEnvelope = self.get_json(url).await?;

        decimal_from_json(&envelope.result.author_reward.vests)
            .ok_or_else(|| ClubError::upstream(SOURCE, "author reward vests is not a number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    fn window() -> Window {
        Window::ending_at(Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap(), 30)
    }

    fn client(server: &MockServer) -> SdsClient {
        SdsClient::new(server.base_url().parse().unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn parses_power_up_rows() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path_contains("/transfers_api/getTransfers/");
            then.status(200).json_body(serde_json::json!({
                "result": {
                    "cols": {"time": 0, "from": 1, "to": 2, "amount": 3, "unit": 4},
                    "rows": [
                        [1772000000, "alice", "alice", 12.5, "STEEM"],
                        [1772000100, "alice", "bob", 3.0, "STEEM"]
                    ]
                }
            }));
        });

        let rows = client(&server)
            .fetch_activity("alice", EventKind::PowerUp, &window())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, dec!(12.5));
        assert_eq!(rows[0].timestamp.timestamp(), 1772000000);
        assert_eq!(rows[1].to, "bob");
        assert_eq!(rows[1].unit.as_deref(), Some("STEEM"));
    }

    #[test]
    fn unit_mix_counts_rows_per_currency() {
        let row = |unit: Option<&str>| ActivityRow {
            operation: EventKind::Transfer,
            timestamp: window().start,
            from: "alice".to_string(),
            to: "exchange".to_string(),
            amount: dec!(1),
            unit: unit.map(str::to_string),
        };
        let rows = vec![row(Some("STEEM")), row(Some("SBD")), row(Some("STEEM")), row(None)];

        assert_eq!(unit_mix(&rows), "?=1 SBD=1 STEEM=2");
        assert_eq!(unit_mix(&[]), "");
    }

    #[tokio::test]
    async fn undated_rows_fall_back_to_window_start() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_contains("/transfers_api/getTransfers/");
            then.status(200).json_body(serde_json::json!({
                "result": { "rows": [["2026-03-01", "alice", "carol", "4.000"]] }
            }));
        });

        let rows = client(&server)
            .fetch_activity("alice", EventKind::Transfer, &window())
            .await
            .unwrap();

        assert_eq!(rows[0].timestamp, window().start);
        assert_eq!(rows[0].amount, dec!(4.000));
        assert_eq!(rows[0].unit, None);
    }

    #[tokio::test]
    async fn short_rows_are_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_contains("/transfers_api/getTransfers/");
            then.status(200).json_body(serde_json::json!({
                "result": { "rows": [[1772000000, "alice", "alice"]] }
            }));
        });

        let err = client(&server)
            .fetch_activity("alice", EventKind::PowerUp, &window())
            .await
            .unwrap_err();
        assert!(matches!(err, ClubError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn reads_author_reward_vests() {
        let server = MockServer::start();
        let w = window();
        let path = format!(
            "/rewards_api/getAllRewardsSums/alice/{}-{}",
            w.start_epoch(),
            w.stop_epoch()
        );
        let mock = server.mock(|when, then| {
            when.method(GET).path(path.as_str());
            then.status(200).json_body(serde_json::json!({
                "result": {
                    "author_reward": {"vests": 20345.123456, "steem": 0.0, "sbd": 0.0},
                    "curation_reward": {"vests": 10.0}
                }
            }));
        });

        let vests = client(&server).author_reward_vests("alice", &w).await.unwrap();

        mock.assert();
        assert_eq!(vests, dec!(20345.123456));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable_not_zero() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_contains("/rewards_api/");
            then.status(500);
        });

        let result = client(&server).author_reward_vests("alice", &window()).await;
        assert!(matches!(
            result,
            Err(ClubError::UpstreamUnavailable { source_name: "sds", .. })
        ));
    }
}
