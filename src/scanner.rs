use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::eligibility::EligibilityEngine;
use crate::error::ClubError;
use crate::models::{ClubTier, Post, RosterEntry, Window};
use crate::sources::CommunityFeed;

pub const CLUB_TAGS: [&str; 3] = ["club5050", "club100", "club75"];

/// What to do with the roster when the feed breaks off mid-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialScanPolicy {
    /// Report an empty roster.
    Discard,
    /// Keep the entries built before the failure.
    RetainPartial,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub freshness: Duration,
    pub tags: Vec<String>,
    pub tier: ClubTier,
    pub page_size: u32,
    pub max_posts: usize,
    /// Consecutive out-of-window posts that end the scan.
    pub stale_run_limit: usize,
    pub policy: PartialScanPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::hours(24),
            tags: CLUB_TAGS.iter().map(|t| t.to_string()).collect(),
            tier: ClubTier::Club5050,
            page_size: 50,
            max_posts: 10_000,
            stale_run_limit: 1,
            policy: PartialScanPolicy::Discard,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub entries: Vec<RosterEntry>,
    pub posts_scanned: usize,
    pub interrupted: bool,
}

pub struct MembershipScanner {
    feed: Arc<dyn CommunityFeed>,
    engine: EligibilityEngine,
    config: ScanConfig,
}

impl MembershipScanner {
    pub fn new(
        feed: Arc<dyn CommunityFeed>,
        engine: EligibilityEngine,
        config: ScanConfig,
    ) -> Self {
        Self {
            feed,
            engine,
            config,
        }
    }

    fn qualifies(&self, post: &Post) -> bool {
        post.tags.iter().any(|tag| self.config.tags.contains(tag))
    }

    /// Builds the roster of club-tag authors active within the freshness window.
    pub async fn scan(&self, community: &str, now: DateTime<Utc>) -> Result<ScanReport, ClubError> {
        let window = Window::ending_at(now, self.config.tier.duration_days());
        let mut report = ScanReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<Post> = None;
        let mut stale_run = 0usize;

        'pages: loop {
            let page = match self
                .feed
                .fetch_page(community, cursor.as_ref(), self.config.page_size)
                .await
            {
                Ok(page) => page,
                Err(err) => return Ok(self.interrupted(report, err)),
            };

            if page.is_empty() {
                break;
            }

            for post in &page {
                report.posts_scanned += 1;

                if now - post.created >= self.config.freshness {
                    stale_run += 1;
                    if stale_run >= self.config.stale_run_limit {
                        break 'pages;
                    }
                    continue;
                }
                stale_run = 0;

                if self.qualifies(post) && seen.insert(post.author.clone()) {
                    match self.engine.build_compliance_result(&post.author, &window).await {
                        Ok(result) => report.entries.push(RosterEntry::from(&result)),
                        Err(ClubError::AccountNotFound(name)) => {
                            tracing::warn!("skipping post author {} with no account", name);
                        }
                        Err(err) => return Err(err),
                    }
                }

                if report.posts_scanned >= self.config.max_posts {
                    tracing::warn!("stopping scan at {} posts", self.config.max_posts);
                    break 'pages;
                }
            }

            cursor = page.last().cloned();
        }

        tracing::info!(
            "scanned {} posts in {}, {} club members",
            report.posts_scanned,
            community,
            report.entries.len()
        );
        Ok(report)
    }

    fn interrupted(&self, mut report: ScanReport, err: ClubError) -> ScanReport {
        let err = match err {
            err @ ClubError::MalformedFeed(_) => err,
            other => ClubError::MalformedFeed(other.to_string()),
        };
        report.interrupted = true;

        match self.config.policy {
            PartialScanPolicy::Discard => {
                tracing::warn!("{}; discarding {} roster entries", err, report.entries.len());
                report.entries.clear();
            }
            PartialScanPolicy::RetainPartial => {
                tracing::warn!("{}; keeping {} roster entries", err, report.entries.len());
            }
        }
        report
    }
}
