use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use rust_decimal::Decimal;

use crate::error::ClubError;
use crate::models::{
    ActivityRow, Balance, ClubTier, ComplianceResult, EventKind, MonetaryEvent, Progress,
    RewardSummary, Window,
};
use crate::sources::{AccountDirectory, EventFetcher, RewardFetcher, VestsConverter};

/// Classifies a raw activity row for `subject`.
///
/// A vesting transfer is a power up only when it goes back to the sender.
/// A transfer counts only when it leaves `subject` for another account.
pub fn classify_row(row: &ActivityRow, subject: &str) -> Option<MonetaryEvent> {
    let kind = match row.operation {
        EventKind::PowerUp if row.from == row.to => EventKind::PowerUp,
        EventKind::Transfer if row.from == subject && row.to != subject => EventKind::Transfer,
        _ => return None,
    };

    Some(MonetaryEvent {
        timestamp: row.timestamp,
        from: row.from.clone(),
        to: row.to.clone(),
        amount: row.amount,
        kind,
    })
}

pub fn aggregate_power_ups(events: &[MonetaryEvent], window: &Window) -> Decimal {
    events
        .iter()
        .filter(|e| e.kind == EventKind::PowerUp && e.from == e.to)
        .filter(|e| window.contains(e.timestamp))
        .map(|e| e.amount.max(Decimal::ZERO))
        .sum()
}

pub fn aggregate_transfers(
    events: &[MonetaryEvent],
    subject: &str,
    window: &Window,
) -> Decimal {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Transfer && e.to != subject)
        .filter(|e| window.contains(e.timestamp))
        .map(|e| e.amount.max(Decimal::ZERO))
        .sum()
}

pub fn compute_target(reward_total: Decimal, duration_days: u32) -> Result<Decimal, ClubError> {
    ClubTier::from_duration(duration_days)
        .map(|tier| reward_total * tier.factor())
        .ok_or(ClubError::InvalidWindowDuration(duration_days))
}

pub fn classify_progress(power_up_total: Decimal, target_total: Decimal) -> Progress {
    if power_up_total <= Decimal::ZERO || target_total <= Decimal::ZERO {
        return Progress::Ineligible;
    }

    if power_up_total > target_total {
        Progress::Met { ratio: Decimal::ONE }
    } else {
        Progress::OnTrack {
            ratio: power_up_total / target_total,
        }
    }
}

pub fn classify_balance(power_up_total: Decimal, transfer_total: Decimal) -> Balance {
    if power_up_total.is_zero() && transfer_total.is_zero() {
        Balance::NoActivity
    } else if power_up_total < transfer_total {
        Balance::NeedsMorePowerUp
    } else {
        Balance::Balanced
    }
}

/// Builds compliance results from injected collaborators.
#[derive(Clone)]
pub struct EligibilityEngine {
    accounts: Arc<dyn AccountDirectory>,
    events: Arc<dyn EventFetcher>,
    rewards: Arc<dyn RewardFetcher>,
    converter: Arc<dyn VestsConverter>,
}

impl EligibilityEngine {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        events: Arc<dyn EventFetcher>,
        rewards: Arc<dyn RewardFetcher>,
        converter: Arc<dyn VestsConverter>,
    ) -> Self {
        Self {
            accounts,
            events,
            rewards,
            converter,
        }
    }

    pub async fn build_compliance_result(
        &self,
        username: &str,
        window: &Window,
    ) -> Result<ComplianceResult, ClubError> {
        self.ensure_account(username).await?;
        let delegatees = self.delegatees(username).await?;
        self.compute(username, window, &delegatees).await
    }

    /// One account lookup and one delegation lookup, then one result per
    /// tier, computed concurrently.
    pub async fn check_tiers(
        &self,
        username: &str,
        tiers: &[ClubTier],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<(ClubTier, ComplianceResult)>, ClubError> {
        self.ensure_account(username).await?;
        let delegatees = self.delegatees(username).await?;

        let windows: Vec<(ClubTier, Window)> = tiers
            .iter()
            .map(|tier| (*tier, Window::ending_at(now, tier.duration_days())))
            .collect();

        let delegatees = &delegatees;
        try_join_all(windows.iter().map(|(tier, window)| async move {
            let result = self.compute(username, window, delegatees).await?;
            Ok::<_, ClubError>((*tier, result))
        }))
        .await
    }

    pub async fn reward_summary(
        &self,
        username: &str,
        window: &Window,
    ) -> Result<RewardSummary, ClubError> {
        let vests = self.rewards.author_reward_vests(username, window).await?;
        let total_reward_power = self.converter.vests_to_power(vests).await?;
        Ok(RewardSummary {
            total_reward_power,
            window_duration_days: window.duration_days,
        })
    }

    async fn ensure_account(&self, username: &str) -> Result<(), ClubError> {
        if self.accounts.account_exists(username).await? {
            Ok(())
        } else {
            tracing::info!("account {} not found", username);
            Err(ClubError::AccountNotFound(username.to_string()))
        }
    }

    async fn delegatees(&self, username: &str) -> Result<BTreeSet<String>, ClubError> {
        Ok(self.accounts.delegatees(username).await?.into_iter().collect())
    }

    async fn compute(
        &self,
        username: &str,
        window: &Window,
        delegatees: &BTreeSet<String>,
    ) -> Result<ComplianceResult, ClubError> {
        // Reject unknown durations before touching the network.
        compute_target(Decimal::ZERO, window.duration_days)?;

        let reward = self.reward_summary(username, window).await?;
        let target_total = compute_target(reward.total_reward_power, reward.window_duration_days)?;

        let mut events = Vec::new();
        for kind in [EventKind::PowerUp, EventKind::Transfer] {
            let rows = self.events.fetch_activity(username, kind, window).await?;
            events.extend(rows.iter().filter_map(|row| classify_row(row, username)));
        }

        let result = ComplianceResult {
            username: username.to_string(),
            window: *window,
            power_up_total: aggregate_power_ups(&events, window),
            transfer_total: aggregate_transfers(&events, username, window),
            reward_total: reward.total_reward_power,
            target_total,
            delegatees: delegatees.clone(),
        };

        tracing::debug!(
            "{} over {} days: reward {} target {} power up {} transfer {}",
            username,
            window.duration_days,
            result.reward_total,
            result.target_total,
            result.power_up_total,
            result.transfer_total
        );
        Ok(result)
    }
}
