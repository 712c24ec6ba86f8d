use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transfer,
    PowerUp,
}

impl EventKind {
    /// Operation name used by the indexing API.
    pub fn op_name(self) -> &'static str {
        match self {
            EventKind::Transfer => "transfer",
            EventKind::PowerUp => "transfer_to_vesting",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonetaryEvent {
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub kind: EventKind,
}

/// Raw account-activity row before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRow {
    pub operation: EventKind,
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub duration_days: u32,
}

impl Window {
    /// Window of `duration_days` ending at UTC midnight of the day containing `now`.
    pub fn ending_at(now: DateTime<Utc>, duration_days: u32) -> Self {
        let stop = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let start = stop - Duration::days(i64::from(duration_days));
        Self {
            start,
            stop,
            duration_days,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.stop
    }

    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn stop_epoch(&self) -> i64 {
        self.stop.timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClubTier {
    Club5050,
    Club75,
    Club100,
}

impl ClubTier {
    pub const ALL: [ClubTier; 3] = [ClubTier::Club5050, ClubTier::Club75, ClubTier::Club100];

    pub fn duration_days(self) -> u32 {
        match self {
            ClubTier::Club5050 => 30,
            ClubTier::Club75 => 60,
            ClubTier::Club100 => 90,
        }
    }

    /// Share of earned rewards that must be powered up.
    pub fn factor(self) -> Decimal {
        match self {
            ClubTier::Club5050 => Decimal::new(5, 1),
            ClubTier::Club75 => Decimal::new(75, 2),
            ClubTier::Club100 => Decimal::ONE,
        }
    }

    pub fn from_duration(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.duration_days() == days)
    }

    pub fn label(self) -> &'static str {
        match self {
            ClubTier::Club5050 => "Club5050",
            ClubTier::Club75 => "Club75",
            ClubTier::Club100 => "Club100",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardSummary {
    pub total_reward_power: Decimal,
    pub window_duration_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Ineligible,
    OnTrack { ratio: Decimal },
    Met { ratio: Decimal },
}

impl Progress {
    pub fn ratio(&self) -> Decimal {
        match self {
            Progress::Ineligible => Decimal::ZERO,
            Progress::OnTrack { ratio } | Progress::Met { ratio } => *ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    NoActivity,
    NeedsMorePowerUp,
    Balanced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceResult {
    pub username: String,
    pub window: Window,
    pub power_up_total: Decimal,
    pub transfer_total: Decimal,
    pub reward_total: Decimal,
    pub target_total: Decimal,
    pub delegatees: BTreeSet<String>,
}

impl ComplianceResult {
    pub fn progress(&self) -> Progress {
        crate::eligibility::classify_progress(self.power_up_total, self.target_total)
    }

    pub fn balance(&self) -> Balance {
        crate::eligibility::classify_balance(self.power_up_total, self.transfer_total)
    }

    pub fn delta(&self) -> Decimal {
        self.power_up_total - self.transfer_total
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RosterEntry {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Reward")]
    pub reward_total: Decimal,
    #[serde(rename = "Power up")]
    pub power_up_total: Decimal,
    #[serde(rename = "Transfer")]
    pub transfer_total: Decimal,
    #[serde(rename = "Diff +,-")]
    pub delta: Decimal,
}

impl From<&ComplianceResult> for RosterEntry {
    fn from(result: &ComplianceResult) -> Self {
        Self {
            username: result.username.clone(),
            reward_total: result.reward_total,
            power_up_total: result.power_up_total,
            transfer_total: result.transfer_total,
            delta: result.delta(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub author: String,
    pub permlink: String,
    pub created: DateTime<Utc>,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_anchored_at_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 17, 42, 5).unwrap();
        let window = Window::ending_at(now, 30);
        assert_eq!(window.stop, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 2, 13, 0, 0, 0).unwrap());
        assert!(window.contains(window.start));
        assert!(!window.contains(window.stop));
    }

    #[test]
    fn tiers_are_ordered_by_duration() {
        let days: Vec<u32> = ClubTier::ALL.iter().map(|t| t.duration_days()).collect();
        assert_eq!(days, vec![30, 60, 90]);
        assert_eq!(ClubTier::from_duration(60), Some(ClubTier::Club75));
        assert_eq!(ClubTier::from_duration(45), None);
    }
}
