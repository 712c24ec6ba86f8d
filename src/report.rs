use std::fmt::Write;

use rust_decimal::Decimal;

use crate::models::{Balance, ClubTier, ComplianceResult, Progress, RosterEntry};
use crate::scanner::{ScanConfig, ScanReport};

fn percent(ratio: Decimal) -> Decimal {
    ratio * Decimal::ONE_HUNDRED
}

fn progress_label(progress: Progress) -> String {
    match progress {
        Progress::Ineligible => "Ineligible".to_string(),
        Progress::OnTrack { ratio } => format!("On track ({:.2} %)", percent(ratio)),
        Progress::Met { .. } => "Met".to_string(),
    }
}

/// Power up and transfer shares of total outgoing activity, in percent.
pub fn transaction_ratio(result: &ComplianceResult) -> Option<(Decimal, Decimal)> {
    let total = result.power_up_total + result.transfer_total;
    if total.is_zero() {
        return None;
    }
    Some((
        percent(result.power_up_total / total),
        percent(result.transfer_total / total),
    ))
}

pub fn build_individual_report(username: &str, results: &[(ClubTier, ComplianceResult)]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Club Check for @{}", username);

    let Some((primary_tier, primary)) = results.first() else {
        let _ = writeln!(output, "No club tiers were checked.");
        return output;
    };

    let _ = writeln!(output);
    let _ = writeln!(output, "## Outgoing Delegations");
    let _ = writeln!(
        output,
        "Not eligible if delegating to investment services or bid-bots."
    );
    if primary.delegatees.is_empty() {
        let _ = writeln!(output, "- none");
    } else {
        for delegatee in &primary.delegatees {
            let _ = writeln!(output, "- {}", delegatee);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Power Up At Least {}% Of Earnings ({} days)",
        percent(primary_tier.factor()).normalize(),
        primary.window.duration_days
    );
    let _ = writeln!(
        output,
        "Earned reward: {:.3} SP, power up total: {:.3} STEEM",
        primary.reward_total, primary.power_up_total
    );
    let _ = writeln!(
        output,
        "Club progress: {:.2} % ({})",
        percent(primary.progress().ratio()),
        progress_label(primary.progress())
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Club Targets");
    let _ = writeln!(output, "| Club | Days | Reward | Target | Power Up | Status |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for (tier, result) in results {
        let _ = writeln!(
            output,
            "| {} | {} | {:.3} | {:.3} | {:.3} | {} |",
            tier.label(),
            result.window.duration_days,
            result.reward_total,
            result.target_total,
            result.power_up_total,
            progress_label(result.progress())
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Transaction Ratio (Power Up More Than Transfer)");
    match transaction_ratio(primary) {
        Some((power_up, transfer)) => {
            let _ = writeln!(
                output,
                "Power up: {:.3} % ({:.3} STEEM), transfer: {:.3} % ({:.3} STEEM)",
                power_up, primary.power_up_total, transfer, primary.transfer_total
            );
        }
        None => {
            let _ = writeln!(output, "No power up, no transfer.");
        }
    }
    let balance = match primary.balance() {
        Balance::NoActivity => "no activity",
        Balance::NeedsMorePowerUp => "needs more power up",
        Balance::Balanced => "balanced",
    };
    let _ = writeln!(output, "Balance: {} (diff {:.3})", balance, primary.delta());

    output
}

pub fn build_roster_report(community: &str, config: &ScanConfig, report: &ScanReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Club Tag Members of {}", community);
    let _ = writeln!(
        output,
        "Active club authors in the last {}h, checked over {} days ({} posts scanned)",
        config.freshness.num_hours(),
        config.tier.duration_days(),
        report.posts_scanned
    );
    if report.interrupted {
        let _ = writeln!(output, "Warning: the community feed broke off during the scan.");
    }
    let _ = writeln!(output);

    if report.entries.is_empty() {
        let _ = writeln!(output, "No club members found for this window.");
        return output;
    }

    let _ = writeln!(output, "| Username | Reward | Power up | Transfer | Diff +,- |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for entry in &report.entries {
        let flag = if entry.delta.is_sign_negative() && !entry.delta.is_zero() {
            " !"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "| {} | {:.3} | {:.3} | {:.3} | {:.3}{} |",
            entry.username,
            entry.reward_total,
            entry.power_up_total,
            entry.transfer_total,
            entry.delta,
            flag
        );
    }

    output
}

pub fn write_roster_csv<W: std::io::Write>(
    writer: W,
    entries: &[RosterEntry],
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for entry in entries {
        csv.serialize(entry)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Window;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn result(
        days: u32,
        reward: Decimal,
        target: Decimal,
        power_up: Decimal,
        transfer: Decimal,
    ) -> ComplianceResult {
        ComplianceResult {
            username: "alice".to_string(),
            window: Window::ending_at(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap(), days),
            power_up_total: power_up,
            transfer_total: transfer,
            reward_total: reward,
            target_total: target,
            delegatees: BTreeSet::from(["bidbot".to_string()]),
        }
    }

    #[test]
    fn transaction_ratio_splits_activity() {
        let active = result(30, dec!(100), dec!(50), dec!(30), dec!(10));
        let idle = result(30, dec!(100), dec!(50), dec!(0), dec!(0));

        assert_eq!(transaction_ratio(&active).unwrap(), (dec!(75), dec!(25)));
        assert!(transaction_ratio(&idle).is_none());
    }

    #[test]
    fn individual_report_lists_every_tier() {
        let results = vec![
            (ClubTier::Club5050, result(30, dec!(100), dec!(50), dec!(60), dec!(10))),
            (ClubTier::Club100, result(90, dec!(200), dec!(200), dec!(60), dec!(10))),
        ];

        let report = build_individual_report("alice", &results);

        assert!(report.contains("# Club Check for @alice"));
        assert!(report.contains("- bidbot"));
        assert!(report.contains("At Least 50% Of Earnings (30 days)"));
        assert!(report.contains("| Club5050 | 30 | 100.000 | 50.000 | 60.000 | Met |"));
        assert!(report
            .contains("| Club100 | 90 | 200.000 | 200.000 | 60.000 | On track (30.00 %) |"));
        assert!(report.contains("Balance: balanced (diff 50.000)"));
    }

    #[test]
    fn roster_report_flags_negative_deltas() {
        let report = ScanReport {
            entries: vec![RosterEntry {
                username: "bob".to_string(),
                reward_total: dec!(12),
                power_up_total: dec!(1),
                transfer_total: dec!(5),
                delta: dec!(-4),
            }],
            posts_scanned: 4,
            interrupted: false,
        };

        let text = build_roster_report("hive-161179", &ScanConfig::default(), &report);

        assert!(text.contains("| bob | 12.000 | 1.000 | 5.000 | -4.000 ! |"));
        assert!(text.contains("in the last 24h, checked over 30 days (4 posts scanned)"));
    }

    #[test]
    fn roster_header_reports_configured_freshness() {
        let config = ScanConfig {
            freshness: chrono::Duration::hours(6),
            tier: ClubTier::Club75,
            ..ScanConfig::default()
        };

        let text = build_roster_report("hive-161179", &config, &ScanReport::default());

        assert!(text.contains("in the last 6h, checked over 60 days"));
        assert!(!text.contains("24h"));
    }

    #[test]
    fn empty_roster_says_so() {
        let text = build_roster_report(
            "hive-161179",
            &ScanConfig::default(),
            &ScanReport {
                interrupted: true,
                ..ScanReport::default()
            },
        );
        assert!(text.contains("broke off"));
        assert!(text.contains("No club members found"));
    }

    #[test]
    fn roster_csv_uses_table_headers() {
        let entries = vec![RosterEntry {
            username: "alice".to_string(),
            reward_total: dec!(10.5),
            power_up_total: dec!(6),
            transfer_total: dec!(1),
            delta: dec!(5),
        }];
        let mut buffer = Vec::new();

        write_roster_csv(&mut buffer, &entries).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Username,Reward,Power up,Transfer,\"Diff +,-\""));
        assert_eq!(lines.next(), Some("alice,10.5,6,1,5"));
    }
}
