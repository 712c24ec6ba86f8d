use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

mod cache;
mod eligibility;
mod error;
mod models;
mod report;
mod scanner;
mod sources;

use cache::CachedChain;
use eligibility::EligibilityEngine;
use error::ClubError;
use models::ClubTier;
use scanner::{MembershipScanner, PartialScanPolicy, ScanConfig};
use sources::{node::DEFAULT_NODE_URL, sds::DEFAULT_SDS_URL, NodeClient, SdsClient};

#[derive(Parser)]
#[command(name = "club-check")]
#[command(about = "Steem club tag power up checker", long_about = None)]
struct Cli {
    /// Steem node JSON-RPC endpoint
    #[arg(long, env = "STEEM_NODE_URL", default_value = DEFAULT_NODE_URL, global = true)]
    node_url: Url,
    /// SteemWorld SDS API base URL
    #[arg(long, env = "SDS_API_URL", default_value = DEFAULT_SDS_URL, global = true)]
    sds_url: Url,
    #[arg(long, env = "CLUB_HTTP_TIMEOUT_SECS", default_value_t = 30, global = true)]
    timeout_secs: u64,
    /// Lifetime of cached window queries; kept for the whole run when unset
    #[arg(long, env = "CLUB_CACHE_TTL_SECS", global = true)]
    cache_ttl_secs: Option<u64>,
    /// Lifetime of cached chain state (accounts, delegations, vesting totals)
    #[arg(long, default_value_t = 600, global = true)]
    state_ttl_secs: u64,
    /// Emit logs as JSON
    #[arg(long, env = "CLUB_LOG_JSON", global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check club eligibility for one account
    Check {
        username: String,
        /// Window in days (30, 60 or 90); repeat for several tiers
        #[arg(long = "tier", value_parser = parse_tier, default_values = ["30", "60", "90"])]
        tiers: Vec<ClubTier>,
    },
    /// Check club tag authors active in a community
    Scan {
        /// Community tag, e.g. hive-161179
        community: String,
        /// Age in hours beyond which a post no longer counts as active
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(1..))]
        freshness_hours: i64,
        #[arg(long, value_parser = parse_tier, default_value = "30")]
        tier: ClubTier,
        /// Also write the roster as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Keep members found before a feed failure instead of discarding them
        #[arg(long)]
        retain_partial: bool,
        /// Consecutive posts older than the freshness window that end the scan
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        stale_run_limit: u64,
        #[arg(long, default_value_t = 10_000)]
        max_posts: usize,
    },
}

fn parse_tier(value: &str) -> Result<ClubTier, String> {
    let days: u32 = value
        .parse()
        .map_err(|_| format!("{value:?} is not a number of days"))?;
    ClubTier::from_duration(days).ok_or_else(|| ClubError::InvalidWindowDuration(days).to_string())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let timeout = Duration::from_secs(cli.timeout_secs);
    let history_ttl = cli.cache_ttl_secs.map(Duration::from_secs);
    let state_ttl = Duration::from_secs(cli.state_ttl_secs);

    let node = Arc::new(
        NodeClient::new(cli.node_url.clone(), timeout, state_ttl)
            .context("failed to set up Steem node client")?,
    );
    let sds = Arc::new(
        SdsClient::new(cli.sds_url.clone(), timeout).context("failed to set up SDS client")?,
    );
    let chain = Arc::new(CachedChain::new(node.clone(), history_ttl, state_ttl));
    let history = Arc::new(CachedChain::new(sds, history_ttl, state_ttl));
    let engine = EligibilityEngine::new(chain, history.clone(), history, node.clone());

    match cli.command {
        Commands::Check { username, tiers } => {
            let username = username.trim().to_lowercase();
            match engine.check_tiers(&username, &tiers, chrono::Utc::now()).await {
                Ok(results) => {
                    print!("{}", report::build_individual_report(&username, &results));
                }
                Err(ClubError::AccountNotFound(name)) => {
                    println!("Account does not exist: {name}");
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to check @{username}"));
                }
            }
        }
        Commands::Scan {
            community,
            freshness_hours,
            tier,
            csv,
            retain_partial,
            stale_run_limit,
            max_posts,
        } => {
            let stale_run_limit =
                usize::try_from(stale_run_limit).context("stale run limit is too large")?;
            let config = ScanConfig {
                freshness: chrono::Duration::hours(freshness_hours),
                tier,
                max_posts,
                stale_run_limit,
                policy: if retain_partial {
                    PartialScanPolicy::RetainPartial
                } else {
                    PartialScanPolicy::Discard
                },
                ..ScanConfig::default()
            };
            let scanner = MembershipScanner::new(node, engine, config.clone());
            let roster = scanner
                .scan(&community, chrono::Utc::now())
                .await
                .with_context(|| format!("failed to scan community {community}"))?;

            print!("{}", report::build_roster_report(&community, &config, &roster));

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_roster_csv(file, &roster.entries)?;
                println!("Roster written to {}.", path.display());
            }
        }
    }

    Ok(())
}
