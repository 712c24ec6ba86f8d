use thiserror::Error;

/// Errors raised while checking club eligibility.
#[derive(Error, Debug)]
pub enum ClubError {
    /// The account does not exist on chain
    #[error("Account does not exist: {0}")]
    AccountNotFound(String),

    /// An event, reward or node source failed to answer
    #[error("{source_name} unavailable: {cause}")]
    UpstreamUnavailable {
        /// Name of the failing source
        source_name: &'static str,
        /// Underlying failure
        cause: String,
    },

    /// The community feed broke off mid-scan
    #[error("Malformed community feed: {0}")]
    MalformedFeed(String),

    /// A window duration outside the club tier set
    #[error("Invalid window duration: {0} days (expected 30, 60 or 90)")]
    InvalidWindowDuration(u32),
}

impl ClubError {
    pub fn upstream(source_name: &'static str, cause: impl std::fmt::Display) -> Self {
        ClubError::UpstreamUnavailable {
            source_name,
            cause: cause.to_string(),
        }
    }
}
