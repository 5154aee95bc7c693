//! Store review prompt gating.
//!
//! Every filter connect request bumps a counter. A prompt is only requested
//! for release builds, more than three days after install, on every eighth
//! connect, and at most three times per app version.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::constants;
use crate::state::RatingGateState;

/// Why no prompt is shown this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PreReleaseBuild,
    TooSoonAfterInstall { days: i64 },
    OffCadence { count: u32 },
    AlreadyAsked { times: u32 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreReleaseBuild => write!(f, "pre-release build"),
            Self::TooSoonAfterInstall { days } => {
                write!(f, "installed {days} day(s) ago")
            }
            Self::OffCadence { count } => write!(f, "connect #{count} is off cadence"),
            Self::AlreadyAsked { times } => write!(f, "already asked {times} time(s)"),
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    NoPrompt(SkipReason),
    Prompt { after: Duration },
}

/// Decision for connect number `count`, without touching any state.
#[must_use]
pub fn decide(state: &RatingGateState, count: u32, now: DateTime<Utc>) -> ReviewDecision {
    if state.is_pre_release_build {
        return ReviewDecision::NoPrompt(SkipReason::PreReleaseBuild);
    }
    let days = now.signed_duration_since(state.install_date).num_days();
    if days <= constants::RATING_MIN_DAYS_SINCE_INSTALL {
        return ReviewDecision::NoPrompt(SkipReason::TooSoonAfterInstall { days });
    }
    if count % constants::RATING_CONNECT_CADENCE != 0 {
        return ReviewDecision::NoPrompt(SkipReason::OffCadence { count });
    }
    if state.rating_triggered_count >= constants::RATING_MAX_PROMPTS {
        return ReviewDecision::NoPrompt(SkipReason::AlreadyAsked {
            times: state.rating_triggered_count,
        });
    }
    ReviewDecision::Prompt {
        after: constants::RATING_PROMPT_DELAY,
    }
}

/// Count a filter connect request and decide whether to prompt.
///
/// The caller persists `state` afterwards; the incremented count is kept
/// whatever the decision.
pub fn record_connect(state: &mut RatingGateState, now: DateTime<Utc>) -> ReviewDecision {
    state.rating_count = state.rating_count.saturating_add(1);
    let decision = decide(state, state.rating_count, now);
    match decision {
        ReviewDecision::Prompt { after } => log::info!(
            "[rating] connect #{} qualifies, prompting in {}s",
            state.rating_count,
            after.as_secs_f32()
        ),
        ReviewDecision::NoPrompt(reason) => {
            log::info!("[rating] connect #{}: skipping ({reason})", state.rating_count);
        }
    }
    decision
}

/// Count a prompt that was actually shown.
pub fn record_prompt_shown(state: &mut RatingGateState) {
    state.rating_triggered_count = state.rating_triggered_count.saturating_add(1);
}
