//! Application-wide constants and configuration values.
//!
//! Timing intervals, rating thresholds, API endpoints, file names and the
//! user-facing messages attached to notices.

use std::time::Duration;

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Current application version (from Cargo.toml).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// === Timing Configuration ===

/// Interval between usage metrics refreshes.
pub const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
/// How long `toggle` waits for a tunnel to settle before giving up.
pub const TOGGLE_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

// === Review Prompt ===

/// Rating counters are scoped to this key; bumping it resets them.
pub const RATING_VERSION_KEY: &str = "1.0";
/// Days after install before the prompt may appear (exclusive).
pub const RATING_MIN_DAYS_SINCE_INSTALL: i64 = 3;
/// Only every Nth filter connect may prompt.
pub const RATING_CONNECT_CADENCE: u32 = 8;
/// Upper bound on prompts per version.
pub const RATING_MAX_PROMPTS: u32 = 3;
/// Delay between a qualifying connect and the prompt.
pub const RATING_PROMPT_DELAY: Duration = Duration::from_secs(5);

// === Remote API ===

/// Default base URL of the subscription API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.lockdownprivacy.com";
/// Session sign-in endpoint (relative to the base URL).
pub const API_SIGNIN_PATH: &str = "signin";
/// Tunnel key endpoint (relative to the base URL).
pub const API_GET_KEY_PATH: &str = "get-key";
/// Timeout for API calls in seconds.
pub const API_TIMEOUT_SECS: u64 = 30;
/// API code: the receipt holds no subscription.
pub const API_CODE_NO_SUBSCRIPTION_IN_RECEIPT: i64 = 9;
/// API code: the subscription in the receipt has lapsed.
pub const API_CODE_NO_ACTIVE_SUBSCRIPTION: i64 = 38;

// === Path Configuration ===

/// Name of the application config directory.
pub const CONFIG_DIR_NAME: &str = "lockdown";
/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Persisted settings file name.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
/// Directory holding installed tunnel credentials.
pub const CREDENTIALS_DIR_NAME: &str = "credentials";
/// Installed secure tunnel credential file.
pub const CREDENTIAL_FILE_NAME: &str = "secure-tunnel.toml";
/// Blocked-connection counters written by the filter.
pub const METRICS_FILE_NAME: &str = "metrics.json";

// === Notice Messages ===

pub const TITLE_TRY_AGAIN: &str = "Network Error";
pub const MSG_TRY_AGAIN: &str = "Please check your connection and try again.";
pub const TITLE_SUBSCRIPTION_EXPIRED: &str = "VPN Subscription Expired";
pub const MSG_SUBSCRIPTION_EXPIRED: &str =
    "Please renew your subscription to activate the Secure Tunnel.";
pub const TITLE_SIGN_IN_ERROR: &str = "Error Signing In To Verify Subscription";
pub const TITLE_ACTIVATION_ERROR: &str = "Error Activating Secure Tunnel";
pub const TITLE_FILTER_ACTIVATED: &str = "Firewall Activated";
pub const MSG_FILTER_ACTIVATED: &str = "Trackers, ads, and other malicious scripts are now blocked in all your apps.\n\nGet maximum privacy with a Secure Tunnel that encrypts your connections, anonymizes your browsing history, and hides your location.";

// === Metrics Display ===

/// Placeholder shown when a counter cannot be read.
pub const MSG_NO_DATA: &str = "---";
