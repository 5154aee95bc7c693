//! Seams to the outside world.
//!
//! The controller never reaches for globals: the OS tunnel subsystem, the
//! subscription API, credential storage and the store review prompt are all
//! handed to it as trait objects bundled in [`Services`].

pub mod api;
pub mod credentials;
pub mod review;
pub mod system;

use std::sync::Arc;

use serde::Deserialize;

use crate::constants;
use crate::state::{TunnelKind, TunnelStatus};

pub use api::HttpSubscriptionApi;
pub use credentials::FileCredentialStore;
pub use review::BrowserRatingPrompt;
pub use system::CommandTunnelSystem;

/// Failures reported by the subscription API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("no subscription found in receipt")]
    NoSubscriptionInReceipt,
    #[error("subscription is no longer active")]
    NoActiveSubscription,
    /// Network, DNS or TLS failure before a usable response arrived.
    #[error("network error: {0}")]
    Transport(String),
    #[error("API error {code}: {message}")]
    Other { code: i64, message: String },
}

impl ApiError {
    /// Map an error code from an API response body.
    #[must_use]
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        match code {
            constants::API_CODE_NO_SUBSCRIPTION_IN_RECEIPT => Self::NoSubscriptionInReceipt,
            constants::API_CODE_NO_ACTIVE_SUBSCRIPTION => Self::NoActiveSubscription,
            _ => Self::Other {
                code,
                message: message.into(),
            },
        }
    }
}

/// Classified result of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Authenticated,
    NoSubscriptionInReceipt,
    NoActiveSubscription,
    TransportError(String),
    OtherApiError(i64),
}

impl<T> From<&Result<T, ApiError>> for SubscriptionOutcome {
    fn from(result: &Result<T, ApiError>) -> Self {
        match result {
            Ok(_) => Self::Authenticated,
            Err(ApiError::NoSubscriptionInReceipt) => Self::NoSubscriptionInReceipt,
            Err(ApiError::NoActiveSubscription) => Self::NoActiveSubscription,
            Err(ApiError::Transport(detail)) => Self::TransportError(detail.clone()),
            Err(ApiError::Other { code, .. }) => Self::OtherApiError(*code),
        }
    }
}

/// Session token returned by a successful sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(pub String);

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Secure tunnel connection key issued by the API.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TunnelCredential {
    /// Opaque key identifier.
    pub id: String,
    /// Base64-encoded key material.
    #[serde(rename = "b64")]
    pub key_base64: String,
}

impl std::fmt::Debug for TunnelCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelCredential")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Local credential installation failures.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("key material is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    #[error("failed to store credential: {0}")]
    Storage(String),
}

/// OS tunnel subsystem failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelSystemError {
    #[error("{kind} is not configured")]
    NotConfigured { kind: TunnelKind },
    #[error("failed to run {kind} command: {message}")]
    Command { kind: TunnelKind, message: String },
}

/// The OS facility that actually brings tunnels up and down.
///
/// Status changes are not returned here; implementations push them into the
/// controller inbox as they happen.
pub trait TunnelSystem: Send + Sync {
    /// Status as currently reported by the OS.
    fn status(&self, kind: TunnelKind) -> TunnelStatus;

    /// Ask the OS to enable or disable `kind`. Returns once the request is
    /// handed off.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be handed off.
    fn set_enabled(&self, kind: TunnelKind, enabled: bool) -> Result<(), TunnelSystemError>;
}

/// Remote subscription service.
pub trait SubscriptionApi: Send + Sync {
    /// Exchange the stored receipt for a session.
    ///
    /// # Errors
    ///
    /// Returns the classified API failure.
    fn authenticate(&self) -> Result<SessionToken, ApiError>;

    /// Request a fresh secure tunnel key.
    ///
    /// # Errors
    ///
    /// Returns the classified API failure.
    fn fetch_credential(&self, session: &SessionToken) -> Result<TunnelCredential, ApiError>;
}

/// Where installed tunnel keys are kept for the OS tunnel subsystem.
pub trait CredentialStore: Send + Sync {
    /// Persist `credential`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or cannot be written.
    fn install(&self, credential: &TunnelCredential) -> Result<(), CredentialError>;
}

/// Platform store-review facility. Fire and forget.
pub trait RatingPrompt: Send + Sync {
    fn request_review(&self);
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Services {
    pub tunnels: Arc<dyn TunnelSystem>,
    pub api: Arc<dyn SubscriptionApi>,
    pub credentials: Arc<dyn CredentialStore>,
    pub rating: Arc<dyn RatingPrompt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_codes_are_classified() {
        assert_eq!(
            ApiError::from_code(constants::API_CODE_NO_SUBSCRIPTION_IN_RECEIPT, "x"),
            ApiError::NoSubscriptionInReceipt
        );
        assert_eq!(
            ApiError::from_code(constants::API_CODE_NO_ACTIVE_SUBSCRIPTION, "x"),
            ApiError::NoActiveSubscription
        );
        assert_eq!(
            ApiError::from_code(1, "user not found"),
            ApiError::Other {
                code: 1,
                message: "user not found".to_string()
            }
        );
    }

    #[test]
    fn test_subscription_outcome_from_result() {
        let ok: Result<(), ApiError> = Ok(());
        assert_eq!(SubscriptionOutcome::from(&ok), SubscriptionOutcome::Authenticated);

        let lapsed: Result<(), ApiError> = Err(ApiError::NoActiveSubscription);
        assert_eq!(
            SubscriptionOutcome::from(&lapsed),
            SubscriptionOutcome::NoActiveSubscription
        );

        let other: Result<(), ApiError> = Err(ApiError::Other {
            code: 42,
            message: "boom".to_string(),
        });
        assert_eq!(
            SubscriptionOutcome::from(&other),
            SubscriptionOutcome::OtherApiError(42)
        );
    }

    #[test]
    fn test_secrets_are_not_debug_printed() {
        let credential = TunnelCredential {
            id: "key-1".to_string(),
            key_base64: "c2VjcmV0".to_string(),
        };
        let printed = format!("{credential:?} {:?}", SessionToken("tok".to_string()));
        assert!(printed.contains("key-1"));
        assert!(!printed.contains("c2VjcmV0"));
        assert!(!printed.contains("tok\""));
    }
}
