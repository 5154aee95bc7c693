//! Secure tunnel activation chain.
//!
//! Before the secure tunnel may connect, the subscription is verified and a
//! fresh key is installed:
//!
//! ```text
//! Idle -> Authenticating -> FetchingCredential -> InstallingCredential
//!      -> RequestingEnable -> Done
//! ```
//!
//! Each step waits for the previous one. The first failure ends the attempt
//! in [`ActivationPhase::Failed`]; nothing is retried. One orchestrator runs
//! one attempt and is then dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::event::{Message, StatusSink};
use crate::services::{
    ApiError, CredentialStore, SubscriptionApi, TunnelSystem, TunnelSystemError,
};
use crate::state::TunnelKind;

/// Why an attempt ended early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to install tunnel credential: {0}")]
    CredentialInstall(String),
    #[error("failed to enable secure tunnel: {0}")]
    Enable(#[from] TunnelSystemError),
    #[error("activation cancelled")]
    Cancelled,
}

/// What the user should be shown after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Generic "check your connection and try again".
    TryAgain,
    /// Straight to the subscription purchase flow.
    Purchase,
    /// Renewal notice, then the purchase flow.
    RenewThenPurchase,
    /// Show the raw error message.
    ShowMessage(String),
    /// Nothing to show.
    Silent,
}

impl ActivationError {
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Api(ApiError::Transport(_)) => Recovery::TryAgain,
            Self::Api(ApiError::NoSubscriptionInReceipt) => Recovery::Purchase,
            Self::Api(ApiError::NoActiveSubscription) => Recovery::RenewThenPurchase,
            Self::Api(error @ ApiError::Other { .. }) => Recovery::ShowMessage(error.to_string()),
            Self::CredentialInstall(_) | Self::Enable(_) => Recovery::ShowMessage(self.to_string()),
            Self::Cancelled => Recovery::Silent,
        }
    }
}

impl Recovery {
    /// Recovery for the result of a standalone subscription check.
    #[must_use]
    pub fn for_subscription(result: &Result<(), ApiError>) -> Self {
        match result {
            Ok(()) => Self::Silent,
            // A lapsed or missing subscription on an already running tunnel
            // is reported as expired either way.
            Err(ApiError::NoSubscriptionInReceipt | ApiError::NoActiveSubscription) => {
                Self::RenewThenPurchase
            }
            Err(ApiError::Transport(_)) => Self::TryAgain,
            Err(error @ ApiError::Other { .. }) => Self::ShowMessage(error.to_string()),
        }
    }
}

/// Where an attempt is in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActivationPhase {
    #[default]
    Idle,
    Authenticating,
    FetchingCredential,
    InstallingCredential,
    RequestingEnable,
    Done,
    Failed(ActivationError),
}

impl std::fmt::Display for ActivationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::FetchingCredential => write!(f, "fetching credential"),
            Self::InstallingCredential => write!(f, "installing credential"),
            Self::RequestingEnable => write!(f, "requesting enable"),
            Self::Done => write!(f, "done"),
            Self::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Result of one attempt, delivered to the controller inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub attempt: u64,
    pub result: Result<(), ActivationError>,
}

/// Runs a single activation attempt.
pub struct ActivationOrchestrator {
    attempt: u64,
    phase: ActivationPhase,
    api: Arc<dyn SubscriptionApi>,
    credentials: Arc<dyn CredentialStore>,
    tunnels: Arc<dyn TunnelSystem>,
}

impl ActivationOrchestrator {
    #[must_use]
    pub fn new(
        attempt: u64,
        api: Arc<dyn SubscriptionApi>,
        credentials: Arc<dyn CredentialStore>,
        tunnels: Arc<dyn TunnelSystem>,
    ) -> Self {
        Self {
            attempt,
            phase: ActivationPhase::Idle,
            api,
            credentials,
            tunnels,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &ActivationPhase {
        &self.phase
    }

    /// Run the chain to completion. `cancel` is checked before every step.
    ///
    /// # Errors
    ///
    /// Returns the first step failure, or [`ActivationError::Cancelled`].
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<(), ActivationError> {
        let result = self.chain(cancel);
        match &result {
            Ok(()) => {
                log::info!("[activation] attempt {} done", self.attempt);
                self.phase = ActivationPhase::Done;
            }
            Err(error) => {
                log::warn!(
                    "[activation] attempt {} failed while {}: {error}",
                    self.attempt,
                    self.phase
                );
                self.phase = ActivationPhase::Failed(error.clone());
            }
        }
        result
    }

    fn chain(&mut self, cancel: &AtomicBool) -> Result<(), ActivationError> {
        self.enter(ActivationPhase::Authenticating, cancel)?;
        let session = self.api.authenticate()?;

        self.enter(ActivationPhase::FetchingCredential, cancel)?;
        let credential = self.api.fetch_credential(&session)?;

        self.enter(ActivationPhase::InstallingCredential, cancel)?;
        self.credentials
            .install(&credential)
            .map_err(|e| ActivationError::CredentialInstall(e.to_string()))?;

        self.enter(ActivationPhase::RequestingEnable, cancel)?;
        self.tunnels.set_enabled(TunnelKind::SecureTunnel, true)?;
        Ok(())
    }

    fn enter(&mut self, phase: ActivationPhase, cancel: &AtomicBool) -> Result<(), ActivationError> {
        if cancel.load(Ordering::SeqCst) {
            return Err(ActivationError::Cancelled);
        }
        log::debug!("[activation] attempt {}: {phase}", self.attempt);
        self.phase = phase;
        Ok(())
    }

    /// Run on a worker thread and post the report to `sink`.
    pub fn spawn(mut self, cancel: Arc<AtomicBool>, sink: StatusSink) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let result = self.run(&cancel);
            let report = ActivationReport {
                attempt: self.attempt,
                result,
            };
            if !sink.send(Message::Activation(report)) {
                log::debug!("[activation] controller gone, dropping report");
            }
        })
    }
}
