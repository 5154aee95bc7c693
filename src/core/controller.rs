//! Dual tunnel controller.
//!
//! Owns the reconciled status of both tunnels and the user's persisted
//! intent. OS notifications, activation results and timers all arrive through
//! one inbox and are applied here, on the owning thread; observers learn
//! about changes through [`Notice`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use super::activation::{ActivationError, ActivationOrchestrator, ActivationReport, Recovery};
use super::metrics::BlockMetrics;
use super::rating::{self, ReviewDecision};
use crate::constants;
use crate::event::{Message, RawStatusEvent, StatusSink};
use crate::services::{ApiError, Services, SubscriptionOutcome};
use crate::state::{
    DesiredState, RatingGateState, Settings, SettingsStore, Transition, TunnelKind, TunnelState,
    TunnelStatus,
};

/// Something observers should show or act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A tunnel's published status changed.
    StatusChanged(Transition),
    /// Error dialog.
    ShowError { title: String, message: String },
    /// Open the subscription purchase flow.
    RouteToPurchase,
    /// Show the renewal notice, then the purchase flow.
    SubscriptionExpired,
    /// The filter may not be enabled before the privacy policy is accepted.
    ConsentRequired,
    /// The filter connected for the first time and no secure tunnel exists yet.
    SecureTunnelUpsell,
    /// The store review prompt was requested.
    ReviewRequested,
    /// Fresh usage counters.
    Metrics(BlockMetrics),
}

/// What a toggle request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    EnableRequested,
    DisableRequested,
    /// The secure tunnel activation chain was started.
    ActivationStarted,
    /// An activation attempt is still outstanding.
    ActivationInFlight,
    /// The tunnel is mid-transition; nothing was done.
    Ignored(TunnelStatus),
    ConsentRequired,
}

struct InFlight {
    attempt: u64,
    cancel: Arc<AtomicBool>,
}

pub struct DualTunnelController {
    services: Services,
    store: Box<dyn SettingsStore>,
    settings: Settings,
    filter: TunnelState,
    secure: TunnelState,
    inbox: Receiver<Message>,
    sink: StatusSink,
    notices: Sender<Notice>,
    activation: Option<InFlight>,
    attempts: u64,
    review_delay: Option<Duration>,
    review_pending: bool,
    metrics: BlockMetrics,
}

impl DualTunnelController {
    /// Build a controller seeded from the OS-reported status and persisted
    /// settings. `sink` must feed `inbox`.
    pub fn new(
        services: Services,
        store: Box<dyn SettingsStore>,
        sink: StatusSink,
        inbox: Receiver<Message>,
        notices: Sender<Notice>,
    ) -> Self {
        let settings = store.load();
        let mut controller = Self {
            filter: TunnelState::new(TunnelKind::Filter, TunnelStatus::Invalid),
            secure: TunnelState::new(TunnelKind::SecureTunnel, TunnelStatus::Invalid),
            services,
            store,
            settings,
            inbox,
            sink,
            notices,
            activation: None,
            attempts: 0,
            review_delay: None,
            review_pending: false,
            metrics: BlockMetrics::default(),
        };
        for kind in TunnelKind::ALL {
            let reported = controller.services.tunnels.status(kind);
            let reconciled = controller.reconcile(kind, reported);
            *controller.state_mut(kind) = TunnelState::new(kind, reconciled);
            log::info!("[controller] initial {kind} status: {reconciled} (reported {reported})");
        }
        controller
    }

    /// Override the delay before a qualifying review prompt.
    #[must_use]
    pub fn with_review_delay(mut self, delay: Duration) -> Self {
        self.review_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn status(&self, kind: TunnelKind) -> TunnelStatus {
        self.state(kind).current()
    }

    #[must_use]
    pub fn desired(&self, kind: TunnelKind) -> DesiredState {
        self.settings.desired(kind)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn rating_state(&self) -> &RatingGateState {
        &self.settings.rating
    }

    #[must_use]
    pub const fn metrics(&self) -> BlockMetrics {
        self.metrics
    }

    #[must_use]
    pub const fn is_activating(&self) -> bool {
        self.activation.is_some()
    }

    /// A review prompt was scheduled and has not been shown yet.
    #[must_use]
    pub const fn review_pending(&self) -> bool {
        self.review_pending
    }

    /// Record whether this build is a pre-release; those never prompt.
    pub fn set_pre_release_build(&mut self, pre_release: bool) {
        if self.settings.rating.is_pre_release_build != pre_release {
            self.settings.rating.is_pre_release_build = pre_release;
            self.persist();
        }
    }

    /// Record acceptance of the filter privacy policy.
    pub fn agree_to_policy(&mut self) {
        if !self.settings.has_agreed_to_filter_policy {
            log::info!("[controller] filter privacy policy accepted");
            self.settings.has_agreed_to_filter_policy = true;
            self.persist();
        }
    }

    /// Apply the toggle policy for `kind`.
    pub fn toggle(&mut self, kind: TunnelKind) -> ToggleOutcome {
        let outcome = match kind {
            TunnelKind::Filter => self.toggle_filter(),
            TunnelKind::SecureTunnel => self.toggle_secure(),
        };
        log::info!("[controller] toggle {kind}: {outcome:?}");
        outcome
    }

    fn toggle_filter(&mut self) -> ToggleOutcome {
        if !self.settings.has_agreed_to_filter_policy {
            self.notify(Notice::ConsentRequired);
            return ToggleOutcome::ConsentRequired;
        }
        match self.filter.current() {
            TunnelStatus::Invalid => {
                self.set_desired(TunnelKind::Filter, true);
                self.request(TunnelKind::Filter, true);
                ToggleOutcome::EnableRequested
            }
            TunnelStatus::Disconnected => {
                self.set_desired(TunnelKind::Filter, true);
                self.publish(TunnelKind::Filter, TunnelStatus::Connecting);
                self.request(TunnelKind::Filter, true);
                self.consult_review_gate();
                ToggleOutcome::EnableRequested
            }
            TunnelStatus::Connected => {
                self.set_desired(TunnelKind::Filter, false);
                self.publish(TunnelKind::Filter, TunnelStatus::Disconnecting);
                self.request(TunnelKind::Filter, false);
                ToggleOutcome::DisableRequested
            }
            status @ (TunnelStatus::Connecting
            | TunnelStatus::Disconnecting
            | TunnelStatus::Reasserting) => ToggleOutcome::Ignored(status),
        }
    }

    fn toggle_secure(&mut self) -> ToggleOutcome {
        match self.secure.current() {
            status if status.is_active() => {
                self.set_desired(TunnelKind::SecureTunnel, false);
                self.publish(TunnelKind::SecureTunnel, TunnelStatus::Disconnecting);
                if let Some(flight) = &self.activation {
                    log::info!("[controller] cancelling activation attempt {}", flight.attempt);
                    flight.cancel.store(true, Ordering::SeqCst);
                }
                self.request(TunnelKind::SecureTunnel, false);
                ToggleOutcome::DisableRequested
            }
            _ => {
                if self.activation.is_some() {
                    return ToggleOutcome::ActivationInFlight;
                }
                self.publish(TunnelKind::SecureTunnel, TunnelStatus::Connecting);
                self.start_activation();
                ToggleOutcome::ActivationStarted
            }
        }
    }

    /// Check the subscription behind an already connected secure tunnel.
    ///
    /// Returns `false` if the tunnel is not connected and nothing was checked.
    pub fn verify_subscription(&self) -> bool {
        if self.secure.current() != TunnelStatus::Connected {
            return false;
        }
        let api = Arc::clone(&self.services.api);
        let sink = self.sink.clone();
        thread::spawn(move || {
            let result = api.authenticate().map(|_| ());
            sink.send(Message::SubscriptionChecked(result));
        });
        true
    }

    /// Apply everything already waiting in the inbox. Returns how many
    /// messages were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one message and apply it.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_message(message);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Status(raw) => self.on_status(&raw),
            Message::Activation(report) => self.on_activation(report),
            Message::SubscriptionChecked(result) => self.on_subscription_checked(&result),
            Message::ReviewDue => self.on_review_due(),
            Message::Metrics(metrics) => {
                self.metrics = metrics;
                self.notify(Notice::Metrics(metrics));
            }
        }
    }

    fn on_status(&mut self, raw: &RawStatusEvent) {
        let Some((kind, status)) = raw.decode() else {
            log::warn!("[controller] dropping unrecognized status event {raw:?}");
            return;
        };
        let reconciled = self.reconcile(kind, status);
        if reconciled != status {
            log::debug!("[controller] {kind} reported {status}, publishing {reconciled}");
        }
        self.publish(kind, reconciled);
    }

    fn on_activation(&mut self, report: ActivationReport) {
        let current = self.activation.as_ref().map(|flight| flight.attempt);
        if current != Some(report.attempt) {
            log::debug!("[controller] ignoring stale activation attempt {}", report.attempt);
            return;
        }
        let Some(flight) = self.activation.take() else {
            return;
        };
        let cancelled = flight.cancel.load(Ordering::SeqCst);

        match report.result {
            Ok(()) if cancelled => {
                log::info!("[controller] attempt {} enabled after cancel, disabling", report.attempt);
                self.request(TunnelKind::SecureTunnel, false);
            }
            Ok(()) => self.set_desired(TunnelKind::SecureTunnel, true),
            Err(_) if cancelled => {
                self.publish(TunnelKind::SecureTunnel, TunnelStatus::Disconnected);
            }
            Err(error) => {
                self.publish(TunnelKind::SecureTunnel, TunnelStatus::Disconnected);
                let title = match &error {
                    ActivationError::Api(_) => constants::TITLE_SIGN_IN_ERROR,
                    _ => constants::TITLE_ACTIVATION_ERROR,
                };
                self.surface(error.recovery(), title);
            }
        }
    }

    fn on_subscription_checked(&mut self, result: &Result<(), ApiError>) {
        log::info!(
            "[controller] subscription check: {:?}",
            SubscriptionOutcome::from(result)
        );
        self.surface(Recovery::for_subscription(result), constants::TITLE_SIGN_IN_ERROR);
    }

    fn on_review_due(&mut self) {
        self.review_pending = false;
        rating::record_prompt_shown(&mut self.settings.rating);
        self.persist();
        self.services.rating.request_review();
        self.notify(Notice::ReviewRequested);
    }

    fn surface(&self, recovery: Recovery, title: &str) {
        let notice = match recovery {
            Recovery::Silent => return,
            Recovery::TryAgain => Notice::ShowError {
                title: constants::TITLE_TRY_AGAIN.to_string(),
                message: constants::MSG_TRY_AGAIN.to_string(),
            },
            Recovery::Purchase => Notice::RouteToPurchase,
            Recovery::RenewThenPurchase => Notice::SubscriptionExpired,
            Recovery::ShowMessage(message) => Notice::ShowError {
                title: title.to_string(),
                message,
            },
        };
        self.notify(notice);
    }

    fn consult_review_gate(&mut self) {
        let decision = rating::record_connect(&mut self.settings.rating, Utc::now());
        self.persist();
        if let ReviewDecision::Prompt { after } = decision {
            let delay = self.review_delay.unwrap_or(after);
            self.review_pending = true;
            let sink = self.sink.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                sink.send(Message::ReviewDue);
            });
        }
    }

    fn start_activation(&mut self) {
        self.attempts += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let orchestrator = ActivationOrchestrator::new(
            self.attempts,
            Arc::clone(&self.services.api),
            Arc::clone(&self.services.credentials),
            Arc::clone(&self.services.tunnels),
        );
        log::info!("[controller] starting activation attempt {}", self.attempts);
        orchestrator.spawn(Arc::clone(&cancel), self.sink.clone());
        self.activation = Some(InFlight {
            attempt: self.attempts,
            cancel,
        });
    }

    fn reconcile(&self, kind: TunnelKind, status: TunnelStatus) -> TunnelStatus {
        match kind {
            // Invalid means not set up yet, which the toggle must still see.
            TunnelKind::Filter
                if !self.settings.user_wants_filter_enabled && status != TunnelStatus::Invalid =>
            {
                TunnelStatus::Disconnected
            }
            _ => status,
        }
    }

    fn publish(&mut self, kind: TunnelKind, status: TunnelStatus) {
        let Some(transition) = self.state_mut(kind).update(status) else {
            return;
        };
        log::info!("[controller] {kind}: {} -> {}", transition.from, transition.to);
        self.notify(Notice::StatusChanged(transition));

        if kind == TunnelKind::Filter
            && status == TunnelStatus::Connected
            && !self.settings.has_seen_initial_filter_connected_dialog
        {
            self.settings.has_seen_initial_filter_connected_dialog = true;
            self.persist();
            if self.secure.current() == TunnelStatus::Invalid {
                self.notify(Notice::SecureTunnelUpsell);
            }
        }
    }

    fn request(&self, kind: TunnelKind, enabled: bool) {
        if let Err(e) = self.services.tunnels.set_enabled(kind, enabled) {
            log::error!("[controller] {kind} request failed: {e}");
        }
    }

    fn set_desired(&mut self, kind: TunnelKind, enabled: bool) {
        if self.settings.desired(kind).user_wants_enabled != enabled {
            self.settings.set_desired(kind, enabled);
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.settings) {
            log::warn!("[controller] failed to save settings: {e}");
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    const fn state(&self, kind: TunnelKind) -> &TunnelState {
        match kind {
            TunnelKind::Filter => &self.filter,
            TunnelKind::SecureTunnel => &self.secure,
        }
    }

    fn state_mut(&mut self, kind: TunnelKind) -> &mut TunnelState {
        match kind {
            TunnelKind::Filter => &mut self.filter,
            TunnelKind::SecureTunnel => &mut self.secure,
        }
    }
}
