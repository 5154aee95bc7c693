//! CLI command handlers.
//!
//! Each handler wires the real services to a controller, runs one command
//! and prints notices as they arrive.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use color_eyre::eyre::WrapErr;

use super::args::Commands;
use crate::config::{self, Config};
use crate::constants;
use crate::core::rating::{self, ReviewDecision};
use crate::core::{DualTunnelController, FileMetricsSource, Notice, ToggleOutcome};
use crate::event::{self, MetricsTicker, StatusSink};
use crate::services::{
    BrowserRatingPrompt, CommandTunnelSystem, FileCredentialStore, HttpSubscriptionApi, Services,
};
use crate::state::{RatingGateState, TomlSettingsStore, TunnelKind};

/// A wired controller plus what the handlers need around it.
struct Session {
    controller: DualTunnelController,
    notices: Receiver<Notice>,
    sink: StatusSink,
    config: Config,
    config_dir: PathBuf,
}

impl Session {
    fn open(config_dir: PathBuf) -> color_eyre::Result<Self> {
        let config = Config::load(&config_dir)?;
        let (sink, inbox) = event::channel();
        let (notify, notices) = mpsc::channel();

        let api = HttpSubscriptionApi::new(
            config.api.base_url()?,
            config.api.receipt_path.clone(),
            config.api.timeout(),
        )
        .wrap_err("Failed to build API client")?;

        let services = Services {
            tunnels: Arc::new(CommandTunnelSystem::new(
                config.filter.clone(),
                config.secure.clone(),
                sink.clone(),
            )),
            api: Arc::new(api),
            credentials: Arc::new(FileCredentialStore::in_dir(&config_dir)),
            rating: Arc::new(BrowserRatingPrompt::new(config.review_url.clone())),
        };
        let store = TomlSettingsStore::in_dir(&config_dir);
        log::debug!("[cli] settings at {}", store.path().display());

        let mut controller =
            DualTunnelController::new(services, Box::new(store), sink.clone(), inbox, notify);
        controller.set_pre_release_build(config.pre_release);

        Ok(Self {
            controller,
            notices,
            sink,
            config,
            config_dir,
        })
    }

    fn print_notices(&self) {
        for notice in self.notices.try_iter() {
            if let Some(line) = describe(&notice) {
                println!("{line}");
            }
        }
    }
}

/// Run `command` against the config in `config_dir` (or the platform default).
///
/// # Errors
///
/// Returns an error if the config cannot be loaded or the services cannot be
/// built.
pub fn run(config_dir: Option<PathBuf>, command: &Commands) -> color_eyre::Result<()> {
    let config_dir = config::resolve_config_dir(config_dir)?;
    let mut session = Session::open(config_dir)?;

    match command {
        Commands::Status => print_status(&session),
        Commands::Toggle { tunnel } => toggle(&mut session, (*tunnel).into()),
        Commands::Agree => {
            session.controller.agree_to_policy();
            println!("Firewall privacy policy accepted.");
        }
        Commands::Watch => watch(&mut session),
        Commands::Rating => print_rating(session.controller.rating_state()),
    }
    Ok(())
}

fn print_status(session: &Session) {
    let controller = &session.controller;
    println!("Config: {}", session.config_dir.display());
    for kind in TunnelKind::ALL {
        let wanted = if controller.desired(kind).user_wants_enabled {
            "on"
        } else {
            "off"
        };
        println!("  {:<8} {:<14} (wanted {wanted})", kind.label(), controller.status(kind).to_string());
    }
    let settings = controller.settings();
    println!(
        "  Policy accepted: {}",
        if settings.has_agreed_to_filter_policy { "yes" } else { "no" }
    );
    print_rating(&settings.rating);
}

fn print_rating(state: &RatingGateState) {
    let days = Utc::now().signed_duration_since(state.install_date).num_days();
    println!("Review prompt:");
    println!("  Installed      {} ({days} day(s) ago)", state.install_date.format("%Y-%m-%d"));
    println!("  Connects       {}", state.rating_count);
    println!(
        "  Prompts shown  {} of {}",
        state.rating_triggered_count,
        constants::RATING_MAX_PROMPTS
    );
    let next = state.rating_count.saturating_add(1);
    match rating::decide(state, next, Utc::now()) {
        ReviewDecision::Prompt { after } => {
            println!("  Next connect   prompts after {}s", after.as_secs());
        }
        ReviewDecision::NoPrompt(reason) => println!("  Next connect   no prompt ({reason})"),
    }
}

fn toggle(session: &mut Session, kind: TunnelKind) {
    let outcome = session.controller.toggle(kind);
    match outcome {
        ToggleOutcome::ConsentRequired => {
            session.print_notices();
            println!("Run `{} agree` to accept the firewall privacy policy.", constants::APP_NAME);
            return;
        }
        ToggleOutcome::Ignored(status) => {
            println!("{} is {status}, try again once it settles.", kind.label());
            return;
        }
        ToggleOutcome::ActivationInFlight => {
            println!("Secure tunnel activation already in progress.");
            return;
        }
        ToggleOutcome::EnableRequested
        | ToggleOutcome::DisableRequested
        | ToggleOutcome::ActivationStarted => {}
    }

    let deadline = Instant::now() + constants::TOGGLE_SETTLE_TIMEOUT;
    loop {
        session.print_notices();
        let controller = &session.controller;
        let settled = !controller.is_activating()
            && !controller.status(kind).is_transitional()
            && !controller.review_pending();
        if settled {
            break;
        }
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            log::warn!("[cli] {kind} did not settle within {:?}", constants::TOGGLE_SETTLE_TIMEOUT);
            break;
        };
        session.controller.process_next(remaining.min(Duration::from_millis(250)));
    }
    session.print_notices();
    println!("{}: {}", kind.label(), session.controller.status(kind));
}

fn watch(session: &mut Session) {
    let metrics_path = session.config.metrics_path(&session.config_dir);
    let _ticker = MetricsTicker::start(
        Arc::new(FileMetricsSource::new(metrics_path)),
        session.sink.clone(),
        constants::METRICS_REFRESH_INTERVAL,
    );
    if session.controller.verify_subscription() {
        log::info!("[cli] verifying subscription for connected secure tunnel");
    }
    for kind in TunnelKind::ALL {
        println!("{}: {}", kind.label(), session.controller.status(kind));
    }
    loop {
        session.controller.process_next(constants::METRICS_REFRESH_INTERVAL);
        session.print_notices();
    }
}

/// One line for a notice, or `None` for notices with nothing to print.
fn describe(notice: &Notice) -> Option<String> {
    let line = match notice {
        Notice::StatusChanged(transition) => transition
            .headline()
            .unwrap_or_else(|| format!("{}: {}", transition.kind.label(), transition.to)),
        Notice::ShowError { title, message } => format!("{title}: {message}"),
        Notice::RouteToPurchase => "No subscription found. Purchase one to use the Secure Tunnel.".to_string(),
        Notice::SubscriptionExpired => format!(
            "{}: {}",
            constants::TITLE_SUBSCRIPTION_EXPIRED,
            constants::MSG_SUBSCRIPTION_EXPIRED
        ),
        Notice::ConsentRequired => "The firewall privacy policy has not been accepted.".to_string(),
        Notice::SecureTunnelUpsell => format!(
            "{}\n{}",
            constants::TITLE_FILTER_ACTIVATED,
            constants::MSG_FILTER_ACTIVATED
        ),
        Notice::ReviewRequested => return None,
        Notice::Metrics(metrics) => format!("Blocked: {metrics}"),
    };
    Some(line)
}
