//! Controller inbox and background tickers.
//!
//! Everything that changes controller state arrives as a [`Message`] on one
//! channel: OS status notifications, activation results, delayed review
//! triggers and metrics ticks. The controller applies them one at a time on
//! its own thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::activation::ActivationReport;
use crate::core::metrics::{BlockMetrics, MetricsSource};
use crate::services::ApiError;
use crate::state::{TunnelKind, TunnelStatus};

/// Object a status notification was attached to.
///
/// The filter tunnel reports through its provider session, the secure tunnel
/// through its VPN connection. Anything else is unexpected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSource {
    ProviderSession,
    VpnConnection,
    Unknown(String),
}

impl StatusSource {
    /// Source that reports status for `kind`.
    #[must_use]
    pub const fn for_kind(kind: TunnelKind) -> Self {
        match kind {
            TunnelKind::Filter => Self::ProviderSession,
            TunnelKind::SecureTunnel => Self::VpnConnection,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<TunnelKind> {
        match self {
            Self::ProviderSession => Some(TunnelKind::Filter),
            Self::VpnConnection => Some(TunnelKind::SecureTunnel),
            Self::Unknown(_) => None,
        }
    }
}

/// Status notification as delivered by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatusEvent {
    pub source: StatusSource,
    pub code: i64,
}

impl RawStatusEvent {
    #[must_use]
    pub fn new(kind: TunnelKind, status: TunnelStatus) -> Self {
        Self {
            source: StatusSource::for_kind(kind),
            code: status.code(),
        }
    }

    /// Decode into a tunnel and status, if both are recognized.
    #[must_use]
    pub fn decode(&self) -> Option<(TunnelKind, TunnelStatus)> {
        Some((self.source.kind()?, TunnelStatus::from_code(self.code)?))
    }
}

/// Messages applied by the controller.
#[derive(Debug)]
pub enum Message {
    /// OS status notification.
    Status(RawStatusEvent),
    /// An activation attempt finished.
    Activation(ActivationReport),
    /// Result of the startup subscription check.
    SubscriptionChecked(Result<(), ApiError>),
    /// The review prompt delay elapsed.
    ReviewDue,
    /// Fresh usage counters.
    Metrics(BlockMetrics),
}

/// Cloneable sending half of the controller inbox.
#[derive(Debug, Clone)]
pub struct StatusSink {
    sender: Sender<Message>,
}

impl StatusSink {
    /// Deliver a message. Returns `false` once the controller is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Report a tunnel status the way the OS would.
    pub fn send_status(&self, kind: TunnelKind, status: TunnelStatus) -> bool {
        self.send(Message::Status(RawStatusEvent::new(kind, status)))
    }
}

/// Create a controller inbox.
#[must_use]
pub fn channel() -> (StatusSink, Receiver<Message>) {
    let (sender, receiver) = mpsc::channel();
    (StatusSink { sender }, receiver)
}

/// Periodically pushes usage counters into the inbox.
///
/// The worker thread stops and is joined when the ticker is dropped.
pub struct MetricsTicker {
    stop: Option<Sender<()>>,
    handler: Option<thread::JoinHandle<()>>,
}

impl MetricsTicker {
    /// Start ticking every `interval`, beginning immediately.
    pub fn start(source: Arc<dyn MetricsSource>, sink: StatusSink, interval: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();

        let handler = thread::spawn(move || loop {
            if !sink.send(Message::Metrics(source.snapshot())) {
                return;
            }
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        });

        Self {
            stop: Some(stop),
            handler: Some(handler),
        }
    }
}

impl Drop for MetricsTicker {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handler) = self.handler.take() {
            let _ = handler.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource;

    impl MetricsSource for CountingSource {
        fn snapshot(&self) -> BlockMetrics {
            BlockMetrics {
                day: Some(1),
                week: Some(2),
                total: Some(3),
            }
        }
    }

    #[test]
    fn test_decode_known_sources() {
        let event = RawStatusEvent::new(TunnelKind::Filter, TunnelStatus::Connected);
        assert_eq!(
            event.decode(),
            Some((TunnelKind::Filter, TunnelStatus::Connected))
        );

        let event = RawStatusEvent {
            source: StatusSource::VpnConnection,
            code: 1,
        };
        assert_eq!(
            event.decode(),
            Some((TunnelKind::SecureTunnel, TunnelStatus::Disconnected))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_shapes() {
        let unknown_source = RawStatusEvent {
            source: StatusSource::Unknown("NEFilterManager".to_string()),
            code: 3,
        };
        assert_eq!(unknown_source.decode(), None);

        let unknown_code = RawStatusEvent {
            source: StatusSource::ProviderSession,
            code: 42,
        };
        assert_eq!(unknown_code.decode(), None);
    }

    #[test]
    fn test_sink_reports_closed_inbox() {
        let (sink, inbox) = channel();
        assert!(sink.send_status(TunnelKind::Filter, TunnelStatus::Connecting));
        drop(inbox);
        assert!(!sink.send(Message::ReviewDue));
    }

    #[test]
    fn test_ticker_ticks_and_stops_on_drop() {
        let (sink, inbox) = channel();
        let ticker = MetricsTicker::start(Arc::new(CountingSource), sink, Duration::from_millis(10));

        let first = inbox.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(first, Message::Metrics(m) if m.total == Some(3)));
        let second = inbox.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(second, Message::Metrics(_)));

        drop(ticker);
        // The worker held the last sender; once joined the inbox drains and closes.
        while inbox.try_recv().is_ok() {}
        assert!(matches!(
            inbox.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
