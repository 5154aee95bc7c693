//! Tunnel status types.
//!
//! Each tunnel keeps a [`TunnelState`] that only changes through
//! [`TunnelState::update`]. Repeated notifications carrying the status that is
//! already applied are swallowed, so observers see one [`Transition`] per real
//! change.

use serde::{Deserialize, Serialize};

/// The two independently managed tunnels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelKind {
    /// Content-filtering tunnel (the firewall).
    Filter,
    /// Encrypted relay tunnel.
    SecureTunnel,
}

impl TunnelKind {
    /// Both kinds, filter first.
    pub const ALL: [TunnelKind; 2] = [TunnelKind::Filter, TunnelKind::SecureTunnel];

    /// Label prefix used in status lines ("FIREWALL ON", "TUNNEL OFF").
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Filter => "FIREWALL",
            Self::SecureTunnel => "TUNNEL",
        }
    }
}

impl std::fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelKind::Filter => write!(f, "filter"),
            TunnelKind::SecureTunnel => write!(f, "secure tunnel"),
        }
    }
}

/// Status reported by the OS tunnel subsystem.
///
/// Transitions are event-driven; the variant order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelStatus {
    /// No configuration installed yet.
    #[default]
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    Reasserting,
    Disconnecting,
}

impl TunnelStatus {
    /// Decode the raw status code delivered with OS notifications.
    ///
    /// Returns `None` for codes outside the known range.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Invalid),
            1 => Some(Self::Disconnected),
            2 => Some(Self::Connecting),
            3 => Some(Self::Connected),
            4 => Some(Self::Reasserting),
            5 => Some(Self::Disconnecting),
            _ => None,
        }
    }

    /// Raw code of this status.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Invalid => 0,
            Self::Disconnected => 1,
            Self::Connecting => 2,
            Self::Connected => 3,
            Self::Reasserting => 4,
            Self::Disconnecting => 5,
        }
    }

    /// A transition is in flight and toggles should wait for it.
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Disconnecting | Self::Reasserting
        )
    }

    /// Tunnel is up or on its way up.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connected | Self::Connecting | Self::Reasserting)
    }
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TunnelStatus::Invalid => "invalid",
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Connected => "connected",
            TunnelStatus::Reasserting => "reasserting",
            TunnelStatus::Disconnecting => "disconnecting",
        };
        f.write_str(text)
    }
}

/// A status change that observers should react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: TunnelKind,
    pub from: TunnelStatus,
    pub to: TunnelStatus,
}

impl Transition {
    /// Status line for this transition's target status.
    ///
    /// `Reasserting` keeps whatever was shown before, so it yields `None`.
    #[must_use]
    pub fn headline(&self) -> Option<String> {
        let prefix = self.kind.label();
        match self.to {
            TunnelStatus::Connected => Some(format!("{prefix} ON")),
            TunnelStatus::Connecting => Some("ACTIVATING".to_string()),
            TunnelStatus::Disconnected | TunnelStatus::Invalid => Some(format!("{prefix} OFF")),
            TunnelStatus::Disconnecting => Some("DEACTIVATING".to_string()),
            TunnelStatus::Reasserting => None,
        }
    }
}

/// Per-tunnel status holder with duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelState {
    kind: TunnelKind,
    current: TunnelStatus,
    previous: TunnelStatus,
}

impl TunnelState {
    /// Start tracking `kind` at `initial`.
    #[must_use]
    pub const fn new(kind: TunnelKind, initial: TunnelStatus) -> Self {
        Self {
            kind,
            current: initial,
            previous: TunnelStatus::Invalid,
        }
    }

    #[must_use]
    pub const fn current(&self) -> TunnelStatus {
        self.current
    }

    /// Status observed just before the current one.
    #[must_use]
    pub const fn previous(&self) -> TunnelStatus {
        self.previous
    }

    /// Apply `status`, returning the transition if it changed anything.
    pub fn update(&mut self, status: TunnelStatus) -> Option<Transition> {
        if status == self.current {
            return None;
        }
        self.previous = self.current;
        self.current = status;
        Some(Transition {
            kind: self.kind,
            from: self.previous,
            to: self.current,
        })
    }
}
