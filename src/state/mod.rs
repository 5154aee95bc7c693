//! State types shared by the controller and its services.

pub mod settings;
pub mod tunnel;

pub use settings::{DesiredState, RatingGateState, Settings, SettingsError, SettingsStore, TomlSettingsStore};
pub use tunnel::{Transition, TunnelKind, TunnelState, TunnelStatus};
