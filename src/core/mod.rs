//! Orchestration: the controller, secure tunnel activation, review gating
//! and usage counters.

pub mod activation;
pub mod controller;
pub mod metrics;
pub mod rating;

pub use activation::{ActivationError, ActivationOrchestrator, ActivationPhase, ActivationReport};
pub use controller::{DualTunnelController, Notice, ToggleOutcome};
pub use metrics::{BlockMetrics, FileMetricsSource, MetricsSource};
pub use rating::ReviewDecision;
