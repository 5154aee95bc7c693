//! Tunnels driven by configured shell commands.
//!
//! Each tunnel kind has an `up`, `down` and optional `status` command. Enable
//! and disable run in the background; status transitions are pushed into the
//! controller inbox the way the OS would report them.

use std::process::{Command, Output, Stdio};
use std::thread;

use super::{TunnelSystem, TunnelSystemError};
use crate::config::TunnelCommands;
use crate::event::StatusSink;
use crate::state::{TunnelKind, TunnelStatus};

/// [`TunnelSystem`] backed by `sh -c` commands.
#[derive(Debug, Clone)]
pub struct CommandTunnelSystem {
    filter: TunnelCommands,
    secure: TunnelCommands,
    sink: StatusSink,
}

impl CommandTunnelSystem {
    #[must_use]
    pub fn new(filter: TunnelCommands, secure: TunnelCommands, sink: StatusSink) -> Self {
        Self {
            filter,
            secure,
            sink,
        }
    }

    fn commands(&self, kind: TunnelKind) -> &TunnelCommands {
        match kind {
            TunnelKind::Filter => &self.filter,
            TunnelKind::SecureTunnel => &self.secure,
        }
    }
}

fn run_shell(command: &str) -> std::io::Result<Output> {
    Command::new("sh")
        .args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
}

fn probe(kind: TunnelKind, command: Option<&str>) -> TunnelStatus {
    let Some(command) = command else {
        return TunnelStatus::Invalid;
    };
    match run_shell(command) {
        Ok(out) if out.status.success() => TunnelStatus::Connected,
        Ok(_) => TunnelStatus::Disconnected,
        Err(e) => {
            log::warn!("[system] {kind} status command failed: {e}");
            TunnelStatus::Invalid
        }
    }
}

impl TunnelSystem for CommandTunnelSystem {
    fn status(&self, kind: TunnelKind) -> TunnelStatus {
        probe(kind, self.commands(kind).status.as_deref())
    }

    fn set_enabled(&self, kind: TunnelKind, enabled: bool) -> Result<(), TunnelSystemError> {
        let commands = self.commands(kind);
        let command = if enabled {
            commands.up.clone()
        } else {
            commands.down.clone()
        }
        .ok_or(TunnelSystemError::NotConfigured { kind })?;

        let (pending, settled) = if enabled {
            (TunnelStatus::Connecting, TunnelStatus::Connected)
        } else {
            (TunnelStatus::Disconnecting, TunnelStatus::Disconnected)
        };
        self.sink.send_status(kind, pending);

        let sink = self.sink.clone();
        let status_command = commands.status.clone();
        thread::spawn(move || {
            let reported = match run_shell(&command) {
                Ok(out) if out.status.success() => settled,
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    log::warn!("[system] {kind} command exited {}: {}", out.status, stderr.trim());
                    fallback(kind, status_command.as_deref())
                }
                Err(e) => {
                    log::error!("[system] failed to execute {kind} command: {e}");
                    fallback(kind, status_command.as_deref())
                }
            };
            sink.send_status(kind, reported);
        });
        Ok(())
    }
}

/// Status to report after a failed command: whatever the probe says, or
/// disconnected when it cannot tell.
fn fallback(kind: TunnelKind, status_command: Option<&str>) -> TunnelStatus {
    match probe(kind, status_command) {
        TunnelStatus::Invalid => TunnelStatus::Disconnected,
        status => status,
    }
}
