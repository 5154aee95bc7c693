//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::state::TunnelKind;

/// Lockdown - firewall and secure tunnel controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.toml, settings.toml and installed keys
    #[arg(long, global = true, env = "LOCKDOWN_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show both tunnels, what the user asked for, and the rating counters
    Status,
    /// Toggle a tunnel and wait for it to settle
    Toggle {
        #[arg(value_enum)]
        tunnel: TunnelArg,
    },
    /// Accept the firewall privacy policy
    Agree,
    /// Follow status changes and blocked-connection counters
    Watch,
    /// Show the review prompt gate and what the next connect would decide
    Rating,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunnelArg {
    /// Content-filtering firewall
    Filter,
    /// Encrypted secure tunnel
    Secure,
}

impl From<TunnelArg> for TunnelKind {
    fn from(arg: TunnelArg) -> Self {
        match arg {
            TunnelArg::Filter => Self::Filter,
            TunnelArg::Secure => Self::SecureTunnel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_toggle() {
        let args =
            Args::try_parse_from(["lockdown", "--config-dir", "/tmp/ld", "toggle", "secure"]).unwrap();
        assert_eq!(args.config_dir, Some(PathBuf::from("/tmp/ld")));
        match args.command {
            Commands::Toggle { tunnel } => {
                assert_eq!(TunnelKind::from(tunnel), TunnelKind::SecureTunnel);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tunnel_is_rejected() {
        assert!(Args::try_parse_from(["lockdown", "toggle", "wifi"]).is_err());
    }
}
