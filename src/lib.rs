//! Lockdown - keeps a content-filtering firewall and an encrypted secure
//! tunnel in line with what the user asked for.

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod event;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;
