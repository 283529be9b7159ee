//! # virtnetctl
//!
//! Operator tooling over the persisted VM network state: inspect or
//! reset per-network configuration state, run one offline status
//! reconciliation and remove a VM's cache tree.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Args, Command};
pub use config::Config;
