//! Harness CLI - command-line client for the harness agent.

pub mod commands;
pub mod output;
