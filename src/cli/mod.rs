//! CLI commands. Each subcommand is a clap `Args` struct with an
//! `execute` method; the binary dispatches to them from `main`.

pub mod cancel;
pub mod config;
pub mod status;
pub mod submit;
