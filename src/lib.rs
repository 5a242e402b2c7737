//! simq: remote execution of simulation jobs over SSH against batch
//! schedulers (PBS/Torque, SGE, Slurm) or plain forked processes.
//!
//! The library is organized around three layers:
//! - [`job`]: the data model (parameter sets, runs, analyses, job scripts)
//! - [`remote`]: transport sessions, scheduler adapters and the
//!   submission/status/cancel orchestrator
//! - [`config`]: per-host connection and scheduler configuration

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod remote;

pub use error::{Error, Result};
