//! Scheduler command construction and output parsing.
//!
//! Batch scheduler CLIs differ in both invocation and output format. This
//! module isolates those differences behind `SchedulerAdapter`, one variant
//! per scheduler family, so the orchestrator stays scheduler-agnostic. The
//! family is selected per host in the configuration, at handler
//! construction time.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported batch scheduler families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// No scheduler: the job script is forked directly on the host and the
    /// PID serves as the job id.
    #[default]
    Forked,
    /// PBS/Torque (qsub/qstat/qdel).
    Pbs,
    /// Sun/Univa Grid Engine (qsub/qstat/qdel, different output formats).
    Sge,
    /// Slurm (sbatch/sacct/scancel).
    Slurm,
}

/// Job state as reported by the remote scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Accepted by the scheduler, waiting in the queue.
    Submitted,
    Running,
    /// Left the queue (completed, failed or cancelled; the collected
    /// `_status.json` distinguishes those).
    Finished,
    Unknown,
}

/// Builds scheduler commands and parses their output for one scheduler
/// family.
#[derive(Debug, Clone)]
pub struct SchedulerAdapter {
    kind: SchedulerKind,
}

impl SchedulerAdapter {
    pub fn new(kind: SchedulerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// Builds the job-submission invocation for `script_path`.
    ///
    /// `parameters` is the job's host-parameter snapshot merged with
    /// `mpi_procs`/`omp_threads`; keys not meaningful to the family are
    /// ignored.
    pub fn submit_command(
        &self,
        script_path: &str,
        job_name: &str,
        parameters: &HashMap<String, String>,
    ) -> String {
        let mpi = parameters.get("mpi_procs").map(String::as_str).unwrap_or("1");
        let omp = parameters
            .get("omp_threads")
            .map(String::as_str)
            .unwrap_or("1");
        let queue = parameters.get("queue");
        let walltime = parameters.get("walltime");

        match self.kind {
            SchedulerKind::Forked => {
                format!("nohup bash {} > /dev/null 2>&1 & echo $!", script_path)
            }
            SchedulerKind::Pbs => {
                let mut cmd = format!(
                    "qsub {} -N {} -l nodes={}:ppn={}",
                    script_path, job_name, mpi, omp
                );
                if let Some(q) = queue {
                    cmd.push_str(&format!(" -q {}", q));
                }
                if let Some(w) = walltime {
                    cmd.push_str(&format!(" -l walltime={}", w));
                }
                cmd
            }
            SchedulerKind::Sge => {
                let mut cmd = format!("qsub -N {}", job_name);
                if let Some(q) = queue {
                    cmd.push_str(&format!(" -q {}", q));
                }
                if mpi != "1" {
                    cmd.push_str(&format!(" -pe mpi {}", mpi));
                }
                cmd.push_str(&format!(" {}", script_path));
                cmd
            }
            SchedulerKind::Slurm => {
                let mut cmd = format!(
                    "sbatch --parsable -J {} -n {} -c {}",
                    job_name, mpi, omp
                );
                if let Some(q) = queue {
                    cmd.push_str(&format!(" -p {}", q));
                }
                if let Some(w) = walltime {
                    cmd.push_str(&format!(" -t {}", w));
                }
                cmd.push_str(&format!(" {}", script_path));
                cmd
            }
        }
    }

    /// Extracts the scheduler-assigned job id from the submit command's
    /// output.
    pub fn parse_job_id(&self, raw_output: &str) -> Result<String> {
        let trimmed = raw_output.trim();
        let job_id = match self.kind {
            // PID echoed by the forked submit; PBS prints "12345.hostname".
            SchedulerKind::Forked | SchedulerKind::Pbs => trimmed
                .split_whitespace()
                .next()
                .filter(|tok| tok.chars().next().is_some_and(|c| c.is_ascii_digit()))
                .map(str::to_string),
            // "Your job 12345 ("name") has been submitted"
            SchedulerKind::Sge => Regex::new(r"Your job (\d+)")
                .expect("static regex")
                .captures(trimmed)
                .map(|c| c[1].to_string()),
            // "--parsable" prints "12345" or "12345;cluster".
            SchedulerKind::Slurm => trimmed
                .split(';')
                .next()
                .map(str::trim)
                .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string),
        };

        job_id.ok_or_else(|| {
            Error::RemoteScheduler(format!(
                "could not parse job id from submit output: {:?}",
                trimmed
            ))
        })
    }

    /// Builds the status-query invocation for `job_id`.
    ///
    /// Commands are constructed so reachable schedulers always produce
    /// non-empty output for a known job; the orchestrator treats empty
    /// output as a scheduler failure.
    pub fn status_command(&self, job_id: &str) -> String {
        match self.kind {
            SchedulerKind::Forked => format!(
                "if ps -p {} > /dev/null 2>&1; then echo running; else echo finished; fi",
                job_id
            ),
            SchedulerKind::Pbs => format!("qstat {}", job_id),
            SchedulerKind::Sge => format!("qstat | grep {} || echo finished", job_id),
            SchedulerKind::Slurm => format!("sacct -n -X -j {} -o State | head -n 1", job_id),
        }
    }

    /// Parses the status command's output into a [`RemoteStatus`].
    /// Unrecognized output parses to `Unknown`, never an error.
    pub fn parse_remote_status(&self, raw_output: &str) -> RemoteStatus {
        let trimmed = raw_output.trim();
        match self.kind {
            SchedulerKind::Forked => match trimmed {
                "running" => RemoteStatus::Running,
                "finished" => RemoteStatus::Finished,
                _ => RemoteStatus::Unknown,
            },
            SchedulerKind::Pbs => match pbs_state_char(trimmed) {
                Some('Q') | Some('W') | Some('H') => RemoteStatus::Submitted,
                Some('R') | Some('E') => RemoteStatus::Running,
                Some('C') => RemoteStatus::Finished,
                _ => RemoteStatus::Unknown,
            },
            SchedulerKind::Sge => {
                if trimmed == "finished" {
                    return RemoteStatus::Finished;
                }
                // "12345 0.5 name user r 08/30/2026 ..." - state is field 5.
                match trimmed.split_whitespace().nth(4) {
                    Some("qw") | Some("hqw") => RemoteStatus::Submitted,
                    Some("r") | Some("t") => RemoteStatus::Running,
                    _ => RemoteStatus::Unknown,
                }
            }
            SchedulerKind::Slurm => match trimmed.split_whitespace().next() {
                Some("PENDING") => RemoteStatus::Submitted,
                Some("RUNNING") | Some("COMPLETING") => RemoteStatus::Running,
                Some("COMPLETED") | Some("FAILED") | Some("CANCELLED") | Some("TIMEOUT") => {
                    RemoteStatus::Finished
                }
                _ => RemoteStatus::Unknown,
            },
        }
    }

    /// Builds the cancel invocation for `job_id`. The exit-status echo is
    /// part of the wire contract: callers check the trailing `'0'`.
    pub fn cancel_command(&self, job_id: &str) -> String {
        match self.kind {
            SchedulerKind::Forked => format!("kill -TERM {}; echo $?", job_id),
            SchedulerKind::Pbs | SchedulerKind::Sge => format!("qdel {}; echo $?", job_id),
            SchedulerKind::Slurm => format!("scancel {}; echo $?", job_id),
        }
    }
}

/// Finds the PBS state character in qstat output: either a bare state
/// token, or field 5 of the job line in the default qstat table.
fn pbs_state_char(trimmed: &str) -> Option<char> {
    if trimmed.len() == 1 {
        return trimmed.chars().next();
    }
    let job_line = trimmed
        .lines()
        .filter(|l| !l.is_empty())
        .last()?;
    let field = job_line.split_whitespace().nth(4)?;
    if field.len() == 1 {
        field.chars().next()
    } else {
        None
    }
}
