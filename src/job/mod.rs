//! Job data model and status state machine.
//!
//! A `Job` is a unit of remote work: either a simulation `Run` or an
//! `AnalysisRun` derived from one. Jobs move through a status state machine
//! driven by the submission pipeline and by an external status poller:
//!
//! ```text
//! created -> submitted -> { running -> including -> finished }
//!                       | failed | canceled
//! ```

pub mod parameter_set;
pub mod script;
pub mod simulator;
pub mod store;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Created,
    Submitted,
    Running,
    Including,
    Failed,
    Canceled,
    Finished,
}

/// What kind of work a job represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum JobKind {
    /// A top-level simulation run under a parameter set.
    Run {
        parameter_set_id: Uuid,
        /// Unique within the owning parameter set; assigned once.
        seed: u64,
    },
    /// An analysis of a finished run. `analyzer_id` is a weak reference,
    /// resolved by lookup in the simulator's analyzer list.
    Analysis {
        parent_run_id: Uuid,
        analyzer_id: Uuid,
        parameters: HashMap<String, Value>,
    },
}

/// Snapshot of the executable definition a job was created from: the
/// command line to run and the optional pre-process scripts. Resolved from
/// the simulator/analyzer at job creation so submission does not depend on
/// the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Executable {
    /// Full command line executed by the job script.
    pub command: String,
    /// Script run locally in the job directory before any remote step.
    pub local_pre_process_script: Option<String>,
    /// Script run in the remote work directory before submission.
    pub pre_process_script: Option<String>,
}

/// A unit of remote work tracked through the status state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,

    /// Name of the host this job was bound to; set at most once.
    pub submitted_to: Option<String>,
    /// Scheduler directives, snapshotted from the host at bind time.
    pub host_parameters: HashMap<String, String>,
    pub mpi_procs: u32,
    pub omp_threads: u32,

    /// Scheduler-assigned identifier; present iff `submitted_at` is.
    pub job_id: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,

    pub hostname: Option<String>,
    pub cpu_time: Option<f64>,
    pub real_time: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub included_at: Option<DateTime<Utc>>,

    /// Diagnostic text; non-empty whenever status is `Failed`.
    pub error_messages: Option<String>,

    /// Input payload written as `_input.json` when present.
    pub input: Option<Value>,
    /// Opaque result payload, simulator-defined shape.
    pub result: Option<Value>,

    /// Arguments passed to the pre-process scripts.
    pub args: String,

    /// Local working directory for this job.
    pub dir: PathBuf,

    /// Auxiliary input files staged to the remote input dir as
    /// (local origin, remote relative destination). Empty for plain runs.
    pub input_files: Vec<(PathBuf, String)>,

    pub executable: Executable,
}

impl Job {
    /// Creates a run job in `Created` state. Seed assignment and uniqueness
    /// are the responsibility of [`parameter_set::ParameterSet::create_run`].
    pub fn run(parameter_set_id: Uuid, seed: u64, dir: PathBuf, executable: Executable) -> Self {
        Self::new(JobKind::Run { parameter_set_id, seed }, dir, executable)
    }

    /// Creates an analysis job in `Created` state.
    pub fn analysis(
        parent_run_id: Uuid,
        analyzer_id: Uuid,
        parameters: HashMap<String, Value>,
        dir: PathBuf,
        executable: Executable,
    ) -> Self {
        Self::new(
            JobKind::Analysis {
                parent_run_id,
                analyzer_id,
                parameters,
            },
            dir,
            executable,
        )
    }

    fn new(kind: JobKind, dir: PathBuf, executable: Executable) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Created,
            submitted_to: None,
            host_parameters: HashMap::new(),
            mpi_procs: 1,
            omp_threads: 1,
            job_id: None,
            submitted_at: None,
            hostname: None,
            cpu_time: None,
            real_time: None,
            started_at: None,
            finished_at: None,
            included_at: None,
            error_messages: None,
            input: None,
            result: None,
            args: String::new(),
            dir,
            input_files: Vec::new(),
            executable,
        }
    }

    /// Whether this is a top-level run (as opposed to an analysis).
    pub fn is_run(&self) -> bool {
        matches!(self.kind, JobKind::Run { .. })
    }

    /// Seed of a run job; `None` for analyses.
    pub fn seed(&self) -> Option<u64> {
        match self.kind {
            JobKind::Run { seed, .. } => Some(seed),
            JobKind::Analysis { .. } => None,
        }
    }

    /// Binds the job to a host, snapshotting the host's default scheduler
    /// parameters. Idempotent: a no-op if already bound.
    pub fn bind_to_host(&mut self, host_name: &str, defaults: &HashMap<String, String>) -> bool {
        if self.submitted_to.is_some() {
            return false;
        }
        self.submitted_to = Some(host_name.to_string());
        if self.host_parameters.is_empty() {
            self.host_parameters = defaults.clone();
        }
        true
    }

    /// Records successful submission: status, scheduler job id and
    /// submission timestamp move together so the record is never partial.
    pub fn mark_submitted(&mut self, job_id: String, at: DateTime<Utc>) {
        self.status = JobStatus::Submitted;
        self.job_id = Some(job_id);
        self.submitted_at = Some(at);
    }

    /// Marks the job failed with a diagnostic message.
    pub fn mark_failed(&mut self, message: &str) {
        self.status = JobStatus::Failed;
        self.record_error(message);
    }

    /// Appends a diagnostic message without touching the status.
    pub fn record_error(&mut self, message: &str) {
        match &mut self.error_messages {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(message);
            }
            None => self.error_messages = Some(message.to_string()),
        }
    }

    /// Transition driven by the external poller once the job is observed
    /// running on the remote host.
    pub fn update_status_running(&mut self, hostname: &str) {
        self.status = JobStatus::Running;
        self.hostname = Some(hostname.to_string());
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Transition driven by the includer once results are being collected.
    pub fn update_status_including(
        &mut self,
        cpu_time: f64,
        real_time: f64,
        result: Option<Value>,
    ) {
        self.status = JobStatus::Including;
        self.cpu_time = Some(cpu_time);
        self.real_time = Some(real_time);
        self.result = result;
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Final transition once results have been included.
    pub fn update_status_finished(&mut self) {
        self.status = JobStatus::Finished;
        if self.included_at.is_none() {
            self.included_at = Some(Utc::now());
        }
    }

    /// Checks the record-level invariants that every transition must
    /// preserve.
    pub fn validate(&self) -> Result<()> {
        if self.job_id.is_some() != self.submitted_at.is_some() {
            return Err(Error::Model(format!(
                "job {}: job_id and submitted_at must be set together",
                self.id
            )));
        }
        if self.status == JobStatus::Failed
            && self.error_messages.as_deref().unwrap_or("").is_empty()
        {
            return Err(Error::Model(format!(
                "job {}: failed status requires error_messages",
                self.id
            )));
        }
        Ok(())
    }
}
