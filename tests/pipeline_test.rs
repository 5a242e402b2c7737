//! End-to-end tests of the submission, status and cancel workflows over a
//! scripted transport channel. No network or scheduler is involved; the
//! channel answers commands from a small prefix-matched script, so these
//! tests pin down the exact command sequences and the job record
//! transitions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use simq::config::HostConfig;
use simq::error::{Error, Result};
use simq::job::parameter_set::ParameterSet;
use simq::job::simulator::Simulator;
use simq::job::store::JobStore;
use simq::job::{Job, JobStatus};
use simq::remote::{
    CommandOutput, RemoteJobHandler, RemoteStatus, SchedulerKind, TransportChannel,
};

/// In-memory store recording every persisted snapshot.
#[derive(Default)]
struct RecordingStore {
    saved: RefCell<Vec<Job>>,
}

impl JobStore for RecordingStore {
    fn save(&self, job: &Job) -> Result<()> {
        self.saved.borrow_mut().push(job.clone());
        Ok(())
    }
}

/// Transport channel scripted by command prefix. Commands without a
/// scripted response get a generic success: `"0\n"` for commands carrying
/// the exit-status echo, an empty string otherwise.
#[derive(Default)]
struct ScriptedChannel {
    commands: Vec<String>,
    files: Vec<(PathBuf, String)>,
    uploads: Vec<(PathBuf, PathBuf)>,
    downloads: Vec<(PathBuf, PathBuf)>,
    removed: Vec<PathBuf>,
    responses: HashMap<&'static str, String>,
    full_responses: HashMap<&'static str, CommandOutput>,
    work_dir_exists: bool,
}

impl ScriptedChannel {
    fn respond(mut self, prefix: &'static str, stdout: &str) -> Self {
        self.responses.insert(prefix, stdout.to_string());
        self
    }

    fn respond_full(mut self, prefix: &'static str, output: CommandOutput) -> Self {
        self.full_responses.insert(prefix, output);
        self
    }

    fn with_work_dir_present(mut self) -> Self {
        self.work_dir_exists = true;
        self
    }

    fn lookup(&self, command: &str) -> Option<String> {
        self.responses
            .iter()
            .find(|(prefix, _)| command.starts_with(**prefix))
            .map(|(_, stdout)| stdout.clone())
    }
}

impl TransportChannel for ScriptedChannel {
    fn execute(&mut self, command: &str) -> Result<(String, i32)> {
        self.commands.push(command.to_string());
        if let Some(stdout) = self.lookup(command) {
            return Ok((stdout, 0));
        }
        if command.contains("echo $?") {
            Ok(("0\n".to_string(), 0))
        } else {
            Ok((String::new(), 0))
        }
    }

    fn execute_full(&mut self, command: &str) -> Result<CommandOutput> {
        self.commands.push(command.to_string());
        let scripted = self
            .full_responses
            .iter()
            .find(|(prefix, _)| command.starts_with(**prefix))
            .map(|(_, output)| output.clone());
        Ok(scripted.unwrap_or(CommandOutput {
            stdout: "12345.head.example.com\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            signal: None,
        }))
    }

    fn write_file(&mut self, path: &Path, content: &str) -> Result<()> {
        self.files.push((path.to_path_buf(), content.to_string()));
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<()> {
        self.uploads.push((local.to_path_buf(), remote.to_path_buf()));
        Ok(())
    }

    fn download_recursive(&mut self, remote_dir: &Path, local_dir: &Path) -> Result<()> {
        self.downloads
            .push((remote_dir.to_path_buf(), local_dir.to_path_buf()));
        Ok(())
    }

    fn exists(&mut self, _path: &Path) -> Result<bool> {
        Ok(self.work_dir_exists)
    }

    fn remove_recursive(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.removed.extend(paths.iter().cloned());
        Ok(())
    }
}

fn pbs_host() -> HostConfig {
    let mut defaults = HashMap::new();
    defaults.insert("queue".to_string(), "batch".to_string());
    HostConfig::new("cluster-a".to_string(), "sim".to_string())
        .with_scheduler(SchedulerKind::Pbs)
        .with_work_base_dir("/work/simq".to_string())
        .with_default_host_parameters(defaults)
}

fn ising_simulator() -> Simulator {
    Simulator::new("ising".to_string(), "~/ising_sim".to_string())
        .with_support_input_json(true)
        .with_parameter_keys(vec!["beta".to_string(), "size".to_string()])
}

/// A run created through the parameter set, with its work directory in a
/// temp dir so local pre-process steps are observable.
fn make_run(sim: &Simulator, base: &TempDir) -> (ParameterSet, Uuid) {
    let mut v = HashMap::new();
    v.insert("beta".to_string(), json!(0.5));
    v.insert("size".to_string(), json!(128));
    let mut ps = ParameterSet::new(v);
    let run_id = ps.create_run(sim, base.path()).unwrap().id;
    (ps, run_id)
}

#[test]
fn submit_happy_path_marks_job_submitted() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();
    let work_dir = format!("/work/simq/{}", job.id);

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();

    handler.submit_on(job, &mut chan).unwrap();

    assert_eq!(job.status, JobStatus::Submitted);
    assert_eq!(job.job_id.as_deref(), Some("12345.head.example.com"));
    assert!(job.submitted_at.is_some());
    assert_eq!(job.submitted_to.as_deref(), Some("cluster-a"));
    // Host defaults were snapshotted at bind time.
    assert_eq!(job.host_parameters.get("queue"), Some(&"batch".to_string()));
    job.validate().unwrap();

    // The input payload was materialized locally before any remote step.
    assert!(job.dir.join("_input.json").exists());

    // Work dir creation precedes script installation precedes submission.
    let mkdir_pos = chan
        .commands
        .iter()
        .position(|c| c.starts_with(&format!("mkdir -p {}", work_dir)))
        .unwrap();
    let qsub_pos = chan
        .commands
        .iter()
        .position(|c| c.starts_with("qsub"))
        .unwrap();
    assert!(mkdir_pos < qsub_pos);
    assert!(chan.commands[mkdir_pos].ends_with("; echo $?"));

    // The job script landed next to the work dir and cds into it.
    let script_path = PathBuf::from(format!("/work/simq/{}.sh", job.id));
    let (_, script_body) = chan
        .files
        .iter()
        .find(|(p, _)| *p == script_path)
        .unwrap();
    assert!(script_body.contains(&format!("cd {} || exit 1", work_dir)));

    // The remote input JSON carries the seed injected by the simulator.
    let (_, input_body) = chan
        .files
        .iter()
        .find(|(p, _)| *p == PathBuf::from(format!("{}/_input.json", work_dir)))
        .unwrap();
    assert!(input_body.contains("_seed"));

    // Persisted at bind time and again after submission.
    let saved = store.saved.borrow();
    assert!(saved.len() >= 2);
    assert_eq!(saved.last().unwrap().status, JobStatus::Submitted);
}

#[test]
fn submit_is_rerunnable_after_transient_failure() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);

    // First attempt: mkdir reports failure.
    let mut failing = ScriptedChannel::default().respond("mkdir -p", "1\n");
    let err = handler.submit_on(job, &mut failing).unwrap_err();
    assert!(matches!(err, Error::RemoteOperation(_)));
    // Status untouched so the pipeline can be re-run; diagnostics recorded.
    assert_eq!(job.status, JobStatus::Created);
    assert!(job.job_id.is_none());
    assert!(job.error_messages.is_some());

    // Second attempt on a healthy channel succeeds; mkdir -p and script
    // overwrite make the re-run safe.
    let mut healthy = ScriptedChannel::default();
    handler.submit_on(job, &mut healthy).unwrap();
    assert_eq!(job.status, JobStatus::Submitted);
    job.validate().unwrap();
}

#[test]
fn local_pre_process_failure_never_touches_the_remote_host() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator()
        .with_local_pre_process_script("#!/bin/sh\nexit 2\n".to_string());
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();

    let err = handler.submit_on(job, &mut chan).unwrap_err();
    assert!(matches!(err, Error::LocalPreprocess(_)));
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_messages
        .as_deref()
        .unwrap()
        .contains("local pre-process"));
    job.validate().unwrap();

    // No remote command, file write or upload happened.
    assert!(chan.commands.is_empty());
    assert!(chan.files.is_empty());
    assert!(chan.uploads.is_empty());
}

#[test]
fn remote_pre_process_failure_salvages_and_cleans_up() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator().with_pre_process_script("#!/bin/sh\nmake input\n".to_string());
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();
    let work_dir = PathBuf::from(format!("/work/simq/{}", job.id));

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default()
        .respond_full(
            "cd ",
            CommandOutput {
                stdout: String::new(),
                stderr: "make: command not found\n".to_string(),
                exit_code: 127,
                signal: None,
            },
        )
        .with_work_dir_present();

    // A job-content failure is absorbed: no error back to the caller.
    handler.submit_on(job, &mut chan).unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.job_id.is_none());
    job.validate().unwrap();

    // The work dir was downloaded for postmortem, then removed along with
    // the job script; the scheduler was never invoked.
    assert_eq!(chan.downloads, vec![(work_dir.clone(), job.dir.clone())]);
    assert!(chan.removed.contains(&work_dir));
    assert!(chan
        .removed
        .contains(&PathBuf::from(format!("/work/simq/{}.sh", job.id))));
    assert!(!chan.commands.iter().any(|c| c.starts_with("qsub")));
}

#[test]
fn remote_pre_process_signal_death_is_a_job_failure() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator().with_pre_process_script("#!/bin/sh\nsleep 1000\n".to_string());
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default().respond_full(
        "cd ",
        CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            signal: Some("KILL".to_string()),
        },
    );

    handler.submit_on(job, &mut chan).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_messages
        .as_deref()
        .unwrap()
        .contains("signal KILL"));
}

#[test]
fn forked_submission_uses_the_pid_as_job_id() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let host = HostConfig::new("workstation".to_string(), "sim".to_string())
        .with_work_base_dir("/home/sim/simq_work".to_string());
    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(host, &store);
    let mut chan = ScriptedChannel::default().respond_full(
        "nohup",
        CommandOutput {
            stdout: "4242\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            signal: None,
        },
    );

    handler.submit_on(job, &mut chan).unwrap();
    assert_eq!(job.status, JobStatus::Submitted);
    assert_eq!(job.job_id.as_deref(), Some("4242"));
}

#[test]
fn status_query_reports_scheduler_state_without_mutating_the_job() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();
    handler.submit_on(job, &mut chan).unwrap();

    let mut chan = ScriptedChannel::default().respond("qstat", "R\n");
    let status = handler.remote_status_on(job, &mut chan).unwrap();
    assert_eq!(status, RemoteStatus::Running);
    assert_eq!(job.status, JobStatus::Submitted);

    let mut chan = ScriptedChannel::default().respond("qstat", "C\n");
    let status = handler.remote_status_on(job, &mut chan).unwrap();
    assert_eq!(status, RemoteStatus::Finished);
    assert_eq!(job.status, JobStatus::Submitted);
}

#[test]
fn empty_status_output_is_a_scheduler_failure() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();
    handler.submit_on(job, &mut chan).unwrap();

    // qstat for a departed job prints nothing.
    let mut chan = ScriptedChannel::default().respond("qstat", "");
    let err = handler.remote_status_on(job, &mut chan).unwrap_err();
    assert!(matches!(err, Error::RemoteScheduler(_)));
    assert_eq!(job.status, JobStatus::Failed);
    job.validate().unwrap();
}

#[test]
fn cancel_active_job_issues_cancel_then_removes_artifacts() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();
    handler.submit_on(job, &mut chan).unwrap();
    let scheduler_id = job.job_id.clone().unwrap();

    let mut chan = ScriptedChannel::default().respond("qstat", "R\n");
    handler.cancel_on(job, &mut chan).unwrap();

    assert!(chan
        .commands
        .iter()
        .any(|c| c.starts_with(&format!("qdel {}", scheduler_id))));
    assert!(chan
        .removed
        .contains(&PathBuf::from(format!("/work/simq/{}", job.id))));
}

#[test]
fn cancel_removes_artifacts_even_when_the_cancel_command_fails() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();
    handler.submit_on(job, &mut chan).unwrap();

    let mut chan = ScriptedChannel::default()
        .respond("qstat", "R\n")
        .respond("qdel", "qdel: permission denied\n1\n");
    let err = handler.cancel_on(job, &mut chan).unwrap_err();
    assert!(matches!(err, Error::RemoteScheduler(_)));

    // Artifact removal happened regardless of the cancel outcome.
    assert!(chan
        .removed
        .contains(&PathBuf::from(format!("/work/simq/{}", job.id))));
}

#[test]
fn cancel_of_inactive_job_skips_the_cancel_command() {
    let base = TempDir::new().unwrap();
    let sim = ising_simulator();
    let (mut ps, run_id) = make_run(&sim, &base);
    let job = ps.run_mut(run_id).unwrap();

    let store = RecordingStore::default();
    let handler = RemoteJobHandler::new(pbs_host(), &store);
    let mut chan = ScriptedChannel::default();
    handler.submit_on(job, &mut chan).unwrap();

    let mut chan = ScriptedChannel::default().respond("qstat", "C\n");
    handler.cancel_on(job, &mut chan).unwrap();

    assert!(!chan.commands.iter().any(|c| c.starts_with("qdel")));
    assert!(chan
        .removed
        .contains(&PathBuf::from(format!("/work/simq/{}", job.id))));
}
