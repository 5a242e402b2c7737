//! High-level orchestration of remote job workflows.
//!
//! `RemoteJobHandler` sequences the transport channel, workspace layout and
//! scheduler adapter into the submit / status / cancel workflows, and
//! applies the error-recovery policy:
//!
//! | error            | recovery                                          |
//! |------------------|---------------------------------------------------|
//! | LocalPreprocess  | mark failed, re-raise; nothing remote to clean    |
//! | RemoteOperation  | record message only, re-raise (caller retries)    |
//! | RemoteJob        | download work dir, clean up, mark failed; swallow |
//! | RemoteScheduler  | record message, mark failed, re-raise             |
//! | anything else    | record diagnostic, re-raise                       |
//!
//! The handler never retries a pipeline step; the external submission
//! driver re-invokes the whole pipeline on transient failure, so the
//! remote steps are written to be safely re-runnable.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::job::script;
use crate::job::store::JobStore;
use crate::job::Job;
use crate::remote::paths;
use crate::remote::scheduler::{RemoteStatus, SchedulerAdapter};
use crate::remote::session::{output_indicates_success, SshSession, TransportChannel};

/// Orchestrates submission, status query and cancellation of jobs on one
/// remote host.
pub struct RemoteJobHandler<'a> {
    host: HostConfig,
    scheduler: SchedulerAdapter,
    store: &'a dyn JobStore,
}

impl<'a> RemoteJobHandler<'a> {
    /// Creates a handler for the given host; the scheduler adapter is
    /// selected from the host configuration.
    pub fn new(host: HostConfig, store: &'a dyn JobStore) -> Self {
        let scheduler = SchedulerAdapter::new(host.scheduler);
        Self {
            host,
            scheduler,
            store,
        }
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    /// Runs the end-to-end submission pipeline for `job`.
    ///
    /// On success the job leaves with `Submitted` status, a scheduler job
    /// id and a submission timestamp. Failures are routed through the
    /// recovery policy; errors classified as retryable are returned to the
    /// caller, which owns the retry cadence.
    pub fn submit_remote_job(&self, job: &mut Job) -> Result<()> {
        // Local steps come first: no remote interaction happens until the
        // local pre-process has succeeded.
        if let Err(e) = self.prepare_local(job) {
            return self.recover(e, job, None);
        }
        let mut session = match SshSession::open(&self.host) {
            Ok(session) => session,
            Err(e) => return self.recover(e, job, None),
        };
        self.submit_via(job, &mut session)
    }

    /// Submission over a caller-provided channel. The channel stands in
    /// for an already-acquired session.
    pub fn submit_on(&self, job: &mut Job, chan: &mut dyn TransportChannel) -> Result<()> {
        if let Err(e) = self.prepare_local(job) {
            return self.recover(e, job, Some(chan));
        }
        self.submit_via(job, chan)
    }

    fn submit_via(&self, job: &mut Job, chan: &mut dyn TransportChannel) -> Result<()> {
        match self.submit_steps(job, chan) {
            Ok(()) => {
                info!(
                    "job {} submitted to {} as {}",
                    job.id,
                    self.host.name,
                    job.job_id.as_deref().unwrap_or("?")
                );
                Ok(())
            }
            Err(e) => self.recover(e, job, Some(chan)),
        }
    }

    /// Queries the scheduler for the job's current state. Does not mutate
    /// `job.status`; the external poller reconciles the returned value
    /// against the persisted record.
    pub fn remote_status(&self, job: &mut Job) -> Result<RemoteStatus> {
        let mut session = match SshSession::open(&self.host) {
            Ok(session) => session,
            Err(e) => {
                self.recover(e, job, None)?;
                return Ok(RemoteStatus::Unknown);
            }
        };
        self.remote_status_on(job, &mut session)
    }

    /// Status query over a caller-provided channel.
    pub fn remote_status_on(
        &self,
        job: &mut Job,
        chan: &mut dyn TransportChannel,
    ) -> Result<RemoteStatus> {
        match self.query_status(job, chan) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.recover(e, job, Some(chan))?;
                Ok(RemoteStatus::Unknown)
            }
        }
    }

    /// Cancels the job if it is still queued or running, then removes all
    /// remote artifacts. Removal is attempted unconditionally, even when
    /// the cancel command failed or the job was no longer active.
    pub fn cancel_remote_job(&self, job: &mut Job) -> Result<()> {
        let mut session = match SshSession::open(&self.host) {
            Ok(session) => session,
            Err(e) => return self.recover(e, job, None),
        };
        self.cancel_on(job, &mut session)
    }

    /// Cancellation over a caller-provided channel.
    pub fn cancel_on(&self, job: &mut Job, chan: &mut dyn TransportChannel) -> Result<()> {
        let cancel_result = self.cancel_if_active(job, chan);

        if let Err(e) = self.remove_remote_files(job, chan) {
            warn!("cleanup of job {} artifacts failed: {}", job.id, e);
        }

        match cancel_result {
            Ok(()) => Ok(()),
            Err(e) => self.recover(e, job, Some(chan)),
        }
    }

    // ---- submission pipeline -------------------------------------------

    /// Steps 1-2: bind to the host and run the local pre-process. Runs
    /// entirely against the local filesystem.
    fn prepare_local(&self, job: &mut Job) -> Result<()> {
        if job.bind_to_host(&self.host.name, &self.host.default_host_parameters) {
            self.store.save(job)?;
        }
        self.execute_local_pre_process(job)
    }

    fn execute_local_pre_process(&self, job: &Job) -> Result<()> {
        fs::create_dir_all(&job.dir)?;

        if let Some(input) = &job.input {
            fs::write(
                job.dir.join("_input.json"),
                serde_json::to_string(input)?,
            )?;
        }

        let Some(script_body) = job.executable.local_pre_process_script.clone() else {
            return Ok(());
        };

        let script_path = job.dir.join("_lpreprocess.sh");
        fs::write(&script_path, &script_body)?;
        make_executable(&script_path)?;

        let cmd = script::local_pre_process_command(&job.args);
        debug!("running local pre-process for job {}: {}", job.id, cmd);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .current_dir(&job.dir)
            .status()
            .map_err(Error::Io)?;

        if !status.success() {
            return Err(Error::LocalPreprocess(format!(
                "\"{}\" exited with {:?} in {}",
                cmd,
                status.code(),
                job.dir.display()
            )));
        }
        Ok(())
    }

    /// Steps 4-9, all on one channel.
    fn submit_steps(&self, job: &mut Job, chan: &mut dyn TransportChannel) -> Result<()> {
        self.create_remote_work_dir(job, chan)?;
        self.prepare_input_json(job, chan)?;
        self.prepare_input_files(job, chan)?;
        self.execute_remote_pre_process(job, chan)?;
        let script_path = self.prepare_job_script(job, chan)?;
        self.submit_to_scheduler(job, chan, &script_path)
    }

    /// Step 4: `mkdir -p` is idempotent, so re-running the pipeline after
    /// a transient failure is safe.
    fn create_remote_work_dir(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<()> {
        let work_dir = paths::work_dir(&self.host, job);
        let cmd = format!("mkdir -p {}; echo $?", work_dir.display());
        let (out, _) = chan.execute(&cmd)?;
        if !output_indicates_success(&out) {
            return Err(Error::RemoteOperation(format!(
                "\"{}\" failed: {}",
                cmd,
                out.trim()
            )));
        }
        Ok(())
    }

    /// Step 5.
    fn prepare_input_json(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<()> {
        if let Some(input) = &job.input {
            chan.write_file(
                &paths::input_json_path(&self.host, job),
                &serde_json::to_string(input)?,
            )?;
        }
        Ok(())
    }

    /// Step 6: stage auxiliary input files, by local copy when the host's
    /// work area is mounted locally, otherwise by upload.
    fn prepare_input_files(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<()> {
        if job.input_files.is_empty() {
            return Ok(());
        }
        match &self.host.mounted_work_base_dir {
            Some(mounted) => self.stage_input_files_via_copy(job, mounted),
            None => self.stage_input_files_via_channel(job, chan),
        }
    }

    fn stage_input_files_via_copy(&self, job: &Job, mounted: &str) -> Result<()> {
        let remote_dir = paths::input_files_dir(&self.host, job);
        let relative = remote_dir
            .strip_prefix(&self.host.work_base_dir)
            .map_err(|_| {
                Error::RemoteOperation(format!(
                    "input dir {} is not under work base {}",
                    remote_dir.display(),
                    self.host.work_base_dir
                ))
            })?;
        let mounted_dir = Path::new(mounted).join(relative);
        fs::create_dir_all(&mounted_dir)?;

        for (origin, dest) in &job.input_files {
            let target = mounted_dir.join(dest);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(origin, &target)?;
        }
        Ok(())
    }

    fn stage_input_files_via_channel(
        &self,
        job: &Job,
        chan: &mut dyn TransportChannel,
    ) -> Result<()> {
        let remote_dir = paths::input_files_dir(&self.host, job);
        chan.execute(&format!("mkdir -p {}", remote_dir.display()))?;

        for (origin, dest) in &job.input_files {
            let remote_path = remote_dir.join(dest);
            if let Some(parent) = remote_path.parent() {
                if parent != remote_dir {
                    chan.execute(&format!("mkdir -p {}", parent.display()))?;
                }
            }
            chan.upload(origin, &remote_path)?;
        }
        Ok(())
    }

    /// Step 7: run the executable's remote pre-process script, if any.
    fn execute_remote_pre_process(
        &self,
        job: &Job,
        chan: &mut dyn TransportChannel,
    ) -> Result<()> {
        let Some(script_body) = job.executable.pre_process_script.clone() else {
            return Ok(());
        };

        let path = paths::pre_process_script_path(&self.host, job);
        chan.write_file(&path, &script_body)?;

        let chmod = format!("chmod +x {}; echo $?", path.display());
        let (out, _) = chan.execute(&chmod)?;
        if !output_indicates_success(&out) {
            return Err(Error::RemoteOperation(format!(
                "chmod failed: {}",
                out.trim()
            )));
        }

        let work_dir = paths::work_dir(&self.host, job);
        let cmd = format!(
            "cd {} && ./_preprocess.sh {} 1>> _stdout.txt 2>> _stderr.txt",
            work_dir.display(),
            job.args
        );
        let result = chan.execute_full(&cmd)?;
        if !result.is_success() {
            let reason = match &result.signal {
                Some(sig) => format!("\"{}\" terminated by signal {}", cmd, sig),
                None => format!("\"{}\" failed", cmd),
            };
            return Err(Error::RemoteJob {
                reason,
                exit_code: Some(result.exit_code),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(())
    }

    /// Step 8: write the generated job script and make it executable.
    /// Overwrites on re-run.
    fn prepare_job_script(
        &self,
        job: &Job,
        chan: &mut dyn TransportChannel,
    ) -> Result<std::path::PathBuf> {
        let script_path = paths::job_script_path(&self.host, job);
        let work_dir = paths::work_dir(&self.host, job);
        let body = script::job_script(job, &work_dir.display().to_string());

        chan.write_file(&script_path, &body)?;
        let chmod = format!("chmod +x {}; echo $?", script_path.display());
        let (out, _) = chan.execute(&chmod)?;
        if !output_indicates_success(&out) {
            return Err(Error::RemoteOperation(format!(
                "chmod failed: {}",
                out.trim()
            )));
        }
        Ok(script_path)
    }

    /// Step 9: submit to the scheduler and record the assigned id.
    fn submit_to_scheduler(
        &self,
        job: &mut Job,
        chan: &mut dyn TransportChannel,
        script_path: &Path,
    ) -> Result<()> {
        let mut parameters: HashMap<String, String> = job.host_parameters.clone();
        parameters.insert("mpi_procs".to_string(), job.mpi_procs.to_string());
        parameters.insert("omp_threads".to_string(), job.omp_threads.to_string());

        let cmd = self.scheduler.submit_command(
            &script_path.display().to_string(),
            &job.id.to_string(),
            &parameters,
        );
        let result = chan.execute_full(&cmd)?;
        if !result.is_success() {
            return Err(Error::RemoteScheduler(format!(
                "\"{}\" failed: rc:{}, {}",
                cmd,
                result.exit_code,
                result.stderr.trim()
            )));
        }

        let job_id = self.scheduler.parse_job_id(&result.stdout)?;
        job.mark_submitted(job_id, Utc::now());
        self.store.save(job)?;
        Ok(())
    }

    // ---- status / cancel -----------------------------------------------

    fn query_status(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<RemoteStatus> {
        let job_id = job
            .job_id
            .as_deref()
            .ok_or_else(|| Error::Model(format!("job {} has no scheduler id", job.id)))?;

        let cmd = self.scheduler.status_command(job_id);
        let (out, _) = chan.execute(&cmd)?;
        if out.is_empty() {
            return Err(Error::RemoteScheduler(format!(
                "\"{}\" returned empty output (scheduler unreachable or job unknown)",
                cmd
            )));
        }
        Ok(self.scheduler.parse_remote_status(&out))
    }

    fn cancel_if_active(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<()> {
        let status = self.query_status(job, chan)?;
        if !matches!(status, RemoteStatus::Submitted | RemoteStatus::Running) {
            debug!("job {} not active ({:?}); skipping cancel command", job.id, status);
            return Ok(());
        }

        let job_id = job
            .job_id
            .as_deref()
            .ok_or_else(|| Error::Model(format!("job {} has no scheduler id", job.id)))?;
        let cmd = self.scheduler.cancel_command(job_id);
        let (out, _) = chan.execute(&cmd)?;
        if !output_indicates_success(&out) {
            return Err(Error::RemoteScheduler(format!(
                "\"{}\" failed: {}",
                cmd,
                out.trim()
            )));
        }
        Ok(())
    }

    fn remove_remote_files(&self, job: &Job, chan: &mut dyn TransportChannel) -> Result<()> {
        chan.remove_recursive(&paths::all_file_paths(&self.host, job))
    }

    // ---- error recovery ------------------------------------------------

    /// Applies the recovery policy for a pipeline error. Returns `Ok(())`
    /// when the error is fully absorbed (job-content failures) and the
    /// original error when the caller is expected to see it.
    fn recover(
        &self,
        error: Error,
        job: &mut Job,
        chan: Option<&mut dyn TransportChannel>,
    ) -> Result<()> {
        match &error {
            Error::LocalPreprocess(_) => {
                job.mark_failed(&format!("failed to execute local pre-process\n{}", error));
                self.persist_best_effort(job);
                Err(error)
            }
            Error::RemoteOperation(_) => {
                // Transient: leave the status alone so the external driver
                // can re-run the pipeline later.
                job.record_error(&format!("remote operation failed\n{}", error));
                self.persist_best_effort(job);
                Err(error)
            }
            Error::RemoteJob { .. } => {
                if let Some(chan) = chan {
                    self.salvage_work_dir(job, chan);
                    if let Err(e) = self.remove_remote_files(job, chan) {
                        warn!("cleanup after job failure {} failed: {}", job.id, e);
                    }
                }
                job.mark_failed(&format!("{}", error));
                self.persist_best_effort(job);
                // A job-content failure, not a transient one: absorbed.
                Ok(())
            }
            Error::RemoteScheduler(_) => {
                job.mark_failed(&format!("scheduler command failed\n{}", error));
                self.persist_best_effort(job);
                Err(error)
            }
            Error::Connection(_) => {
                job.record_error(&format!(
                    "failed to establish ssh connection to host({})\n{}",
                    self.host.name, error
                ));
                self.persist_best_effort(job);
                Err(error)
            }
            _ => {
                job.record_error(&format!("{}", error));
                self.persist_best_effort(job);
                Err(error)
            }
        }
    }

    /// Downloads the remote work directory into the job's local directory
    /// for postmortem inspection. Best effort.
    fn salvage_work_dir(&self, job: &Job, chan: &mut dyn TransportChannel) {
        let work_dir = paths::work_dir(&self.host, job);
        match chan.exists(&work_dir) {
            Ok(true) => {
                if let Err(e) = chan.download_recursive(&work_dir, &job.dir) {
                    warn!("postmortem download for job {} failed: {}", job.id, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("could not check work dir of job {}: {}", job.id, e),
        }
    }

    fn persist_best_effort(&self, job: &Job) {
        if let Err(e) = self.store.save(job) {
            warn!("failed to persist job record {}: {}", job.id, e);
        }
    }
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
