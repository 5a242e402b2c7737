//! CLI command for submitting a job to a remote host.

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;
use crate::job::store::{load_job, JsonFileStore};
use crate::job::JobStatus;
use crate::remote::RemoteJobHandler;

#[derive(Args)]
#[command(about = "Submit a job to a remote host")]
pub struct SubmitCommand {
    /// Path to the job record (job.json)
    pub job: PathBuf,

    /// Name of the configured host to submit to
    #[arg(long)]
    pub host: String,

    /// Use a specific configuration file instead of the default
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl SubmitCommand {
    pub fn execute(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        let host = config
            .get_host(&self.host)
            .ok_or_else(|| anyhow!("host '{}' is not configured", self.host))?
            .clone();

        let mut job = load_job(&self.job)?;
        if job.status != JobStatus::Created {
            return Err(anyhow!(
                "job {} has status {:?}; only created jobs can be submitted",
                job.id,
                job.status
            ));
        }

        let store = JsonFileStore;
        let handler = RemoteJobHandler::new(host, &store);
        handler.submit_remote_job(&mut job)?;

        match job.status {
            JobStatus::Submitted => {
                println!(
                    "Submitted job {} to {} (scheduler id: {})",
                    job.id,
                    self.host,
                    job.job_id.as_deref().unwrap_or("?")
                );
            }
            JobStatus::Failed => {
                // Job-content failures are absorbed by the handler; the
                // record carries the diagnostics.
                println!("Job {} failed during submission:", job.id);
                if let Some(messages) = &job.error_messages {
                    println!("{}", messages);
                }
            }
            other => println!("Job {} left in status {:?}", job.id, other),
        }

        Ok(())
    }
}
