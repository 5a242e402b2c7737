//! CLI command for cancelling a submitted job and removing its remote
//! artifacts.

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;
use crate::job::store::{load_job, JobStore, JsonFileStore};
use crate::job::JobStatus;
use crate::remote::RemoteJobHandler;

#[derive(Args)]
#[command(about = "Cancel a job and remove its remote artifacts")]
pub struct CancelCommand {
    /// Path to the job record (job.json)
    pub job: PathBuf,

    /// Use a specific configuration file instead of the default
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CancelCommand {
    pub fn execute(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        let mut job = load_job(&self.job)?;
        let host_name = job
            .submitted_to
            .clone()
            .ok_or_else(|| anyhow!("job {} has not been submitted to any host", job.id))?;
        let host = config
            .get_host(&host_name)
            .ok_or_else(|| anyhow!("host '{}' is not configured", host_name))?
            .clone();

        let store = JsonFileStore;
        let handler = RemoteJobHandler::new(host, &store);
        handler.cancel_remote_job(&mut job)?;

        job.status = JobStatus::Canceled;
        store.save(&job)?;
        println!("Canceled job {} on {}", job.id, host_name);

        Ok(())
    }
}
