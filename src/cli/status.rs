//! CLI command for querying a submitted job's scheduler state.

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

use crate::config::Config;
use crate::job::store::{load_job, JsonFileStore};
use crate::remote::RemoteJobHandler;

#[derive(Args)]
#[command(about = "Query the remote scheduler state of a job")]
pub struct StatusCommand {
    /// Path to the job record (job.json)
    pub job: PathBuf,

    /// Use a specific configuration file instead of the default
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl StatusCommand {
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
        let status = handler.remote_status(&mut job)?;

        println!("Job:       {}", job.id);
        println!("Host:      {}", host_name);
        println!("Scheduler: {}", job.job_id.as_deref().unwrap_or("?"));
        println!("State:     {:?}", status);

        Ok(())
    }
}
