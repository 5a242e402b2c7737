//! Job record persistence seam.
//!
//! Durable storage of job records is an external collaborator; the
//! orchestrator only needs a `save` call at its two persist points (host
//! bind and successful submission). `JsonFileStore` is the implementation
//! the CLI ships: one `job.json` per job directory.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::job::Job;

/// Persistence interface the orchestrator writes through.
pub trait JobStore {
    fn save(&self, job: &Job) -> Result<()>;
}

/// File name of the per-job record inside the job's local directory.
pub const JOB_RECORD_FILE: &str = "job.json";

/// Stores each job as pretty-printed JSON at `<job.dir>/job.json`.
#[derive(Debug, Default, Clone)]
pub struct JsonFileStore;

impl JobStore for JsonFileStore {
    fn save(&self, job: &Job) -> Result<()> {
        fs::create_dir_all(&job.dir)?;
        let contents = serde_json::to_string_pretty(job)?;
        fs::write(job.dir.join(JOB_RECORD_FILE), contents)?;
        Ok(())
    }
}

/// Loads a job record previously written by [`JsonFileStore`].
pub fn load_job(path: &Path) -> Result<Job> {
    let contents = fs::read_to_string(path)?;
    let job: Job = serde_json::from_str(&contents)?;
    Ok(job)
}
