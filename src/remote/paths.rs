//! Remote workspace layout.
//!
//! Pure path functions keyed by (host, job). The layout is part of the
//! wire contract with existing wrapper scripts:
//!
//! ```text
//! <work_base_dir>/<job id>/           work dir
//! <work_base_dir>/<job id>/_input.json
//! <work_base_dir>/<job id>/_input/    staged auxiliary input files
//! <work_base_dir>/<job id>/_preprocess.sh
//! <work_base_dir>/<job id>/_stdout.txt, _stderr.txt
//! <work_base_dir>/<job id>.sh         job submission script
//! ```
//!
//! Job ids are uuids, so paths are collision-free across concurrently
//! active jobs on the same host.

use std::path::{Path, PathBuf};

use crate::config::HostConfig;
use crate::job::Job;

pub fn work_dir(host: &HostConfig, job: &Job) -> PathBuf {
    Path::new(&host.work_base_dir).join(job.id.to_string())
}

pub fn input_json_path(host: &HostConfig, job: &Job) -> PathBuf {
    work_dir(host, job).join("_input.json")
}

pub fn input_files_dir(host: &HostConfig, job: &Job) -> PathBuf {
    work_dir(host, job).join("_input")
}

pub fn pre_process_script_path(host: &HostConfig, job: &Job) -> PathBuf {
    work_dir(host, job).join("_preprocess.sh")
}

pub fn job_script_path(host: &HostConfig, job: &Job) -> PathBuf {
    Path::new(&host.work_base_dir).join(format!("{}.sh", job.id))
}

/// The full set of remote paths to remove when cleaning up a job.
pub fn all_file_paths(host: &HostConfig, job: &Job) -> Vec<PathBuf> {
    vec![work_dir(host, job), job_script_path(host, job)]
}
