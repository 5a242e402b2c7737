//! Job submission script generation.
//!
//! Builds the bash script handed to the batch scheduler. The script runs
//! the simulator command inside the job's remote work directory with
//! stdout/stderr redirected to `_stdout.txt`/`_stderr.txt`, and records
//! hostname, timing and the exit code to `_status.json` so the poller can
//! collect telemetry after the scheduler reports completion.

use crate::job::Job;

/// Builds the job submission script for `job`, executing
/// `job.executable.command` inside `work_dir`.
///
/// Deterministic given the job: re-running submission overwrites the script
/// with identical content.
pub fn job_script(job: &Job, work_dir: &str) -> String {
    let mut lines = Vec::new();
    lines.push("#!/bin/bash".to_string());
    lines.push(format!("# simq job {}", job.id));
    lines.push("LANG=C".to_string());
    lines.push(format!("cd {} || exit 1", work_dir));
    lines.push(format!("export OMP_NUM_THREADS={}", job.omp_threads));
    lines.push("echo \"{\" > _status.json".to_string());
    lines.push("echo \"  \\\"hostname\\\": \\\"$(hostname)\\\",\" >> _status.json".to_string());
    lines.push(
        "echo \"  \\\"started_at\\\": \\\"$(date -u '+%Y-%m-%dT%H:%M:%SZ')\\\",\" >> _status.json"
            .to_string(),
    );
    lines.push("START=$(date +%s)".to_string());
    lines.push(format!(
        "{{ time -p {{ {} 1>> _stdout.txt 2>> _stderr.txt; }} }} 2>> _time.txt",
        job.executable.command
    ));
    lines.push("RC=$?".to_string());
    lines.push("END=$(date +%s)".to_string());
    lines.push("echo \"  \\\"real_time\\\": $((END - START)),\" >> _status.json".to_string());
    lines.push(
        "echo \"  \\\"finished_at\\\": \\\"$(date -u '+%Y-%m-%dT%H:%M:%SZ')\\\",\" >> _status.json"
            .to_string(),
    );
    lines.push("echo \"  \\\"rc\\\": $RC\" >> _status.json".to_string());
    lines.push("echo \"}\" >> _status.json".to_string());
    lines.push("exit $RC".to_string());
    lines.join("\n") + "\n"
}

/// The local pre-process wrapper command, run from the job's local
/// directory with output appended to the local log files.
pub fn local_pre_process_command(args: &str) -> String {
    format!("./_lpreprocess.sh {} 1>> _stdout.txt 2>> _stderr.txt", args)
}
