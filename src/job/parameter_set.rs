//! Parameter sets and the run collection they own.
//!
//! A `ParameterSet` is one point in a simulator's parameter space. It owns
//! its runs exclusively, and the analyses of those runs live in the same
//! collection keyed by parent run id: an analysis never outlives its run.
//! Seed uniqueness is enforced here, at the owning-collection level.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::simulator::Simulator;
use crate::job::{Job, JobKind};

/// Seeds are drawn uniformly below this bound.
const SEED_MAX: u64 = 1 << 31;

/// Bounded number of draws before seed assignment gives up.
const SEED_ITERATION_LIMIT: usize = 1024;

/// One point in a simulator's parameter space, owning its runs and their
/// analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    pub id: Uuid,
    /// Parameter values, keyed by the simulator's parameter names.
    pub v: HashMap<String, Value>,
    runs: Vec<Job>,
    analyses: Vec<Job>,
}

impl ParameterSet {
    pub fn new(v: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            v,
            runs: Vec::new(),
            analyses: Vec::new(),
        }
    }

    /// Creates a run under this parameter set with a fresh unique seed,
    /// the executable snapshot and input payload resolved from `sim`.
    ///
    /// The run's local directory is `<base_dir>/<run id>`.
    pub fn create_run(&mut self, sim: &Simulator, base_dir: &Path) -> Result<&Job> {
        let seed = self.draw_unique_seed(&mut rand::thread_rng())?;
        let (executable, input) = sim.executable_for_run(&self.v, seed);
        let mut job = Job::run(self.id, seed, base_dir.to_path_buf(), executable);
        // Local directory is keyed by the job id.
        job.dir = base_dir.join(job.id.to_string());
        job.input = input;
        self.runs.push(job);
        Ok(self.runs.last().expect("just pushed"))
    }

    /// Creates an analysis of an existing run. Fails if the parent run is
    /// not in this collection or the analyzer is unknown to the simulator.
    pub fn create_analysis(
        &mut self,
        sim: &Simulator,
        parent_run_id: Uuid,
        analyzer_id: Uuid,
        parameters: HashMap<String, Value>,
        base_dir: &Path,
    ) -> Result<&Job> {
        let parent = self
            .run(parent_run_id)
            .ok_or_else(|| Error::Model(format!("run {} not found", parent_run_id)))?;
        let parent_dir = parent.dir.clone();

        let analyzer = sim
            .analyzer(analyzer_id)
            .ok_or_else(|| Error::Model(format!("analyzer {} not found", analyzer_id)))?;

        let executable = analyzer.executable(&parameters);
        let mut job = Job::analysis(
            parent_run_id,
            analyzer_id,
            parameters,
            parent_dir,
            executable,
        );
        job.dir = job.dir.join(job.id.to_string());
        self.analyses.push(job);
        Ok(self.analyses.last().expect("just pushed"))
    }

    /// Looks up a run by id.
    pub fn run(&self, id: Uuid) -> Option<&Job> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn run_mut(&mut self, id: Uuid) -> Option<&mut Job> {
        self.runs.iter_mut().find(|r| r.id == id)
    }

    pub fn runs(&self) -> &[Job] {
        &self.runs
    }

    /// Analyses belonging to the given run.
    pub fn analyses_of(&self, run_id: Uuid) -> Vec<&Job> {
        self.analyses
            .iter()
            .filter(|a| matches!(a.kind, JobKind::Analysis { parent_run_id, .. } if parent_run_id == run_id))
            .collect()
    }

    pub fn analysis_mut(&mut self, id: Uuid) -> Option<&mut Job> {
        self.analyses.iter_mut().find(|a| a.id == id)
    }

    /// Removes a run and, with it, all of its analyses (composition: an
    /// analysis does not outlive its run).
    pub fn remove_run(&mut self, run_id: Uuid) -> Option<Job> {
        let idx = self.runs.iter().position(|r| r.id == run_id)?;
        self.analyses.retain(
            |a| !matches!(a.kind, JobKind::Analysis { parent_run_id, .. } if parent_run_id == run_id),
        );
        Some(self.runs.remove(idx))
    }

    fn draw_unique_seed<R: Rng>(&self, rng: &mut R) -> Result<u64> {
        for _ in 0..SEED_ITERATION_LIMIT {
            let candidate = rng.gen_range(0..SEED_MAX);
            if !self.runs.iter().any(|r| r.seed() == Some(candidate)) {
                return Ok(candidate);
            }
        }
        Err(Error::Seed(format!(
            "no unique seed found for parameter set {} within {} attempts",
            self.id, SEED_ITERATION_LIMIT
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::simulator::Simulator;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn sim() -> Simulator {
        Simulator::new("ising".to_string(), "~/ising_sim".to_string())
            .with_support_input_json(true)
    }

    fn params() -> HashMap<String, Value> {
        let mut v = HashMap::new();
        v.insert("beta".to_string(), serde_json::json!(0.5));
        v
    }

    #[test]
    fn test_create_run_assigns_distinct_seeds() {
        let mut ps = ParameterSet::new(params());
        let sim = sim();
        let base = PathBuf::from("/tmp/simq");

        for _ in 0..50 {
            ps.create_run(&sim, &base).unwrap();
        }

        let seeds: HashSet<u64> = ps.runs().iter().map(|r| r.seed().unwrap()).collect();
        assert_eq!(seeds.len(), 50);
    }

    #[test]
    fn test_run_input_carries_seed() {
        let mut ps = ParameterSet::new(params());
        let run = ps.create_run(&sim(), &PathBuf::from("/tmp/simq")).unwrap();
        let input = run.input.as_ref().unwrap();
        assert_eq!(input["beta"], serde_json::json!(0.5));
        assert_eq!(input["_seed"], serde_json::json!(run.seed().unwrap()));
    }

    #[test]
    fn test_seed_exhaustion_reports_error() {
        struct FixedRng(u64);
        impl rand::RngCore for FixedRng {
            fn next_u32(&mut self) -> u32 {
                self.0 as u32
            }
            fn next_u64(&mut self) -> u64 {
                self.0
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(0);
            }
            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
                dest.fill(0);
                Ok(())
            }
        }

        let mut ps = ParameterSet::new(params());
        let sim = sim();
        // Occupy the only seed the fixed generator can produce.
        let mut rng = FixedRng(7);
        let seed = ps.draw_unique_seed(&mut rng).unwrap();
        let (executable, _) = sim.executable_for_run(&ps.v, seed);
        ps.runs
            .push(Job::run(ps.id, seed, PathBuf::from("/tmp/x"), executable));

        let err = ps.draw_unique_seed(&mut rng).unwrap_err();
        assert!(matches!(err, Error::Seed(_)));
    }

    #[test]
    fn test_analysis_requires_existing_run() {
        let mut ps = ParameterSet::new(params());
        let sim = sim();
        let err = ps
            .create_analysis(
                &sim,
                Uuid::new_v4(),
                Uuid::new_v4(),
                HashMap::new(),
                &PathBuf::from("/tmp/simq"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[test]
    fn test_remove_run_drops_its_analyses() {
        let mut analyzer_sim = sim();
        let analyzer_id = analyzer_sim.add_analyzer(
            "mean".to_string(),
            "~/mean_analysis".to_string(),
            vec![],
        );

        let mut ps = ParameterSet::new(params());
        let run_id = ps
            .create_run(&analyzer_sim, &PathBuf::from("/tmp/simq"))
            .unwrap()
            .id;
        ps.create_analysis(
            &analyzer_sim,
            run_id,
            analyzer_id,
            HashMap::new(),
            &PathBuf::from("/tmp/simq"),
        )
        .unwrap();
        assert_eq!(ps.analyses_of(run_id).len(), 1);

        ps.remove_run(run_id).unwrap();
        assert!(ps.run(run_id).is_none());
        assert!(ps.analyses_of(run_id).is_empty());
    }

    #[test]
    fn test_analysis_dir_nests_under_run_dir() {
        let mut analyzer_sim = sim();
        let analyzer_id =
            analyzer_sim.add_analyzer("mean".to_string(), "~/mean".to_string(), vec![]);

        let mut ps = ParameterSet::new(params());
        let base = PathBuf::from("/tmp/simq");
        let run = ps.create_run(&analyzer_sim, &base).unwrap();
        let run_dir = run.dir.clone();
        let run_id = run.id;

        let analysis = ps
            .create_analysis(&analyzer_sim, run_id, analyzer_id, HashMap::new(), &base)
            .unwrap();
        assert!(analysis.dir.starts_with(&run_dir));
    }
}
