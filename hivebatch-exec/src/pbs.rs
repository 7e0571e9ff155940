//! PBS/Torque allocations.

use std::path::Path;

use hivebatch_core::{ComputeEnvironment, JobHandle, JobSpec, Resolved};

use crate::error::Result;
use crate::nodes::read_node_file;
use crate::{dispatch, ExecOptions, Vars};

pub const PPN_VAR: &str = "PBS_NUM_PPN";
pub const NODEFILE_VAR: &str = "PBS_NODEFILE";
pub const JOBID_VAR: &str = "PBS_JOBID";

/// Runs simulations on the nodes of the current PBS job.
///
/// Each node runs `PBS_NUM_PPN` divided by the simulations per node setting
/// jobs concurrently, at least one.
pub struct Pbs {
    options: ExecOptions,
    vars: Vars,
}

impl Pbs {
    pub fn new(options: ExecOptions, vars: Vars) -> Self {
        Pbs { options, vars }
    }

    fn resolve_inner(&self) -> Result<Resolved> {
        let ppn = self.vars.require_count(PPN_VAR)?;
        let nodefile = self.vars.require(NODEFILE_VAR)?;
        let run_id = self.vars.require(JOBID_VAR)?.to_string();
        let nodes = read_node_file(Path::new(nodefile))?;
        let per_node = self.options.sims_per_node.unwrap_or(1).max(1);
        Ok(Resolved {
            nodes,
            jobs_per_node: (ppn / per_node).max(1),
            propagate_env: self.options.propagate_env.clone(),
            run_id,
        })
    }
}

impl ComputeEnvironment for Pbs {
    fn name(&self) -> &str {
        "pbs"
    }

    fn resolve(&self) -> hivebatch_core::Result<Resolved> {
        Ok(self.resolve_inner()?)
    }

    fn submit(
        &self,
        resolved: &Resolved,
        jobs: Vec<JobSpec>,
    ) -> hivebatch_core::Result<Vec<JobHandle>> {
        dispatch(&self.vars, &self.options.cancel, resolved, jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let nodefile = dir.path().join("nodes");
        fs::write(&nodefile, "n07\nn07\nn03\nn07\nn03\n").unwrap();
        let vars = Vars::from_pairs(vec![
            (PPN_VAR, "16".to_string()),
            (NODEFILE_VAR, nodefile.to_string_lossy().to_string()),
            (JOBID_VAR, "4242.mgmt".to_string()),
        ]);
        let options = ExecOptions {
            sims_per_node: Some(3),
            ..ExecOptions::default()
        };
        let resolved = Pbs::new(options, vars.clone()).resolve().unwrap();
        assert_eq!(resolved.nodes, vec!["n07", "n03"]);
        assert_eq!(resolved.jobs_per_node, 5);
        assert_eq!(resolved.run_id, "4242.mgmt");

        let options = ExecOptions {
            sims_per_node: Some(32),
            ..ExecOptions::default()
        };
        assert_eq!(
            Pbs::new(options, vars).resolve().unwrap().jobs_per_node,
            1
        );
    }

    #[test]
    fn missing_vars() {
        let vars = Vars::from_pairs(vec![(PPN_VAR, "16")]);
        match Pbs::new(ExecOptions::default(), vars).resolve() {
            Err(hivebatch_core::Error::EnvironmentVariableMissing(name)) => {
                assert_eq!(name, NODEFILE_VAR)
            }
            other => panic!("expected missing variable, got {:?}", other),
        }
    }
}
