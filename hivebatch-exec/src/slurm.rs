//! Slurm allocations.

use hivebatch_core::{ComputeEnvironment, JobHandle, JobSpec, Resolved};

use crate::error::Result;
use crate::nodes::expand_host_list;
use crate::{dispatch, ExecOptions, Vars};

pub const CPUS_PER_TASK_VAR: &str = "SLURM_CPUS_PER_TASK";
pub const NODELIST_VAR: &str = "SLURM_JOB_NODELIST";
pub const JOBID_VAR: &str = "SLURM_JOB_ID";

/// Runs simulations on the nodes of the current Slurm job.
///
/// Jobs per node come from the simulations per node setting when given,
/// otherwise from `SLURM_CPUS_PER_TASK`.
pub struct Slurm {
    options: ExecOptions,
    vars: Vars,
}

impl Slurm {
    pub fn new(options: ExecOptions, vars: Vars) -> Self {
        Slurm { options, vars }
    }

    fn resolve_inner(&self) -> Result<Resolved> {
        let run_id = self.vars.require(JOBID_VAR)?.to_string();
        let nodes = expand_host_list(self.vars.require(NODELIST_VAR)?)?;
        let jobs_per_node = match self.options.sims_per_node {
            Some(n) => n.max(1),
            None => self.vars.require_count(CPUS_PER_TASK_VAR)?,
        };
        Ok(Resolved {
            nodes,
            jobs_per_node,
            propagate_env: self.options.propagate_env.clone(),
            run_id,
        })
    }
}

impl ComputeEnvironment for Slurm {
    fn name(&self) -> &str {
        "slurm"
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

    fn vars() -> Vars {
        Vars::from_pairs(vec![
            (CPUS_PER_TASK_VAR, "8"),
            (NODELIST_VAR, "cn[01-02,05]"),
            (JOBID_VAR, "913"),
        ])
    }

    #[test]
    fn resolves_allocation() {
        let resolved = Slurm::new(ExecOptions::default(), vars()).resolve().unwrap();
        assert_eq!(resolved.nodes, vec!["cn01", "cn02", "cn05"]);
        assert_eq!(resolved.jobs_per_node, 8);
        assert_eq!(resolved.run_id, "913");
        assert_eq!(resolved.slots(), 24);
    }

    #[test]
    fn sims_per_node_overrides() {
        let options = ExecOptions {
            sims_per_node: Some(2),
            ..ExecOptions::default()
        };
        let vars = Vars::from_pairs(vec![(NODELIST_VAR, "cn1"), (JOBID_VAR, "914")]);
        let resolved = Slurm::new(options, vars).resolve().unwrap();
        assert_eq!(resolved.jobs_per_node, 2);
    }

    #[test]
    fn bad_cpu_count() {
        let vars = Vars::from_pairs(vec![
            (CPUS_PER_TASK_VAR, "many"),
            (NODELIST_VAR, "cn1"),
            (JOBID_VAR, "915"),
        ]);
        assert!(Slurm::new(ExecOptions::default(), vars).resolve().is_err());
    }
}
