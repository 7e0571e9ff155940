//! Arbitrary hosts reachable over ssh.

use std::path::PathBuf;

use chrono::Local as LocalTime;
use hivebatch_core::{ComputeEnvironment, JobHandle, JobSpec, Resolved};
use rand::Rng;

use crate::error::Result;
use crate::nodes::read_node_file;
use crate::{dispatch, ExecOptions, Vars};

pub const NODEFILE_VAR: &str = "HIVEBATCH_ADHOC_NODEFILE";

/// Generates an identifier unlikely to collide with concurrent invocations
/// sharing a filesystem, e.g. `20261016-141502-4120-9f3a07c2`.
pub fn generate_run_id() -> String {
    format!(
        "{}-{}-{:08x}",
        LocalTime::now().format("%Y%m%d-%H%M%S"),
        std::process::id(),
        rand::thread_rng().gen::<u32>()
    )
}

/// Runs simulations on the hosts listed in a node file.
///
/// Nothing is assumed about the cores of those hosts, each one runs the
/// declared number of simulations per node.
pub struct Adhoc {
    options: ExecOptions,
    vars: Vars,
    run_id: String,
}

impl Adhoc {
    pub fn new(options: ExecOptions, vars: Vars) -> Self {
        Adhoc {
            options,
            vars,
            run_id: generate_run_id(),
        }
    }

    fn nodefile(&self) -> Result<PathBuf> {
        match &self.options.nodefile {
            Some(path) => Ok(path.clone()),
            None => Ok(PathBuf::from(self.vars.require(NODEFILE_VAR)?)),
        }
    }

    fn resolve_inner(&self) -> Result<Resolved> {
        let nodes = read_node_file(&self.nodefile()?)?;
        Ok(Resolved {
            nodes,
            jobs_per_node: self.options.sims_per_node.unwrap_or(1).max(1),
            propagate_env: self.options.propagate_env.clone(),
            run_id: self.run_id.clone(),
        })
    }
}

impl ComputeEnvironment for Adhoc {
    fn name(&self) -> &str {
        "adhoc"
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
    fn nodefile_from_flag_or_var() {
        let dir = tempfile::tempdir().unwrap();
        let nodefile = dir.path().join("hosts");
        fs::write(&nodefile, "alpha\nbeta\n").unwrap();

        let options = ExecOptions {
            nodefile: Some(nodefile.clone()),
            ..ExecOptions::default()
        };
        let adhoc = Adhoc::new(options, Vars::default());
        let resolved = adhoc.resolve().unwrap();
        assert_eq!(resolved.nodes, vec!["alpha", "beta"]);
        assert_eq!(resolved.jobs_per_node, 1);
        // stable for the lifetime of the backend
        assert_eq!(resolved.run_id, adhoc.resolve().unwrap().run_id);

        let vars = Vars::from_pairs(vec![(NODEFILE_VAR, nodefile.to_string_lossy().to_string())]);
        let options = ExecOptions {
            sims_per_node: Some(3),
            ..ExecOptions::default()
        };
        let resolved = Adhoc::new(options, vars).resolve().unwrap();
        assert_eq!(resolved.jobs_per_node, 3);

        assert!(matches!(
            Adhoc::new(ExecOptions::default(), Vars::default()).resolve(),
            Err(hivebatch_core::Error::EnvironmentVariableMissing(_))
        ));
    }

    #[test]
    fn run_ids_differ() {
        assert_ne!(generate_run_id(), generate_run_id());
        assert_eq!(generate_run_id().split('-').count(), 4);
    }
}
