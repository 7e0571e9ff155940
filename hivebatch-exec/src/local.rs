//! Simulations on the machine running the pipeline.

use hivebatch_core::{ComputeEnvironment, JobHandle, JobSpec, Resolved};
use sysinfo::{RefreshKind, System, SystemExt};

use crate::{dispatch, ExecOptions, Vars};

pub const LOCAL_HOST: &str = "localhost";

/// Number of logical cores available on this machine.
pub fn available_cores() -> usize {
    let system = System::new_with_specifics(RefreshKind::new().with_cpu());
    system.get_processors().len().max(1)
}

pub struct Local {
    options: ExecOptions,
    vars: Vars,
    cores: Option<usize>,
}

impl Local {
    pub fn new(options: ExecOptions, vars: Vars) -> Self {
        Local {
            options,
            vars,
            cores: None,
        }
    }

    /// Uses a fixed core count instead of querying the system.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = Some(cores);
        self
    }
}

impl ComputeEnvironment for Local {
    fn name(&self) -> &str {
        "local"
    }

    fn resolve(&self) -> hivebatch_core::Result<Resolved> {
        let cores = self.cores.unwrap_or_else(available_cores);
        let engines = self.options.physics_engines.max(1);
        Ok(Resolved {
            nodes: vec![LOCAL_HOST.to_string()],
            jobs_per_node: (cores / engines).max(1),
            propagate_env: self.options.propagate_env.clone(),
            run_id: std::process::id().to_string(),
        })
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
    use hivebatch_core::JobStatus;
    use std::path::PathBuf;

    #[test]
    fn parallelism_from_cores() {
        let options = ExecOptions {
            physics_engines: 4,
            ..ExecOptions::default()
        };
        let local = Local::new(options.clone(), Vars::default()).with_cores(16);
        let resolved = local.resolve().unwrap();
        assert_eq!(resolved.jobs_per_node, 4);
        assert_eq!(resolved.nodes, vec![LOCAL_HOST]);
        assert_eq!(resolved.run_id, std::process::id().to_string());

        // more engines than cores still runs one simulation at a time
        let local = Local::new(options, Vars::default()).with_cores(2);
        assert_eq!(local.resolve().unwrap().jobs_per_node, 1);
        assert!(available_cores() >= 1);
    }

    #[test]
    fn runs_jobs_with_propagated_env() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExecOptions {
            propagate_env: vec!["HIVEBATCH_MARKER".to_string()],
            ..ExecOptions::default()
        };
        let local = Local::new(options, Vars::from_pairs(vec![("HIVEBATCH_MARKER", "run")]))
            .with_cores(2);
        let resolved = local.resolve().unwrap();
        let jobs = (0..3)
            .map(|i| JobSpec {
                index: i,
                unit: 0,
                run: i as u32,
                command: format!("touch \"$HIVEBATCH_MARKER\"_{}", i),
                workdir: PathBuf::from(dir.path()),
            })
            .collect();
        let handles = local.submit(&resolved, jobs).unwrap();
        for handle in &handles {
            assert_eq!(handle.wait(), JobStatus::Exited(0));
        }
        for i in 0..3 {
            assert!(dir.path().join(format!("run_{}", i)).is_file());
        }
    }
}
