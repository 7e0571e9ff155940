//! Compute environment backends for `hivebatch`.
//!
//! Every backend implements [`ComputeEnvironment`] from `hivebatch-core`:
//! it resolves the nodes simulations may run on, how many of them can run
//! concurrently on each node and an identifier for the invocation, then
//! dispatches jobs on a bounded [`WorkerPool`].
//!
//! | Backend | Parallelism | Nodes | Run id |
//! |---|---|---|---|
//! | `local` | cores ÷ physics engines | local host | process id |
//! | `pbs` | `PBS_NUM_PPN` ÷ sims per node | `PBS_NODEFILE` | `PBS_JOBID` |
//! | `slurm` | `SLURM_CPUS_PER_TASK` or sims per node | `SLURM_JOB_NODELIST` | `SLURM_JOB_ID` |
//! | `adhoc` | sims per node, default 1 | node file | generated |
//!
//! Scheduler variables are read from a [`Vars`] snapshot taken when the
//! backend is created.
//!
//! [`ComputeEnvironment`]: ../hivebatch_core/exec/trait.ComputeEnvironment.html
//! [`WorkerPool`]: pool/struct.WorkerPool.html
//! [`Vars`]: struct.Vars.html

#[macro_use]
extern crate log;

pub mod adhoc;
pub mod launcher;
pub mod local;
pub mod nodes;
pub mod pbs;
pub mod pool;
pub mod slurm;

mod error;
mod vars;

pub use adhoc::Adhoc;
pub use error::{Error, Result};
pub use local::Local;
pub use pbs::Pbs;
pub use pool::WorkerPool;
pub use slurm::Slurm;
pub use vars::Vars;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use hivebatch_core::{ComputeEnvironment, JobHandle, JobSpec, Resolved};

/// Supported compute environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Local,
    Pbs,
    Slurm,
    Adhoc,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Local => "local",
            Kind::Pbs => "pbs",
            Kind::Slurm => "slurm",
            Kind::Adhoc => "adhoc",
        }
    }
}

impl FromStr for Kind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Kind::Local),
            "pbs" | "scheduler-a" => Ok(Kind::Pbs),
            "slurm" | "scheduler-b" => Ok(Kind::Slurm),
            "adhoc" => Ok(Kind::Adhoc),
            _ => Err(Error::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Settings shared by all backends, mostly coming from command line flags.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Physics engines used by a single simulation
    pub physics_engines: usize,
    /// Simulations to run on each node, meaning depends on the backend
    pub sims_per_node: Option<usize>,
    /// Node file for the adhoc backend
    pub nodefile: Option<PathBuf>,
    /// Environment variables exported to every simulation
    pub propagate_env: Vec<String>,
    /// Once set, no further queued job is started
    pub cancel: Arc<AtomicBool>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        ExecOptions {
            physics_engines: 1,
            sims_per_node: None,
            nodefile: None,
            propagate_env: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Creates the named backend, reading scheduler variables from the current
/// process environment.
pub fn from_name(
    name: &str,
    options: ExecOptions,
) -> Result<Box<dyn ComputeEnvironment + Send + Sync>> {
    create(Kind::from_str(name)?, options, Vars::from_env())
}

pub fn create(
    kind: Kind,
    options: ExecOptions,
    vars: Vars,
) -> Result<Box<dyn ComputeEnvironment + Send + Sync>> {
    debug!("using {} compute environment", kind);
    Ok(match kind {
        Kind::Local => Box::new(Local::new(options, vars)),
        Kind::Pbs => Box::new(Pbs::new(options, vars)),
        Kind::Slurm => Box::new(Slurm::new(options, vars)),
        Kind::Adhoc => Box::new(Adhoc::new(options, vars)),
    })
}

/// Dispatches jobs on a worker pool, exporting the propagated variables
/// found in the snapshot.
pub(crate) fn dispatch(
    vars: &Vars,
    cancel: &Arc<AtomicBool>,
    resolved: &Resolved,
    jobs: Vec<JobSpec>,
) -> hivebatch_core::Result<Vec<JobHandle>> {
    let env = vars.select(&resolved.propagate_env);
    let pool = WorkerPool::new(env, cancel.clone());
    Ok(pool.submit(resolved, jobs)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(Kind::from_str("scheduler-a").unwrap(), Kind::Pbs);
        assert_eq!(Kind::from_str("scheduler-b").unwrap(), Kind::Slurm);
        assert_eq!(Kind::from_str("Local").unwrap(), Kind::Local);
        assert!(matches!(
            Kind::from_str("condor"),
            Err(Error::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn missing_scheduler_vars() {
        let env = create(Kind::Slurm, ExecOptions::default(), Vars::default()).unwrap();
        assert!(matches!(
            env.resolve(),
            Err(hivebatch_core::Error::EnvironmentVariableMissing(_))
        ));
    }
}
