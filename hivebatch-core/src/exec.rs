//! Compute environment interface.
//!
//! The pipeline only ever talks to a compute environment through the
//! [`ComputeEnvironment`] trait. Concrete backends live in the
//! `hivebatch-exec` crate.
//!
//! [`ComputeEnvironment`]: trait.ComputeEnvironment.html

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::Result;

/// Resources resolved by a compute environment for a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    /// Hosts simulations can be dispatched to, in order, without duplicates
    pub nodes: Vec<String>,
    /// Simulations allowed to run concurrently on each node
    pub jobs_per_node: usize,
    /// Environment variables exported to every simulation
    pub propagate_env: Vec<String>,
    /// Identifier unique to this invocation
    pub run_id: String,
}

impl Resolved {
    /// Total number of concurrently running simulations.
    pub fn slots(&self) -> usize {
        self.nodes.len() * self.jobs_per_node
    }
}

/// Single simulation invocation handed to a compute environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Position in dispatch order
    pub index: usize,
    /// Experiment unit the job belongs to
    pub unit: usize,
    pub run: u32,
    /// Shell command line to execute
    pub command: String,
    /// Directory the command is executed from
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Exited(i32),
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        match self {
            JobStatus::Queued | JobStatus::Running => false,
            _ => true,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Exited(code) => write!(f, "exited with code {}", code),
            JobStatus::Failed(reason) => write!(f, "failed: {}", reason),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Shared, pollable handle to a submitted job.
///
/// Backends update the status through [`set`], the pipeline polls or waits
/// on it.
///
/// [`set`]: struct.JobHandle.html#method.set
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job: Arc<JobSpec>,
    status: Arc<(Mutex<JobStatus>, Condvar)>,
}

impl JobHandle {
    pub fn new(job: JobSpec) -> Self {
        JobHandle {
            job: Arc::new(job),
            status: Arc::new((Mutex::new(JobStatus::Queued), Condvar::new())),
        }
    }

    pub fn poll(&self) -> JobStatus {
        let (lock, _) = &*self.status;
        match lock.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.poll().is_done()
    }

    pub fn set(&self, status: JobStatus) {
        let (lock, cvar) = &*self.status;
        let mut guard = match lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = status;
        cvar.notify_all();
    }

    /// Blocks until the job reaches a final status.
    pub fn wait(&self) -> JobStatus {
        let (lock, cvar) = &*self.status;
        let mut guard = match lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !guard.is_done() {
            guard = match cvar.wait_timeout(guard, Duration::from_millis(500)) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        guard.clone()
    }
}

/// Where and how simulations are executed.
///
/// Implementations are constructed once per invocation and don't change
/// afterwards.
pub trait ComputeEnvironment {
    /// Short name of the environment, e.g. `local` or `slurm`.
    fn name(&self) -> &str;

    /// Resolves nodes, parallelism and run identifier. Fails before
    /// anything is dispatched if required environment variables are
    /// missing.
    fn resolve(&self) -> Result<Resolved>;

    /// Submits jobs for execution. Jobs are started in the given order,
    /// the returned handles are in the same order.
    fn submit(&self, resolved: &Resolved, jobs: Vec<JobSpec>) -> Result<Vec<JobHandle>>;
}

#[test]
fn handle_status_updates() {
    let handle = JobHandle::new(JobSpec {
        index: 0,
        unit: 0,
        run: 0,
        command: "true".to_string(),
        workdir: PathBuf::from("."),
    });
    assert_eq!(handle.poll(), JobStatus::Queued);
    assert!(!handle.is_done());
    let other = handle.clone();
    std::thread::spawn(move || other.set(JobStatus::Exited(0)));
    assert_eq!(handle.wait(), JobStatus::Exited(0));
}
