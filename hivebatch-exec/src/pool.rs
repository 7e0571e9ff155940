//! Bounded worker pool.
//!
//! One worker thread is started for every node and job slot on that node.
//! Workers pull jobs off a shared queue in index order, so jobs start in
//! order but may finish out of order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use hivebatch_core::{JobHandle, JobSpec, JobStatus, Resolved};

use crate::error::{Error, Result};
use crate::launcher;

/// Function running a single job on a node.
pub type LaunchFn = dyn Fn(&str, &JobSpec, &[(String, String)]) -> JobStatus + Send + Sync;

type Worker = Box<dyn FnOnce() + Send + 'static>;

fn spawn_named(n: usize, worker: Worker) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("worker-{}", n))
        .spawn(worker)
}

pub struct WorkerPool {
    env: Arc<Vec<(String, String)>>,
    cancel: Arc<AtomicBool>,
    launch: Arc<LaunchFn>,
}

impl WorkerPool {
    /// Creates a pool launching jobs with the default launcher.
    pub fn new(env: Vec<(String, String)>, cancel: Arc<AtomicBool>) -> Self {
        WorkerPool {
            env: Arc::new(env),
            cancel,
            launch: Arc::new(launcher::launch),
        }
    }

    pub fn with_launcher(mut self, launch: Arc<LaunchFn>) -> Self {
        self.launch = launch;
        self
    }

    /// Queues all jobs and starts the workers, returning right away.
    ///
    /// Once the cancel flag is set, jobs still in the queue are marked
    /// cancelled instead of being started. Running jobs are left alone.
    pub fn submit(&self, resolved: &Resolved, jobs: Vec<JobSpec>) -> Result<Vec<JobHandle>> {
        self.submit_with(resolved, jobs, spawn_named)
    }

    /// If a worker can't be started, the ones already running are stopped
    /// and joined before the error is returned.
    fn submit_with<S>(
        &self,
        resolved: &Resolved,
        jobs: Vec<JobSpec>,
        spawn: S,
    ) -> Result<Vec<JobHandle>>
    where
        S: Fn(usize, Worker) -> io::Result<JoinHandle<()>>,
    {
        if resolved.slots() == 0 {
            return Err(Error::InvalidNodeList(format!(
                "{} node(s) with {} job(s) each leave no slot to run on",
                resolved.nodes.len(),
                resolved.jobs_per_node
            )));
        }
        let handles = jobs.into_iter().map(JobHandle::new).collect::<Vec<_>>();
        let (sender, receiver) = unbounded();
        for handle in &handles {
            if sender.send(handle.clone()).is_err() {
                return Err(Error::Other("job queue closed".to_string()));
            }
        }
        drop(sender);

        let abort = Arc::new(AtomicBool::new(false));
        let workers = resolved.slots().min(handles.len());
        let mut started = Vec::with_capacity(workers);
        for n in 0..workers {
            let node = resolved.nodes[n % resolved.nodes.len()].clone();
            let receiver = receiver.clone();
            let env = self.env.clone();
            let cancel = self.cancel.clone();
            let abort_worker = abort.clone();
            let launch = self.launch.clone();
            let worker: Worker = Box::new(move || {
                let stop = [cancel.as_ref(), abort_worker.as_ref()];
                work(&node, receiver, &env, &stop, launch.as_ref())
            });
            match spawn(n, worker) {
                Ok(thread) => started.push(thread),
                Err(e) => {
                    warn!(
                        "failed starting worker {}, stopping {} started worker(s)",
                        n,
                        started.len()
                    );
                    abort.store(true, Ordering::SeqCst);
                    for thread in started {
                        let _ = thread.join();
                    }
                    return Err(e.into());
                }
            }
        }
        debug!(
            "started {} worker(s) for {} job(s)",
            workers,
            handles.len()
        );
        Ok(handles)
    }
}

fn work(
    node: &str,
    queue: Receiver<JobHandle>,
    env: &[(String, String)],
    stop: &[&AtomicBool],
    launch: &LaunchFn,
) {
    while let Ok(handle) = queue.recv() {
        if stop.iter().any(|flag| flag.load(Ordering::SeqCst)) {
            handle.set(JobStatus::Cancelled);
            continue;
        }
        handle.set(JobStatus::Running);
        let status = launch(node, &handle.job, env);
        if status != JobStatus::Exited(0) {
            debug!(
                "exp{} run {} on {} {}",
                handle.job.unit, handle.job.run, node, status
            );
        }
        handle.set(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    fn jobs(n: usize) -> Vec<JobSpec> {
        (0..n)
            .map(|i| JobSpec {
                index: i,
                unit: i / 2,
                run: (i % 2) as u32,
                command: format!("job {}", i),
                workdir: PathBuf::from("."),
            })
            .collect()
    }

    fn resolved(nodes: &[&str], jobs_per_node: usize) -> Resolved {
        Resolved {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            jobs_per_node,
            propagate_env: Vec::new(),
            run_id: "test".to_string(),
        }
    }

    #[test]
    fn single_slot_keeps_index_order() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let record = started.clone();
        let pool = WorkerPool::new(Vec::new(), Arc::new(AtomicBool::new(false))).with_launcher(
            Arc::new(move |_node: &str, job: &JobSpec, _env: &[(String, String)]| {
                record.lock().unwrap().push(job.index);
                JobStatus::Exited(0)
            }),
        );
        let handles = pool.submit(&resolved(&["localhost"], 1), jobs(6)).unwrap();
        for handle in &handles {
            assert_eq!(handle.wait(), JobStatus::Exited(0));
        }
        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn spreads_over_nodes() {
        let nodes = Arc::new(Mutex::new(Vec::new()));
        let record = nodes.clone();
        let pool = WorkerPool::new(Vec::new(), Arc::new(AtomicBool::new(false))).with_launcher(
            Arc::new(move |node: &str, _job: &JobSpec, _env: &[(String, String)]| {
                thread::sleep(Duration::from_millis(50));
                record.lock().unwrap().push(node.to_string());
                JobStatus::Exited(0)
            }),
        );
        let handles = pool
            .submit(&resolved(&["node1", "node2"], 2), jobs(8))
            .unwrap();
        handles.iter().for_each(|h| {
            h.wait();
        });
        let nodes = nodes.lock().unwrap();
        assert_eq!(nodes.len(), 8);
        assert!(nodes.iter().any(|n| n == "node1"));
        assert!(nodes.iter().any(|n| n == "node2"));
    }

    #[test]
    fn cancelled_jobs_are_not_started() {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let pool = WorkerPool::new(Vec::new(), cancel).with_launcher(Arc::new(
            move |_node: &str, _job: &JobSpec, _env: &[(String, String)]| {
                flag.store(true, Ordering::SeqCst);
                JobStatus::Exited(0)
            },
        ));
        let handles = pool.submit(&resolved(&["localhost"], 1), jobs(3)).unwrap();
        let statuses = handles.iter().map(|h| h.wait()).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Exited(0),
                JobStatus::Cancelled,
                JobStatus::Cancelled
            ]
        );
    }

    #[test]
    fn failed_spawn_stops_started_workers() {
        let launched = Arc::new(Mutex::new(0));
        let record = launched.clone();
        let pool = WorkerPool::new(Vec::new(), Arc::new(AtomicBool::new(false))).with_launcher(
            Arc::new(move |_node: &str, _job: &JobSpec, _env: &[(String, String)]| {
                *record.lock().unwrap() += 1;
                thread::sleep(Duration::from_millis(10));
                JobStatus::Exited(0)
            }),
        );
        let result = pool.submit_with(&resolved(&["localhost"], 3), jobs(20), |n, worker| {
            if n == 1 {
                Err(io::Error::new(io::ErrorKind::Other, "no more threads"))
            } else {
                spawn_named(n, worker)
            }
        });
        assert!(matches!(result, Err(Error::IoError(_))));
        // the started worker was joined, nothing runs after the error
        let at_return = *launched.lock().unwrap();
        assert!(at_return < 20);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*launched.lock().unwrap(), at_return);
    }

    #[test]
    fn no_slots() {
        let pool = WorkerPool::new(Vec::new(), Arc::new(AtomicBool::new(false)));
        assert!(pool.submit(&resolved(&[], 4), jobs(1)).is_err());
    }
}
