//! Starting a single simulation on a node.

use std::process::{Command, Stdio};

use hivebatch_core::{JobSpec, JobStatus};

/// Node names that mean the host we're running on.
const LOCAL_NAMES: [&str; 3] = ["localhost", "127.0.0.1", ":"];

pub fn is_local(node: &str) -> bool {
    LOCAL_NAMES.contains(&node)
}

/// Command line executed on a remote node, changing into the job's working
/// directory and exporting the propagated variables first.
pub fn remote_command(job: &JobSpec, env: &[(String, String)]) -> String {
    let mut line = format!(
        "cd {}",
        shlex::quote(&job.workdir.to_string_lossy())
    );
    for (name, value) in env {
        line.push_str(&format!(" && export {}={}", name, shlex::quote(value)));
    }
    line.push_str(" && ");
    line.push_str(&job.command);
    line
}

fn command_for(node: &str, job: &JobSpec, env: &[(String, String)]) -> Command {
    if is_local(node) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&job.command)
            .current_dir(&job.workdir)
            .envs(env.iter().map(|(k, v)| (k, v)));
        cmd
    } else {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg(node)
            .arg(remote_command(job, env));
        cmd
    }
}

/// Runs the job on the node, blocking until it finishes.
pub fn launch(node: &str, job: &JobSpec, env: &[(String, String)]) -> JobStatus {
    trace!("exp{} run {} on {}: {}", job.unit, job.run, node, job.command);
    let status = command_for(node, job, env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) => match status.code() {
            Some(code) => JobStatus::Exited(code),
            None => JobStatus::Failed(format!("terminated by signal ({})", status)),
        },
        Err(e) => JobStatus::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job(command: &str, workdir: PathBuf) -> JobSpec {
        JobSpec {
            index: 0,
            unit: 0,
            run: 0,
            command: command.to_string(),
            workdir,
        }
    }

    #[test]
    fn remote_exports() {
        let job = job("argos3 -c main_0.xml", PathBuf::from("/scratch/my batch/exp0"));
        let env = vec![("ARGOS_PLUGIN_PATH".to_string(), "/opt/a b".to_string())];
        assert_eq!(
            remote_command(&job, &env),
            "cd \"/scratch/my batch/exp0\" && export ARGOS_PLUGIN_PATH=\"/opt/a b\" && argos3 -c main_0.xml"
        );
    }

    #[test]
    fn local_launch_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let env = vec![("HIVEBATCH_TEST_VALUE".to_string(), "42".to_string())];
        let status = launch(
            "localhost",
            &job(
                "test \"$HIVEBATCH_TEST_VALUE\" = 42 && touch done",
                dir.path().to_path_buf(),
            ),
            &env,
        );
        assert_eq!(status, JobStatus::Exited(0));
        assert!(dir.path().join("done").is_file());

        let status = launch("localhost", &job("exit 7", dir.path().to_path_buf()), &[]);
        assert_eq!(status, JobStatus::Exited(7));
    }
}
