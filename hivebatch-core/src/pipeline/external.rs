//! External collaborators for stages 4 and 5.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

use super::state::PipelineState;

/// Produces visualizations for a single processed batch.
pub trait Renderer {
    fn render(&self, batch_root: &Path, state: &PipelineState) -> Result<()>;
}

/// Compares two or more processed batches.
pub trait Comparator {
    fn compare(&self, batch_roots: &[PathBuf]) -> Result<()>;
}

/// Collaborator running a configured shell command.
///
/// Within the command `{batch_root}` is replaced with the quoted batch root,
/// `{batch_roots}` with all quoted batch roots separated by spaces and
/// `{criteria}` with the quoted criteria string. Without a command the stage
/// does nothing.
#[derive(Debug, Clone, Default)]
pub struct ExternalCommand {
    command: Option<String>,
}

impl ExternalCommand {
    pub fn new(command: Option<String>) -> Self {
        ExternalCommand { command }
    }

    fn quote(path: &Path) -> String {
        shlex::quote(&path.to_string_lossy()).into_owned()
    }

    fn execute(&self, command: &str) -> Result<()> {
        info!("running external command: {}", command);
        let status = Command::new("sh").arg("-c").arg(command).status()?;
        if !status.success() {
            return Err(Error::CollaboratorFailed(format!(
                "`{}` exited with {}",
                command, status
            )));
        }
        Ok(())
    }
}

impl Renderer for ExternalCommand {
    fn render(&self, batch_root: &Path, state: &PipelineState) -> Result<()> {
        let command = match &self.command {
            Some(c) => c,
            None => {
                info!("no visualization command configured, skipping");
                return Ok(());
            }
        };
        let command = command
            .replace("{batch_root}", &ExternalCommand::quote(batch_root))
            .replace("{batch_roots}", &ExternalCommand::quote(batch_root))
            .replace("{criteria}", &shlex::quote(&state.criteria));
        self.execute(&command)
    }
}

impl Comparator for ExternalCommand {
    fn compare(&self, batch_roots: &[PathBuf]) -> Result<()> {
        let command = match &self.command {
            Some(c) => c,
            None => {
                info!("no comparison command configured, skipping");
                return Ok(());
            }
        };
        let roots = batch_roots
            .iter()
            .map(|r| ExternalCommand::quote(r))
            .collect::<Vec<_>>()
            .join(" ");
        let first = batch_roots
            .first()
            .map(|r| ExternalCommand::quote(r))
            .unwrap_or_default();
        let command = command
            .replace("{batch_roots}", &roots)
            .replace("{batch_root}", &first);
        self.execute(&command)
    }
}
