//! Persisted pipeline state.

use std::fs;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};

use crate::error::{Error, Result};
use crate::materialize::BatchSettings;
use crate::{OWNER_MARKER_FILE, PIPELINE_STATE_FILE, VERSION};

use super::Stage;

/// Completion record of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub completed_at: DateTime<Utc>,
    pub run_id: String,
}

fn default_engines() -> u32 {
    1
}

/// Record of which stages completed for a batch root, along with the
/// settings the batch was generated with.
///
/// Created by the generation stage. Regenerating a batch clears all stage
/// records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Version of the tool that created the batch
    pub version: String,
    pub criteria: String,
    pub scenario: String,
    /// File stem of the template configuration
    pub template_stem: String,
    pub n_units: usize,
    pub n_runs: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub sim_command: String,
    /// Physics engines used by each simulation
    #[serde(default = "default_engines")]
    pub n_engines: u32,
    #[serde(default)]
    pub time_setup: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
}

impl PipelineState {
    pub fn new(criteria: &str, scenario: &str, template_stem: &str, n_units: usize, n_runs: u32) -> Self {
        PipelineState {
            version: VERSION.to_string(),
            criteria: criteria.to_string(),
            scenario: scenario.to_string(),
            template_stem: template_stem.to_string(),
            n_units,
            n_runs,
            seed: 0,
            sim_command: String::new(),
            n_engines: default_engines(),
            time_setup: None,
            stages: Vec::new(),
        }
    }

    /// Takes over the settings a batch is being generated with.
    pub fn set_settings(&mut self, settings: &BatchSettings, n_engines: u32) {
        self.n_runs = settings.n_runs;
        self.seed = settings.seed;
        self.sim_command = settings.sim_command.clone();
        self.time_setup = settings.time_setup.map(|t| t.to_string());
        self.n_engines = n_engines;
    }

    /// Whether the batch was generated with exactly these settings.
    pub fn same_settings(&self, template_stem: &str, settings: &BatchSettings, n_engines: u32) -> bool {
        self.template_stem == template_stem
            && self.n_runs == settings.n_runs
            && self.seed == settings.seed
            && self.sim_command == settings.sim_command
            && self.time_setup == settings.time_setup.map(|t| t.to_string())
            && self.n_engines == n_engines
    }

    pub fn path(batch_root: &Path) -> PathBuf {
        batch_root.join(PIPELINE_STATE_FILE)
    }

    /// Loads the state of the given batch root, if there is one.
    ///
    /// State written by an incompatible version of the tool is rejected.
    pub fn load(batch_root: &Path) -> Result<Option<Self>> {
        let path = PipelineState::path(batch_root);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let state: PipelineState = toml::from_slice(&bytes)?;
        if !VersionReq::from_str(&format!("^{}", state.version))?
            .matches(&Version::from_str(VERSION)?)
        {
            return Err(Error::IncompatibleState(path, state.version));
        }
        Ok(Some(state))
    }

    /// Loads the state, failing if the batch root was never generated.
    pub fn load_required(batch_root: &Path, stage: Stage) -> Result<Self> {
        PipelineState::load(batch_root)?.ok_or_else(|| {
            Error::prerequisite(
                stage,
                format!(
                    "no pipeline state at {}, run stage 1 first",
                    batch_root.to_string_lossy()
                ),
            )
        })
    }

    pub fn save(&self, batch_root: &Path) -> Result<()> {
        fs::create_dir_all(batch_root)?;
        let text = toml::to_string(self)?;
        let path = PipelineState::path(batch_root);
        // replaced atomically
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.stages.iter().any(|r| r.stage == stage)
    }

    pub fn last_completed(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().rev().find(|r| r.stage == stage)
    }

    pub fn record(&mut self, stage: Stage, run_id: &str) {
        self.stages.push(StageRecord {
            stage,
            completed_at: Utc::now(),
            run_id: run_id.to_string(),
        });
    }
}

/// Exclusive claim on a batch root, released on drop.
#[derive(Debug)]
pub struct OwnerGuard {
    path: PathBuf,
}

impl OwnerGuard {
    pub fn acquire(batch_root: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(batch_root)?;
        let path = batch_root.join(OWNER_MARKER_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(run_id.as_bytes())?;
                Ok(OwnerGuard { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                Err(Error::BatchRootBusy(
                    batch_root.to_path_buf(),
                    owner.trim().to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "failed removing owner marker {}: {}",
                self.path.to_string_lossy(),
                e
            );
        }
    }
}
