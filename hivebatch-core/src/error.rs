//! Error types.

use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;

use crate::pipeline::Stage;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[cfg(feature = "yaml")]
    #[error("yaml deserialization error: {0}")]
    YamlDeserError(#[from] serde_yaml::Error),
    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),
    #[error("toml serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("csv error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("semver req parse error: {0}")]
    SemverReqParseError(#[from] semver::ReqParseError),
    #[error("semver error: {0}")]
    SemverError(#[from] semver::SemVerError),
    #[error("failed parsing int: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("failed parsing float: {0}")]
    ParseFloatError(#[from] ParseFloatError),

    #[error("xml error: {0}")]
    XmlError(String),
    #[error("unsupported config file extension: {0}")]
    UnsupportedConfigFormat(String),

    /// Malformed criteria string, the offending token is always included.
    #[error("bad criteria token `{token}` in `{criteria}`: {reason}")]
    GrammarError {
        criteria: String,
        token: String,
        reason: String,
    },
    #[error("scenario shape violation: {0}")]
    ShapeViolation(String),
    #[error("scenario divisibility violation: {0}")]
    DivisibilityViolation(String),
    #[error("auxiliary config is missing required data: {0}")]
    AuxConfigMissing(String),
    #[error("invalid auxiliary config value: {0}")]
    InvalidAuxConfig(String),

    #[error("required environment variable not set: {0}")]
    EnvironmentVariableMissing(String),
    #[error("stage {stage} prerequisite not met: {reason}")]
    StagePrerequisite { stage: Stage, reason: String },
    #[error("{failed} of {total} simulation jobs failed or were preempted, re-run stage 2 to resume")]
    WorkerFailure { failed: usize, total: usize },
    #[error("batch root {0} is in use by run `{1}`")]
    BatchRootBusy(PathBuf, String),
    #[error("pipeline state at {0} was written by incompatible version {1}")]
    IncompatibleState(PathBuf, String),
    #[error("external collaborator failed: {0}")]
    CollaboratorFailed(String),

    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    pub(crate) fn grammar(criteria: &str, token: &str, reason: impl Into<String>) -> Self {
        Error::GrammarError {
            criteria: criteria.to_string(),
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn prerequisite(stage: Stage, reason: impl Into<String>) -> Self {
        Error::StagePrerequisite {
            stage,
            reason: reason.into(),
        }
    }
}
