use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown compute environment: {0}, expected one of: local, pbs, slurm, adhoc")]
    UnknownEnvironment(String),
    #[error("invalid node list: {0}")]
    InvalidNodeList(String),
    #[error("failed parsing {0} as a positive integer: {1}")]
    InvalidCount(String, String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("other: {0}")]
    Other(String),

    #[error("{0}")]
    CoreError(#[from] hivebatch_core::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<Error> for hivebatch_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CoreError(e) => e,
            Error::IoError(e) => hivebatch_core::Error::IoError(e),
            e => hivebatch_core::Error::Other(e.to_string()),
        }
    }
}
