//! This library implements the core of the `hivebatch` experiment
//! orchestrator.
//!
//! Given a compact *batch criteria* string (for example
//! `population_size.Log1024`) and a template simulation configuration, the
//! library produces a matrix of concrete experiment configurations and drives
//! them through a staged pipeline: generation, execution, processing,
//! visualization and comparison.
//!
//! # Batch criteria
//!
//! Criteria strings are parsed into a [`CriteriaDescriptor`]. Each criteria
//! family knows how to turn its descriptor into an ordered sequence of
//! [`MutationSet`]s, one per experiment. Mutation sets only ever overwrite
//! attributes that already exist in the template document.
//!
//! # Pipeline
//!
//! The [`Pipeline`] owns a single batch root directory and the persisted
//! [`PipelineState`] within it. Execution is delegated to an implementation of
//! the [`ComputeEnvironment`] trait. This library does not provide any
//! concrete compute environment, for the local, PBS, Slurm and ad-hoc backends
//! see `hivebatch-exec`.
//!
//! ## Example
//!
//! ```ignore
//! use hivebatch_core::{criteria, variables, AuxConfig, ScenarioSpec};
//!
//! let desc = criteria::parse("population_size.Log64")?;
//! let scenario = ScenarioSpec::parse("QS.16x16", 4)?;
//! let sets = variables::generate(&desc, &variables::GenContext::new(&AuxConfig::default(), &scenario))?;
//! assert_eq!(sets.len(), 7);
//! ```
//!
//! [`CriteriaDescriptor`]: criteria/struct.CriteriaDescriptor.html
//! [`MutationSet`]: mutation/struct.MutationSet.html
//! [`Pipeline`]: pipeline/struct.Pipeline.html
//! [`PipelineState`]: pipeline/state/struct.PipelineState.html
//! [`ComputeEnvironment`]: exec/trait.ComputeEnvironment.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use config::AuxConfig;
pub use criteria::{CriteriaDescriptor, Family};
pub use error::{Error, Result};
pub use exec::{ComputeEnvironment, JobHandle, JobSpec, JobStatus, Resolved};
pub use materialize::{ExperimentUnit, Materializer};
pub use mutation::{Mutation, MutationSet};
pub use pipeline::{Pipeline, Stage};
pub use scenario::{ScenarioSpec, Topology};
pub use time_setup::TimeSetup;

pub mod config;
pub mod criteria;
pub mod error;
pub mod exec;
pub mod materialize;
pub mod mutation;
pub mod pipeline;
pub mod scenario;
pub mod time_setup;
pub mod variables;
pub mod xml;

mod util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Name of the persisted pipeline state file within the batch root.
pub const PIPELINE_STATE_FILE: &str = "pipeline.toml";
/// Name of the marker file claiming a batch root for a single invocation.
pub const OWNER_MARKER_FILE: &str = ".owner";
/// Prefix of every experiment unit directory, followed by the unit index.
pub const EXP_DIR_PREFIX: &str = "exp";
/// Serialized mutation set stored within each experiment unit directory.
pub const EXP_DEF_FILE: &str = "exp_def.bin";
/// Simulator command list stored within each experiment unit directory.
pub const COMMANDS_FILE: &str = "commands.txt";
/// Directory within each experiment unit holding raw simulator output.
pub const OUTPUT_DIR_NAME: &str = "output";
/// Directory within each experiment unit holding averaged run output.
pub const AVERAGED_DIR_NAME: &str = "averaged";
/// Scratch directory within the batch root used by compute environments.
pub const EXEC_DIR_NAME: &str = ".exec";

/// Delimiter used by simulator metrics files.
pub const CSV_DELIMITER: u8 = b';';

/// Floating point number type used throughout the library.
pub type Float = f64;
