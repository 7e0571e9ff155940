//! Arena geometry and entity distribution constraints.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::mutation::MutationSet;
use crate::variables::arena;

/// Block/entity distribution topology of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    SingleSource,
    DualSource,
    QuadSource,
    PowerLaw,
    Random,
}

impl Topology {
    /// Required ratio of arena X to arena Y.
    pub fn aspect(&self) -> u32 {
        match self {
            Topology::SingleSource | Topology::DualSource => 2,
            Topology::QuadSource | Topology::PowerLaw | Topology::Random => 1,
        }
    }

    /// Short tag used in scenario strings.
    pub fn tag(&self) -> &'static str {
        match self {
            Topology::SingleSource => "SS",
            Topology::DualSource => "DS",
            Topology::QuadSource => "QS",
            Topology::PowerLaw => "PL",
            Topology::Random => "RN",
        }
    }

    /// Name used within the configuration document.
    pub fn dist_type(&self) -> &'static str {
        match self {
            Topology::SingleSource => "single_source",
            Topology::DualSource => "dual_source",
            Topology::QuadSource => "quad_source",
            Topology::PowerLaw => "powerlaw",
            Topology::Random => "random",
        }
    }
}

impl FromStr for Topology {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SS" | "single_source" => Ok(Topology::SingleSource),
            "DS" | "dual_source" => Ok(Topology::DualSource),
            "QS" | "quad_source" => Ok(Topology::QuadSource),
            "PL" | "powerlaw" | "power_law" => Ok(Topology::PowerLaw),
            "RN" | "random" => Ok(Topology::Random),
            _ => Err(Error::Other(format!("unknown block distribution: {}", s))),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Arena dimensions, distribution topology and physics engine count shared
/// by a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub arena_x: u32,
    pub arena_y: u32,
    pub topology: Topology,
    pub n_engines: u32,
}

impl ScenarioSpec {
    pub fn new(topology: Topology, arena_x: u32, arena_y: u32, n_engines: u32) -> Self {
        ScenarioSpec {
            arena_x,
            arena_y,
            topology,
            n_engines,
        }
    }

    /// Parses a scenario string in the `{topology}.{X}x{Y}` form, e.g.
    /// `SS.32x16`.
    pub fn parse(input: &str, n_engines: u32) -> Result<Self> {
        let split = input.split('.').collect::<Vec<&str>>();
        if split.len() != 2 {
            return Err(Error::Other(format!(
                "failed parsing scenario `{}`, expected `{{topology}}.{{X}}x{{Y}}`",
                input
            )));
        }
        let topology = Topology::from_str(split[0])?;
        let dims = split[1].split('x').collect::<Vec<&str>>();
        if dims.len() != 2 {
            return Err(Error::Other(format!(
                "failed parsing arena dimensions `{}` in scenario `{}`",
                split[1], input
            )));
        }
        Ok(ScenarioSpec::new(
            topology,
            dims[0].parse()?,
            dims[1].parse()?,
            n_engines,
        ))
    }

    /// Same scenario with different arena dimensions.
    pub fn with_dims(&self, arena_x: u32, arena_y: u32) -> Self {
        ScenarioSpec {
            arena_x,
            arena_y,
            ..*self
        }
    }

    /// Checks topology shape and physics engine divisibility constraints.
    pub fn validate(&self) -> Result<()> {
        let aspect = self.topology.aspect();
        if aspect.checked_mul(self.arena_y) != Some(self.arena_x) {
            return Err(Error::ShapeViolation(format!(
                "{} distribution requires X = {}*Y, got {}x{}",
                self.topology, aspect, self.arena_x, self.arena_y
            )));
        }
        if self.n_engines == 0 {
            return Err(Error::DivisibilityViolation(
                "physics engine count must be at least 1".to_string(),
            ));
        }
        if self.arena_x % self.n_engines != 0 || self.arena_y % self.n_engines != 0 {
            return Err(Error::DivisibilityViolation(format!(
                "arena {}x{} can't be evenly divided between {} physics engines",
                self.arena_x, self.arena_y, self.n_engines
            )));
        }
        Ok(())
    }

    /// Mutations setting up arena geometry and distribution type in the
    /// template.
    pub fn mutations(&self) -> MutationSet {
        let mut set = arena::shape_mutations(self.arena_x, self.arena_y);
        set.push(
            ".//arena_map/blocks/distribution",
            "dist_type",
            self.topology.dist_type(),
        );
        set
    }

    pub fn area(&self) -> u64 {
        self.arena_x as u64 * self.arena_y as u64
    }
}

impl fmt::Display for ScenarioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}x{}", self.topology, self.arena_x, self.arena_y)
    }
}
