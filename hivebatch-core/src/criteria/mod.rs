//! Batch criteria definitions.
//!
//! A criteria string is a set of dot-separated tokens. The first token
//! selects the variable family, the remaining ones are family specific:
//!
//! ```text
//! population_size.Log1024
//! population_dynamics.C8.F2p0.B0p001.D0p001.Z16
//! population_density.CD1p0.I16.C4
//! temporal_variance.BCStepU1000
//! saa_noise.sensors.C4.Z16
//! ```
//!
//! Decimal values use `p` in place of the decimal point, so `0p01` reads as
//! `0.01`.
//!
//! The set of families is closed. Projects needing additional families can
//! add them through [`CriteriaRegistry::register`], they are never discovered
//! at runtime.
//!
//! [`CriteriaRegistry::register`]: struct.CriteriaRegistry.html#method.register

mod parser;

use std::fmt;
use std::sync::Arc;

use fnv::FnvHashMap;

use crate::error::{Error, Result};
use crate::mutation::MutationSet;
use crate::variables::{self, GenContext};
use crate::Float;

/// Criteria variable family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    PopulationSize,
    BlockQuantity,
    PopulationDynamics,
    PopulationDensity,
    BlockDensity,
    BlockMotionDynamics,
    TemporalVariance,
    Oracle,
    TaPolicySet,
    SaaNoise,
    /// Family added through the registration interface
    Custom(String),
}

impl Family {
    pub const BUILTIN: [Family; 10] = [
        Family::PopulationSize,
        Family::BlockQuantity,
        Family::PopulationDynamics,
        Family::PopulationDensity,
        Family::BlockDensity,
        Family::BlockMotionDynamics,
        Family::TemporalVariance,
        Family::Oracle,
        Family::TaPolicySet,
        Family::SaaNoise,
    ];

    pub fn name(&self) -> &str {
        match self {
            Family::PopulationSize => "population_size",
            Family::BlockQuantity => "block_quantity",
            Family::PopulationDynamics => "population_dynamics",
            Family::PopulationDensity => "population_density",
            Family::BlockDensity => "block_density",
            Family::BlockMotionDynamics => "block_motion_dynamics",
            Family::TemporalVariance => "temporal_variance",
            Family::Oracle => "oracle",
            Family::TaPolicySet => "ta_policy_set",
            Family::SaaNoise => "saa_noise",
            Family::Custom(name) => name,
        }
    }

    /// Looks up a builtin family by name.
    pub fn builtin(name: &str) -> Option<Family> {
        Family::BUILTIN.iter().find(|f| f.name() == name).cloned()
    }

    /// Whether the family accepts the fixed population `Z` token. Families
    /// that sweep the population themselves don't.
    pub fn accepts_population_override(&self) -> bool {
        match self {
            Family::PopulationSize | Family::PopulationDensity => false,
            _ => true,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Increment {
    Log,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateKind {
    Birth,
    Death,
    Malfunction,
    Repair,
}

impl RateKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RateKind::Birth => "B",
            RateKind::Death => "D",
            RateKind::Malfunction => "M",
            RateKind::Repair => "R",
        }
    }

    /// Attribute name within the configuration document.
    pub fn attr(&self) -> &'static str {
        match self {
            RateKind::Birth => "birth_mu",
            RateKind::Death => "death_lambda",
            RateKind::Malfunction => "malfunction_lambda",
            RateKind::Repair => "repair_mu",
        }
    }
}

/// Category of applied penalty for temporal variance criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyCategory {
    /// Block carry throttle
    BlockCarry,
    /// Block manipulation penalty
    BlockManipulation,
}

impl PenaltyCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            PenaltyCategory::BlockCarry => "BC",
            PenaltyCategory::BlockManipulation => "BM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    /// Step up after the given number of timesteps
    StepUp(u32),
    /// Step down after the given number of timesteps
    StepDown(u32),
}

impl Waveform {
    pub fn is_step(&self) -> bool {
        match self {
            Waveform::StepUp(_) | Waveform::StepDown(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleKind {
    Entities,
    Tasking,
}

impl OracleKind {
    pub fn name(&self) -> &'static str {
        match self {
            OracleKind::Entities => "entities",
            OracleKind::Tasking => "tasking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseCategory {
    Sensors,
    Actuators,
    All,
}

/// Single typed parameter of a criteria descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    Increment { kind: Increment, bound: u32 },
    Cardinality(u32),
    /// Linear scale factor of a rate ramp
    Factor(Float),
    Rate { kind: RateKind, value: Float },
    RandomWalk(Float),
    Density(Float),
    ArenaIncrement(u32),
    Variance {
        category: PenaltyCategory,
        waveform: Waveform,
    },
    Oracle(OracleKind),
    PolicySetAll,
    Noise(NoiseCategory),
    /// Fixed population override
    Population(u32),
    /// Raw token of a registered custom family
    Token(String),
}

impl Param {
    /// Key identifying the parameter slot, two params with the same key can't
    /// appear in one descriptor.
    pub(crate) fn slot(&self) -> String {
        match self {
            Param::Increment { .. } => "increment".to_string(),
            Param::Cardinality(_) => "cardinality".to_string(),
            Param::Factor(_) => "factor".to_string(),
            Param::Rate { kind, .. } => format!("rate:{}", kind.tag()),
            Param::RandomWalk(_) => "random_walk".to_string(),
            Param::Density(_) => "density".to_string(),
            Param::ArenaIncrement(_) => "arena_increment".to_string(),
            Param::Variance { .. } => "variance".to_string(),
            Param::Oracle(_) => "oracle".to_string(),
            Param::PolicySetAll => "policy_set".to_string(),
            Param::Noise(_) => "noise".to_string(),
            Param::Population(_) => "population".to_string(),
            Param::Token(t) => format!("token:{}", t),
        }
    }
}

/// Parsed criteria string.
///
/// Cardinality is not stored, it's computed by the generators as it may
/// depend on auxiliary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaDescriptor {
    cli_arg: String,
    family: Family,
    params: Vec<Param>,
}

impl CriteriaDescriptor {
    pub(crate) fn new(cli_arg: &str, family: Family, params: Vec<Param>) -> Self {
        CriteriaDescriptor {
            cli_arg: cli_arg.to_string(),
            family,
            params,
        }
    }

    /// Original criteria string.
    pub fn cli_arg(&self) -> &str {
        &self.cli_arg
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    fn find<T>(&self, f: impl Fn(&Param) -> Option<T>) -> Option<T> {
        self.params.iter().find_map(f)
    }

    pub fn population(&self) -> Option<u32> {
        self.find(|p| match p {
            Param::Population(n) => Some(*n),
            _ => None,
        })
    }

    pub fn cardinality_token(&self) -> Option<u32> {
        self.find(|p| match p {
            Param::Cardinality(n) => Some(*n),
            _ => None,
        })
    }

    pub fn increment(&self) -> Option<(Increment, u32)> {
        self.find(|p| match p {
            Param::Increment { kind, bound } => Some((*kind, *bound)),
            _ => None,
        })
    }

    pub fn factor(&self) -> Option<Float> {
        self.find(|p| match p {
            Param::Factor(f) => Some(*f),
            _ => None,
        })
    }

    /// Starting rates in declaration order.
    pub fn rates(&self) -> Vec<(RateKind, Float)> {
        self.params
            .iter()
            .filter_map(|p| match p {
                Param::Rate { kind, value } => Some((*kind, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn random_walk(&self) -> Option<Float> {
        self.find(|p| match p {
            Param::RandomWalk(v) => Some(*v),
            _ => None,
        })
    }

    pub fn density(&self) -> Option<Float> {
        self.find(|p| match p {
            Param::Density(v) => Some(*v),
            _ => None,
        })
    }

    pub fn arena_increment(&self) -> Option<u32> {
        self.find(|p| match p {
            Param::ArenaIncrement(v) => Some(*v),
            _ => None,
        })
    }

    pub fn variance(&self) -> Option<(PenaltyCategory, Waveform)> {
        self.find(|p| match p {
            Param::Variance { category, waveform } => Some((*category, *waveform)),
            _ => None,
        })
    }

    pub fn oracle(&self) -> Option<OracleKind> {
        self.find(|p| match p {
            Param::Oracle(k) => Some(*k),
            _ => None,
        })
    }

    pub fn noise(&self) -> Option<NoiseCategory> {
        self.find(|p| match p {
            Param::Noise(c) => Some(*c),
            _ => None,
        })
    }

    /// Raw tokens of a custom family descriptor.
    pub fn tokens(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| match p {
                Param::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Error pointing at a descriptor parameter that's missing, used when a
    /// descriptor was built by hand rather than parsed.
    pub(crate) fn missing(&self, what: &str) -> Error {
        Error::grammar(&self.cli_arg, self.family.name(), format!("missing {}", what))
    }
}

impl fmt::Display for CriteriaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cli_arg)
    }
}

/// Interface for project specific criteria families.
pub trait CustomCriteria: Send + Sync {
    /// Turns the tokens following the family name into parameters, usually
    /// as `Param::Token`s.
    fn parse(&self, criteria: &str, tokens: &[&str]) -> Result<Vec<Param>>;
    /// Produces one mutation set per experiment.
    fn generate(&self, desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<MutationSet>>;
}

/// Maps family names to parsers and generators.
///
/// Builtin families are always present, custom ones have to be registered
/// explicitly before parsing.
#[derive(Clone, Default)]
pub struct CriteriaRegistry {
    custom: FnvHashMap<String, Arc<dyn CustomCriteria>>,
}

impl CriteriaRegistry {
    pub fn new() -> Self {
        CriteriaRegistry::default()
    }

    /// Registers a custom family under the given name.
    pub fn register(&mut self, name: &str, criteria: Arc<dyn CustomCriteria>) -> Result<()> {
        if Family::builtin(name).is_some() || self.custom.contains_key(name) {
            return Err(Error::Other(format!(
                "criteria family `{}` is already registered",
                name
            )));
        }
        if name.is_empty() || name.contains('.') {
            return Err(Error::Other(format!(
                "invalid criteria family name: `{}`",
                name
            )));
        }
        self.custom.insert(name.to_string(), criteria);
        Ok(())
    }

    /// Names of all known families, builtin first.
    pub fn family_names(&self) -> Vec<String> {
        let mut names = Family::BUILTIN
            .iter()
            .map(|f| f.name().to_string())
            .collect::<Vec<_>>();
        let mut custom = self.custom.keys().cloned().collect::<Vec<_>>();
        custom.sort();
        names.extend(custom);
        names
    }

    /// Parses a criteria string into a descriptor.
    pub fn parse(&self, criteria: &str) -> Result<CriteriaDescriptor> {
        let tokens = criteria.split('.').collect::<Vec<&str>>();
        let family_token = tokens[0];
        if let Some(family) = Family::builtin(family_token) {
            let params = parser::parse_builtin(criteria, &family, &tokens[1..])?;
            return Ok(CriteriaDescriptor::new(criteria, family, params));
        }
        if let Some(custom) = self.custom.get(family_token) {
            let params = custom.parse(criteria, &tokens[1..])?;
            return Ok(CriteriaDescriptor::new(
                criteria,
                Family::Custom(family_token.to_string()),
                params,
            ));
        }
        let names = self.family_names();
        let names = names.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        let reason = match crate::util::get_similar(family_token, &names) {
            Some(similar) => format!("unknown criteria family, did you mean `{}`?", similar),
            None => "unknown criteria family".to_string(),
        };
        Err(Error::grammar(criteria, family_token, reason))
    }

    /// Generates the mutation sets for a descriptor, dispatching custom
    /// families to their registered implementation.
    pub fn generate(&self, desc: &CriteriaDescriptor, ctx: &GenContext) -> Result<Vec<MutationSet>> {
        match desc.family() {
            Family::Custom(name) => match self.custom.get(name) {
                Some(custom) => custom.generate(desc, ctx),
                None => Err(Error::grammar(
                    desc.cli_arg(),
                    name,
                    "criteria family not registered",
                )),
            },
            _ => variables::generate(desc, ctx),
        }
    }
}

/// Parses a criteria string using builtin families only.
pub fn parse(criteria: &str) -> Result<CriteriaDescriptor> {
    CriteriaRegistry::default().parse(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuxConfig;
    use crate::scenario::ScenarioSpec;

    struct NestPose;

    impl CustomCriteria for NestPose {
        fn parse(&self, criteria: &str, tokens: &[&str]) -> Result<Vec<Param>> {
            if tokens.is_empty() {
                return Err(Error::grammar(criteria, "", "missing nest poses"));
            }
            Ok(tokens.iter().map(|t| Param::Token(t.to_string())).collect())
        }

        fn generate(
            &self,
            desc: &CriteriaDescriptor,
            _ctx: &GenContext,
        ) -> Result<Vec<MutationSet>> {
            Ok(desc
                .tokens()
                .iter()
                .map(|t| {
                    let mut set = MutationSet::new();
                    set.push(".//nest", "position", t);
                    set
                })
                .collect())
        }
    }

    #[test]
    fn unknown_family_suggests_similar() {
        match parse("populaton_size.Log64") {
            Err(Error::GrammarError { token, reason, .. }) => {
                assert_eq!(token, "populaton_size");
                assert!(reason.contains("population_size"));
            }
            other => panic!("expected grammar error, got {:?}", other),
        }
    }

    #[test]
    fn registered_family_parses_and_generates() {
        let mut registry = CriteriaRegistry::new();
        registry.register("nest_pose", Arc::new(NestPose)).unwrap();
        assert!(registry.register("oracle", Arc::new(NestPose)).is_err());
        assert!(registry.register("nest_pose", Arc::new(NestPose)).is_err());

        let desc = registry.parse("nest_pose.a.b.c").unwrap();
        assert_eq!(desc.family(), &Family::Custom("nest_pose".to_string()));
        let aux = AuxConfig::default();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let sets = registry
            .generate(&desc, &GenContext::new(&aux, &scenario))
            .unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[2].effective(".//nest", "position"), Some("c"));

        // a plain parse doesn't know about registered families
        assert!(parse("nest_pose.a").is_err());
    }
}
