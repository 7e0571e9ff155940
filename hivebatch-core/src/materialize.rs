//! Experiment matrix materialization.
//!
//! Turns an ordered sequence of mutation sets into experiment unit
//! directories under the batch root:
//!
//! ```text
//! {batch_root}/exp{i}/
//!     {stem}.xml            full experiment configuration
//!     {stem}_{run}.xml      per-run configuration with its own seed
//!     commands.txt          one simulator invocation per run
//!     exp_def.bin           serialized experiment definition
//!     output/               simulator output, one directory per run
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::DEFAULT_SIM_COMMAND;
use crate::error::{Error, Result};
use crate::mutation::{Mutation, MutationSet};
use crate::scenario::ScenarioSpec;
use crate::time_setup::TimeSetup;
use crate::xml::Document;
use crate::{COMMANDS_FILE, EXP_DEF_FILE, EXP_DIR_PREFIX, OUTPUT_DIR_NAME};

pub const DEFAULT_RUNS: u32 = 4;

const RANDOM_SEED_PATH: &str = ".//experiment";
const THREADS_PATH: &str = ".//system";
const CONVERGENCE_PATH: &str = ".//loop_functions/convergence";
const OUTPUT_PATHS: [&str; 2] = [
    ".//controllers/*/params/output/sim",
    ".//loop_functions/output/sim",
];

/// Settings shared by every experiment of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Simulations with distinct seeds per experiment
    pub n_runs: u32,
    /// Base seed from which all run seeds are derived
    pub seed: u64,
    /// Simulator invocation, `{config}` is replaced with the run config path
    pub sim_command: String,
    /// Duration and metrics interval, the template's are kept if not set
    #[serde(default)]
    pub time_setup: Option<TimeSetup>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            n_runs: DEFAULT_RUNS,
            seed: 0,
            sim_command: DEFAULT_SIM_COMMAND.to_string(),
            time_setup: None,
        }
    }
}

/// Path of the experiment unit directory with the given index.
pub fn unit_dir(batch_root: &Path, index: usize) -> PathBuf {
    batch_root.join(format!("{}{}", EXP_DIR_PREFIX, index))
}

/// Output directory of a single run.
pub fn run_output_dir(batch_root: &Path, index: usize, stem: &str, run: u32) -> PathBuf {
    unit_dir(batch_root, index)
        .join(OUTPUT_DIR_NAME)
        .join(format!("{}_{}_output", stem, run))
}

fn same_contents(path: &Path, expected: &[u8]) -> bool {
    match fs::read(path) {
        Ok(bytes) => bytes == expected,
        Err(_) => false,
    }
}

/// Mutation whose target doesn't exist in the template.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingAttributeWarning {
    pub unit: usize,
    pub mutation: Mutation,
}

/// Single simulation of an experiment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub unit: usize,
    pub run: u32,
    pub seed: u64,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
}

/// Definition persisted alongside each experiment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDef {
    pub index: usize,
    pub mutations: MutationSet,
    pub seeds: Vec<u64>,
}

impl ExperimentDef {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// Fully materialized experiment, not yet written to disk.
#[derive(Debug, Clone)]
pub struct ExperimentUnit {
    pub index: usize,
    /// Every mutation applied to the template, scenario setup included
    pub mutations: MutationSet,
    pub document: Document,
    pub runs: Vec<RunSpec>,
    pub warnings: Vec<MissingAttributeWarning>,
    run_documents: Vec<Document>,
}

impl ExperimentUnit {
    pub fn dir(&self, batch_root: &Path) -> PathBuf {
        unit_dir(batch_root, self.index)
    }
}

pub struct Materializer {
    template: Document,
    stem: String,
    batch_root: PathBuf,
    settings: BatchSettings,
}

impl Materializer {
    pub fn new(template_path: &Path, batch_root: &Path, settings: BatchSettings) -> Result<Self> {
        let stem = template_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                Error::Other(format!(
                    "invalid template path: {}",
                    template_path.to_string_lossy()
                ))
            })?
            .to_string();
        let template = Document::from_path(template_path)?;
        // simulator commands refer to run configs by absolute path
        let batch_root =
            dunce::canonicalize(batch_root).unwrap_or_else(|_| batch_root.to_path_buf());
        Ok(Materializer::from_document(template, &stem, &batch_root, settings))
    }

    pub fn from_document(
        template: Document,
        stem: &str,
        batch_root: &Path,
        settings: BatchSettings,
    ) -> Self {
        Materializer {
            template,
            stem: stem.to_string(),
            batch_root: batch_root.to_path_buf(),
            settings,
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Applies the scenario setup, the experiment's own mutations and
    /// finally the time setup to a copy of the template.
    pub fn build_unit(
        &self,
        index: usize,
        scenario: &ScenarioSpec,
        set: &MutationSet,
    ) -> Result<ExperimentUnit> {
        let mut mutations = scenario.mutations();
        mutations.push(THREADS_PATH, "threads", scenario.n_engines);
        mutations.push(CONVERGENCE_PATH, "n_threads", scenario.n_engines);
        mutations.extend(set.clone());
        if let Some(time_setup) = &self.settings.time_setup {
            mutations.extend(time_setup.mutations());
        }

        let mut document = self.template.clone();
        let mut warnings = Vec::new();
        for mutation in &mutations {
            if !document.set_attr(&mutation.path, &mutation.attr, &mutation.value)? {
                warnings.push(MissingAttributeWarning {
                    unit: index,
                    mutation: mutation.clone(),
                });
            }
        }

        let seeds = self.run_seeds(index);
        let dir = unit_dir(&self.batch_root, index);
        let output_root = dir.join(OUTPUT_DIR_NAME);
        let mut runs = Vec::new();
        let mut run_documents = Vec::new();
        for (run, seed) in seeds.iter().enumerate() {
            let run = run as u32;
            let mut doc = document.clone();
            // not every template carries output and seed settings
            doc.set_attr(RANDOM_SEED_PATH, "random_seed", &seed.to_string())?;
            let output_dir = format!("{}_{}_output", self.stem, run);
            for path in OUTPUT_PATHS.iter() {
                doc.set_attr(path, "output_dir", &output_dir)?;
                doc.set_attr(path, "output_root", &output_root.to_string_lossy())?;
            }
            runs.push(RunSpec {
                unit: index,
                run,
                seed: *seed,
                config_path: dir.join(format!("{}_{}.xml", self.stem, run)),
                output_dir: output_root.join(&output_dir),
            });
            run_documents.push(doc);
        }

        Ok(ExperimentUnit {
            index,
            mutations,
            document,
            runs,
            warnings,
            run_documents,
        })
    }

    /// Distinct seeds for every run of an experiment, derived from the base
    /// seed and the experiment index only.
    fn run_seeds(&self, index: usize) -> Vec<u64> {
        let n = self.settings.n_runs as usize;
        let mut rng = StdRng::seed_from_u64(self.settings.seed.wrapping_add(index as u64));
        rand::seq::index::sample(&mut rng, 10 * n.max(1), n)
            .into_iter()
            .map(|s| s as u64 + 1)
            .collect()
    }

    /// Simulator command for a single run.
    pub fn command(&self, run: &RunSpec) -> String {
        let config = run.config_path.to_string_lossy();
        self.settings
            .sim_command
            .replace("{config}", &shlex::quote(&config))
    }

    /// Builds every experiment unit in memory without writing anything.
    ///
    /// Scenario violations are reported here.
    pub fn build(&self, scenario: &ScenarioSpec, sets: &[MutationSet]) -> Result<Vec<ExperimentUnit>> {
        scenario.validate()?;
        let units = sets
            .iter()
            .enumerate()
            .map(|(i, set)| self.build_unit(i, scenario, set))
            .collect::<Result<Vec<_>>>()?;
        for unit in &units {
            for warning in &unit.warnings {
                warn!(
                    "exp{}: no attribute target for mutation {}, skipping",
                    warning.unit, warning.mutation
                );
            }
        }
        Ok(units)
    }

    /// Builds every experiment unit in memory, then writes them all out.
    pub fn materialize(
        &self,
        scenario: &ScenarioSpec,
        sets: &[MutationSet],
    ) -> Result<Vec<ExperimentUnit>> {
        let units = self.build(scenario, sets)?;
        self.write_all(&units)?;
        Ok(units)
    }

    pub fn write_all(&self, units: &[ExperimentUnit]) -> Result<()> {
        for unit in units {
            self.write_unit(unit)?;
        }
        info!(
            "materialized {} experiment(s) with {} run(s) each at {}",
            units.len(),
            self.settings.n_runs,
            self.batch_root.to_string_lossy()
        );
        Ok(())
    }

    /// Whether the configurations and commands on disk are exactly the ones
    /// the unit would be written as.
    pub fn matches_disk(&self, unit: &ExperimentUnit) -> Result<bool> {
        let dir = unit.dir(&self.batch_root);
        if !same_contents(&dir.join(format!("{}.xml", self.stem)), &unit.document.to_bytes()?) {
            return Ok(false);
        }
        for (run, doc) in unit.runs.iter().zip(unit.run_documents.iter()) {
            if !same_contents(&run.config_path, &doc.to_bytes()?) {
                return Ok(false);
            }
        }
        Ok(same_contents(&dir.join(COMMANDS_FILE), self.commands(unit).as_bytes()))
    }

    fn commands(&self, unit: &ExperimentUnit) -> String {
        let mut commands = String::new();
        for run in &unit.runs {
            commands.push_str(&self.command(run));
            commands.push('\n');
        }
        commands
    }

    pub fn write_unit(&self, unit: &ExperimentUnit) -> Result<()> {
        let dir = unit.dir(&self.batch_root);
        fs::create_dir_all(dir.join(OUTPUT_DIR_NAME))?;
        unit.document
            .write(dir.join(format!("{}.xml", self.stem)))?;

        for (run, doc) in unit.runs.iter().zip(unit.run_documents.iter()) {
            doc.write(&run.config_path)?;
        }
        fs::write(dir.join(COMMANDS_FILE), self.commands(unit))?;

        let def = ExperimentDef {
            index: unit.index,
            mutations: unit.mutations.clone(),
            seeds: unit.runs.iter().map(|r| r.seed).collect(),
        };
        fs::write(dir.join(EXP_DEF_FILE), bincode::serialize(&def)?)?;
        debug!("wrote exp{} to {}", unit.index, dir.to_string_lossy());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::parse;
    use crate::variables::{generate, GenContext};
    use crate::AuxConfig;

    const TEMPLATE: &str = r#"<?xml version="1.0" ?>
<argos-configuration>
  <framework>
    <system threads="0"/>
    <experiment length="100" ticks_per_second="10" random_seed="0"/>
  </framework>
  <controllers>
    <depth0_controller id="ffc">
      <params>
        <output>
          <sim output_root="output" output_dir="__current_date__"/>
        </output>
        <task_alloc policy="random"/>
      </params>
    </depth0_controller>
  </controllers>
  <loop_functions>
    <output>
      <sim output_root="output" output_dir="__current_date__"/>
      <metrics output_interval="1000"/>
    </output>
    <convergence n_threads="1"/>
  </loop_functions>
  <arena size="10, 10, 2" center="5, 5, 1">
    <distribute>
      <position method="uniform" min="2, 2, 0" max="8, 8, 0"/>
      <entity quantity="1"/>
    </distribute>
  </arena>
</argos-configuration>
"#;

    fn materializer_with(root: &Path, settings: BatchSettings) -> Materializer {
        let template = Document::parse(TEMPLATE).unwrap();
        Materializer::from_document(template, "main", root, settings)
    }

    fn materializer(root: &Path) -> Materializer {
        materializer_with(root, BatchSettings::default())
    }

    fn read_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    dirs.push(path);
                } else {
                    files.push((path.clone(), fs::read(&path).unwrap()));
                }
            }
        }
        files.sort();
        files
    }

    #[test]
    fn rematerializing_is_byte_identical() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("QS.16x16", 4).unwrap();
        let aux = AuxConfig::default();
        let desc = parse("population_size.Log8").unwrap();
        let sets = generate(&desc, &GenContext::new(&aux, &scenario)).unwrap();

        let units = materializer(root.path()).materialize(&scenario, &sets).unwrap();
        assert_eq!(units.len(), 4);
        let first = read_tree(root.path());
        materializer(root.path()).materialize(&scenario, &sets).unwrap();
        assert_eq!(read_tree(root.path()), first);

        let exp3 = unit_dir(root.path(), 3);
        let doc = Document::from_path(exp3.join("main.xml")).unwrap();
        assert_eq!(
            doc.get_attr(".//arena/distribute/entity", "quantity").unwrap(),
            Some("8")
        );
        assert_eq!(doc.get_attr(".//system", "threads").unwrap(), Some("4"));
        assert_eq!(doc.get_attr(".//arena", "size").unwrap(), Some("16, 16, 2"));

        let commands = fs::read_to_string(exp3.join(COMMANDS_FILE)).unwrap();
        assert_eq!(commands.lines().count(), 4);
        assert!(commands.lines().all(|l| l.starts_with("argos3 -c ")));

        let def = ExperimentDef::from_path(exp3.join(EXP_DEF_FILE)).unwrap();
        assert_eq!(def.index, 3);
        assert_eq!(def.mutations, units[3].mutations);
    }

    #[test]
    fn runs_get_distinct_seeds_and_outputs() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let unit = materializer(root.path())
            .build_unit(0, &scenario, &MutationSet::new())
            .unwrap();
        let mut seeds = unit.runs.iter().map(|r| r.seed).collect::<Vec<_>>();
        seeds.sort();
        seeds.dedup();
        assert_eq!(seeds.len(), 4);
        assert!(seeds.iter().all(|s| *s >= 1 && *s <= 40));

        let run_doc = &unit.run_documents[2];
        assert_eq!(
            run_doc
                .get_attr(".//controllers/*/params/output/sim", "output_dir")
                .unwrap(),
            Some("main_2_output")
        );
        assert_eq!(
            unit.runs[2].output_dir,
            run_output_dir(root.path(), 0, "main", 2)
        );
    }

    #[test]
    fn time_setup_and_threads() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("QS.16x16", 4).unwrap();
        let settings = BatchSettings {
            time_setup: Some(TimeSetup::new(2000, 100)),
            ..BatchSettings::default()
        };
        let materializer = Materializer::from_document(
            Document::parse(TEMPLATE).unwrap(),
            "main",
            root.path(),
            settings,
        );
        let mut set = MutationSet::new();
        set.push(".//experiment", "length", 1);
        let unit = materializer.build_unit(0, &scenario, &set).unwrap();
        let doc = &unit.document;
        // time setup goes last
        assert_eq!(doc.get_attr(".//experiment", "length").unwrap(), Some("2000"));
        assert_eq!(
            doc.get_attr(".//experiment", "ticks_per_second").unwrap(),
            Some("5")
        );
        assert_eq!(
            doc.get_attr(".//output/metrics", "output_interval").unwrap(),
            Some("100")
        );
        assert_eq!(doc.get_attr(".//system", "threads").unwrap(), Some("4"));
        assert_eq!(
            doc.get_attr(".//loop_functions/convergence", "n_threads").unwrap(),
            Some("4")
        );
        assert!(unit.warnings.iter().all(|w| w.mutation.path != ".//experiment"));

        let plain = materializer_with(root.path(), BatchSettings::default())
            .build_unit(0, &scenario, &MutationSet::new())
            .unwrap();
        assert_eq!(
            plain.document.get_attr(".//experiment", "length").unwrap(),
            Some("100")
        );
    }

    #[test]
    fn disk_comparison() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let sets = vec![MutationSet::new()];
        let units = materializer(root.path()).materialize(&scenario, &sets).unwrap();
        assert!(materializer(root.path()).matches_disk(&units[0]).unwrap());

        let reseeded = materializer_with(
            root.path(),
            BatchSettings {
                seed: 5,
                ..BatchSettings::default()
            },
        );
        let unit = reseeded.build_unit(0, &scenario, &sets[0]).unwrap();
        assert!(!reseeded.matches_disk(&unit).unwrap());
    }

    #[test]
    fn missing_targets_are_warnings() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("QS.16x16", 1).unwrap();
        let mut set = MutationSet::new();
        set.push(".//oracle_manager/entities_oracle", "caches", true);
        let unit = materializer(root.path())
            .build_unit(0, &scenario, &set)
            .unwrap();
        assert!(unit
            .warnings
            .iter()
            .any(|w| w.mutation.path == ".//oracle_manager/entities_oracle"));
        // walls and grids are missing from the template too
        assert!(unit
            .warnings
            .iter()
            .any(|w| w.mutation.path.contains("wall_north")));
        assert!(unit.document.get_attr(".//oracle_manager", "caches").unwrap().is_none());
    }

    #[test]
    fn violations_write_nothing() {
        let root = tempfile::tempdir().unwrap();
        let scenario = ScenarioSpec::parse("SS.16x16", 1).unwrap();
        let result = materializer(root.path()).materialize(&scenario, &[MutationSet::new()]);
        assert!(matches!(result, Err(Error::ShapeViolation(_))));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
