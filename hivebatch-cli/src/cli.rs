//! Application definition.

extern crate simplelog;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Error, Result};
use clap::{value_t, App, AppSettings, Arg, ArgMatches, SubCommand};
use hivebatch::criteria;
use hivebatch::materialize::BatchSettings;
use hivebatch::pipeline::{BatchSpec, PipelineState, RunSummary};
use hivebatch::{AuxConfig, ComputeEnvironment, Pipeline, ScenarioSpec, Stage, TimeSetup};
use hivebatch_exec::{ExecOptions, Kind};

use crate::inspect;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

const ENVIRONMENTS: [&str; 6] = ["local", "pbs", "slurm", "adhoc", "scheduler-a", "scheduler-b"];

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("hivebatch")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Generate, run and process batches of swarm simulation experiments.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output (0-5 or none, error, warn, info, debug, trace)"))

        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(10)
            .about("Run pipeline stages on a single batch")
            .long_about("Run pipeline stages on a single batch.\n\n\
            Stages are 1 (generate), 2 (execute), 3 (process), 4 (visualize) \n\
            and 5 (compare). Stage 1 needs the criteria, the scenario and the \n\
            template, later stages only need the batch root. Stage 2 can be \n\
            run again after an interruption, finished simulations are skipped.")
            .arg(Arg::with_name("batch-root")
                .required(true)
                .long("batch-root")
                .short("r")
                .value_name("path")
                .help("Directory holding all generated experiments and their output"))
            .arg(Arg::with_name("criteria")
                .long("criteria")
                .short("c")
                .value_name("criteria")
                .help("Batch criteria, e.g. `population_size.Log64`"))
            .arg(Arg::with_name("scenario")
                .long("scenario")
                .short("s")
                .value_name("scenario")
                .help("Block distribution and arena dimensions, e.g. `SS.32x16`"))
            .arg(Arg::with_name("template")
                .long("template")
                .short("t")
                .value_name("path")
                .help("Template simulator configuration"))
            .arg(Arg::with_name("config")
                .long("config")
                .value_name("path")
                .help("Auxiliary configuration file (.yaml or .toml)"))
            .arg(Arg::with_name("pipeline")
                .long("pipeline")
                .short("p")
                .value_name("stages")
                .default_value("1,2,3,4")
                .help("Stages to run, in any order"))
            .arg(Arg::with_name("exec-env")
                .long("exec-env")
                .short("e")
                .value_name("env")
                .default_value("local")
                .possible_values(&ENVIRONMENTS)
                .help("Compute environment simulations are executed on"))
            .arg(Arg::with_name("physics-engines")
                .long("physics-engines")
                .value_name("n")
                .default_value("1")
                .help("Physics engines per simulation, arena dimensions have to divide evenly. \
                Without stage 1 the count the batch was generated with is used"))
            .arg(Arg::with_name("sims-per-node")
                .long("sims-per-node")
                .value_name("n")
                .help("Simulations per node, used by the pbs, slurm and adhoc environments"))
            .arg(Arg::with_name("nodefile")
                .long("nodefile")
                .value_name("path")
                .help("Node file for the adhoc environment, one host per line"))
            .arg(Arg::with_name("n-runs")
                .long("n-runs")
                .short("n")
                .value_name("n")
                .default_value("4")
                .help("Simulations with distinct random seeds per experiment"))
            .arg(Arg::with_name("seed")
                .long("seed")
                .value_name("n")
                .default_value("0")
                .help("Base seed all simulation seeds are derived from"))
            .arg(Arg::with_name("time-setup")
                .long("time-setup")
                .value_name("setup")
                .help("Simulation duration and metrics datapoints, e.g. `T10000N50`"))
            .arg(Arg::with_name("stddev")
                .long("stddev")
                .help("Also write standard deviation files when processing"))
            .arg(Arg::with_name("compare-with")
                .long("compare-with")
                .value_name("path")
                .multiple(true)
                .help("Other processed batch roots to compare with in stage 5"))
        )

        // compare subcommand
        .subcommand(SubCommand::with_name("compare")
            .display_order(11)
            .about("Compare two or more processed batches")
            .arg(Arg::with_name("batch-roots")
                .required(true)
                .multiple(true)
                .min_values(2)
                .value_name("path"))
            .arg(Arg::with_name("config")
                .long("config")
                .value_name("path")
                .help("Auxiliary configuration file (.yaml or .toml)"))
        )

        // inspect subcommand
        .subcommand(SubCommand::with_name("inspect")
            .display_order(12)
            .about("Show the state of a batch, or preview the experiments criteria generate")
            .arg(Arg::with_name("batch-root")
                .required_unless("criteria")
                .value_name("path"))
            .arg(Arg::with_name("criteria")
                .long("criteria")
                .short("c")
                .value_name("criteria")
                .requires("scenario")
                .help("Preview the experiments generated for these criteria"))
            .arg(Arg::with_name("scenario")
                .long("scenario")
                .short("s")
                .value_name("scenario"))
            .arg(Arg::with_name("physics-engines")
                .long("physics-engines")
                .value_name("n")
                .default_value("1"))
            .arg(Arg::with_name("config")
                .long("config")
                .value_name("path")
                .help("Auxiliary configuration file (.yaml or .toml)"))
            .arg(Arg::with_name("toml")
                .long("toml")
                .help("Print the batch state as toml"))
        )
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

/// Runs based on specified subcommand.
pub fn start(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("run", Some(m)) => start_run(m),
        ("compare", Some(m)) => start_compare(m),
        ("inspect", Some(m)) => start_inspect(m),
        _ => Ok(()),
    }
}

fn start_run(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);

    let aux = load_aux_config(matches)?;
    let batch_root = batch_root_path(matches.value_of("batch-root"))?;
    let stages = Stage::parse_list(matches.value_of("pipeline").unwrap_or("1,2,3,4"))?;
    let n_engines = physics_engines(
        &stages,
        engines_flag(matches)?,
        PipelineState::load(&batch_root)?.as_ref(),
    )?;

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupted, finishing running simulations before exiting");
        c.store(true, Ordering::SeqCst);
    })?;

    let mut pipeline = Pipeline::new(&batch_root, aux.clone()).with_cancel_flag(cancel.clone());
    if stages.contains(&Stage::Generate) {
        pipeline = pipeline.with_batch(batch_spec(matches, &aux, n_engines)?);
    }
    if let Some(roots) = matches.values_of("compare-with") {
        pipeline = pipeline.compare_with(
            roots
                .map(|r| batch_root_path(Some(r)))
                .collect::<Result<Vec<PathBuf>>>()?,
        );
    }

    let env = if stages.contains(&Stage::Execute) {
        let kind = Kind::from_str(matches.value_of("exec-env").unwrap_or("local"))?;
        let sims_per_node = match matches.value_of("sims-per-node") {
            Some(_) => Some(value_t!(matches, "sims-per-node", usize)?),
            None => None,
        };
        let options = ExecOptions {
            physics_engines: n_engines as usize,
            sims_per_node,
            nodefile: matches.value_of("nodefile").map(PathBuf::from),
            propagate_env: aux.exec.propagate_env.clone(),
            cancel: cancel.clone(),
        };
        Some(hivebatch_exec::create(
            kind,
            options,
            hivebatch_exec::Vars::from_env(),
        )?)
    } else {
        None
    };

    let env_ref = env.as_ref().map(|e| &**e as &dyn ComputeEnvironment);
    let summary = pipeline.run(&stages, env_ref)?;
    print_summary(&summary, &batch_root);
    if cancel.load(Ordering::SeqCst) {
        return Err(Error::msg(
            "interrupted, run the same stages again to resume",
        ));
    }
    Ok(())
}

fn start_compare(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);

    let aux = load_aux_config(matches)?;
    let mut roots = matches
        .values_of("batch-roots")
        .map(|v| v.map(|r| batch_root_path(Some(r))).collect::<Result<Vec<_>>>())
        .unwrap_or_else(|| Ok(Vec::new()))?;
    if roots.len() < 2 {
        return Err(Error::msg("comparison needs at least two batch roots"));
    }
    let own = roots.remove(0);
    let summary = Pipeline::new(&own, aux)
        .compare_with(roots)
        .run(&[Stage::Compare], None)?;
    print_summary(&summary, &own);
    Ok(())
}

fn start_inspect(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);

    let aux = load_aux_config(matches)?;
    if let Some(criteria) = matches.value_of("criteria") {
        let scenario = matches
            .value_of("scenario")
            .ok_or_else(|| Error::msg("previewing criteria requires a scenario"))?;
        let physics_engines = value_t!(matches, "physics-engines", u32)?;
        let scenario = ScenarioSpec::parse(scenario, physics_engines)?;
        return inspect::preview(criteria, &scenario, &aux);
    }
    let batch_root = batch_root_path(matches.value_of("batch-root"))?;
    inspect::batch(&batch_root, &aux, matches.is_present("toml"))
}

/// Assembles everything stage 1 needs from the command line.
fn batch_spec(matches: &ArgMatches, aux: &AuxConfig, physics_engines: u32) -> Result<BatchSpec> {
    let missing = |what: &str| Error::msg(format!("stage 1 requires --{}", what));
    let criteria = criteria::parse(matches.value_of("criteria").ok_or_else(|| missing("criteria"))?)?;
    let scenario = ScenarioSpec::parse(
        matches.value_of("scenario").ok_or_else(|| missing("scenario"))?,
        physics_engines,
    )?;
    let template = PathBuf::from(matches.value_of("template").ok_or_else(|| missing("template"))?);
    let template = template.canonicalize().unwrap_or(template);
    let n_runs = value_t!(matches, "n-runs", u32)?;
    if n_runs == 0 {
        return Err(Error::msg("at least one run per experiment is required"));
    }
    Ok(BatchSpec {
        criteria,
        scenario,
        template,
        settings: BatchSettings {
            n_runs,
            seed: value_t!(matches, "seed", u64)?,
            sim_command: aux.sim.command.clone(),
            time_setup: match matches.value_of("time-setup") {
                Some(setup) => Some(TimeSetup::from_str(setup)?),
                None => None,
            },
        },
    })
}

/// Physics engine count given explicitly on the command line.
fn engines_flag(matches: &ArgMatches) -> Result<Option<u32>> {
    if matches.occurrences_of("physics-engines") == 0 {
        return Ok(None);
    }
    Ok(Some(value_t!(matches, "physics-engines", u32)?))
}

/// Physics engines per simulation for this invocation. Stage 1 takes the
/// flag, later stages stick to what the batch was generated with.
fn physics_engines(stages: &[Stage], flag: Option<u32>, state: Option<&PipelineState>) -> Result<u32> {
    if stages.contains(&Stage::Generate) {
        return Ok(flag.unwrap_or(1));
    }
    match (flag, state) {
        (Some(flag), Some(state)) if flag != state.n_engines => Err(Error::msg(format!(
            "batch was generated with {} physics engine(s), not {}",
            state.n_engines, flag
        ))),
        (_, Some(state)) => Ok(state.n_engines),
        (flag, None) => Ok(flag.unwrap_or(1)),
    }
}

fn load_aux_config(matches: &ArgMatches) -> Result<AuxConfig> {
    let mut aux = match matches.value_of("config") {
        Some(path) => {
            debug!("loading auxiliary config from {}", path);
            AuxConfig::from_path(path)?
        }
        None => AuxConfig::default(),
    };
    if matches.is_present("stddev") {
        aux.stages.gen_stddev = true;
    }
    Ok(aux)
}

/// Absolute batch root path. The directory is created if it doesn't exist
/// yet, simulations get paths rooted at it.
fn batch_root_path(path: Option<&str>) -> Result<PathBuf> {
    let path = PathBuf::from(path.ok_or_else(|| Error::msg("batch root not provided"))?);
    fs::create_dir_all(&path)?;
    Ok(path.canonicalize().unwrap_or(path))
}

fn print_summary(summary: &RunSummary, batch_root: &Path) {
    if summary.completed.is_empty() {
        println!("no stages completed for {}", batch_root.to_string_lossy());
        return;
    }
    for stage in &summary.completed {
        println!("completed stage {}", stage);
    }
    if let Some(exec) = &summary.exec {
        println!(
            "simulations: {} dispatched, {} already complete",
            exec.dispatched, exec.skipped
        );
    }
    if let Some(process) = &summary.process {
        println!(
            "averaged {} metrics file(s) over {} experiment(s)",
            process.files, process.units
        );
    }
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" => LevelFilter::Error,
            "2" | "warn" | "warning" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        },
        _ => LevelFilter::Info,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Trace)
        .set_time_format_str("%H:%M:%S%.3f")
        .build();
    let _ = TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args() {
        let matches = app()
            .get_matches_from_safe(vec![
                "hivebatch",
                "run",
                "-r",
                "/tmp/batch",
                "-c",
                "population_size.Log8",
                "-s",
                "QS.16x16",
                "--pipeline",
                "1,2",
                "-e",
                "scheduler-b",
                "--sims-per-node",
                "4",
            ])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        assert_eq!(m.value_of("exec-env"), Some("scheduler-b"));
        assert_eq!(value_t!(m, "n-runs", u32).unwrap(), 4);
        assert_eq!(
            Stage::parse_list(m.value_of("pipeline").unwrap()).unwrap(),
            vec![Stage::Generate, Stage::Execute]
        );
    }

    #[test]
    fn rejects_unknown_env() {
        assert!(app()
            .get_matches_from_safe(vec!["hivebatch", "run", "-r", "x", "-e", "condor"])
            .is_err());
        assert!(app()
            .get_matches_from_safe(vec!["hivebatch", "compare", "only-one"])
            .is_err());
    }

    #[test]
    fn resumed_batches_keep_engine_count() {
        let mut state = PipelineState::new("oracle.entities", "QS.16x16", "main", 3, 2);
        state.n_engines = 4;
        let execute = [Stage::Execute, Stage::Process];
        assert_eq!(physics_engines(&execute, None, Some(&state)).unwrap(), 4);
        assert_eq!(physics_engines(&execute, Some(4), Some(&state)).unwrap(), 4);
        assert!(physics_engines(&execute, Some(2), Some(&state)).is_err());
        assert_eq!(physics_engines(&execute, None, None).unwrap(), 1);

        // regenerating may change it
        let all = [Stage::Generate, Stage::Execute];
        assert_eq!(physics_engines(&all, Some(2), Some(&state)).unwrap(), 2);
        assert_eq!(physics_engines(&all, None, Some(&state)).unwrap(), 1);

        let matches = app()
            .get_matches_from_safe(vec!["hivebatch", "run", "-r", "x", "-p", "2"])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        assert_eq!(engines_flag(m).unwrap(), None);
        let matches = app()
            .get_matches_from_safe(vec!["hivebatch", "run", "-r", "x", "--physics-engines", "8"])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        assert_eq!(engines_flag(m).unwrap(), Some(8));
    }

    #[test]
    fn time_setup_flag() {
        let matches = app()
            .get_matches_from_safe(vec![
                "hivebatch",
                "run",
                "-r",
                "x",
                "-c",
                "oracle.entities",
                "-s",
                "QS.16x16",
                "-t",
                "main.xml",
                "--time-setup",
                "T2000N100",
            ])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        let spec = batch_spec(m, &AuxConfig::default(), 1).unwrap();
        assert_eq!(spec.settings.time_setup, Some(TimeSetup::new(2000, 100)));

        let matches = app()
            .get_matches_from_safe(vec![
                "hivebatch",
                "run",
                "-r",
                "x",
                "-c",
                "oracle.entities",
                "-s",
                "QS.16x16",
                "-t",
                "main.xml",
                "--time-setup",
                "T0",
            ])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        assert!(batch_spec(m, &AuxConfig::default(), 1).is_err());
    }

    #[test]
    fn batch_spec_requires_generation_args() {
        let matches = app()
            .get_matches_from_safe(vec!["hivebatch", "run", "-r", "x", "-c", "oracle.entities"])
            .unwrap();
        let m = matches.subcommand_matches("run").unwrap();
        let err = batch_spec(m, &AuxConfig::default(), 1).unwrap_err();
        assert_eq!(err.to_string(), "stage 1 requires --scenario");
    }
}
