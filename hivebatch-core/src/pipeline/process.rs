//! Stage 3: averaging of run output.
//!
//! For every experiment unit the metrics files of all runs are averaged row
//! by row. Units are processed in parallel.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::materialize::{run_output_dir, unit_dir};
use crate::util::{find_files_with_extension, fmt_float};
use crate::{Float, AVERAGED_DIR_NAME, CSV_DELIMITER};

use super::state::PipelineState;

/// Outcome of stage 3.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessReport {
    pub units: usize,
    /// Averaged metrics files written across all units
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(CSV_DELIMITER)
            .has_headers(true)
            .from_path(path)?;
        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(|c| c.to_string()).collect());
        }
        Ok(Table { headers, rows })
    }

    fn write(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(CSV_DELIMITER)
            .from_path(path)?;
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Averaged table along with its per-row sample standard deviation.
#[derive(Debug, Clone, PartialEq)]
struct Aggregate {
    headers: Vec<String>,
    mean: Vec<Vec<String>>,
    stddev: Vec<Vec<String>>,
}

/// Averages tables with identical headers row by row. Columns that aren't
/// numeric in every run are left out. Rows missing from some runs are
/// averaged over the runs that have them.
fn aggregate(tables: &[Table]) -> Aggregate {
    let headers = &tables[0].headers;
    let numeric = (0..headers.len())
        .filter(|j| {
            tables.iter().all(|t| {
                t.rows
                    .iter()
                    .all(|r| r.get(*j).map_or(false, |c| c.trim().parse::<Float>().is_ok()))
            })
        })
        .collect::<Vec<usize>>();
    let n_rows = tables.iter().map(|t| t.rows.len()).max().unwrap_or(0);

    let mut mean = Vec::with_capacity(n_rows);
    let mut stddev = Vec::with_capacity(n_rows);
    for r in 0..n_rows {
        let mut mean_row = Vec::with_capacity(numeric.len());
        let mut std_row = Vec::with_capacity(numeric.len());
        for j in &numeric {
            let values = tables
                .iter()
                .filter_map(|t| t.rows.get(r))
                .filter_map(|row| row[*j].trim().parse::<Float>().ok())
                .collect::<Vec<Float>>();
            let n = values.len() as Float;
            let m = values.iter().sum::<Float>() / n;
            let s = if values.len() > 1 {
                (values.iter().map(|v| (v - m).powi(2)).sum::<Float>() / (n - 1.0)).sqrt()
            } else {
                0.0
            };
            mean_row.push(fmt_float(m));
            std_row.push(fmt_float((s * 100.0).round() / 100.0));
        }
        mean.push(mean_row);
        stddev.push(std_row);
    }
    Aggregate {
        headers: numeric.iter().map(|j| headers[*j].clone()).collect(),
        mean,
        stddev,
    }
}

fn average_unit(
    batch_root: &Path,
    index: usize,
    state: &PipelineState,
    metrics_leaf: &str,
    gen_stddev: bool,
) -> Result<usize> {
    let mut tables: BTreeMap<String, Vec<Table>> = BTreeMap::new();
    for run in 0..state.n_runs {
        let dir = run_output_dir(batch_root, index, &state.template_stem, run).join(metrics_leaf);
        for path in find_files_with_extension(&dir, "csv") {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            tables
                .entry(name)
                .or_insert_with(Vec::new)
                .push(Table::read(&path)?);
        }
    }

    let out_dir = unit_dir(batch_root, index).join(AVERAGED_DIR_NAME);
    fs::create_dir_all(&out_dir)?;
    for (name, runs) in &tables {
        if runs.len() != state.n_runs as usize {
            return Err(Error::Other(format!(
                "exp{}: {} present in {} of {} runs",
                index,
                name,
                runs.len(),
                state.n_runs
            )));
        }
        if runs.iter().any(|t| t.headers != runs[0].headers) {
            return Err(Error::Other(format!(
                "exp{}: columns of {} differ between runs",
                index, name
            )));
        }
        let agg = aggregate(runs);
        if agg.headers.len() < runs[0].headers.len() {
            debug!(
                "exp{}: dropped {} non-numeric column(s) from {}",
                index,
                runs[0].headers.len() - agg.headers.len(),
                name
            );
        }
        Table::write(&out_dir.join(name), &agg.headers, &agg.mean)?;
        if gen_stddev {
            let stem = name.trim_end_matches(".csv");
            Table::write(
                &out_dir.join(format!("{}.stddev", stem)),
                &agg.headers,
                &agg.stddev,
            )?;
        }
    }
    debug!("exp{}: averaged {} metrics file(s)", index, tables.len());
    Ok(tables.len())
}

/// Averages all units of the batch.
pub fn run(
    batch_root: &Path,
    state: &PipelineState,
    metrics_leaf: &str,
    gen_stddev: bool,
) -> Result<ProcessReport> {
    let files = (0..state.n_units)
        .into_par_iter()
        .map(|i| average_unit(batch_root, i, state, metrics_leaf, gen_stddev))
        .collect::<Result<Vec<usize>>>()?;
    Ok(ProcessReport {
        units: state.n_units,
        files: files.iter().sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> Table {
        let mut lines = text.lines();
        let headers = lines
            .next()
            .unwrap()
            .split(';')
            .map(|s| s.to_string())
            .collect();
        let rows = lines
            .map(|l| l.split(';').map(|s| s.to_string()).collect())
            .collect();
        Table { headers, rows }
    }

    #[test]
    fn row_wise_mean() {
        let runs = vec![
            table("clock;collected;label\n0;2;a\n1;4;a"),
            table("clock;collected;label\n0;4;b\n1;8;b\n2;10;b"),
        ];
        let agg = aggregate(&runs);
        assert_eq!(agg.headers, vec!["clock", "collected"]);
        assert_eq!(agg.mean[0], vec!["0", "3"]);
        assert_eq!(agg.mean[1], vec!["1", "6"]);
        // only the second run has a third row
        assert_eq!(agg.mean[2], vec!["2", "10"]);
        assert_eq!(agg.stddev[0], vec!["0", "1.41"]);
        assert_eq!(agg.stddev[2], vec!["0", "0"]);
    }

    #[test]
    fn averages_whole_batch() {
        let root = tempfile::tempdir().unwrap();
        let state = PipelineState::new("oracle.entities", "QS.16x16", "main", 2, 2);
        for unit in 0..2 {
            for run in 0..2 {
                let dir = run_output_dir(root.path(), unit, "main", run).join("metrics");
                fs::create_dir_all(&dir).unwrap();
                fs::write(
                    dir.join("blocks.csv"),
                    format!("clock;n\n0;{}\n", unit * 10 + run as usize),
                )
                .unwrap();
            }
        }
        let report = run(root.path(), &state, "metrics", true).unwrap();
        assert_eq!(report, ProcessReport { units: 2, files: 2 });
        let averaged = unit_dir(root.path(), 1).join(AVERAGED_DIR_NAME);
        assert_eq!(
            fs::read_to_string(averaged.join("blocks.csv")).unwrap(),
            "clock;n\n0;10.5\n"
        );
        assert!(averaged.join("blocks.stddev").is_file());
    }

    #[test]
    fn missing_run_file_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let state = PipelineState::new("oracle.entities", "QS.16x16", "main", 1, 2);
        let dir = run_output_dir(root.path(), 0, "main", 0).join("metrics");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("blocks.csv"), "clock;n\n0;1\n").unwrap();
        assert!(run(root.path(), &state, "metrics", false).is_err());
    }
}
