//! Structural checks of stage artifacts.
//!
//! Stage completion is judged by what's on disk, never by simulator exit
//! status.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::materialize::unit_dir;
use crate::util::find_files_with_extension;
use crate::{AVERAGED_DIR_NAME, COMMANDS_FILE, CSV_DELIMITER, EXP_DEF_FILE};

/// Whether the file's last byte is a newline. Files cut off mid-row don't
/// end in one.
fn ends_with_newline(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    if file.seek(SeekFrom::End(-1)).is_err() {
        return false;
    }
    let mut last = [0u8; 1];
    file.read_exact(&mut last).is_ok() && last[0] == b'\n'
}

/// Checks a single metrics file: a header, at least one data row, every
/// row with the same number of fields as the header, and a final newline.
pub fn csv_well_formed(path: &Path) -> bool {
    if !ends_with_newline(path) {
        return false;
    }
    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .has_headers(true)
        .flexible(false)
        .from_path(path)
    {
        Ok(r) => r,
        Err(_) => return false,
    };
    match reader.headers() {
        Ok(h) if !h.is_empty() => (),
        _ => return false,
    }
    let mut rows = 0;
    for record in reader.records() {
        if record.is_err() {
            return false;
        }
        rows += 1;
    }
    rows > 0
}

/// Checks the output of a single run. The metrics directory needs to hold at
/// least one metrics file and all of them need to be well formed.
pub fn run_output_valid(output_dir: &Path, metrics_leaf: &str) -> bool {
    let csvs = find_files_with_extension(&output_dir.join(metrics_leaf), "csv");
    !csvs.is_empty() && csvs.iter().all(|p| csv_well_formed(p))
}

/// Checks that stage 1 left everything stage 2 needs for the unit.
pub fn unit_generated(batch_root: &Path, index: usize, stem: &str) -> bool {
    let dir = unit_dir(batch_root, index);
    dir.join(format!("{}.xml", stem)).is_file()
        && dir.join(COMMANDS_FILE).is_file()
        && dir.join(EXP_DEF_FILE).is_file()
}

/// Checks that stage 3 produced averaged output for the unit.
pub fn unit_processed(batch_root: &Path, index: usize) -> bool {
    let averaged = unit_dir(batch_root, index).join(AVERAGED_DIR_NAME);
    let csvs = find_files_with_extension(&averaged, "csv");
    !csvs.is_empty() && csvs.iter().all(|p| csv_well_formed(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn csv_checks() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        fs::write(&good, "a;b;c\n1;2;3\n4;5;6\n").unwrap();
        assert!(csv_well_formed(&good));

        let header_only = dir.path().join("header.csv");
        fs::write(&header_only, "a;b;c\n").unwrap();
        assert!(!csv_well_formed(&header_only));

        let ragged = dir.path().join("ragged.csv");
        fs::write(&ragged, "a;b;c\n1;2;3\n4;5\n").unwrap();
        assert!(!csv_well_formed(&ragged));

        // interrupted while writing a row
        let truncated = dir.path().join("truncated.csv");
        fs::write(&truncated, "a;b\n1;2\n3;").unwrap();
        assert!(!csv_well_formed(&truncated));
        let no_newline = dir.path().join("no_newline.csv");
        fs::write(&no_newline, "a;b\n1;2").unwrap();
        assert!(!csv_well_formed(&no_newline));
        let crlf = dir.path().join("crlf.csv");
        fs::write(&crlf, "a;b\r\n1;2\r\n").unwrap();
        assert!(csv_well_formed(&crlf));

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        assert!(!csv_well_formed(&empty));

        assert!(!csv_well_formed(&dir.path().join("missing.csv")));
    }

    #[test]
    fn run_output_needs_metrics() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!run_output_valid(dir.path(), "metrics"));
        let metrics = dir.path().join("metrics");
        fs::create_dir_all(&metrics).unwrap();
        assert!(!run_output_valid(dir.path(), "metrics"));
        fs::write(metrics.join("blocks.csv"), "t;n\n0;1\n").unwrap();
        assert!(run_output_valid(dir.path(), "metrics"));
        fs::write(metrics.join("robots.csv"), "t;n\n0").unwrap();
        assert!(!run_output_valid(dir.path(), "metrics"));
    }
}
