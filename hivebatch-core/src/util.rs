//! Contains a collection of useful utility functions.

use std::ffi::OsStr;
use std::fs::{read, read_dir};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::Result;

/// Create a static deser object from given path using serde.
pub fn deser_struct_from_path<T>(file_path: PathBuf) -> Result<T>
where
    for<'de> T: serde::Deserialize<'de>,
{
    let bytes = read(&file_path)?;
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let d: T = match ext {
        "toml" => toml::from_slice(&bytes)?,
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yaml::from_slice(&bytes)?,
        _ => {
            return Err(Error::UnsupportedConfigFormat(
                file_path.to_string_lossy().to_string(),
            ))
        }
    };
    Ok(d)
}

/// Get paths to files with the given extension in the provided directory,
/// sorted by file name.
pub fn find_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        let dir_entry = match read_dir(dir) {
            Ok(d) => d,
            _ => {
                error!("couldn't read directory at path: {}", dir.to_string_lossy());
                return Vec::new();
            }
        };
        for entry in dir_entry {
            let path = match entry {
                Ok(p) => p.path(),
                _ => continue,
            };
            if path.is_file() && path.extension().unwrap_or(OsStr::new("")) == extension {
                paths.push(path);
            }
        }
    };
    paths.sort();
    paths
}

/// Get a similar name based on string similarity.
pub fn get_similar(original: &str, list: &[&str]) -> Option<String> {
    use strsim::normalized_damerau_levenshtein;
    let mut highest_sim = 0f64;
    let mut best = None;
    for candidate in list {
        let sim = normalized_damerau_levenshtein(candidate, original);
        if sim > highest_sim {
            highest_sim = sim;
            best = Some(*candidate);
        }
    }
    if highest_sim > 0.4f64 {
        best.map(|s| s.to_owned())
    } else {
        None
    }
}

/// Formats a float the same way on every platform, without a trailing `.0`
/// for whole numbers.
pub fn fmt_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Evenly spaced values between `start` and `end` inclusive.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num)
                .map(|i| {
                    if i == num - 1 {
                        end
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

#[test]
fn similar_family_name() {
    let list = ["population_size", "block_quantity", "oracle"];
    assert_eq!(
        get_similar("populaton_size", &list),
        Some("population_size".to_string())
    );
    assert_eq!(get_similar("zzzzzzzzzzzzzzzzzz", &list), None);
}

#[test]
fn linspace_endpoints() {
    let v = linspace(0.0, 0.4, 5);
    assert_eq!(v.len(), 5);
    assert_eq!(v[0], 0.0);
    assert_eq!(v[4], 0.4);
    assert!((v[2] - 0.2).abs() < 1e-12);
    assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
}

#[test]
fn float_formatting() {
    assert_eq!(fmt_float(16.0), "16");
    assert_eq!(fmt_float(0.25), "0.25");
    assert_eq!(fmt_float(-3.0), "-3");
}
