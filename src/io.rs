// io.rs - Binary and CSV collaborators around the analysis core

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blocking::BlockingCurve;
use crate::error::{AnalysisError, Result};
use crate::finite_size::PseudoCriticalPoint;
use crate::measure::{MeasurementSeries, RECORD_WIDTH};

/// What to do when an output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    Skip,
    Rename,
}

/// Decide the path to write to; `None` means the write should be skipped.
///
/// `Rename` picks the first free `<stem>_v<n>.<ext>`.
pub fn resolve_output_path(path: &Path, policy: OverwritePolicy) -> Option<PathBuf> {
    if !path.exists() {
        return Some(path.to_path_buf());
    }
    match policy {
        OverwritePolicy::Overwrite => Some(path.to_path_buf()),
        OverwritePolicy::Skip => {
            info!(path = %path.display(), "output exists, skipping");
            None
        }
        OverwritePolicy::Rename => {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            (1..)
                .map(|n| dir.join(format!("{stem}_v{n}{ext}")))
                .find(|candidate| !candidate.exists())
        }
    }
}

/// Read little-endian f64 records of `n_cols` columns, row-major.
pub fn load_binary_records(path: &Path, n_cols: usize) -> Result<Vec<Vec<f64>>> {
    if n_cols == 0 {
        return Err(AnalysisError::invalid("number of columns must be positive"));
    }
    let bytes = fs::read(path)?;
    let row_bytes = 8 * n_cols;
    if bytes.len() % row_bytes != 0 {
        return Err(AnalysisError::Format(format!(
            "{}: {} bytes is not a whole number of {}-column f64 rows",
            path.display(),
            bytes.len(),
            n_cols
        )));
    }
    let records: Vec<Vec<f64>> = bytes
        .chunks_exact(row_bytes)
        .map(|row| {
            row.chunks_exact(8)
                .map(|b| {
                    let mut word = [0u8; 8];
                    word.copy_from_slice(b);
                    f64::from_le_bytes(word)
                })
                .collect()
        })
        .collect();
    debug!(path = %path.display(), rows = records.len(), "loaded binary records");
    Ok(records)
}

/// Write records in the same layout [`load_binary_records`] reads.
pub fn write_binary_records(path: &Path, records: &[Vec<f64>]) -> Result<()> {
    let bytes: Vec<u8> = records
        .iter()
        .flat_map(|row| row.iter().flat_map(|v| v.to_le_bytes()))
        .collect();
    fs::write(path, bytes)?;
    Ok(())
}

/// Load a simulator output file and drop the first `first_index` rows.
pub fn load_measurement_series(path: &Path, first_index: usize) -> Result<MeasurementSeries> {
    let records = load_binary_records(path, RECORD_WIDTH)?;
    MeasurementSeries::from_records(&records, first_index)
}

/// Expand directories into the files directly inside them with the given
/// extension, sorted by name. Plain files are kept as given.
pub fn collect_input_files(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lattice side from a name like `data_b0.456_a1.0_L15.bin`.
pub fn lattice_side_from_path(path: &Path) -> Option<usize> {
    let name = file_name(path);
    name.match_indices("_L").find_map(|(idx, _)| {
        let digits: String = name[idx + 2..].chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}

/// Inverse temperature from a name like `data_b0.456_a1.0_L15.bin`.
pub fn beta_from_path(path: &Path) -> Option<f64> {
    let name = file_name(path);
    name.match_indices("_b").find_map(|(idx, _)| {
        let number: String = name[idx + 2..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        number.trim_end_matches('.').parse().ok()
    })
}

/// Write curves side by side as `block_size,var_<name>,...`.
///
/// Block sizes missing from a curve are left empty.
pub fn write_blocking_curves(path: &Path, curves: &[(String, BlockingCurve)]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    let mut header = vec!["block_size".to_string()];
    header.extend(curves.iter().map(|(name, _)| format!("var_{name}")));
    wtr.write_record(&header)?;

    let mut sizes: Vec<usize> = curves.iter().flat_map(|(_, c)| c.keys().copied()).collect();
    sizes.sort_unstable();
    sizes.dedup();
    for k in sizes {
        let mut row = vec![k.to_string()];
        row.extend(
            curves
                .iter()
                .map(|(_, c)| c.get(&k).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a file written by [`write_blocking_curves`]; names lose their `var_` prefix.
pub fn read_blocking_curves(path: &Path) -> Result<Vec<(String, BlockingCurve)>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some("block_size") {
        return Err(AnalysisError::Format(format!(
            "{}: first column must be block_size",
            path.display()
        )));
    }
    let mut curves: Vec<(String, BlockingCurve)> = headers
        .iter()
        .skip(1)
        .map(|h| (h.strip_prefix("var_").unwrap_or(h).to_string(), BTreeMap::new()))
        .collect();

    for record in rdr.records() {
        let record = record?;
        let k: usize = record[0]
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Format(format!("bad block size '{}'", &record[0])))?;
        for (field, (_, curve)) in record.iter().skip(1).zip(curves.iter_mut()) {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let v: f64 = field
                .parse()
                .map_err(|_| AnalysisError::Format(format!("bad variance '{field}'")))?;
            curve.insert(k, v);
        }
    }
    Ok(curves)
}

/// One block size of a jackknife + blocking run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JackknifeRow {
    #[serde(rename = "L")]
    pub lattice_side: usize,
    pub beta: f64,
    pub block_size: usize,
    pub var_chi_prime: f64,
    #[serde(rename = "var_U")]
    pub var_u: f64,
}

pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<T>, csv::Error>>()?;
    Ok(rows)
}

pub fn read_pseudo_critical(path: &Path) -> Result<Vec<PseudoCriticalPoint>> {
    read_rows(path)
}

/// Read `(L, beta, value)` triples from a table with columns `L`, `beta` and `column`.
pub fn read_fss_column(path: &Path, column: &str) -> Result<Vec<(usize, f64, f64)>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    let find = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            AnalysisError::Format(format!("{}: missing column '{}'", path.display(), name))
        })
    };
    let (il, ib, iv) = (find("L")?, find("beta")?, find(column)?);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let parse = |i: usize| -> Result<f64> {
            record[i].trim().parse::<f64>().map_err(|_| {
                AnalysisError::Format(format!("bad number '{}' in {}", &record[i], path.display()))
            })
        };
        let l = parse(il)?;
        if l < 1.0 || l.fract() != 0.0 {
            return Err(AnalysisError::Format(format!("bad lattice side {l}")));
        }
        rows.push((l as usize, parse(ib)?, parse(iv)?));
    }
    Ok(rows)
}

pub fn ensure_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        info!(dir = %dir.display(), "created directory");
    }
    Ok(())
}
