/**
 * Measurement persistence
 *
 * Writes received batches under the output directory:
 * - session_<id>_<stamp>.json   full batch, pretty printed
 * - session_<id>_<stamp>.csv    one row per group, only for complete batches
 * - all_sessions_<stamp>.json   every stored entry, on demand
 *
 * Stamps have one-second resolution; a second write inside the same second
 * replaces the first.
 */

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::batch::MeasurementBatch;
use crate::session::SessionStore;

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn file_stamp(at: &DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Keeps session ids usable as file name fragments.
pub fn sanitize_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// `[<prefix>_]session_<id>_<stamp>.<ext>`
pub fn session_file_name(prefix: Option<&str>, session_id: &str, at: &DateTime<Local>, ext: &str) -> String {
    let base = format!("session_{}_{}.{}", sanitize_id(session_id), file_stamp(at), ext);
    match prefix {
        Some(prefix) => format!("{}_{}", prefix, base),
        None => base,
    }
}

pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let file = File::create(path).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| PersistError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Full batch as pretty JSON.
pub fn write_json(batch: &MeasurementBatch, dir: &Path, at: &DateTime<Local>) -> Result<PathBuf, PersistError> {
    ensure_dir(dir)?;
    let path = dir.join(session_file_name(None, &batch.session_id, at, "json"));
    write_pretty(&path, batch)?;
    info!(path = %path.display(), session = %batch.session_id, "batch saved as JSON");
    Ok(path)
}

/// Row-per-group CSV. Returns `Ok(None)` without touching the disk when an
/// array of the shape is missing or the arrays disagree on length.
pub fn write_table(batch: &MeasurementBatch, dir: &Path, at: &DateTime<Local>) -> Result<Option<PathBuf>, PersistError> {
    if !batch.series.is_complete() {
        debug!(session = %batch.session_id, "incomplete batch, no table written");
        return Ok(None);
    }
    let Some(rows) = batch.series.group_len() else {
        debug!(session = %batch.session_id, "ragged arrays, no table written");
        return Ok(None);
    };

    ensure_dir(dir)?;
    let path = dir.join(session_file_name(None, &batch.session_id, at, "csv"));
    write_csv(&path, batch, rows).map_err(|source| PersistError::Write {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), rows, "batch saved as CSV");
    Ok(Some(path))
}

fn write_csv(path: &Path, batch: &MeasurementBatch, rows: usize) -> io::Result<()> {
    let columns = batch.series.columns();
    let overall = if batch.statistics.is_some() {
        batch.shape().overall_columns()
    } else {
        &[][..]
    };

    let mut out = BufWriter::new(File::create(path)?);

    let mut header = vec!["group_num"];
    header.extend(columns.iter().map(|(key, _)| *key));
    header.extend(overall.iter().map(|c| c.column));
    writeln!(out, "{}", header.join(","))?;

    let figures: Vec<f64> = overall
        .iter()
        .map(|c| batch.overall(c.block, c.kind).unwrap_or(0.0))
        .collect();

    for row in 0..rows {
        let mut cells = vec![(row + 1).to_string()];
        for (_, values) in &columns {
            cells.push(values.and_then(|v| v.get(row)).map(f64::to_string).unwrap_or_default());
        }
        cells.extend(figures.iter().map(f64::to_string));
        writeln!(out, "{}", cells.join(","))?;
    }

    out.flush()
}

/// Dumps every stored entry. Nothing is written for an empty store.
pub fn write_sessions(store: &SessionStore, dir: &Path, at: &DateTime<Local>) -> Result<Option<PathBuf>, PersistError> {
    if store.is_empty() {
        return Ok(None);
    }
    ensure_dir(dir)?;
    let path = dir.join(format!("all_sessions_{}.json", file_stamp(at)));
    write_pretty(&path, store.all())?;
    info!(path = %path.display(), sessions = store.len(), "all sessions saved");
    Ok(Some(path))
}
