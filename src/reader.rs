//! Streaming reader for pairwise distance tables.
//!
//! Parses a three-column `(query_id, ref_id, dist)` table incrementally,
//! grouping rows by query id into bounded batches. A batch always holds a
//! whole number of distinct query ids: rows for one query are never split
//! across batches. Each query's distances are sorted ascending (ties broken
//! by reference id) before the batch is handed out, so downstream consumers
//! can short-circuit on the first acceptable candidate.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{GasError, Result};

/// Open a delimited table, transparently decompressing `.gz` files.
pub(crate) fn open_table(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    if !path.is_file() {
        return Err(GasError::input_file(path, "does not exist"));
    }
    let file = File::open(path).map_err(|e| GasError::io(path, "open", e))?;
    let len = file
        .metadata()
        .map_err(|e| GasError::io(path, "stat", e))?
        .len();
    if len == 0 {
        return Err(GasError::input_file(path, "is empty"));
    }
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(BufReader::new(reader))
}

/// All distances for one query id, ascending by distance.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDists {
    pub query_id: String,
    pub dists: Vec<(String, f64)>,
}

/// One bounded chunk of the distance stream, queries in file order.
#[derive(Debug, Default)]
pub struct DistBatch {
    pub queries: Vec<QueryDists>,
}

struct Row {
    query_id: String,
    ref_id: String,
    dist: f64,
}

/// Lazy, finite, non-restartable sequence of [`DistBatch`] values.
///
/// The file handle is scoped to the reader's lifetime and released on all
/// exit paths, including parse failure.
pub struct DistReader {
    path: PathBuf,
    lines: Lines<BufReader<Box<dyn Read>>>,
    batch_size: usize,
    line_number: u64,
    groups: Vec<(String, HashMap<String, f64>)>,
    index: HashMap<String, usize>,
    pending: Option<Row>,
    done: bool,
}

impl DistReader {
    /// Open a pairwise distance table and validate its header.
    ///
    /// # Errors
    /// `Config` for a zero batch size, `InputFile`/`Header` for unusable
    /// files, `Io` on open failure.
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Result<Self> {
        let path = path.into();
        if batch_size == 0 {
            return Err(GasError::config(
                "batch size must be a positive integer",
            ));
        }
        let mut lines = open_table(&path)?.lines();
        let header = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(GasError::io(&path, "read", e)),
            None => return Err(GasError::header(&path, "missing header row")),
        };
        let num_cols = header.trim_end_matches('\r').split('\t').count();
        if num_cols != 3 {
            return Err(GasError::header(
                &path,
                format!(
                    "expected 3 columns [query_id, ref_id, dist], found {}",
                    num_cols
                ),
            ));
        }
        Ok(DistReader {
            path,
            lines,
            batch_size,
            line_number: 1,
            groups: Vec::new(),
            index: HashMap::new(),
            pending: None,
            done: false,
        })
    }

    /// Parse one data row. Rows with fewer than three fields are skipped;
    /// a malformed distance aborts the whole run.
    fn parse_row(&self, line: &str) -> Result<Option<Row>> {
        let mut fields = line.trim_end_matches('\r').split('\t');
        let (Some(query_id), Some(ref_id), Some(raw_dist)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::debug!("skipping row {} with fewer than 3 fields", self.line_number);
            return Ok(None);
        };
        if query_id.is_empty() || ref_id.is_empty() {
            return Ok(None);
        }
        let dist: f64 = raw_dist.trim().parse().map_err(|_| {
            GasError::parse(
                &self.path,
                self.line_number,
                format!("invalid distance '{}'", raw_dist),
            )
        })?;
        if !dist.is_finite() || dist < 0.0 {
            return Err(GasError::parse(
                &self.path,
                self.line_number,
                format!("distance must be a non-negative number (got {})", raw_dist),
            ));
        }
        Ok(Some(Row {
            query_id: query_id.to_string(),
            ref_id: ref_id.to_string(),
            dist,
        }))
    }

    fn push_row(&mut self, row: Row) {
        match self.index.get(&row.query_id) {
            Some(&slot) => {
                // Duplicate (query, ref) pairs keep the last value seen.
                self.groups[slot].1.insert(row.ref_id, row.dist);
            }
            None => {
                self.index.insert(row.query_id.clone(), self.groups.len());
                let mut dists = HashMap::new();
                dists.insert(row.ref_id, row.dist);
                self.groups.push((row.query_id, dists));
            }
        }
    }

    /// Sort every query's distances and hand the accumulated batch out.
    fn flush(&mut self) -> DistBatch {
        self.index.clear();
        let queries = self
            .groups
            .drain(..)
            .map(|(query_id, dists)| {
                let mut dists: Vec<(String, f64)> = dists.into_iter().collect();
                dists.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                QueryDists { query_id, dists }
            })
            .collect();
        DistBatch { queries }
    }
}

impl Iterator for DistReader {
    type Item = Result<DistBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(row) = self.pending.take() {
            self.push_row(row);
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(GasError::io(self.path.clone(), "read", e)));
                }
                None => {
                    self.done = true;
                    let batch = self.flush();
                    return if batch.queries.is_empty() {
                        None
                    } else {
                        Some(Ok(batch))
                    };
                }
            };
            self.line_number += 1;
            let row = match self.parse_row(&line) {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            // A query id not yet in the current batch closes it out once the
            // batch already holds the configured number of distinct queries.
            // An id seen in an *earlier* batch starts a fresh group here; the
            // engine skips it downstream because it is already assigned.
            if !self.index.contains_key(&row.query_id) && self.index.len() >= self.batch_size {
                self.pending = Some(row);
                return Some(Ok(self.flush()));
            }
            self.push_row(row);
        }
    }
}
