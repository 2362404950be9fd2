//! Membership store: the mutable state behind address assignment.
//!
//! Built once from an existing cluster/address table, then mutated
//! incrementally by the assignment engine, one query at a time, append-only.
//! Holds three indices:
//!
//! - `addresses`: sample id -> integer address segments
//! - `prefix_lookup`: formatted address prefix -> member ids, at every depth
//! - `next_label`: per-level counter for fresh labels, strictly increasing

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{GasError, Result};
use crate::reader::open_table;
use crate::types::ThresholdMap;

/// Address assignments for all known samples, reference and newly assigned.
#[derive(Debug)]
pub struct MembershipStore {
    delimiter: char,
    num_levels: usize,
    addresses: HashMap<String, Vec<u64>>,
    /// Sample ids in insertion order: reference file order, then assignment order.
    order: Vec<String>,
    prefix_lookup: HashMap<String, Vec<String>>,
    next_label: Vec<u64>,
}

impl MembershipStore {
    /// An empty store where every level's next label starts at 1.
    pub fn empty(delimiter: char, num_levels: usize) -> Self {
        MembershipStore {
            delimiter,
            num_levels,
            addresses: HashMap::new(),
            order: Vec::new(),
            prefix_lookup: HashMap::new(),
            next_label: vec![1; num_levels],
        }
    }

    /// Build a store from a membership table.
    ///
    /// Address values are validated row by row and failures are accumulated
    /// across the whole file (one sample-id list per failure mode) so a
    /// single error report covers every bad row.
    pub fn build(
        path: impl Into<PathBuf>,
        sample_col: &str,
        address_col: &str,
        delimiter: char,
        thresholds: &ThresholdMap,
    ) -> Result<Self> {
        let path = path.into();
        let num_levels = thresholds.len();
        let mut lines = open_table(&path)?.lines();

        let header = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(GasError::io(&path, "read", e)),
            None => return Err(GasError::header(&path, "missing header row")),
        };
        let columns: Vec<&str> = header.trim_end_matches('\r').split('\t').collect();
        let sample_idx = Self::find_column(&columns, sample_col, &path)?;
        let address_idx = Self::find_column(&columns, address_col, &path)?;

        let mut store = MembershipStore::empty(delimiter, num_levels);
        let mut missing_delimiter: Vec<String> = Vec::new();
        let mut wrong_length: Vec<String> = Vec::new();
        let mut non_integer: Vec<String> = Vec::new();

        for line in lines {
            let line = line.map_err(|e| GasError::io(&path, "read", e))?;
            let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
            if fields.len() <= sample_idx.max(address_idx) {
                log::warn!("skipping membership row with too few fields: '{}'", line);
                continue;
            }
            let id = fields[sample_idx];
            let value = fields[address_idx];

            let segments: Vec<&str> = value.split(delimiter).collect();
            if segments.len() != num_levels {
                // Only a multi-level scheme can be missing its delimiter; a
                // single-level address trivially has none.
                if num_levels > 1 && !value.contains(delimiter) {
                    missing_delimiter.push(id.to_string());
                } else {
                    wrong_length.push(id.to_string());
                }
                continue;
            }
            let mut parsed = Vec::with_capacity(num_levels);
            let mut ok = true;
            for segment in &segments {
                match segment.parse::<u64>() {
                    Ok(v) => parsed.push(v),
                    Err(_) => {
                        non_integer.push(id.to_string());
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                store.insert(id.to_string(), parsed);
            }
        }

        if !missing_delimiter.is_empty() || !wrong_length.is_empty() || !non_integer.is_empty() {
            return Err(GasError::AddressFormat {
                path,
                missing_delimiter,
                wrong_length,
                non_integer,
                level_names: thresholds.level_names(),
            });
        }

        // next label per level: one past the largest reference label
        for address in store.addresses.values() {
            for (level, &label) in address.iter().enumerate() {
                if label + 1 > store.next_label[level] {
                    store.next_label[level] = label + 1;
                }
            }
        }

        log::info!(
            "loaded {} reference memberships across {} levels",
            store.len(),
            num_levels
        );
        Ok(store)
    }

    fn find_column(columns: &[&str], name: &str, path: &Path) -> Result<usize> {
        columns.iter().position(|c| *c == name).ok_or_else(|| {
            GasError::header(
                path,
                format!("required column '{}' not found in [{}]", name, columns.join(", ")),
            )
        })
    }

    /// Commit a new sample's address into every index.
    ///
    /// The only mutator used post-construction. Callers must invoke it at most
    /// once per id.
    pub fn add(&mut self, id: String, address: Vec<u64>) {
        debug_assert_eq!(address.len(), self.num_levels);
        debug_assert!(!self.addresses.contains_key(&id));
        self.insert(id, address);
    }

    fn insert(&mut self, id: String, address: Vec<u64>) {
        if self.addresses.contains_key(&id) {
            log::warn!("duplicate sample id '{}' in memberships, keeping the first", id);
            return;
        }
        for depth in 1..=address.len() {
            let prefix = self.format_address(&address[..depth]);
            self.prefix_lookup.entry(prefix).or_default().push(id.clone());
        }
        self.order.push(id.clone());
        self.addresses.insert(id, address);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.addresses.contains_key(id)
    }

    pub fn address_of(&self, id: &str) -> Option<&[u64]> {
        self.addresses.get(id).map(|a| a.as_slice())
    }

    /// Member ids sharing the given formatted address prefix.
    pub fn prefix_members(&self, prefix: &str) -> Option<&[String]> {
        self.prefix_lookup.get(prefix).map(|m| m.as_slice())
    }

    /// Consume the next free label at `level`. Strictly increasing, never reused.
    pub fn allocate_label(&mut self, level: usize) -> u64 {
        let label = self.next_label[level];
        self.next_label[level] += 1;
        label
    }

    /// Peek at the next free label for a level without consuming it.
    pub fn next_label(&self, level: usize) -> u64 {
        self.next_label[level]
    }

    pub fn format_address(&self, segments: &[u64]) -> String {
        let mut out = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            out.push_str(&segment.to_string());
        }
        out
    }

    /// `(id, formatted address)` pairs in insertion order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.order.iter().map(|id| {
            let address = &self.addresses[id];
            (id.as_str(), self.format_address(address))
        })
    }

    /// Address segments in insertion order, for per-level output columns.
    pub fn iter_segments(&self) -> impl Iterator<Item = (&str, &[u64])> + '_ {
        self.order
            .iter()
            .map(|id| (id.as_str(), self.addresses[id].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }
}
