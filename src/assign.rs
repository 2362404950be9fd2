//! Nomenclature assignment engine.
//!
//! Consumes distance batches from a [`DistReader`] and assigns each unseen
//! query an address against the shared [`MembershipStore`]. For every query:
//!
//! 1. Walk candidate references in ascending-distance order and take the
//!    first one already present in the store.
//! 2. Pick the finest threshold level that admits the candidate's distance.
//! 3. Walk that reference's address prefixes from finest to coarsest,
//!    accepting the first prefix group that passes the linkage test.
//! 4. Fill any remaining levels with fresh labels and commit.
//!
//! A query assigned in an earlier batch becomes a valid reference for later
//! queries within the same run. Processing is single-threaded and strictly
//! in file order; batch size must not change the outcome.

use std::collections::HashMap;

use crate::error::{GasError, Result};
use crate::membership::MembershipStore;
use crate::reader::{DistBatch, DistReader, QueryDists};
use crate::types::{DistSummary, LinkageMethod, ThresholdMap};

/// The assignment engine. Configuration is validated at construction;
/// the store is passed explicitly into every call that mutates it.
#[derive(Debug)]
pub struct Assigner {
    thresholds: ThresholdMap,
    method: LinkageMethod,
}

impl Assigner {
    pub fn new(thresholds: ThresholdMap, method: LinkageMethod) -> Self {
        // ThresholdMap is validated on construction (non-empty, strictly
        // decreasing), so there is nothing further to check here.
        Assigner { thresholds, method }
    }

    pub fn thresholds(&self) -> &ThresholdMap {
        &self.thresholds
    }

    /// Drive the reader to exhaustion, assigning every query in stream order.
    /// Returns the number of newly assigned queries. Any stream error aborts
    /// the run immediately.
    pub fn run(&self, reader: DistReader, store: &mut MembershipStore) -> Result<usize> {
        if store.num_levels() != self.thresholds.len() {
            return Err(GasError::config(format!(
                "membership store has {} levels but {} thresholds were supplied",
                store.num_levels(),
                self.thresholds.len()
            )));
        }
        let mut assigned = 0;
        for (batch_number, batch) in reader.enumerate() {
            let batch = batch?;
            let n = self.assign_batch(&batch, store);
            log::info!(
                "batch {}: {} queries, {} newly assigned",
                batch_number + 1,
                batch.queries.len(),
                n
            );
            assigned += n;
        }
        Ok(assigned)
    }

    /// Assign every unseen query in one batch, in file order.
    pub fn assign_batch(&self, batch: &DistBatch, store: &mut MembershipStore) -> usize {
        let mut assigned = 0;
        for query in &batch.queries {
            if self.assign_query(query, store) {
                assigned += 1;
            }
        }
        assigned
    }

    /// Assign a single query. Returns false when the id is already known
    /// (it arrived as a reference, or was assigned in an earlier batch).
    pub fn assign_query(&self, query: &QueryDists, store: &mut MembershipStore) -> bool {
        if store.contains(&query.query_id) {
            return false;
        }
        let num_levels = self.thresholds.len();
        let mut slots: Vec<Option<u64>> = vec![None; num_levels];

        let dist_by_ref: HashMap<&str, f64> = query
            .dists
            .iter()
            .map(|(rid, d)| (rid.as_str(), *d))
            .collect();

        // First viable reference in ascending-distance order. Self-distances
        // and ids absent from the store are skipped; no aggregation across
        // further candidates.
        let candidate = query
            .dists
            .iter()
            .find(|(rid, _)| rid != &query.query_id && store.contains(rid));

        if let Some((rid, dist)) = candidate {
            let level = self.thresholds.level_for_distance(*dist);
            if let Some(anchor) = store.address_of(rid).map(|a| a.to_vec()) {
                for depth in (1..=level + 1).rev() {
                    let prefix = store.format_address(&anchor[..depth]);
                    let Some(members) = store.prefix_members(&prefix) else {
                        continue;
                    };
                    let group: Vec<f64> = members
                        .iter()
                        .filter_map(|m| dist_by_ref.get(m.as_str()).copied())
                        .collect();
                    let Some(summary) = DistSummary::from_distances(&group) else {
                        continue;
                    };
                    if self
                        .method
                        .is_eligible(&summary, self.thresholds.threshold_at(depth - 1))
                    {
                        for (idx, segment) in anchor[..depth].iter().enumerate() {
                            slots[idx] = Some(*segment);
                        }
                        break;
                    }
                }
            }
        }

        let address: Vec<u64> = slots
            .iter()
            .enumerate()
            .map(|(level, slot)| match slot {
                Some(segment) => *segment,
                None => store.allocate_label(level),
            })
            .collect();
        store.add(query.query_id.clone(), address);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn thresholds(values: &[f64]) -> ThresholdMap {
        ThresholdMap::from_values(values).unwrap()
    }

    /// A=1.1.1, B=1.1.2, C=1.1.3, D=1.1.4 with label counters initialized
    /// from the file, exactly as a real run would see them.
    fn reference_store() -> MembershipStore {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"id\taddress\n\
              A\t1.1.1\n\
              B\t1.1.2\n\
              C\t1.1.3\n\
              D\t1.1.4\n",
        )
        .unwrap();
        file.flush().unwrap();
        MembershipStore::build(file.path(), "id", "address", '.', &thresholds(&[5.0, 3.0, 0.0]))
            .unwrap()
    }

    fn query(id: &str, dists: &[(&str, f64)]) -> QueryDists {
        let mut dists: Vec<(String, f64)> =
            dists.iter().map(|(r, d)| (r.to_string(), *d)).collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        QueryDists {
            query_id: id.to_string(),
            dists,
        }
    }

    #[test]
    fn test_exact_match_joins_finest_group() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        let q = query(
            "E",
            &[("E", 0.0), ("B", 0.0), ("A", 6.0), ("C", 6.0), ("D", 6.0)],
        );
        assert!(engine.assign_query(&q, &mut store));
        assert_eq!(store.address_of("E"), Some(&[1, 1, 2][..]));
    }

    #[test]
    fn test_mid_threshold_match_allocates_finer_levels() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        // distance 2 matches level_2 (threshold 3) but not level_3 (threshold 0):
        // the query inherits B's first two segments and gets a fresh third.
        let q = query("E", &[("B", 2.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[1, 1, 5][..]));
    }

    #[test]
    fn test_unmatched_query_gets_fully_fresh_address() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        // beyond every threshold: brand-new label at every level, each
        // strictly greater than any existing label at that level
        let q = query("E", &[("A", 50.0), ("B", 60.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[2, 2, 5][..]));
        assert_eq!(store.next_label(0), 3);
        assert_eq!(store.next_label(1), 3);
        assert_eq!(store.next_label(2), 6);
    }

    #[test]
    fn test_complete_linkage_rejects_wide_group() {
        let mut store = reference_store();
        // second member of cluster 1.1.2
        store.add("B2".to_string(), vec![1, 1, 2]);
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Complete);
        // B at 0 -> finest level, prefix 1.1.2 = {B:0, B2:3}: max 3 > 0, so
        // complete linkage rejects the finest group and falls back to 1.1
        // (max 3 <= 3), leaving the last segment to a fresh label.
        let q = query("E", &[("B", 0.0), ("B2", 3.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[1, 1, 5][..]));
    }

    #[test]
    fn test_complete_linkage_falls_back_to_coarser_prefix() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Complete);
        // B at 1 -> finest admissible level is level_2 (threshold 3), prefix 1.1.
        // Group 1.1 = {A,B,C,D}, max 9 > 3 -> ineligible. Coarser prefix 1:
        // same members, max 9 > 5 -> ineligible. Fresh address everywhere.
        let q = query("E", &[("B", 1.0), ("A", 2.0), ("C", 9.0), ("D", 9.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[2, 2, 5][..]));
    }

    #[test]
    fn test_average_linkage_uses_group_mean() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Average);
        // B at 1 -> level_2, prefix 1.1, group mean (1+2+3+4)/4 = 2.5 <= 3:
        // eligible, so E inherits 1.1 and gets a fresh third segment.
        let q = query("E", &[("B", 1.0), ("A", 2.0), ("C", 3.0), ("D", 4.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[1, 1, 5][..]));
    }

    #[test]
    fn test_average_linkage_rejects_high_mean() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Average);
        // group mean (1+9+9+9)/4 = 7 > 3 at prefix 1.1 and > 5 at prefix 1
        let q = query("E", &[("B", 1.0), ("A", 9.0), ("C", 9.0), ("D", 9.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[2, 2, 5][..]));
    }

    #[test]
    fn test_known_id_is_skipped() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        let q = query("A", &[("B", 0.0)]);
        assert!(!engine.assign_query(&q, &mut store));
        assert_eq!(store.address_of("A"), Some(&[1, 1, 1][..]));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_self_distance_ignored() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        // "AA" sorts before "D", so the self-distance is the first entry the
        // candidate scan sees and must step over
        let q = query("AA", &[("AA", 0.0), ("D", 0.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("AA"), Some(&[1, 1, 4][..]));
    }

    #[test]
    fn test_unknown_reference_ids_skipped() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        // closest id is not in the store; the next one is
        let q = query("E", &[("ghost", 0.0), ("C", 0.5)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[1, 1, 3][..]));
    }

    #[test]
    fn test_earlier_assignment_becomes_reference() {
        let mut store = reference_store();
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        let batch = DistBatch {
            queries: vec![query("E", &[("B", 0.0)]), query("F", &[("E", 0.0)])],
        };
        assert_eq!(engine.assign_batch(&batch, &mut store), 2);
        assert_eq!(store.address_of("E"), Some(&[1, 1, 2][..]));
        // F only knows E, which was assigned moments ago in the same batch
        assert_eq!(store.address_of("F"), Some(&[1, 1, 2][..]));
    }

    #[test]
    fn test_no_viable_reference_at_all() {
        let mut store = MembershipStore::empty('.', 2);
        let engine = Assigner::new(thresholds(&[5.0, 0.0]), LinkageMethod::Single);
        let q = query("E", &[("E", 0.0)]);
        engine.assign_query(&q, &mut store);
        assert_eq!(store.address_of("E"), Some(&[1, 1][..]));
        // F's only non-self distance names an id that was never assigned
        let q2 = query("F", &[("F", 0.0), ("nobody", 1.0)]);
        engine.assign_query(&q2, &mut store);
        assert_eq!(store.address_of("F"), Some(&[2, 2][..]));
    }

    #[test]
    fn test_level_count_mismatch_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"query_id\tref_id\tdist\nq1\tr1\t1\n").unwrap();
        file.flush().unwrap();
        let reader = DistReader::new(file.path(), 10).unwrap();
        let mut store = MembershipStore::empty('.', 2);
        let engine = Assigner::new(thresholds(&[5.0, 3.0, 0.0]), LinkageMethod::Single);
        assert!(matches!(
            engine.run(reader, &mut store),
            Err(GasError::Config(_))
        ));
    }
}
