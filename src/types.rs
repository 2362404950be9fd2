//! Core types shared by the assignment and clustering paths.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{GasError, Result};

/// One hierarchy level: a caller-supplied name paired with a distance
/// threshold. Position in the containing [`ThresholdMap`], not the name,
/// determines which address segment the level controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level {
    pub name: String,
    pub threshold: f64,
}

/// Ordered collection of levels, coarsest (largest threshold) first.
///
/// Thresholds must be strictly decreasing. The original tool only enforced
/// this on the de novo path; here it holds everywhere so the engine's
/// finest-to-coarsest threshold scan is total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdMap {
    levels: Vec<Level>,
}

impl ThresholdMap {
    pub fn new(levels: Vec<Level>) -> Result<Self> {
        if levels.is_empty() {
            return Err(GasError::config("at least one threshold level is required"));
        }
        for level in &levels {
            if !level.threshold.is_finite() || level.threshold < 0.0 {
                return Err(GasError::config(format!(
                    "threshold for level '{}' must be a non-negative number (got {})",
                    level.name, level.threshold
                )));
            }
        }
        for pair in levels.windows(2) {
            if pair[0].threshold <= pair[1].threshold {
                return Err(GasError::config(format!(
                    "thresholds must be in strictly decreasing order ({} -> {} at level '{}')",
                    pair[0].threshold, pair[1].threshold, pair[1].name
                )));
            }
        }
        Ok(ThresholdMap { levels })
    }

    /// Pair a list of numeric thresholds with positional names `level_1..level_n`.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let levels = values
            .iter()
            .enumerate()
            .map(|(i, v)| Level {
                name: format!("level_{}", i + 1),
                threshold: *v,
            })
            .collect();
        ThresholdMap::new(levels)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn threshold_at(&self, idx: usize) -> f64 {
        self.levels[idx].threshold
    }

    pub fn level_names(&self) -> Vec<String> {
        self.levels.iter().map(|l| l.name.clone()).collect()
    }

    /// Deepest (finest) level whose threshold admits `d`, scanning finest to
    /// coarsest. Falls back to the coarsest level when no threshold does.
    pub fn level_for_distance(&self, d: f64) -> usize {
        for idx in (0..self.levels.len()).rev() {
            if self.levels[idx].threshold >= d {
                return idx;
            }
        }
        0
    }
}

/// Rule for deciding whether a query is close enough to an existing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
}

impl LinkageMethod {
    pub const ACCEPTED: [&'static str; 3] = ["single", "complete", "average"];

    /// Whether a group with the given distance summary may absorb the query
    /// at `threshold`. Single uses the closest member, complete the farthest,
    /// average the mean.
    pub fn is_eligible(&self, summary: &DistSummary, threshold: f64) -> bool {
        match self {
            LinkageMethod::Single => summary.min <= threshold,
            LinkageMethod::Complete => summary.max <= threshold,
            LinkageMethod::Average => summary.mean <= threshold,
        }
    }
}

impl FromStr for LinkageMethod {
    type Err = GasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(LinkageMethod::Single),
            "complete" => Ok(LinkageMethod::Complete),
            "average" => Ok(LinkageMethod::Average),
            other => Err(GasError::config(format!(
                "'{}' is not one of the accepted methods {:?}",
                other,
                Self::ACCEPTED
            ))),
        }
    }
}

impl fmt::Display for LinkageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkageMethod::Single => "single",
            LinkageMethod::Complete => "complete",
            LinkageMethod::Average => "average",
        };
        write!(f, "{}", name)
    }
}

/// Min/mean/max of a query's distances to the members of one candidate group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl DistSummary {
    /// Returns `None` for an empty group.
    pub fn from_distances(dists: &[f64]) -> Option<Self> {
        if dists.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &d in dists {
            min = min.min(d);
            max = max.max(d);
            sum += d;
        }
        Some(DistSummary {
            min,
            mean: sum / dists.len() as f64,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_map_from_values() {
        let map = ThresholdMap::from_values(&[5.0, 3.0, 0.0]).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.levels()[0].name, "level_1");
        assert_eq!(map.levels()[2].name, "level_3");
        assert_eq!(map.threshold_at(1), 3.0);
    }

    #[test]
    fn test_threshold_map_rejects_increasing() {
        assert!(ThresholdMap::from_values(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_threshold_map_rejects_equal() {
        assert!(ThresholdMap::from_values(&[3.0, 3.0, 1.0]).is_err());
    }

    #[test]
    fn test_threshold_map_rejects_empty() {
        assert!(ThresholdMap::from_values(&[]).is_err());
    }

    #[test]
    fn test_threshold_map_rejects_nan() {
        assert!(ThresholdMap::from_values(&[5.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_level_for_distance_picks_finest() {
        let map = ThresholdMap::from_values(&[5.0, 3.0, 0.0]).unwrap();
        // distance 0 admitted by every level -> finest wins
        assert_eq!(map.level_for_distance(0.0), 2);
        // distance 2 admitted by levels 0 and 1
        assert_eq!(map.level_for_distance(2.0), 1);
        // distance 4 admitted only by the coarsest
        assert_eq!(map.level_for_distance(4.0), 0);
        // distance beyond every threshold falls back to the coarsest
        assert_eq!(map.level_for_distance(100.0), 0);
    }

    #[test]
    fn test_linkage_method_from_str() {
        assert_eq!(
            "single".parse::<LinkageMethod>().unwrap(),
            LinkageMethod::Single
        );
        assert_eq!(
            "complete".parse::<LinkageMethod>().unwrap(),
            LinkageMethod::Complete
        );
        assert_eq!(
            "average".parse::<LinkageMethod>().unwrap(),
            LinkageMethod::Average
        );
        assert!("ward".parse::<LinkageMethod>().is_err());
    }

    #[test]
    fn test_eligibility_rules() {
        let summary = DistSummary {
            min: 1.0,
            mean: 2.0,
            max: 4.0,
        };
        assert!(LinkageMethod::Single.is_eligible(&summary, 1.0));
        assert!(!LinkageMethod::Single.is_eligible(&summary, 0.5));
        assert!(LinkageMethod::Complete.is_eligible(&summary, 4.0));
        assert!(!LinkageMethod::Complete.is_eligible(&summary, 3.0));
        assert!(LinkageMethod::Average.is_eligible(&summary, 2.0));
        assert!(!LinkageMethod::Average.is_eligible(&summary, 1.5));
    }

    #[test]
    fn test_dist_summary() {
        let summary = DistSummary::from_distances(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert_eq!(summary.mean, 2.0);
        assert!(DistSummary::from_distances(&[]).is_none());
    }
}
