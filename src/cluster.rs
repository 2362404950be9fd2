//! De novo multi-level clustering.
//!
//! Thin adapter over kodama's agglomerative linkage: build the dendrogram
//! once, cut it at every configured threshold to produce flat cluster ids,
//! and export the tree in Newick format. This path shares the address
//! formatting conventions of the assignment engine but none of its state.

use std::fmt;
use std::str::FromStr;

use kodama::{linkage, Method, Step};

use crate::error::{GasError, Result};
use crate::matrix::DistanceMatrix;
use crate::types::{LinkageMethod, ThresholdMap};

/// Branch length convention for the Newick export.
///
/// `Patristic`: leaf-to-leaf path distance through a merge equals the merge
/// height. `Cophenetic`: merge heights are doubled first, the ultrametric
/// convention where the tree height at the common ancestor is the distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeDistances {
    Patristic,
    Cophenetic,
}

impl TreeDistances {
    pub const ACCEPTED: [&'static str; 2] = ["patristic", "cophenetic"];

    fn height_multiplier(&self) -> f64 {
        match self {
            TreeDistances::Patristic => 1.0,
            TreeDistances::Cophenetic => 2.0,
        }
    }
}

impl FromStr for TreeDistances {
    type Err = GasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patristic" => Ok(TreeDistances::Patristic),
            "cophenetic" => Ok(TreeDistances::Cophenetic),
            other => Err(GasError::config(format!(
                "invalid tree distances value '{}', must be one of {:?}",
                other,
                Self::ACCEPTED
            ))),
        }
    }
}

impl fmt::Display for TreeDistances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TreeDistances::Patristic => "patristic",
            TreeDistances::Cophenetic => "cophenetic",
        };
        write!(f, "{}", name)
    }
}

// kodama reuses scipy's method names; only the three nomenclature methods
// are exposed here.
fn to_kodama_method(method: LinkageMethod) -> Method {
    match method {
        LinkageMethod::Single => Method::Single,
        LinkageMethod::Complete => Method::Complete,
        LinkageMethod::Average => Method::Average,
    }
}

/// Result of clustering one distance matrix at multiple thresholds.
#[derive(Debug)]
pub struct MultiLevelClustering {
    labels: Vec<String>,
    /// One cluster id per threshold, aligned with `labels`.
    memberships: Vec<Vec<u64>>,
    newick: String,
}

impl MultiLevelClustering {
    /// Cluster a validated matrix. Thresholds come in pre-validated,
    /// strictly decreasing; the matrix needs at least two samples for a
    /// dendrogram to exist.
    pub fn new(
        matrix: DistanceMatrix,
        thresholds: &ThresholdMap,
        method: LinkageMethod,
        tree_distances: TreeDistances,
    ) -> Result<Self> {
        let n = matrix.num_samples();
        if n < 2 {
            return Err(GasError::config(
                "clustering requires at least two samples",
            ));
        }

        let mut condensed = matrix.condensed.clone();
        let dendrogram = linkage(&mut condensed, n, to_kodama_method(method));
        let steps = dendrogram.steps();

        let mut memberships = vec![Vec::with_capacity(thresholds.len()); n];
        for level in thresholds.levels() {
            let flat = cut_at(steps, n, level.threshold);
            for (i, cluster_id) in flat.into_iter().enumerate() {
                memberships[i].push(cluster_id);
            }
        }

        let newick = build_newick(
            steps,
            &matrix.labels,
            tree_distances.height_multiplier(),
        );

        Ok(MultiLevelClustering {
            labels: matrix.labels,
            memberships,
            newick,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(label, cluster id per threshold)` in label order.
    pub fn memberships(&self) -> impl Iterator<Item = (&str, &[u64])> + '_ {
        self.labels
            .iter()
            .zip(self.memberships.iter())
            .map(|(label, ids)| (label.as_str(), ids.as_slice()))
    }

    pub fn newick(&self) -> &str {
        &self.newick
    }
}

/// Flat clusters at one threshold: merge every dendrogram step whose height
/// is within the threshold, then number the resulting groups from 1 in order
/// of first appearance over the label order.
fn cut_at(steps: &[Step<f64>], n: usize, threshold: f64) -> Vec<u64> {
    let total = 2 * n - 1;
    let mut parent: Vec<usize> = (0..total).collect();
    for (i, step) in steps.iter().enumerate() {
        if step.dissimilarity <= threshold {
            let merged = n + i;
            parent[step.cluster1] = merged;
            parent[step.cluster2] = merged;
        }
    }

    let mut cluster_ids = Vec::with_capacity(n);
    let mut roots: Vec<(usize, u64)> = Vec::new();
    for leaf in 0..n {
        let mut node = leaf;
        while parent[node] != node {
            node = parent[node];
        }
        let id = match roots.iter().find(|(root, _)| *root == node) {
            Some((_, id)) => *id,
            None => {
                let id = roots.len() as u64 + 1;
                roots.push((node, id));
                id
            }
        };
        cluster_ids.push(id);
    }
    cluster_ids
}

/// Newick string for the full dendrogram. Both children of a merge at height
/// `h` receive branch length `h / 2`, so the leaf-to-leaf path through the
/// merge sums to `h`.
fn build_newick(steps: &[Step<f64>], labels: &[String], multiplier: f64) -> String {
    let n = labels.len();
    let total = 2 * n - 1;
    let mut lengths = vec![0.0; total];
    for step in steps {
        let half = step.dissimilarity * multiplier / 2.0;
        lengths[step.cluster1] = half;
        lengths[step.cluster2] = half;
    }
    let root = total - 1;
    let mut out = String::new();
    write_node(root, root, n, steps, labels, &lengths, &mut out);
    out.push(';');
    out
}

fn write_node(
    node: usize,
    root: usize,
    n: usize,
    steps: &[Step<f64>],
    labels: &[String],
    lengths: &[f64],
    out: &mut String,
) {
    if node < n {
        out.push_str(&labels[node]);
    } else {
        let step = &steps[node - n];
        out.push('(');
        write_node(step.cluster1, root, n, steps, labels, lengths, out);
        out.push(',');
        write_node(step.cluster2, root, n, steps, labels, lengths, out);
        out.push(')');
    }
    if node != root {
        out.push(':');
        out.push_str(&lengths[node].to_string());
    }
}
