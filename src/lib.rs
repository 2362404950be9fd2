//! Hierarchical genomic address assignment and de novo multi-level clustering.
//!
//! A genomic address is a dot-delimited sequence of integer labels, one per
//! hierarchy level, coarsest first (e.g. `1.1.2`). This crate provides two
//! pipelines sharing the same nomenclature conventions:
//!
//! - **call**: stream pairwise distances between query and reference samples
//!   and assign each query an address against an existing membership table,
//!   allocating new labels where no existing cluster is close enough
//!   ([`Assigner`], [`MembershipStore`], [`DistReader`]).
//! - **mcluster**: derive addresses de novo from a square distance matrix via
//!   agglomerative linkage, cut at multiple thresholds, with a Newick tree
//!   export ([`MultiLevelClustering`]).

pub mod assign;
pub mod cluster;
pub mod commands;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod membership;
pub mod output;
pub mod reader;
pub mod types;

pub use assign::Assigner;
pub use cluster::{MultiLevelClustering, TreeDistances};
pub use error::{GasError, Result};
pub use matrix::{read_distance_matrix, DistanceMatrix};
pub use membership::MembershipStore;
pub use output::OutputFormat;
pub use reader::{DistBatch, DistReader, QueryDists};
pub use types::{DistSummary, Level, LinkageMethod, ThresholdMap};
