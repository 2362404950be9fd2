//! Command-line argument definitions for the gaddr CLI.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::GasError;

#[derive(Parser)]
#[command(name = "gaddr")]
#[command(about = "Genomic Address Service: hierarchical nomenclature from genetic distances")]
#[command(
    long_about = "Gaddr assigns dot-delimited multi-level nomenclature codes (genomic
addresses such as 1.1.2) to samples from their pairwise genetic distances.

WORKFLOW:
  1. De novo clustering:   gaddr mcluster -i matrix.tsv -t 10,5,0 -o out/
  2. Assign new samples:   gaddr call -d dists.tsv -r out/clusters.text -t 10,5,0 -o called/

INPUT FORMATS:
  Tab-delimited text tables; gzip-compressed files (.gz) are automatically
  detected and decompressed.
  - pairwise distances: query_id<TAB>ref_id<TAB>dist
  - memberships: sample-id and address columns (names configurable)
  - distance matrix: square, symmetric, labels in header and first column

OUTPUT:
  Per-run output directory with the address table (text or Parquet),
  thresholds.json, run.json, and for mcluster a Newick tree."
)]
pub struct Cli {
    /// Enable verbose progress output with timestamps
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Call genomic addresses for new samples based on existing clusterings
    Call(CallArgs),

    /// De novo nested multi-level clustering of a distance matrix
    Mcluster(MclusterArgs),
}

#[derive(Args)]
#[command(after_help = "EXAMPLES:
  # Assign queries with explicit thresholds (coarsest first)
  gaddr call -d dists.tsv -r clusters.text -t 10,5,0 -o results/

  # Assign with a named threshold map and complete linkage
  gaddr call -d dists.tsv -r clusters.text -j thresholds.json -m complete -o results/

  # Parquet output, custom columns, batches of 500 queries
  gaddr call -d dists.tsv.gz -r clusters.text -t 10,5,0 -s sample -c genotype \\
      -u parquet -b 500 -o results/")]
pub struct CallArgs {
    /// Three-column file [query_id, ref_id, dist] in TSV format
    #[arg(short, long)]
    pub dists: PathBuf,

    /// Existing cluster/address file in TSV format
    #[arg(short, long)]
    pub rclusters: PathBuf,

    /// Linkage method [single, complete, average]
    #[arg(short, long, default_value = "average")]
    pub method: String,

    /// JSON file of column name -> threshold; key order defines level order
    #[arg(short = 'j', long, conflicts_with = "thresholds")]
    pub thresh_map: Option<PathBuf>,

    /// Comma-delimited thresholds, paired with levels in sequential order
    #[arg(short, long)]
    pub thresholds: Option<String>,

    /// Column name for the sample id
    #[arg(short, long, default_value = "id")]
    pub sample_col: String,

    /// Column name for the genomic address
    #[arg(short = 'c', long, default_value = "address")]
    pub address_col: String,

    /// Output directory for assignment results
    #[arg(short, long)]
    pub outdir: PathBuf,

    /// Output format for assignments [text, parquet]
    #[arg(short = 'u', long, default_value = "text")]
    pub outfmt: String,

    /// Single-character delimiter for the nomenclature code
    #[arg(short = 'l', long, default_value = ".")]
    pub delimiter: String,

    /// Number of distinct query ids to process at a time
    #[arg(short, long, default_value_t = 100)]
    pub batch_size: usize,

    /// Overwrite an existing output directory
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
#[command(after_help = "EXAMPLES:
  # Cluster at three thresholds and export the dendrogram
  gaddr mcluster -i matrix.tsv -t 10,5,0 -o clusters/

  # Accept a matrix whose rows/columns are consistently ordered but unsorted
  gaddr mcluster -i matrix.tsv -t 10,5,0 --sort-matrix -o clusters/

  # Ultrametric branch lengths
  gaddr mcluster -i matrix.tsv -t 10,5,0 --tree-distances cophenetic -o clusters/")]
pub struct MclusterArgs {
    /// TSV-formatted square distance matrix
    #[arg(short = 'i', long)]
    pub matrix: PathBuf,

    /// Output directory for cluster results
    #[arg(short, long)]
    pub outdir: PathBuf,

    /// Linkage method [single, complete, average]
    #[arg(short, long, default_value = "average")]
    pub method: String,

    /// Comma-delimited thresholds, strictly decreasing
    #[arg(short, long)]
    pub thresholds: String,

    /// Single-character delimiter for the nomenclature code
    #[arg(short, long, default_value = ".")]
    pub delimiter: String,

    /// Lexically sort matrix rows and columns before validation
    #[arg(long)]
    pub sort_matrix: bool,

    /// Branch length convention for the Newick tree [patristic, cophenetic]
    #[arg(long, default_value = "patristic")]
    pub tree_distances: String,

    /// Overwrite an existing output directory
    #[arg(short, long)]
    pub force: bool,
}

/// Parse the nomenclature delimiter: exactly one character, not tab/newline.
pub fn parse_delimiter(raw: &str) -> std::result::Result<char, GasError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '\t' && c != '\n' => Ok(c),
        _ => Err(GasError::config(format!(
            "delimiter must be a single character other than tab or newline (got '{}')",
            raw.escape_debug()
        ))),
    }
}

/// Parse a comma-delimited threshold list.
pub fn parse_threshold_list(raw: &str) -> std::result::Result<Vec<f64>, GasError> {
    raw.split(',')
        .map(|token| {
            token.trim().parse::<f64>().map_err(|_| {
                GasError::config(format!(
                    "thresholds must all be integers or floats (got '{}')",
                    token
                ))
            })
        })
        .collect()
}
