//! `gaddr mcluster`: de novo multi-level clustering of a distance matrix.

use std::fs;

use anyhow::{Context, Result};

use crate::cluster::{MultiLevelClustering, TreeDistances};
use crate::matrix::read_distance_matrix;
use crate::output::{self, RunMetadata};
use crate::types::{LinkageMethod, ThresholdMap};

use super::args::{parse_delimiter, parse_threshold_list, MclusterArgs};
use super::{check_outdir, create_outdir};

const PROGRAM: &str = "genomic address service: de novo clustering";

pub fn run(args: &MclusterArgs) -> Result<()> {
    // configuration is validated in full before any clustering runs; the
    // strictly-decreasing threshold contract lives in ThresholdMap
    let method: LinkageMethod = args.method.parse()?;
    let delimiter = parse_delimiter(&args.delimiter)?;
    let tree_distances: TreeDistances = args.tree_distances.parse()?;
    let thresholds = ThresholdMap::from_values(&parse_threshold_list(&args.thresholds)?)?;
    check_outdir(&args.outdir, args.force)?;

    let mut run_data = RunMetadata::new(
        PROGRAM,
        serde_json::json!({
            "matrix": args.matrix,
            "outdir": args.outdir,
            "method": args.method,
            "thresholds": args.thresholds,
            "delimiter": args.delimiter,
            "sort_matrix": args.sort_matrix,
            "tree_distances": args.tree_distances,
        }),
    );
    run_data.set_thresholds(&thresholds);

    let matrix = read_distance_matrix(&args.matrix, args.sort_matrix)?;
    log::info!("clustering {} samples with {} linkage", matrix.num_samples(), method);
    let clustering = MultiLevelClustering::new(matrix, &thresholds, method, tree_distances)?;

    // outputs are only written once clustering has completed
    create_outdir(&args.outdir)?;
    output::write_threshold_map(&args.outdir.join("thresholds.json"), &thresholds)?;
    let result_file = args.outdir.join("clusters.text");
    output::write_clusters(&result_file, &clustering, &thresholds, delimiter)?;

    let tree_file = args.outdir.join("tree.nwk");
    fs::write(&tree_file, format!("{}\n", clustering.newick()))
        .with_context(|| format!("failed to write {}", tree_file.display()))?;

    run_data.result_file = result_file.display().to_string();
    run_data.finish(&args.outdir.join("run.json"))?;
    Ok(())
}
