//! `gaddr call`: assign addresses to new samples against existing memberships.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use crate::assign::Assigner;
use crate::membership::MembershipStore;
use crate::output::{self, OutputFormat, RunMetadata};
use crate::reader::DistReader;
use crate::types::{Level, LinkageMethod, ThresholdMap};

use super::args::{parse_delimiter, parse_threshold_list, CallArgs};
use super::{check_outdir, create_outdir};

const PROGRAM: &str = "genomic address service: cluster assignment";

pub fn run(args: &CallArgs) -> Result<()> {
    // configuration is validated in full before any file is touched
    let method: LinkageMethod = args.method.parse()?;
    let delimiter = parse_delimiter(&args.delimiter)?;
    let outfmt: OutputFormat = args.outfmt.parse()?;
    let thresholds = resolve_thresholds(args)?;
    check_outdir(&args.outdir, args.force)?;

    let mut run_data = RunMetadata::new(
        PROGRAM,
        serde_json::json!({
            "dists": args.dists,
            "rclusters": args.rclusters,
            "method": args.method,
            "thresh_map": args.thresh_map,
            "thresholds": args.thresholds,
            "sample_col": args.sample_col,
            "address_col": args.address_col,
            "outdir": args.outdir,
            "outfmt": args.outfmt,
            "delimiter": args.delimiter,
            "batch_size": args.batch_size,
        }),
    );
    run_data.set_thresholds(&thresholds);

    let mut store = MembershipStore::build(
        &args.rclusters,
        &args.sample_col,
        &args.address_col,
        delimiter,
        &thresholds,
    )?;
    let reader = DistReader::new(&args.dists, args.batch_size)?;
    let assigner = Assigner::new(thresholds, method);
    let assigned = assigner.run(reader, &mut store)?;
    log::info!(
        "assigned {} new queries ({} samples total)",
        assigned,
        store.len()
    );

    // outputs are only written once the entire stream has been consumed
    create_outdir(&args.outdir)?;
    output::write_threshold_map(&args.outdir.join("thresholds.json"), assigner.thresholds())?;
    let result_file = args.outdir.join(format!("results.{}", outfmt.extension()));
    output::write_assignments(&result_file, &store, outfmt, &args.sample_col, &args.address_col)?;
    run_data.result_file = result_file.display().to_string();
    run_data.finish(&args.outdir.join("run.json"))?;
    Ok(())
}

fn resolve_thresholds(args: &CallArgs) -> Result<ThresholdMap> {
    match (&args.thresh_map, &args.thresholds) {
        (Some(path), None) => load_threshold_map(path),
        (None, Some(raw)) => Ok(ThresholdMap::from_values(&parse_threshold_list(raw)?)?),
        _ => bail!("exactly one of --thresh-map or --thresholds must be specified"),
    }
}

/// Load a `{level name: threshold}` JSON object; key order defines level order.
fn load_threshold_map(path: &Path) -> Result<ThresholdMap> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read threshold map {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse threshold map {}", path.display()))?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("threshold map must be a JSON object of name: threshold"))?;
    let mut levels = Vec::with_capacity(object.len());
    for (name, raw) in object {
        let threshold = raw
            .as_f64()
            .ok_or_else(|| anyhow!("threshold for level '{}' must be numeric", name))?;
        levels.push(Level {
            name: name.clone(),
            threshold,
        });
    }
    Ok(ThresholdMap::new(levels)?)
}
