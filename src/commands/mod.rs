//! Command-line interface definitions and drivers for the gaddr CLI.

pub mod args;
pub mod call;
pub mod mcluster;

pub use args::{CallArgs, Cli, Commands, MclusterArgs};

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Refuse an existing output directory unless forced. Checked before the
/// pipeline runs so a long run cannot fail at the very end on this.
pub(crate) fn check_outdir(outdir: &Path, force: bool) -> Result<()> {
    if outdir.is_dir() && !force {
        bail!(
            "output directory {} exists, specify --force to overwrite",
            outdir.display()
        );
    }
    Ok(())
}

/// Create the output directory. Called only once the pipeline has finished,
/// which keeps failed runs from leaving partial output behind.
pub(crate) fn create_outdir(outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create output directory {}", outdir.display()))?;
    Ok(())
}
