use std::path::PathBuf;

use dosescan_analysis::curve_fit::{self, CurveFitResult};
use tracing::{info, warn};

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SelectModelArg {
    /// JSON array of curve fits (one per feature and model)
    #[arg(long)]
    input: PathBuf,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &SelectModelArg) -> anyhow::Result<()> {
    let fits: Vec<CurveFitResult> = util::read_json_file("curve fit", &arg.input)?;
    let best = curve_fit::best_models_by_feature(&fits);

    let unresolved = best.values().filter(|fit| fit.is_none()).count();
    if unresolved > 0 {
        warn!(features = unresolved, "no_acceptable_model");
    }
    info!(fits = fits.len(), features = best.len(), "models_selected");

    util::save_json(&best, arg.output.as_deref())
}
