use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context as _;
use dosescan_stats::{
    density::DensityOptions,
    distribution::{DistributionSummary, SummaryOptions},
};

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SummarizeArg {
    /// JSON object mapping group names to arrays of values (null for missing)
    #[arg(long)]
    input: PathBuf,
    /// Fail on missing values instead of dropping them
    #[arg(long)]
    keep_invalid: bool,
    /// Number of density grid points
    #[arg(long, default_value_t = DensityOptions::default().grid_points)]
    grid_points: usize,
    /// Extra divisor applied to the Silverman bandwidth
    #[arg(long, default_value_t = DensityOptions::default().bandwidth_divisor)]
    bandwidth_divisor: f64,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &SummarizeArg) -> anyhow::Result<()> {
    let groups: BTreeMap<String, Vec<Option<f64>>> = util::read_json_file("sample", &arg.input)?;
    let options = SummaryOptions {
        strip_invalid: !arg.keep_invalid,
        density: DensityOptions {
            grid_points: arg.grid_points,
            bandwidth_divisor: arg.bandwidth_divisor,
        },
    };

    let summaries = groups
        .into_iter()
        .map(|(name, values)| {
            let summary = DistributionSummary::summarize_optional(values, &options)
                .with_context(|| format!("Failed to summarize group {name}"))?;
            Ok((name, summary))
        })
        .collect::<anyhow::Result<BTreeMap<_, _>>>()?;

    util::save_json(&summaries, arg.output.as_deref())
}
