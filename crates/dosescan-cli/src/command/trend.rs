use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use dosescan_analysis::{
    task::TaskOutcome,
    trend::{self, PermutationSeed, TrendTestConfig},
};
use tracing::{info, warn};

use crate::util::{self, ProgressLog};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrendArg {
    /// Dataset JSON files; each is tested on its own worker
    #[arg(long, required = true)]
    input: Vec<PathBuf>,
    /// Selection cutoff for the (adjusted) p-value
    #[arg(long, default_value_t = 0.05)]
    p_cutoff: f64,
    /// Apply Benjamini-Hochberg correction over the features that pass the filters
    #[arg(long)]
    apply_correction: bool,
    /// Exclude vendor control probes
    #[arg(long)]
    filter_controls: bool,
    /// Exclude features whose best fold change is below this linear threshold
    #[arg(long)]
    fold_filter: Option<String>,
    /// Number of permutations per feature
    #[arg(long, default_value = "1000")]
    permutations: String,
    /// Permutation seed (32 hex digits); random when omitted
    #[arg(long)]
    seed: Option<PermutationSeed>,
    /// Gene annotation JSON file used to decorate the results
    #[arg(long)]
    annotations: Option<PathBuf>,
    /// Only output selected features
    #[arg(long)]
    selected_only: bool,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &TrendArg) -> anyhow::Result<()> {
    let mut config = TrendTestConfig::from_user_input(
        arg.p_cutoff,
        arg.apply_correction,
        arg.filter_controls,
        arg.fold_filter.is_some(),
        arg.fold_filter.as_deref().unwrap_or_default(),
        &arg.permutations,
    )
    .context("Invalid trend test settings")?;
    config.seed = arg.seed;

    let datasets = arg
        .input
        .iter()
        .map(|path| util::read_dataset_file(path).map(Arc::new))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let annotations = util::read_annotations_file(arg.annotations.as_deref())?;

    let batch = trend::run_trend_tests(&datasets, &config)?;
    let mut progress = datasets
        .iter()
        .map(|dataset| ProgressLog::new(&dataset.name))
        .collect::<Vec<_>>();
    let outcomes = batch.wait_all(|label, fraction| {
        if let Some(log) = progress.iter_mut().find(|log| log.label() == label) {
            log.update(fraction);
        }
    });

    let mut all_results = Vec::with_capacity(outcomes.len());
    for (label, outcome) in outcomes {
        let mut results = match outcome {
            TaskOutcome::Completed(results) => results,
            TaskOutcome::Cancelled => bail!("Trend test on {label} was cancelled"),
            TaskOutcome::Failed(message) => bail!("Trend test on {label} failed: {message}"),
        };
        if let Some(annotations) = &annotations {
            results = results.annotated(annotations);
        }
        let selected = results.selected().count();
        if selected == 0 {
            warn!(dataset = %label, "no_features_selected");
        }
        info!(dataset = %label, selected, seed = %results.seed, "trend_test_summary");
        if arg.selected_only {
            results.results = results.selected().cloned().collect();
        }
        all_results.push(results);
    }

    util::save_json(&all_results, arg.output.as_deref())
}
