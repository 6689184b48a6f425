use std::{path::PathBuf, sync::Arc};

use anyhow::bail;
use dosescan_analysis::{
    anova::{self, AnovaConfig},
    correction::CorrectionMethod,
    task::TaskOutcome,
};
use tracing::info;

use crate::util::{self, ProgressLog};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AnovaArg {
    /// Dataset JSON file
    #[arg(long)]
    input: PathBuf,
    /// Multiple-testing correction (bh, bonferroni)
    #[arg(long, default_value = "bh")]
    correction: CorrectionMethod,
    /// Gene annotation JSON file used to decorate the results
    #[arg(long)]
    annotations: Option<PathBuf>,
    /// Only keep features whose adjusted p-value is at or below this cutoff
    #[arg(long)]
    cutoff: Option<f64>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &AnovaArg) -> anyhow::Result<()> {
    let dataset = Arc::new(util::read_dataset_file(&arg.input)?);
    let annotations = util::read_annotations_file(arg.annotations.as_deref())?;
    let config = AnovaConfig {
        correction: arg.correction,
    };

    let label = dataset.name.clone();
    let handle = anova::spawn_anova(dataset, config)?;
    let mut progress = ProgressLog::new(&label);
    let mut results = match handle.wait(|fraction| progress.update(fraction)) {
        TaskOutcome::Completed(results) => results,
        TaskOutcome::Cancelled => bail!("ANOVA run on {label} was cancelled"),
        TaskOutcome::Failed(message) => bail!("ANOVA run on {label} failed: {message}"),
    };

    if let Some(annotations) = &annotations {
        results = results.annotated(annotations);
    }
    if let Some(cutoff) = arg.cutoff {
        let passing = results.passing(cutoff, true).cloned().collect::<Vec<_>>();
        info!(passing = passing.len(), total = results.results.len(), cutoff, "anova_filtered");
        results.results = passing;
    }

    util::save_json(&results, arg.output.as_deref())
}
