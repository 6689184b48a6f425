use clap::{Parser, Subcommand};

use self::{anova::AnovaArg, select_model::SelectModelArg, summarize::SummarizeArg, trend::TrendArg};

mod anova;
mod select_model;
mod summarize;
mod trend;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Run the one-way ANOVA prefilter on a dataset
    Anova(#[clap(flatten)] AnovaArg),
    /// Run the Williams trend permutation test on one or more datasets
    Trend(#[clap(flatten)] TrendArg),
    /// Summarize sample distributions (quartiles, outliers, density)
    Summarize(#[clap(flatten)] SummarizeArg),
    /// Pick the best curve-fit model per feature
    SelectModel(#[clap(flatten)] SelectModelArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Anova(arg) => anova::run(&arg)?,
        Mode::Trend(arg) => trend::run(&arg)?,
        Mode::Summarize(arg) => summarize::run(&arg)?,
        Mode::SelectModel(arg) => select_model::run(&arg)?,
    }
    Ok(())
}
