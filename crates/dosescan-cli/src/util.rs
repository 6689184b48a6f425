use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use dosescan_analysis::{annotation::GeneAnnotations, measurement::DoseResponseDataset};
use tracing::info;

/// Writes `value` as pretty JSON to `output_path`, or to stdout without one.
pub fn save_json<T>(value: &T, output_path: Option<&Path>) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    let target = output_path.map_or_else(|| "stdout".to_owned(), |p| p.display().to_string());
    let mut writer: Box<dyn Write> = match output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {target}"))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write JSON to {target}"))?;
    writeln!(writer).with_context(|| format!("Failed to write newline to {target}"))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush output to {target}"))?;
    info!(output = %target, "results_written");
    Ok(())
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {file_kind} file: {}", path.display()))?;
    let reader = io::BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse {file_kind} JSON file: {}", path.display()))
}

pub fn read_dataset_file<P>(path: P) -> anyhow::Result<DoseResponseDataset>
where
    P: AsRef<Path>,
{
    let dataset: DoseResponseDataset = read_json_file("dataset", path)?;
    info!(
        dataset = %dataset.name,
        features = dataset.features.len(),
        "dataset_loaded"
    );
    Ok(dataset)
}

/// Reads gene annotations when a path is given; no path means no decoration.
pub fn read_annotations_file(path: Option<&Path>) -> anyhow::Result<Option<GeneAnnotations>> {
    path.map(|path| read_json_file("annotations", path)).transpose()
}

/// Logs run progress at info level, once per 10% step.
#[derive(Debug)]
pub struct ProgressLog<'a> {
    label: &'a str,
    logged_step: u8,
}

impl<'a> ProgressLog<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            logged_step: 0,
        }
    }

    pub fn label(&self) -> &str {
        self.label
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn update(&mut self, fraction: f64) {
        let step = (fraction.clamp(0.0, 1.0) * 10.0).floor() as u8;
        if step > self.logged_step {
            self.logged_step = step;
            info!(run = self.label, percent = u32::from(step) * 10, "progress");
        }
    }
}
