use dosescan_stats::StatsError;

/// Errors raised by the prefilters, the trend test and the curve-fit model.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From, derive_more::IsVariant)]
pub enum AnalysisError {
    #[display("feature {feature_id} has fewer than 2 dose groups")]
    InsufficientGroups { feature_id: String },
    #[display("feature {feature_id} has one replicate per dose group (no within-group degrees of freedom)")]
    InsufficientReplicates { feature_id: String },
    #[display("invalid {name}: {value:?}")]
    InvalidConfig { name: &'static str, value: String },
    #[display("invalid dose: {value}")]
    InvalidDose { value: f64 },
    #[display("expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[display("inconsistent benchmark dose bounds: BMDL={bmdl}, BMD={bmd}, BMDU={bmdu}")]
    InconsistentBounds { bmdl: f64, bmd: f64, bmdu: f64 },
    #[display("{model} expects {expected} parameters, got {actual}")]
    InvalidParameters {
        model: String,
        expected: usize,
        actual: usize,
    },
    #[display("run cancelled")]
    Cancelled,
    #[display("failed to spawn worker thread")]
    Spawn(std::io::Error),
    #[display("{_0}")]
    #[from]
    Stats(StatsError),
}
