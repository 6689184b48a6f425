/// Errors produced by the order-statistic and density routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum StatsError {
    /// The sample was empty, contained non-finite values, or was otherwise unusable.
    #[display("invalid input: sample is empty or contains non-finite values")]
    InvalidInput,
    /// The sample has zero spread, so no kernel bandwidth can be derived from it.
    #[display("degenerate sample: zero variance, kernel bandwidth is zero")]
    DegenerateSample,
}
