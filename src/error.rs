use thiserror::Error;

/// Domain errors raised by the modeling core.
///
/// Application code wraps these in `anyhow::Error` with context; callers that
/// need to branch on a specific failure (e.g. skip a game with bad odds) match
/// on the variant instead.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Prediction or backtest requested before any model was trained/loaded.
    #[error("model not initialized: {0}. Train one first with `yrfi-edge train --data <csv>`")]
    NotInitialized(String),

    /// A required input field is absent.
    #[error("row {row}: missing required field `{field}`")]
    MissingField { row: usize, field: &'static str },

    /// A required input field is present but cannot be parsed.
    #[error("row {row}: malformed value {value:?} for `{field}`")]
    Malformed {
        row: usize,
        field: &'static str,
        value: String,
    },

    /// Odds that are not valid American odds (integers with |o| >= 100).
    #[error("invalid American odds {0:?}")]
    InvalidOdds(String),

    /// Not enough usable rows to fit or evaluate a model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}
