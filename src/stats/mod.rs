//! Statistical analysis of the cleaned panel.

pub mod descriptive;
pub mod dist;
pub mod engine;
pub mod linalg;

pub use engine::{
    run_all, stars, ControlledResult, CorrelationResult, Descriptive, FixedEffectsResult,
    ModelOutcome, ModelResults, OlsResult, ResultBundle, MIN_OBSERVATIONS,
};
pub use linalg::{fit_ols, FitError, LinearFit};
