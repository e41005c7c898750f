//! Error types for the research pipeline.
//!
//! Each external collaborator has its own error type; `EmpiricaError` is
//! the taxonomy the orchestrator surfaces to callers. Only fatal
//! conditions become errors. Degraded paths (a sparse indicator, a failed
//! literature search, a tautology that could not be corrected) are logged
//! as warnings and the run continues.

use crate::llm::{GenerateJsonError, JsonExtractError, LlmError};
use crate::pipeline::Stage;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EmpiricaError>;

/// Which side of the regression a series feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRole {
    Independent,
    Dependent,
}

impl std::fmt::Display for SeriesRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesRole::Independent => write!(f, "independent (X)"),
            SeriesRole::Dependent => write!(f, "dependent (Y)"),
        }
    }
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum EmpiricaError {
    /// Missing or invalid configuration, reported before any stage runs.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Text generation failed during {stage}: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("Could not read a JSON answer during {stage}: {source}")]
    Json {
        stage: Stage,
        #[source]
        source: JsonExtractError,
    },

    #[error("Planner response is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("No observations fetched for the {role} series {indicator} ({start_year}-{end_year})")]
    EmptySeries {
        role: SeriesRole,
        indicator: String,
        start_year: i32,
        end_year: i32,
    },

    #[error("Only {rows} observations left after {stage} (at least {required} required)")]
    InsufficientData {
        stage: Stage,
        rows: usize,
        required: usize,
    },

    #[error("Statistical analysis failed: {0}")]
    Analysis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmpiricaError {
    /// Attach the failing stage to a text-generation error.
    pub fn llm(stage: Stage, source: LlmError) -> Self {
        match source {
            LlmError::MissingApiKey => {
                EmpiricaError::Config("text-generation API key is not set".to_string())
            }
            source => EmpiricaError::Llm { stage, source },
        }
    }

    /// Attach the failing stage to a structured-answer error.
    pub fn generation(stage: Stage, source: GenerateJsonError) -> Self {
        match source {
            GenerateJsonError::Llm(e) => Self::llm(stage, e),
            GenerateJsonError::Json(e) => EmpiricaError::Json { stage, source: e },
        }
    }
}
