//! Indicator selection guards.
//!
//! This module provides the tautology guard, the keyword fallback table
//! used to repair tautological pairs, and the catalog validator.

pub mod fallback;
pub mod tautology;
pub mod validator;

pub use fallback::{select_fallback, FallbackPair, FallbackRule, FALLBACK_RULES};
pub use tautology::{is_tautology, tautology_reason, TautologyReason, INDICATOR_FAMILIES};
pub use validator::{Existence, IndicatorValidator};
