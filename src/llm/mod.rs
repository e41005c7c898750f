//! Text-generation service access.
//!
//! This module provides the `TextGenerator` seam, its HTTP implementation
//! and the JSON extraction used for structured answers.

pub mod client;
pub mod json;

pub use client::{generate_json, AnthropicClient, GenerateJsonError, LlmError, TextGenerator};
pub use json::{extract_json, JsonExtractError};
