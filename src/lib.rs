//! Empirica - hypothesis-driven cross-country panel analysis.
//!
//! A free-text hypothesis is turned into a research plan (indicator pair,
//! controls, years), the panel is fetched from the World Bank, reviewed and
//! cleaned, and a fixed suite of descriptive models is estimated.
//!
//! The entry point is [`pipeline::Pipeline`], or [`run_empirica`] to build
//! the real clients from a [`Config`].

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod literature;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod review;
pub mod stats;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{EmpiricaError, Result};
pub use pipeline::{run_empirica, Pipeline, RunOutcome, Stage};
