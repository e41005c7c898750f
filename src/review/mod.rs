//! Data quality review and cleaning.

pub mod cleaner;
pub mod reviewer;

pub use cleaner::{apply_cleaning, CleaningReport};
pub use reviewer::{summarize, CleaningDirective, DataReviewer, DataSummary, Review, VariableStats};
