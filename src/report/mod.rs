//! Output sinks for a finished run.

pub mod generator;

pub use generator::{
    generate_json_report, generate_markdown_summary, generate_reproduction_manifest,
    run_directory, write_outputs, ManifestVariables, ReproductionManifest, MANIFEST_FILE,
    RESULTS_FILE, SUMMARY_FILE,
};
