//! Report model and exporters.
//!
//! Exporters are pure functions of a [`model::ReportModel`]: they render
//! artifacts in memory and the pipeline decides whether to write them.

pub mod builder;
pub mod document;
pub mod json;
pub mod model;
pub mod spreadsheet;

use crate::error::ExportError;
use model::ReportModel;
use std::path::PathBuf;

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the output directory.
    pub relative_path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(relative_path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes: bytes.into(),
        }
    }
}

/// Serializes a report model into artifacts.
pub trait Exporter: Send + Sync {
    /// Format name, e.g. `spreadsheet`.
    fn name(&self) -> &'static str;

    fn render(&self, model: &ReportModel, file_stem: &str) -> Result<Vec<Artifact>, ExportError>;
}

/// Names accepted by [`exporter_for`].
pub const FORMATS: [&str; 3] = ["document", "spreadsheet", "json"];

/// Look up an exporter by format name.
pub fn exporter_for(name: &str) -> Option<Box<dyn Exporter>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "document" | "markdown" | "md" => Some(Box::new(document::DocumentExporter)),
        "spreadsheet" | "xlsx" | "excel" => Some(Box::new(spreadsheet::SpreadsheetExporter)),
        "json" => Some(Box::new(json::JsonExporter)),
        _ => None,
    }
}

/// Document, spreadsheet and JSON, in that order.
pub fn default_exporters() -> Vec<Box<dyn Exporter>> {
    FORMATS.iter().filter_map(|name| exporter_for(name)).collect()
}
