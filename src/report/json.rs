//! JSON export of the full report model.

use crate::error::ExportError;
use crate::report::model::ReportModel;
use crate::report::{Artifact, Exporter};

/// Generate a JSON report.
pub fn generate_json_report(model: &ReportModel) -> Result<String, ExportError> {
    serde_json::to_string_pretty(model).map_err(Into::into)
}

pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn render(&self, model: &ReportModel, file_stem: &str) -> Result<Vec<Artifact>, ExportError> {
        let json = generate_json_report(model)?;
        Ok(vec![Artifact::new(format!("{}.json", file_stem), json)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::builder::tests::sample_model;

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&sample_model()).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"by_bank\""));
        assert!(json.contains("\"executive_summary\""));
        assert!(json.contains("\"kind\": \"county\""));
    }

    #[test]
    fn test_sections_are_in_report_order() {
        let json = generate_json_report(&sample_model()).unwrap();
        let positions: Vec<usize> = ["summary", "by_bank", "by_county", "trends", "raw_data"]
            .iter()
            .map(|key| json.find(&format!("\"{}\"", key)).unwrap())
            .collect();

        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_artifact_name() {
        let artifacts = JsonExporter.render(&sample_model(), "cook").unwrap();
        assert_eq!(artifacts[0].relative_path.to_str(), Some("cook.json"));
    }
}
