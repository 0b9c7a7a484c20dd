//! Markdown report generation.
//!
//! The document follows a fixed section order. Each narrative section is
//! immediately followed by the table that supports it.

use crate::analysis::ratio::to_percent;
use crate::error::ExportError;
use crate::narrative::prompts::DEFINITIONS;
use crate::report::model::{Narrative, NarrativeSection, NarrativeSource, ReportMetadata, ReportModel};
use crate::report::{Artifact, Exporter};

/// Generate the complete Markdown document.
pub fn generate_markdown_report(model: &ReportModel) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", model.metadata.title));
    output.push_str(&generate_metadata_section(&model.metadata));
    output.push_str(&generate_table_of_contents());

    for section in NarrativeSection::ALL {
        output.push_str(&generate_narrative_section(model, section));
        output.push_str(&generate_supporting_table(model, section));
    }

    output.push_str(&generate_methodology_footer(model));

    output
}

/// Generate the cover metadata.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Report Details\n\n");
    section.push_str(&format!("- **Counties:** {}\n", metadata.counties.join("; ")));
    section.push_str(&format!("- **Years:** {}\n", year_range(&metadata.years)));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Run ID:** `{}`\n", metadata.run_id));
    section.push_str(&format!(
        "- **Narrative Provider:** `{}`\n",
        metadata.narrative_provider
    ));
    section.push_str(&format!("- **Branch Records:** {}\n", metadata.records));
    if metadata.rows_rejected > 0 {
        section.push_str(&format!(
            "- **Rows Rejected:** {} of {}\n",
            metadata.rows_rejected, metadata.rows_seen
        ));
    }
    section.push('\n');

    section
}

fn generate_table_of_contents() -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    for section in NarrativeSection::ALL {
        let anchor = section.title().replace(' ', "-").to_lowercase();
        toc.push_str(&format!("- [{}](#{})\n", section.title(), anchor));
    }
    toc.push_str("- [Methodology](#methodology)\n\n");

    toc
}

fn generate_narrative_section(model: &ReportModel, section: NarrativeSection) -> String {
    let mut block = String::new();

    block.push_str(&format!("## {}\n\n", section.title()));

    match model.narrative(section) {
        Some(narrative) => {
            block.push_str(narrative.text.trim());
            block.push_str("\n\n");
            if let Some(note) = fallback_note(narrative) {
                block.push_str(&note);
            }
        }
        None => block.push_str("*No narrative available for this section.*\n\n"),
    }

    block
}

/// A short italic note when the text is the statistical fallback.
fn fallback_note(narrative: &Narrative) -> Option<String> {
    match (narrative.source, &narrative.error) {
        (NarrativeSource::Generated, _) => None,
        (_, Some(_)) => Some(
            "*Narrative generation was unavailable; this text was derived directly from the statistics.*\n\n"
                .to_string(),
        ),
        (_, None) => Some("*Derived directly from the statistics.*\n\n".to_string()),
    }
}

fn generate_supporting_table(model: &ReportModel, section: NarrativeSection) -> String {
    match section {
        NarrativeSection::ExecutiveSummary => generate_overview_table(model),
        NarrativeSection::KeyFindings => {
            let mut out = generate_leaders_table(model);
            out.push_str(&generate_definitions_block());
            out
        }
        NarrativeSection::Trends => generate_county_trend_table(model),
        NarrativeSection::BankStrategy => {
            let mut out = generate_rankings_table(model);
            out.push_str(&generate_growth_table(model));
            out
        }
        NarrativeSection::CommunityImpact => {
            let mut out = generate_community_table(model);
            out.push_str(&generate_benchmark_table(model));
            out
        }
        NarrativeSection::Conclusion => generate_comparison_table(model),
    }
}

fn generate_overview_table(model: &ReportModel) -> String {
    let mut table = String::new();

    table.push_str("### Branch Overview\n\n");
    table.push_str("| Year | Counties | Branches | Banks | LMI % | Minority % |\n");
    table.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for year in &model.summary.overview {
        table.push_str(&format!(
            "| {} | {} | {} | {} | {:.2} | {:.2} |\n",
            year.year,
            year.county_count,
            year.total_branches,
            year.bank_count,
            to_percent(year.lmi_pct),
            to_percent(year.minority_pct)
        ));
    }
    table.push('\n');

    if let Some(headline) = &model.summary.headline {
        table.push_str(&format!(
            "**Net change {}-{}:** {} to {} branches ({:+}, {})\n\n",
            headline.start_year,
            headline.end_year,
            headline.start_value,
            headline.end_value,
            headline.absolute(),
            headline.change
        ));
    }

    table
}

fn generate_leaders_table(model: &ReportModel) -> String {
    if model.summary.leaders.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Market Leaders\n\n");
    table.push_str("| County | Year | Leading Banks | Combined Share % |\n");
    table.push_str("|:---|:---:|:---|:---:|\n");
    for group in &model.summary.leaders {
        let names: Vec<&str> = group.leaders.iter().map(|e| e.bank_name.as_str()).collect();
        table.push_str(&format!(
            "| {} | {} | {} | {:.2} |\n",
            group.county_state,
            group.year,
            names.join(", "),
            to_percent(group.cumulative_share)
        ));
    }
    table.push('\n');

    table
}

fn generate_definitions_block() -> String {
    let mut block = String::new();

    block.push_str("### Understanding the Data\n\n");
    for line in DEFINITIONS.lines().skip(1) {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str(
        "\nPercentages are shares of a county's branches. The LMI/MMCT figure is an upper bound, \
         the smaller of the two shares.\n\n",
    );

    block
}

fn generate_county_trend_table(model: &ReportModel) -> String {
    let mut table = String::new();

    table.push_str("### County Trends\n\n");
    table.push_str("| County | Metric | Year | Branches | Change |\n");
    table.push_str("|:---|:---|:---:|:---:|:---:|\n");
    for series in &model.trends.counties {
        for point in &series.points {
            let change = if point.observed {
                point.pct_change.to_string()
            } else {
                "no data".to_string()
            };
            table.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                series.entity.county_state(),
                series.metric,
                point.year,
                point.value,
                change
            ));
        }
    }
    table.push('\n');

    table
}

fn generate_rankings_table(model: &ReportModel) -> String {
    let latest = model.latest_rankings();
    if latest.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Market Share Rankings\n\n");
    table.push_str("| County | Year | Rank | Bank | Branches | Share % |\n");
    table.push_str("|:---|:---:|:---:|:---|:---:|:---:|\n");
    for entry in latest {
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {:.2} |\n",
            entry.county_state,
            entry.year,
            entry.rank,
            entry.bank_name,
            entry.total_branches,
            to_percent(entry.market_share_pct)
        ));
    }
    table.push('\n');

    table
}

fn generate_growth_table(model: &ReportModel) -> String {
    if model.by_bank.growth.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Leading Bank Growth\n\n");
    table.push_str("| County | Bank | First Year | Last Year | Change | Change % | LMI % | Minority % |\n");
    table.push_str("|:---|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for growth in &model.by_bank.growth {
        table.push_str(&format!(
            "| {} | {} | {} ({}) | {} ({}) | {:+} | {} | {:.2} | {:.2} |\n",
            growth.county_state,
            growth.bank_name,
            growth.first_year_branches,
            growth.first_year,
            growth.last_year_branches,
            growth.last_year,
            growth.absolute_change,
            growth.pct_change,
            to_percent(growth.current_lmi_pct),
            to_percent(growth.current_minority_pct)
        ));
    }
    table.push('\n');

    table
}

fn generate_community_table(model: &ReportModel) -> String {
    let mut table = String::new();

    table.push_str("### Community Reach by County\n\n");
    table.push_str("| County | Year | LMI Branches | LMI % | Minority Branches | Minority % | LMI/MMCT Upper Bound % |\n");
    table.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for county in &model.by_county.summaries {
        table.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} | {:.2} | {:.2} |\n",
            county.county_state,
            county.year,
            county.lmi_branches,
            to_percent(county.lmi_pct),
            county.minority_branches,
            to_percent(county.minority_pct),
            to_percent(county.overlap_upper_bound())
        ));
    }
    table.push('\n');

    table
}

fn generate_benchmark_table(model: &ReportModel) -> String {
    if model.by_bank.benchmarks.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str("### Banks Against County Benchmarks\n\n");
    table.push_str("| County | Bank | LMI % | County LMI % | Gap (pts) | Minority % | County Minority % | Gap (pts) |\n");
    table.push_str("|:---|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for bench in &model.by_bank.benchmarks {
        table.push_str(&format!(
            "| {} | {} | {:.2} | {:.2} | {:+.2} | {:.2} | {:.2} | {:+.2} |\n",
            bench.county_state,
            bench.bank_name,
            to_percent(bench.lmi_pct),
            to_percent(bench.county_lmi_pct),
            bench.lmi_gap_points,
            to_percent(bench.minority_pct),
            to_percent(bench.county_minority_pct),
            bench.minority_gap_points
        ));
    }
    table.push('\n');

    table
}

fn generate_comparison_table(model: &ReportModel) -> String {
    let Some(comparison) = &model.by_county.comparison else {
        return String::new();
    };

    let mut table = String::new();

    table.push_str("### County Comparison\n\n");
    table.push_str("| Year |");
    for county in &comparison.counties {
        table.push_str(&format!(" {} |", county));
    }
    table.push_str(" Combined |\n|:---:|");
    for _ in 0..=comparison.counties.len() {
        table.push_str(":---:|");
    }
    table.push('\n');

    for (row, combined) in comparison.rows.iter().zip(comparison.combined.iter()) {
        table.push_str(&format!("| {} |", row.year));
        for county in &row.counties {
            table.push_str(&format!(" {} |", county.total_branches));
        }
        table.push_str(&format!(" {} |\n", combined.total_branches));
    }
    table.push('\n');

    table
}

/// Generate the methodology footer.
fn generate_methodology_footer(model: &ReportModel) -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("## Methodology\n\n");
    footer.push_str(
        "Branch counts come from the annual summary-of-deposits branch data. \
         Rows with missing fields, negative counts, or sub-counts above the total \
         are excluded. Rows for the same bank, county and year are summed, \
         including rows from the legacy feed.\n\n",
    );
    footer.push_str(
        "Year-over-year change is relative to the preceding year on the report axis. \
         A year with no data counts as zero branches. Growth from zero is reported as \
         a new entrant rather than a percentage.\n\n",
    );
    footer.push_str(&format!(
        "Market leaders are the smallest set of top-ranked banks holding at least {:.0}% \
         of a county's branches in the latest year.\n\n",
        model
            .summary
            .leaders
            .first()
            .map(|g| to_percent(g.threshold))
            .unwrap_or(50.0)
    ));
    footer.push_str(&format!("*Report run `{}`*\n", model.metadata.run_id));

    footer
}

fn year_range(years: &[i32]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first == last => first.to_string(),
        (Some(first), Some(last)) => format!("{}-{}", first, last),
        _ => "none".to_string(),
    }
}

pub struct DocumentExporter;

impl Exporter for DocumentExporter {
    fn name(&self) -> &'static str {
        "document"
    }

    fn render(&self, model: &ReportModel, file_stem: &str) -> Result<Vec<Artifact>, ExportError> {
        if model.narratives.len() != NarrativeSection::ALL.len() {
            return Err(ExportError::Render {
                exporter: "document",
                message: format!(
                    "expected {} narrative sections, found {}",
                    NarrativeSection::ALL.len(),
                    model.narratives.len()
                ),
            });
        }

        let markdown = generate_markdown_report(model);
        Ok(vec![Artifact::new(format!("{}.md", file_stem), markdown)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::normalize;
    use crate::models::Selection;
    use crate::report::builder::tests::{sample_model, sample_results, COOK};
    use crate::report::builder::{analyze, ReportBuilder};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_sections_in_fixed_order() {
        let markdown = generate_markdown_report(&sample_model());

        let positions: Vec<usize> = NarrativeSection::ALL
            .iter()
            .map(|s| markdown.find(&format!("## {}\n", s.title())).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);

        assert!(markdown.starts_with("# Bank Branch Trends: Cook County, Illinois (2020-2021)"));
        assert!(markdown.contains("## Methodology"));
    }

    #[test]
    fn test_tables_follow_their_sections() {
        let markdown = generate_markdown_report(&sample_model());

        let findings = markdown.find("## Key Findings").unwrap();
        let definitions = markdown.find("### Understanding the Data").unwrap();
        let trends = markdown.find("## Overall Trends").unwrap();
        assert!(findings < definitions && definitions < trends);

        let strategy = markdown.find("## Bank Strategy Analysis").unwrap();
        let rankings = markdown.find("### Market Share Rankings").unwrap();
        let community = markdown.find("## Community Impact Analysis").unwrap();
        assert!(strategy < rankings && rankings < community);
    }

    #[test]
    fn test_metadata_section() {
        let section = generate_metadata_section(&sample_model().metadata);

        assert!(section.contains("Cook County, Illinois"));
        assert!(section.contains("2020-2021"));
        assert!(section.contains("`run-1`"));
        assert!(section.contains("1970-01-01"));
        assert!(!section.contains("Rows Rejected"));
    }

    #[test]
    fn test_rankings_use_two_decimals() {
        let table = generate_rankings_table(&sample_model());
        assert!(table.contains("| Cook County, Illinois | 2021 | 1 | Bank A | 10 | 66.67 |"));
        assert!(table.contains("| Cook County, Illinois | 2021 | 2 | Bank B | 5 | 33.33 |"));
    }

    #[test]
    fn test_comparison_only_for_multiple_counties() {
        assert!(generate_comparison_table(&sample_model()).is_empty());

        let selection = Selection::new(
            vec![COOK.to_string(), "Queens County, New York".to_string()],
            vec![2020, 2021],
        );
        let parts = analyze(&selection, normalize(&sample_results()), 0.5, |_| {});
        let model = ReportBuilder::new("run-2", Utc::now()).build(parts).unwrap();

        let table = generate_comparison_table(&model);
        assert!(table.contains("| Year | Cook County, Illinois | Queens County, New York | Combined |"));
        assert!(table.contains("| 2021 | 15 | 0 | 15 |"));
    }

    #[test]
    fn test_fallback_note() {
        let generated = Narrative::generated("text".to_string());
        assert!(fallback_note(&generated).is_none());

        let failed = Narrative::fallback("text".to_string(), Some("timed out".to_string()));
        assert!(fallback_note(&failed).unwrap().contains("unavailable"));
    }

    #[test]
    fn test_missing_narratives_fail_render() {
        let mut model = sample_model();
        model.narratives = BTreeMap::new();

        let result = DocumentExporter.render(&model, "cook");
        assert!(matches!(result, Err(ExportError::Render { .. })));
    }

    #[test]
    fn test_artifact_name() {
        let artifacts = DocumentExporter.render(&sample_model(), "cook").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].relative_path.to_str(), Some("cook.md"));
    }
}
