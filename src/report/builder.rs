//! Report model assembly.
//!
//! [`analyze`] runs the pure analysis stages in order; [`ReportBuilder`]
//! turns their output into a [`ReportModel`]. The builder decides what is
//! reportable: entities with zero branches are kept, and only an entirely
//! empty selection is an error.

use crate::analysis::{
    aggregate, bank_growth, bank_trends, benchmarks, combine_years, compare_counties,
    concentration_leaders, county_trends, fill_county_years, partition, rank_all, year_axis,
    Aggregates, BankBenchmark, BankGrowth, ConcentrationLeaders, CountyComparison,
    NormalizedRecords,
};
use crate::analysis::trends::build_series;
use crate::error::PipelineError;
use crate::models::{RankedEntry, Selection, TrendEntity, TrendMetric, TrendSeries};
use crate::narrative::fallback::fallback_text;
use crate::progress::Checkpoint;
use crate::report::model::{
    BankSection, CountySection, Narrative, NarrativeSection, ReportMetadata, ReportModel,
    SummarySection, TrendSection,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Outputs of the analysis stages for one run.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub selection: Selection,
    pub normalized: NormalizedRecords,
    pub aggregates: Aggregates,
    pub year_axis: Vec<i32>,
    pub county_trends: Vec<TrendSeries>,
    pub bank_trends: Vec<TrendSeries>,
    pub rankings: Vec<RankedEntry>,
    pub leaders: Vec<ConcentrationLeaders>,
    pub growth: Vec<BankGrowth>,
    pub comparison: Option<CountyComparison>,
    pub benchmarks: Vec<BankBenchmark>,
}

/// Run aggregation, trends, ranking and comparison in order.
///
/// `on_stage` is told about each stage before it starts.
pub fn analyze(
    selection: &Selection,
    normalized: NormalizedRecords,
    concentration_threshold: f64,
    mut on_stage: impl FnMut(Checkpoint),
) -> ReportParts {
    on_stage(Checkpoint::Aggregating);
    let aggregates = aggregate(&normalized.records);

    on_stage(Checkpoint::CalculatingTrends);
    let axis = year_axis(&selection.years, aggregates.counties.iter().map(|c| c.year));
    let county_series = county_trends(&aggregates.counties, &selection.counties, &axis);
    let bank_series = bank_trends(&aggregates.banks, &axis);

    on_stage(Checkpoint::Ranking);
    let rankings = rank_all(&aggregates.counties, &aggregates.banks);
    let latest = axis.last().copied();
    let leaders: Vec<ConcentrationLeaders> = match latest {
        Some(year) => county_names(selection, &aggregates)
            .iter()
            .filter_map(|county| {
                concentration_leaders(&partition(&rankings, county, year), concentration_threshold)
            })
            .collect(),
        None => Vec::new(),
    };

    let targets: Vec<(String, String)> = leaders
        .iter()
        .flat_map(|group| {
            group
                .leaders
                .iter()
                .map(|e| (e.county_state.clone(), e.bank_name.clone()))
        })
        .collect();
    let growth = match (axis.first(), axis.last()) {
        (Some(&first), Some(&last)) => bank_growth(&aggregates.banks, &targets, first, last),
        _ => Vec::new(),
    };

    on_stage(Checkpoint::ComparingCounties);
    let names = county_names(selection, &aggregates);
    let comparison = compare_counties(&names, &aggregates.counties, &aggregates.banks);
    let bench = match latest {
        Some(year) => benchmarks(&aggregates.banks, &aggregates.counties, year),
        None => Vec::new(),
    };

    ReportParts {
        selection: selection.clone(),
        normalized,
        aggregates,
        year_axis: axis,
        county_trends: county_series,
        bank_trends: bank_series,
        rankings,
        leaders,
        growth,
        comparison,
        benchmarks: bench,
    }
}

/// Selected counties plus any county seen in the data, sorted.
fn county_names(selection: &Selection, aggregates: &Aggregates) -> Vec<String> {
    let mut names = selection.counties.clone();
    names.extend(aggregates.counties.iter().map(|c| c.county_state.clone()));
    names.sort();
    names.dedup();
    names
}

/// Assembles a [`ReportModel`] from analysis output.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    run_id: String,
    generated_at: DateTime<Utc>,
    provider: String,
    title: Option<String>,
}

impl ReportBuilder {
    pub fn new(run_id: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            generated_at,
            provider: "offline".to_string(),
            title: None,
        }
    }

    /// Narrative backend label recorded in the metadata.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Build the model. Narrative sections start as pending fallbacks.
    pub fn build(&self, parts: ReportParts) -> Result<ReportModel, PipelineError> {
        if parts.normalized.is_empty() {
            return Err(PipelineError::EmptyDataset {
                counties: describe_counties(&parts.selection.counties),
                years: describe_years(&parts.selection.years),
            });
        }

        let names = county_names(&parts.selection, &parts.aggregates);
        let filled = fill_county_years(&parts.aggregates.counties, &names, &parts.year_axis);
        let overview = combine_years(&filled, &parts.aggregates.banks, &parts.year_axis);
        let headline = headline(&overview, &parts.year_axis);

        let title = self.title.clone().unwrap_or_else(|| default_title(&names, &parts.year_axis));

        let metadata = ReportMetadata {
            title,
            run_id: self.run_id.clone(),
            generated_at: self.generated_at,
            counties: names,
            years: parts.year_axis.clone(),
            rows_seen: parts.normalized.rows_seen,
            rows_rejected: parts.normalized.rejected.len(),
            records: parts.normalized.records.len(),
            narrative_provider: self.provider.clone(),
        };

        let mut model = ReportModel {
            metadata,
            summary: SummarySection {
                overview,
                headline,
                leaders: parts.leaders,
            },
            by_bank: BankSection {
                summaries: parts.aggregates.banks,
                rankings: parts.rankings,
                growth: parts.growth,
                benchmarks: parts.benchmarks,
            },
            by_county: CountySection {
                summaries: filled,
                comparison: parts.comparison,
            },
            trends: TrendSection {
                year_axis: parts.year_axis,
                counties: parts.county_trends,
                banks: parts.bank_trends,
            },
            raw_data: parts.normalized.records,
            narratives: BTreeMap::new(),
        };

        let placeholders: BTreeMap<NarrativeSection, Narrative> = NarrativeSection::ALL
            .iter()
            .map(|&s| (s, Narrative::pending(fallback_text(&model, s))))
            .collect();
        model.narratives = placeholders;

        debug!(
            "Assembled report: {} bank summaries, {} county rows, {} series",
            model.by_bank.summaries.len(),
            model.by_county.summaries.len(),
            model.trends.counties.len() + model.trends.banks.len()
        );

        Ok(model)
    }
}

/// Combined net change across the selection.
fn headline(
    overview: &[crate::analysis::CombinedYearSummary],
    axis: &[i32],
) -> Option<crate::models::NetChange> {
    let values: BTreeMap<i32, u64> = overview
        .iter()
        .filter(|y| y.county_count > 0)
        .map(|y| (y.year, y.total_branches))
        .collect();
    let series = build_series(
        TrendEntity::County {
            county_state: "All selected counties".to_string(),
        },
        TrendMetric::TotalBranches,
        axis,
        &values,
    );
    series.net_change()
}

fn default_title(counties: &[String], years: &[i32]) -> String {
    let place = match counties {
        [] => "Selected Counties".to_string(),
        [one] => one.clone(),
        [first, rest @ ..] => format!("{} and {} more", first, rest.len()),
    };
    format!("Bank Branch Trends: {} ({})", place, describe_years(years))
}

fn describe_counties(counties: &[String]) -> String {
    if counties.is_empty() {
        "the selected counties".to_string()
    } else {
        counties.join("; ")
    }
}

fn describe_years(years: &[i32]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first == last => first.to_string(),
        (Some(first), Some(last)) => format!("{}-{}", first, last),
        _ => "the selected years".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::normalize;
    use crate::models::{QueryResult, RawBranchRow, Vintage};
    use crate::report::model::NarrativeSource;

    pub(crate) const COOK: &str = "Cook County, Illinois";

    pub(crate) fn raw(bank: &str, county: &str, year: i32, total: i64, lmi: i64, minority: i64) -> RawBranchRow {
        RawBranchRow {
            bank_name: bank.to_string(),
            year,
            geography_id: "17031".to_string(),
            county_state: county.to_string(),
            total_branches: total,
            lmi_branches: lmi,
            minority_branches: minority,
            vintage: Vintage::Current,
        }
    }

    /// Cook County: 12 branches in 2020, 15 in 2021; Bank A leads with 10.
    pub(crate) fn sample_results() -> Vec<QueryResult> {
        vec![
            QueryResult {
                county_state: COOK.to_string(),
                year: 2020,
                rows: vec![
                    raw("Bank A", COOK, 2020, 8, 2, 2),
                    raw("Bank B", COOK, 2020, 4, 1, 1),
                ],
            },
            QueryResult {
                county_state: COOK.to_string(),
                year: 2021,
                rows: vec![
                    raw("Bank B", COOK, 2021, 5, 1, 1),
                    raw("Bank A", COOK, 2021, 10, 2, 3),
                ],
            },
        ]
    }

    pub(crate) fn sample_selection() -> Selection {
        Selection::new(vec![COOK.to_string()], vec![2020, 2021])
    }

    pub(crate) fn sample_model() -> ReportModel {
        let selection = sample_selection();
        let parts = analyze(&selection, normalize(&sample_results()), 0.5, |_| {});
        ReportBuilder::new("run-1", DateTime::<Utc>::from_timestamp(0, 0).unwrap())
            .build(parts)
            .unwrap()
    }

    #[test]
    fn test_scenario_two_banks() {
        let model = sample_model();

        let county_2021 = model
            .by_county
            .summaries
            .iter()
            .find(|c| c.year == 2021)
            .unwrap();
        assert_eq!(county_2021.total_branches, 15);

        let top = model.latest_rankings()[0];
        assert_eq!(top.bank_name, "Bank A");
        assert_eq!(top.rank, 1);
        assert_eq!(crate::analysis::ratio::to_percent(top.market_share_pct), 66.67);
    }

    #[test]
    fn test_empty_selection_fails() {
        let selection = sample_selection();
        let empty = vec![QueryResult {
            county_state: COOK.to_string(),
            year: 2020,
            rows: Vec::new(),
        }];
        let parts = analyze(&selection, normalize(&empty), 0.5, |_| {});
        let err = ReportBuilder::new("run-1", Utc::now()).build(parts).unwrap_err();

        assert!(matches!(err, PipelineError::EmptyDataset { .. }));
        assert_eq!(
            err.to_string(),
            "no branch records found for Cook County, Illinois in 2020-2021"
        );
    }

    #[test]
    fn test_partial_empty_selection_still_reports() {
        let queens = "Queens County, New York";
        let selection = Selection::new(vec![COOK.to_string(), queens.to_string()], vec![2020, 2021]);
        let parts = analyze(&selection, normalize(&sample_results()), 0.5, |_| {});
        let model = ReportBuilder::new("run-1", Utc::now()).build(parts).unwrap();

        assert_eq!(model.by_county.summaries.len(), 4);
        assert!(model
            .by_county
            .summaries
            .iter()
            .filter(|c| c.county_state == queens)
            .all(|c| c.total_branches == 0));
        assert!(model.by_county.comparison.is_some());
        assert_eq!(model.metadata.counties.len(), 2);
    }

    #[test]
    fn test_zero_branch_bank_is_retained() {
        let mut results = sample_results();
        results[1].rows.push(raw("Bank Z", COOK, 2021, 0, 0, 0));
        let parts = analyze(&sample_selection(), normalize(&results), 0.5, |_| {});
        let model = ReportBuilder::new("run-1", Utc::now()).build(parts).unwrap();

        assert!(model.by_bank.summaries.iter().any(|b| b.bank_name == "Bank Z"));
        assert!(model.latest_rankings().iter().any(|e| e.bank_name == "Bank Z" && e.rank == 3));
    }

    #[test]
    fn test_stages_report_in_order() {
        let mut seen = Vec::new();
        analyze(&sample_selection(), normalize(&sample_results()), 0.5, |c| seen.push(c));
        assert_eq!(
            seen,
            vec![
                Checkpoint::Aggregating,
                Checkpoint::CalculatingTrends,
                Checkpoint::Ranking,
                Checkpoint::ComparingCounties
            ]
        );
    }

    #[test]
    fn test_placeholders_and_metadata() {
        let model = sample_model();

        assert_eq!(model.narratives.len(), NarrativeSection::ALL.len());
        assert!(model
            .narratives
            .values()
            .all(|n| n.source == NarrativeSource::Pending && !n.text.is_empty()));
        assert_eq!(model.metadata.title, "Bank Branch Trends: Cook County, Illinois (2020-2021)");
        assert_eq!(model.metadata.rows_seen, 4);
        assert_eq!(model.metadata.records, 4);

        let headline = model.summary.headline.as_ref().unwrap();
        assert_eq!((headline.start_value, headline.end_value), (12, 15));
    }

    #[test]
    fn test_growth_covers_leaders() {
        let model = sample_model();
        assert_eq!(model.summary.leaders.len(), 1);
        assert_eq!(model.by_bank.growth.len(), 1);
        assert_eq!(model.by_bank.growth[0].bank_name, "Bank A");
        assert_eq!(model.by_bank.growth[0].absolute_change, 2);
    }
}
