//! The exporter-agnostic report model.
//!
//! A [`ReportModel`] is self-describing: exporters only format what is
//! here and never recompute statistics.

use crate::analysis::{
    BankBenchmark, BankGrowth, CombinedYearSummary, ConcentrationLeaders, CountyComparison,
};
use crate::models::{
    BankYearSummary, BranchRecord, CountyYearSummary, NetChange, RankedEntry, TrendSeries,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named narrative sections, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSection {
    ExecutiveSummary,
    KeyFindings,
    Trends,
    BankStrategy,
    CommunityImpact,
    Conclusion,
}

impl NarrativeSection {
    pub const ALL: [NarrativeSection; 6] = [
        NarrativeSection::ExecutiveSummary,
        NarrativeSection::KeyFindings,
        NarrativeSection::Trends,
        NarrativeSection::BankStrategy,
        NarrativeSection::CommunityImpact,
        NarrativeSection::Conclusion,
    ];

    /// Stable key, e.g. `community_impact`.
    pub fn key(&self) -> &'static str {
        match self {
            NarrativeSection::ExecutiveSummary => "executive_summary",
            NarrativeSection::KeyFindings => "key_findings",
            NarrativeSection::Trends => "trends",
            NarrativeSection::BankStrategy => "bank_strategy",
            NarrativeSection::CommunityImpact => "community_impact",
            NarrativeSection::Conclusion => "conclusion",
        }
    }

    /// Heading used in the document.
    pub fn title(&self) -> &'static str {
        match self {
            NarrativeSection::ExecutiveSummary => "Executive Summary",
            NarrativeSection::KeyFindings => "Key Findings",
            NarrativeSection::Trends => "Overall Trends",
            NarrativeSection::BankStrategy => "Bank Strategy Analysis",
            NarrativeSection::CommunityImpact => "Community Impact Analysis",
            NarrativeSection::Conclusion => "Conclusion",
        }
    }
}

impl fmt::Display for NarrativeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Where a section's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    /// Not yet sent to the narrative backend; text is the fallback.
    Pending,
    /// Written by the narrative backend.
    Generated,
    /// Deterministic statement built from the statistics.
    Fallback,
}

/// Text of one narrative section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub source: NarrativeSource,
    pub text: String,
    /// Why generation failed, when the fallback replaced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Narrative {
    pub fn pending(text: String) -> Self {
        Self {
            source: NarrativeSource::Pending,
            text,
            error: None,
        }
    }

    pub fn generated(text: String) -> Self {
        Self {
            source: NarrativeSource::Generated,
            text,
            error: None,
        }
    }

    pub fn fallback(text: String, error: Option<String>) -> Self {
        Self {
            source: NarrativeSource::Fallback,
            text,
            error,
        }
    }
}

/// Metadata about the report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub counties: Vec<String>,
    pub years: Vec<i32>,
    /// Raw rows received from the query collaborator.
    pub rows_seen: usize,
    /// Rows rejected during normalization.
    pub rows_rejected: usize,
    /// Records after deduplication.
    pub records: usize,
    /// Narrative backend label, e.g. `ollama:llama3.2:latest`.
    pub narrative_provider: String,
}

/// Headline figures across all selected counties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySection {
    /// Combined totals per year across the selection.
    pub overview: Vec<CombinedYearSummary>,
    /// Combined branch change from the first to the last year.
    pub headline: Option<NetChange>,
    /// Market leaders per county in the last year.
    pub leaders: Vec<ConcentrationLeaders>,
}

/// Bank level tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankSection {
    /// Ordered by county, year, bank.
    pub summaries: Vec<BankYearSummary>,
    /// Ordered by county, year, rank.
    pub rankings: Vec<RankedEntry>,
    pub growth: Vec<BankGrowth>,
    /// Benchmarks for the last year.
    pub benchmarks: Vec<BankBenchmark>,
}

/// County level tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountySection {
    /// Every selected county for every axis year, zero-filled.
    pub summaries: Vec<CountyYearSummary>,
    /// Present only when more than one county is selected.
    pub comparison: Option<CountyComparison>,
}

/// Trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSection {
    pub year_axis: Vec<i32>,
    pub counties: Vec<TrendSeries>,
    pub banks: Vec<TrendSeries>,
}

/// The complete report.
///
/// Section fields are declared in report order: summary, by bank,
/// by county, trends, raw data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub metadata: ReportMetadata,
    pub summary: SummarySection,
    pub by_bank: BankSection,
    pub by_county: CountySection,
    pub trends: TrendSection,
    pub raw_data: Vec<BranchRecord>,
    pub narratives: BTreeMap<NarrativeSection, Narrative>,
}

impl ReportModel {
    /// Narrative for a section.
    pub fn narrative(&self, section: NarrativeSection) -> Option<&Narrative> {
        self.narratives.get(&section)
    }

    /// First and last axis year.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = *self.trends.year_axis.first()?;
        let last = *self.trends.year_axis.last()?;
        Some((first, last))
    }

    /// Last axis year.
    pub fn latest_year(&self) -> Option<i32> {
        self.trends.year_axis.last().copied()
    }

    /// Rankings of the latest year, ordered by county then rank.
    pub fn latest_rankings(&self) -> Vec<&RankedEntry> {
        match self.latest_year() {
            Some(year) => self
                .by_bank
                .rankings
                .iter()
                .filter(|e| e.year == year)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Replace narrative sections, returning the updated model.
    pub fn with_narratives(mut self, narratives: BTreeMap<NarrativeSection, Narrative>) -> Self {
        for (section, narrative) in narratives {
            self.narratives.insert(section, narrative);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_keys_and_titles() {
        assert_eq!(NarrativeSection::CommunityImpact.key(), "community_impact");
        assert_eq!(NarrativeSection::Trends.title(), "Overall Trends");
        assert_eq!(NarrativeSection::ALL.len(), 6);
    }

    #[test]
    fn test_section_serializes_as_key() {
        let json = serde_json::to_string(&NarrativeSection::BankStrategy).unwrap();
        assert_eq!(json, "\"bank_strategy\"");
    }

    #[test]
    fn test_section_order_matches_document_order() {
        let mut sorted = NarrativeSection::ALL;
        sorted.sort();
        assert_eq!(sorted, NarrativeSection::ALL);
    }
}
