//! Data models for branch trend reporting.
//!
//! This module contains the canonical records and the derived summaries
//! that flow through the report pipeline. Derived values are built once per
//! run from an immutable snapshot of records and never mutated afterwards.

use crate::analysis::ratio;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which feed a raw row was sourced from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Vintage {
    /// Current summary-of-deposits feed.
    #[default]
    Current,
    /// Legacy feed kept for older years.
    Legacy,
}

impl fmt::Display for Vintage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vintage::Current => write!(f, "current"),
            Vintage::Legacy => write!(f, "legacy"),
        }
    }
}

/// A branch row exactly as the query collaborator returned it.
///
/// Counts are signed so malformed input survives decoding and can be
/// rejected row by row during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBranchRow {
    /// Reporting institution name.
    pub bank_name: String,
    /// Reporting year.
    pub year: i32,
    /// Five digit county FIPS code.
    #[serde(alias = "geoid5", default)]
    pub geography_id: String,
    /// County and state, e.g. "Cook County, Illinois".
    pub county_state: String,
    /// Branches operated by the bank in the county.
    pub total_branches: i64,
    /// Branches located in low-to-moderate income tracts.
    #[serde(alias = "lmict")]
    pub lmi_branches: i64,
    /// Branches located in majority-minority tracts.
    #[serde(alias = "mmct")]
    pub minority_branches: i64,
    /// Source feed of this row.
    #[serde(default)]
    pub vintage: Vintage,
}

/// The (counties, years) selection a report is generated for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Selected counties, sorted and deduplicated.
    pub counties: Vec<String>,
    /// Selected years, ascending and deduplicated.
    pub years: Vec<i32>,
}

impl Selection {
    /// Creates a selection, normalizing order and removing duplicates.
    pub fn new(counties: Vec<String>, years: Vec<i32>) -> Self {
        let mut counties: Vec<String> = counties
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        counties.sort();
        counties.dedup();

        let mut years = years;
        years.sort_unstable();
        years.dedup();

        Self { counties, years }
    }

    /// Every (county, year) pair in the selection.
    pub fn pairs(&self) -> Vec<(String, i32)> {
        self.counties
            .iter()
            .flat_map(|c| self.years.iter().map(move |y| (c.clone(), *y)))
            .collect()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.counties.is_empty() || self.years.is_empty()
    }
}

/// Pre-fetched rows for one selected (county, year) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub county_state: String,
    pub year: i32,
    pub rows: Vec<RawBranchRow>,
}

/// Uniqueness key of a branch record.
///
/// Field order gives the canonical sort: county, then year, then bank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub county_state: String,
    pub year: i32,
    pub bank_name: String,
}

/// A validated, deduplicated branch record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Reporting institution name (trimmed).
    pub bank_name: String,
    /// Reporting year.
    pub year: i32,
    /// County and state.
    pub county_state: String,
    /// Five digit county FIPS code.
    pub geography_id: String,
    /// Total branches.
    pub total_branches: u64,
    /// Branches in LMI tracts, never above `total_branches`.
    pub lmi_branches: u64,
    /// Branches in majority-minority tracts, never above `total_branches`.
    pub minority_branches: u64,
}

impl BranchRecord {
    /// Returns the uniqueness key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            county_state: self.county_state.clone(),
            year: self.year,
            bank_name: self.bank_name.clone(),
        }
    }
}

/// Branch totals for one bank in one county and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankYearSummary {
    pub bank_name: String,
    pub county_state: String,
    pub year: i32,
    pub total_branches: u64,
    pub lmi_branches: u64,
    pub minority_branches: u64,
    /// Share of branches in LMI tracts, in [0, 1].
    pub lmi_pct: f64,
    /// Share of branches in majority-minority tracts, in [0, 1].
    pub minority_pct: f64,
}

/// Branch totals across all banks for one county and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyYearSummary {
    pub county_state: String,
    pub year: i32,
    pub total_branches: u64,
    /// Number of banks reporting in the county that year.
    pub bank_count: usize,
    pub lmi_branches: u64,
    pub minority_branches: u64,
    /// Share of branches in LMI tracts, in [0, 1].
    pub lmi_pct: f64,
    /// Share of branches in majority-minority tracts, in [0, 1].
    pub minority_pct: f64,
}

impl CountyYearSummary {
    /// A county-year with no reporting banks.
    pub fn empty(county_state: &str, year: i32) -> Self {
        Self {
            county_state: county_state.to_string(),
            year,
            total_branches: 0,
            bank_count: 0,
            lmi_branches: 0,
            minority_branches: 0,
            lmi_pct: 0.0,
            minority_pct: 0.0,
        }
    }

    /// Upper bound of branches that are both LMI and majority-minority.
    ///
    /// Tract-level intersections are not part of the input, so the smaller
    /// of the two shares is the most that can overlap.
    pub fn overlap_upper_bound(&self) -> f64 {
        self.lmi_pct.min(self.minority_pct)
    }
}

/// The entity a trend series is computed for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendEntity {
    /// All banks in a county.
    County { county_state: String },
    /// One bank inside one county.
    Bank {
        bank_name: String,
        county_state: String,
    },
}

impl TrendEntity {
    /// County the entity belongs to.
    pub fn county_state(&self) -> &str {
        match self {
            TrendEntity::County { county_state } => county_state,
            TrendEntity::Bank { county_state, .. } => county_state,
        }
    }

    /// Bank name, if this is a bank series.
    pub fn bank_name(&self) -> Option<&str> {
        match self {
            TrendEntity::County { .. } => None,
            TrendEntity::Bank { bank_name, .. } => Some(bank_name),
        }
    }
}

impl fmt::Display for TrendEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendEntity::County { county_state } => write!(f, "{}", county_state),
            TrendEntity::Bank {
                bank_name,
                county_state,
            } => write!(f, "{} ({})", bank_name, county_state),
        }
    }
}

/// Which branch count a trend series follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    TotalBranches,
    LmiBranches,
    MinorityBranches,
}

impl TrendMetric {
    /// All metrics in report order.
    pub const ALL: [TrendMetric; 3] = [
        TrendMetric::TotalBranches,
        TrendMetric::LmiBranches,
        TrendMetric::MinorityBranches,
    ];
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendMetric::TotalBranches => write!(f, "Total Branches"),
            TrendMetric::LmiBranches => write!(f, "LMI Branches"),
            TrendMetric::MinorityBranches => write!(f, "Minority Branches"),
        }
    }
}

/// Year-over-year change of a trend point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PctChange {
    /// No earlier data point exists for the entity.
    FirstObservation,
    /// Prior value was zero and current value is positive.
    NewEntrant,
    /// Relative change as a fraction (-0.25 means a 25% decline).
    Change(f64),
}

impl PctChange {

    /// Short status label used by exporters.
    pub fn label(&self) -> &'static str {
        match self {
            PctChange::FirstObservation => "first observation",
            PctChange::NewEntrant => "new entrant",
            PctChange::Change(_) => "change",
        }
    }
}

impl fmt::Display for PctChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PctChange::Change(v) => write!(f, "{:+.2}%", ratio::to_percent(*v)),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// One year of a trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Display key of the entity (bank or county).
    pub entity_key: String,
    pub year: i32,
    /// Value for the year; zero when the entity has no data that year.
    pub value: u64,
    /// False when the year is a gap in the entity's data.
    pub observed: bool,
    /// Value of the preceding year on the axis, once the series has started.
    pub prior_year_value: Option<u64>,
    pub pct_change: PctChange,
}

/// Change between the first observed point and the end of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetChange {
    pub start_year: i32,
    pub end_year: i32,
    pub start_value: u64,
    pub end_value: u64,
    pub change: PctChange,
}

impl NetChange {
    /// Absolute change in branches.
    pub fn absolute(&self) -> i64 {
        self.end_value as i64 - self.start_value as i64
    }
}

/// A year-ordered trend series for one entity and metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub entity: TrendEntity,
    pub metric: TrendMetric,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    /// Net change from the first observed point to the last point.
    ///
    /// Returns `None` when the entity was never observed.
    pub fn net_change(&self) -> Option<NetChange> {
        let first = self.points.iter().find(|p| p.observed)?;
        let last = self.points.last()?;

        Some(NetChange {
            start_year: first.year,
            end_year: last.year,
            start_value: first.value,
            end_value: last.value,
            change: if first.year == last.year {
                PctChange::FirstObservation
            } else {
                ratio::pct_change(first.value, last.value)
            },
        })
    }
}

/// A bank's position in its county's market for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub county_state: String,
    pub year: i32,
    pub bank_name: String,
    pub total_branches: u64,
    /// Share of the county's branches, as a fraction in [0, 1].
    pub market_share_pct: f64,
    /// 1 is the largest bank; ranks are unique within a county-year.
    pub rank: usize,
}
