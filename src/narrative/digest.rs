//! Compact statistical digests sent to the narrative backend.
//!
//! A digest carries summary numbers and labels only, never raw rows.
//! Percentages are rendered on the 0-100 scale.

use crate::analysis::ratio::to_percent;
use crate::error::NarrativeError;
use crate::models::{TrendEntity, TrendMetric};
use crate::report::model::{NarrativeSection, ReportModel};
use serde::Serialize;

/// Banks listed for overview sections.
pub const OVERVIEW_TOP_BANKS: usize = 5;

/// Combined totals for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearLine {
    pub year: i32,
    pub total_branches: u64,
    pub bank_count: usize,
    pub lmi_pct: f64,
    pub minority_pct: f64,
}

/// Net change of one county series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub county_state: String,
    pub metric: String,
    pub start_year: i32,
    pub end_year: i32,
    pub start_value: u64,
    pub end_value: u64,
    pub change: String,
}

/// One bank's market position in the latest year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareLine {
    pub county_state: String,
    pub rank: usize,
    pub bank_name: String,
    pub total_branches: u64,
    pub market_share_pct: f64,
}

/// Growth of a leading bank across the period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthLine {
    pub county_state: String,
    pub bank_name: String,
    pub first_year_branches: u64,
    pub last_year_branches: u64,
    pub change: String,
    pub lmi_pct: f64,
    pub minority_pct: f64,
}

/// A bank's community shares against its county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkLine {
    pub county_state: String,
    pub bank_name: String,
    pub lmi_pct: f64,
    pub county_lmi_pct: f64,
    pub lmi_gap_points: f64,
    pub minority_pct: f64,
    pub county_minority_pct: f64,
    pub minority_gap_points: f64,
}

/// Statistics scoped to one narrative section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionDigest {
    pub section: NarrativeSection,
    pub counties: Vec<String>,
    pub first_year: i32,
    pub last_year: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overview: Vec<YearLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trends: Vec<TrendLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub market_shares: Vec<ShareLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub growth: Vec<GrowthLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub benchmarks: Vec<BenchmarkLine>,
}

impl SectionDigest {
    /// Render as pretty JSON for the prompt.
    pub fn render(&self) -> Result<String, NarrativeError> {
        serde_json::to_string_pretty(self).map_err(|e| NarrativeError::MalformedDigest {
            section: self.section.key(),
            reason: e.to_string(),
        })
    }
}

fn malformed(section: NarrativeSection, reason: &str) -> NarrativeError {
    NarrativeError::MalformedDigest {
        section: section.key(),
        reason: reason.to_string(),
    }
}

/// Build the digest for `section`.
///
/// `top_banks` caps the ranked banks per county for the bank and
/// community sections; overview sections list five.
pub fn build_digest(
    model: &ReportModel,
    section: NarrativeSection,
    top_banks: usize,
) -> Result<SectionDigest, NarrativeError> {
    let (first_year, last_year) = model
        .year_span()
        .ok_or_else(|| malformed(section, "report has no years"))?;

    let overview: Vec<YearLine> = model
        .summary
        .overview
        .iter()
        .map(|y| YearLine {
            year: y.year,
            total_branches: y.total_branches,
            bank_count: y.bank_count,
            lmi_pct: to_percent(y.lmi_pct),
            minority_pct: to_percent(y.minority_pct),
        })
        .collect();

    let metrics: &[TrendMetric] = match section {
        NarrativeSection::ExecutiveSummary | NarrativeSection::Conclusion => {
            &[TrendMetric::TotalBranches]
        }
        NarrativeSection::CommunityImpact => {
            &[TrendMetric::LmiBranches, TrendMetric::MinorityBranches]
        }
        NarrativeSection::BankStrategy => &[],
        NarrativeSection::KeyFindings | NarrativeSection::Trends => &TrendMetric::ALL,
    };
    let trends = trend_lines(model, metrics);

    let share_limit = match section {
        NarrativeSection::BankStrategy | NarrativeSection::CommunityImpact => top_banks,
        NarrativeSection::Trends => 0,
        _ => OVERVIEW_TOP_BANKS,
    };
    let market_shares = share_lines(model, share_limit);

    let growth = if section == NarrativeSection::BankStrategy {
        growth_lines(model)
    } else {
        Vec::new()
    };

    let benchmarks = if section == NarrativeSection::CommunityImpact {
        let listed: Vec<(&str, &str)> = market_shares
            .iter()
            .map(|s| (s.county_state.as_str(), s.bank_name.as_str()))
            .collect();
        benchmark_lines(model, &listed)
    } else {
        Vec::new()
    };

    let digest = SectionDigest {
        section,
        counties: model.metadata.counties.clone(),
        first_year,
        last_year,
        overview: if section == NarrativeSection::BankStrategy {
            Vec::new()
        } else {
            overview
        },
        trends,
        market_shares,
        growth,
        benchmarks,
    };

    validate(&digest)?;
    Ok(digest)
}

fn validate(digest: &SectionDigest) -> Result<(), NarrativeError> {
    let section = digest.section;
    match section {
        NarrativeSection::BankStrategy if digest.market_shares.is_empty() => {
            Err(malformed(section, "no ranked banks"))
        }
        NarrativeSection::BankStrategy => Ok(()),
        _ if digest.overview.is_empty() => Err(malformed(section, "no yearly totals")),
        _ => Ok(()),
    }
}

fn trend_lines(model: &ReportModel, metrics: &[TrendMetric]) -> Vec<TrendLine> {
    model
        .trends
        .counties
        .iter()
        .filter(|s| metrics.contains(&s.metric))
        .filter_map(|series| {
            let net = series.net_change()?;
            let county_state = match &series.entity {
                TrendEntity::County { county_state } => county_state.clone(),
                TrendEntity::Bank { .. } => return None,
            };
            Some(TrendLine {
                county_state,
                metric: series.metric.to_string(),
                start_year: net.start_year,
                end_year: net.end_year,
                start_value: net.start_value,
                end_value: net.end_value,
                change: net.change.to_string(),
            })
        })
        .collect()
}

fn share_lines(model: &ReportModel, limit: usize) -> Vec<ShareLine> {
    model
        .latest_rankings()
        .into_iter()
        .filter(|e| e.rank <= limit)
        .map(|e| ShareLine {
            county_state: e.county_state.clone(),
            rank: e.rank,
            bank_name: e.bank_name.clone(),
            total_branches: e.total_branches,
            market_share_pct: to_percent(e.market_share_pct),
        })
        .collect()
}

fn growth_lines(model: &ReportModel) -> Vec<GrowthLine> {
    model
        .by_bank
        .growth
        .iter()
        .map(|g| GrowthLine {
            county_state: g.county_state.clone(),
            bank_name: g.bank_name.clone(),
            first_year_branches: g.first_year_branches,
            last_year_branches: g.last_year_branches,
            change: g.pct_change.to_string(),
            lmi_pct: to_percent(g.current_lmi_pct),
            minority_pct: to_percent(g.current_minority_pct),
        })
        .collect()
}

fn benchmark_lines(model: &ReportModel, listed: &[(&str, &str)]) -> Vec<BenchmarkLine> {
    model
        .by_bank
        .benchmarks
        .iter()
        .filter(|b| listed.contains(&(b.county_state.as_str(), b.bank_name.as_str())))
        .map(|b| BenchmarkLine {
            county_state: b.county_state.clone(),
            bank_name: b.bank_name.clone(),
            lmi_pct: to_percent(b.lmi_pct),
            county_lmi_pct: to_percent(b.county_lmi_pct),
            lmi_gap_points: b.lmi_gap_points,
            minority_pct: to_percent(b.minority_pct),
            county_minority_pct: to_percent(b.county_minority_pct),
            minority_gap_points: b.minority_gap_points,
        })
        .collect()
}
