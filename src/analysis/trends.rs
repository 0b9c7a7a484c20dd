//! Year-over-year trend series.
//!
//! Series run over a shared ascending year axis. A year with no data is
//! kept as an explicit unobserved point with value 0; nothing is
//! interpolated. County and bank series are built from their own
//! summaries and never mixed.

use crate::analysis::aggregator::group_by_bank;
use crate::analysis::ratio;
use crate::models::{
    BankYearSummary, CountyYearSummary, PctChange, TrendEntity, TrendMetric, TrendPoint,
    TrendSeries,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ascending union of the selected years and the years seen in data.
pub fn year_axis(selected: &[i32], observed: impl IntoIterator<Item = i32>) -> Vec<i32> {
    let mut axis: BTreeSet<i32> = selected.iter().copied().collect();
    axis.extend(observed);
    axis.into_iter().collect()
}

/// Build one series over `axis` from the entity's observed values.
///
/// The series starts at the first observed year. Every later year gets a
/// prior value (the preceding axis year, 0 if it was a gap) and a change
/// computed with the shared ratio policy.
pub fn build_series(
    entity: TrendEntity,
    metric: TrendMetric,
    axis: &[i32],
    values: &BTreeMap<i32, u64>,
) -> TrendSeries {
    let entity_key = entity.to_string();
    let mut points = Vec::with_capacity(axis.len());
    let mut prior: Option<u64> = None;

    for &year in axis {
        let observed = values.contains_key(&year);
        let value = values.get(&year).copied().unwrap_or(0);

        let pct_change = match prior {
            Some(p) => ratio::pct_change(p, value),
            None => PctChange::FirstObservation,
        };

        points.push(TrendPoint {
            entity_key: entity_key.clone(),
            year,
            value,
            observed,
            prior_year_value: prior,
            pct_change,
        });

        if prior.is_some() || observed {
            prior = Some(value);
        }
    }

    TrendSeries {
        entity,
        metric,
        points,
    }
}

fn county_metric(summary: &CountyYearSummary, metric: TrendMetric) -> u64 {
    match metric {
        TrendMetric::TotalBranches => summary.total_branches,
        TrendMetric::LmiBranches => summary.lmi_branches,
        TrendMetric::MinorityBranches => summary.minority_branches,
    }
}

fn bank_metric(summary: &BankYearSummary, metric: TrendMetric) -> u64 {
    match metric {
        TrendMetric::TotalBranches => summary.total_branches,
        TrendMetric::LmiBranches => summary.lmi_branches,
        TrendMetric::MinorityBranches => summary.minority_branches,
    }
}

/// Trend series for every county and metric.
///
/// `counties` must hold only county-years that actually have records;
/// selected counties without any data still get an all-gap series.
pub fn county_trends(
    counties: &[CountyYearSummary],
    county_names: &[String],
    axis: &[i32],
) -> Vec<TrendSeries> {
    let mut names: BTreeSet<&str> = county_names.iter().map(String::as_str).collect();
    names.extend(counties.iter().map(|c| c.county_state.as_str()));

    let mut series = Vec::new();
    for name in names {
        let own: Vec<&CountyYearSummary> =
            counties.iter().filter(|c| c.county_state == name).collect();

        for metric in TrendMetric::ALL {
            let values: BTreeMap<i32, u64> = own
                .iter()
                .map(|c| (c.year, county_metric(c, metric)))
                .collect();
            series.push(build_series(
                TrendEntity::County {
                    county_state: name.to_string(),
                },
                metric,
                axis,
                &values,
            ));
        }
    }

    series
}

/// Trend series for every (bank, county) and metric.
pub fn bank_trends(banks: &[BankYearSummary], axis: &[i32]) -> Vec<TrendSeries> {
    let mut series = Vec::new();

    for ((bank_name, county_state), members) in group_by_bank(banks) {
        for metric in TrendMetric::ALL {
            let values: BTreeMap<i32, u64> = members
                .iter()
                .map(|b| (b.year, bank_metric(b, metric)))
                .collect();
            series.push(build_series(
                TrendEntity::Bank {
                    bank_name: bank_name.clone(),
                    county_state: county_state.clone(),
                },
                metric,
                axis,
                &values,
            ));
        }
    }

    series
}

/// Branch growth of one bank between the first and last selected year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankGrowth {
    pub county_state: String,
    pub bank_name: String,
    pub first_year: i32,
    pub last_year: i32,
    pub first_year_branches: u64,
    pub last_year_branches: u64,
    pub absolute_change: i64,
    pub pct_change: PctChange,
    /// LMI share in the last year, in [0, 1].
    pub current_lmi_pct: f64,
    /// Minority share in the last year, in [0, 1].
    pub current_minority_pct: f64,
}

/// Growth for each requested (county, bank) pair.
///
/// A bank absent in either year counts as 0 branches that year.
pub fn bank_growth(
    banks: &[BankYearSummary],
    targets: &[(String, String)],
    first_year: i32,
    last_year: i32,
) -> Vec<BankGrowth> {
    let find = |county: &str, bank: &str, year: i32| {
        banks
            .iter()
            .find(|b| b.county_state == county && b.bank_name == bank && b.year == year)
    };

    targets
        .iter()
        .map(|(county_state, bank_name)| {
            let first = find(county_state, bank_name, first_year);
            let last = find(county_state, bank_name, last_year);

            let first_branches = first.map(|b| b.total_branches).unwrap_or(0);
            let last_branches = last.map(|b| b.total_branches).unwrap_or(0);

            BankGrowth {
                county_state: county_state.clone(),
                bank_name: bank_name.clone(),
                first_year,
                last_year,
                first_year_branches: first_branches,
                last_year_branches: last_branches,
                absolute_change: last_branches as i64 - first_branches as i64,
                pct_change: ratio::pct_change(first_branches, last_branches),
                current_lmi_pct: last.map(|b| b.lmi_pct).unwrap_or(0.0),
                current_minority_pct: last.map(|b| b.minority_pct).unwrap_or(0.0),
            }
        })
        .collect()
}
