//! Branch count aggregation and summary statistics.
//!
//! This module rolls branch records up into per-bank and per-county
//! summaries for every year present. Summaries partition the input
//! exactly: each record contributes to one bank summary, and each bank
//! summary to one county summary.

use crate::analysis::ratio::share;
use crate::models::{BankYearSummary, BranchRecord, CountyYearSummary};
use std::collections::{BTreeMap, BTreeSet};

/// Per-bank and per-county summaries of a record set.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    /// Ordered by county, year, bank.
    pub banks: Vec<BankYearSummary>,
    /// Ordered by county, year. Only county-years with records appear.
    pub counties: Vec<CountyYearSummary>,
}

/// Aggregate records into bank and county summaries.
pub fn aggregate(records: &[BranchRecord]) -> Aggregates {
    let banks = summarize_banks(records);
    let counties = summarize_counties(&banks);
    Aggregates { banks, counties }
}

/// Sum records per (bank, county, year).
pub fn summarize_banks(records: &[BranchRecord]) -> Vec<BankYearSummary> {
    let mut totals: BTreeMap<(String, i32, String), (u64, u64, u64)> = BTreeMap::new();

    for record in records {
        let entry = totals
            .entry((
                record.county_state.clone(),
                record.year,
                record.bank_name.clone(),
            ))
            .or_default();
        entry.0 += record.total_branches;
        entry.1 += record.lmi_branches;
        entry.2 += record.minority_branches;
    }

    totals
        .into_iter()
        .map(|((county_state, year, bank_name), (total, lmi, minority))| BankYearSummary {
            bank_name,
            county_state,
            year,
            total_branches: total,
            lmi_branches: lmi,
            minority_branches: minority,
            lmi_pct: share(lmi, total),
            minority_pct: share(minority, total),
        })
        .collect()
}

/// Sum bank summaries per (county, year).
pub fn summarize_counties(banks: &[BankYearSummary]) -> Vec<CountyYearSummary> {
    group_by_county_year(banks)
        .into_iter()
        .map(|((county_state, year), members)| county_from_banks(&county_state, year, &members))
        .collect()
}

/// Build one county summary from its member bank summaries.
pub fn county_from_banks(
    county_state: &str,
    year: i32,
    members: &[&BankYearSummary],
) -> CountyYearSummary {
    let total: u64 = members.iter().map(|b| b.total_branches).sum();
    let lmi: u64 = members.iter().map(|b| b.lmi_branches).sum();
    let minority: u64 = members.iter().map(|b| b.minority_branches).sum();
    let bank_count = members
        .iter()
        .map(|b| b.bank_name.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    CountyYearSummary {
        county_state: county_state.to_string(),
        year,
        total_branches: total,
        bank_count,
        lmi_branches: lmi,
        minority_branches: minority,
        lmi_pct: share(lmi, total),
        minority_pct: share(minority, total),
    }
}

/// Group bank summaries by (county, year).
pub fn group_by_county_year(
    banks: &[BankYearSummary],
) -> BTreeMap<(String, i32), Vec<&BankYearSummary>> {
    let mut grouped: BTreeMap<(String, i32), Vec<&BankYearSummary>> = BTreeMap::new();

    for bank in banks {
        grouped
            .entry((bank.county_state.clone(), bank.year))
            .or_default()
            .push(bank);
    }

    grouped
}

/// Group bank summaries by (bank, county), each group in year order.
pub fn group_by_bank(banks: &[BankYearSummary]) -> BTreeMap<(String, String), Vec<&BankYearSummary>> {
    let mut grouped: BTreeMap<(String, String), Vec<&BankYearSummary>> = BTreeMap::new();

    for bank in banks {
        grouped
            .entry((bank.bank_name.clone(), bank.county_state.clone()))
            .or_default()
            .push(bank);
    }

    for members in grouped.values_mut() {
        members.sort_by_key(|b| b.year);
    }

    grouped
}

/// Expand county summaries over every selected county and year.
///
/// County-years without records are represented by an empty summary so
/// that an absence stays visible in the report.
pub fn fill_county_years(
    counties: &[CountyYearSummary],
    county_names: &[String],
    years: &[i32],
) -> Vec<CountyYearSummary> {
    let known: BTreeMap<(&str, i32), &CountyYearSummary> = counties
        .iter()
        .map(|c| ((c.county_state.as_str(), c.year), c))
        .collect();

    let mut names: BTreeSet<&str> = county_names.iter().map(String::as_str).collect();
    names.extend(counties.iter().map(|c| c.county_state.as_str()));

    let mut axis: BTreeSet<i32> = years.iter().copied().collect();
    axis.extend(counties.iter().map(|c| c.year));

    let mut filled = Vec::with_capacity(names.len() * axis.len());
    for name in names {
        for year in &axis {
            let summary = known
                .get(&(name, *year))
                .map(|c| (*c).clone())
                .unwrap_or_else(|| CountyYearSummary::empty(name, *year));
            filled.push(summary);
        }
    }

    filled
}

/// Distinct bank names across the summaries, alphabetically.
pub fn distinct_banks(banks: &[BankYearSummary]) -> Vec<String> {
    banks
        .iter()
        .map(|b| b.bank_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
