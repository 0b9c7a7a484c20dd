//! Cross-county comparison and county benchmarks.

use crate::analysis::ratio::{percentage_points, share};
use crate::models::{BankYearSummary, CountyYearSummary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// All selected counties combined into one pseudo-county for a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedYearSummary {
    pub year: i32,
    /// Counties with at least one reporting bank that year.
    pub county_count: usize,
    pub total_branches: u64,
    /// Distinct banks across all counties.
    pub bank_count: usize,
    pub lmi_branches: u64,
    pub minority_branches: u64,
    pub lmi_pct: f64,
    pub minority_pct: f64,
}

/// One year of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub year: i32,
    /// One summary per selected county, empty when it had no data.
    pub counties: Vec<CountyYearSummary>,
}

/// Aligned multi-county view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyComparison {
    pub counties: Vec<String>,
    /// Years with data in any selected county.
    pub years: Vec<i32>,
    pub rows: Vec<ComparisonRow>,
    pub combined: Vec<CombinedYearSummary>,
}

/// Combine all counties per year over `years`.
///
/// Years without data produce an all-zero combined summary.
pub fn combine_years(
    counties: &[CountyYearSummary],
    banks: &[BankYearSummary],
    years: &[i32],
) -> Vec<CombinedYearSummary> {
    years
        .iter()
        .map(|&year| {
            let members: Vec<&CountyYearSummary> = counties
                .iter()
                .filter(|c| c.year == year && c.bank_count > 0)
                .collect();
            let total: u64 = members.iter().map(|c| c.total_branches).sum();
            let lmi: u64 = members.iter().map(|c| c.lmi_branches).sum();
            let minority: u64 = members.iter().map(|c| c.minority_branches).sum();
            let bank_count = banks
                .iter()
                .filter(|b| b.year == year)
                .map(|b| b.bank_name.as_str())
                .collect::<BTreeSet<_>>()
                .len();

            CombinedYearSummary {
                year,
                county_count: members.len(),
                total_branches: total,
                bank_count,
                lmi_branches: lmi,
                minority_branches: minority,
                lmi_pct: share(lmi, total),
                minority_pct: share(minority, total),
            }
        })
        .collect()
}

/// Align county summaries across the selected counties.
///
/// Returns `None` unless more than one county is selected. Every year
/// that has data in any county gets a row for every county.
pub fn compare_counties(
    selected: &[String],
    counties: &[CountyYearSummary],
    banks: &[BankYearSummary],
) -> Option<CountyComparison> {
    if selected.len() < 2 {
        return None;
    }

    let years: Vec<i32> = counties
        .iter()
        .filter(|c| selected.contains(&c.county_state))
        .map(|c| c.year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let index: BTreeMap<(&str, i32), &CountyYearSummary> = counties
        .iter()
        .map(|c| ((c.county_state.as_str(), c.year), c))
        .collect();

    let rows = years
        .iter()
        .map(|&year| ComparisonRow {
            year,
            counties: selected
                .iter()
                .map(|name| {
                    index
                        .get(&(name.as_str(), year))
                        .map(|c| (*c).clone())
                        .unwrap_or_else(|| CountyYearSummary::empty(name, year))
                })
                .collect(),
        })
        .collect();

    let in_selection: Vec<CountyYearSummary> = counties
        .iter()
        .filter(|c| selected.contains(&c.county_state))
        .cloned()
        .collect();
    let combined = combine_years(&in_selection, banks, &years);

    Some(CountyComparison {
        counties: selected.to_vec(),
        years,
        rows,
        combined,
    })
}

/// A bank's community shares next to its county's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankBenchmark {
    pub county_state: String,
    pub year: i32,
    pub bank_name: String,
    pub total_branches: u64,
    pub lmi_pct: f64,
    pub county_lmi_pct: f64,
    /// Bank minus county, in percentage points.
    pub lmi_gap_points: f64,
    pub minority_pct: f64,
    pub county_minority_pct: f64,
    /// Bank minus county, in percentage points.
    pub minority_gap_points: f64,
}

/// Benchmarks for every bank in `year`.
pub fn benchmarks(
    banks: &[BankYearSummary],
    counties: &[CountyYearSummary],
    year: i32,
) -> Vec<BankBenchmark> {
    banks
        .iter()
        .filter(|b| b.year == year)
        .filter_map(|bank| {
            let county = counties
                .iter()
                .find(|c| c.county_state == bank.county_state && c.year == year)?;
            Some(BankBenchmark {
                county_state: bank.county_state.clone(),
                year,
                bank_name: bank.bank_name.clone(),
                total_branches: bank.total_branches,
                lmi_pct: bank.lmi_pct,
                county_lmi_pct: county.lmi_pct,
                lmi_gap_points: percentage_points(bank.lmi_pct, county.lmi_pct),
                minority_pct: bank.minority_pct,
                county_minority_pct: county.minority_pct,
                minority_gap_points: percentage_points(bank.minority_pct, county.minority_pct),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::models::BranchRecord;

    const COOK: &str = "Cook County, Illinois";
    const QUEENS: &str = "Queens County, New York";

    fn record(bank: &str, county: &str, year: i32, total: u64, lmi: u64) -> BranchRecord {
        BranchRecord {
            bank_name: bank.to_string(),
            year,
            county_state: county.to_string(),
            geography_id: String::new(),
            total_branches: total,
            lmi_branches: lmi,
            minority_branches: 0,
        }
    }

    #[test]
    fn test_single_county_has_no_comparison() {
        let aggregates = aggregate(&[record("Bank A", COOK, 2021, 3, 1)]);
        assert!(compare_counties(&[COOK.to_string()], &aggregates.counties, &aggregates.banks).is_none());
    }

    #[test]
    fn test_missing_county_year_is_zero_filled() {
        let aggregates = aggregate(&[
            record("Bank A", COOK, 2020, 4, 1),
            record("Bank A", COOK, 2021, 6, 3),
            record("Bank B", QUEENS, 2021, 2, 2),
        ]);
        let selected = vec![COOK.to_string(), QUEENS.to_string()];
        let comparison = compare_counties(&selected, &aggregates.counties, &aggregates.banks).unwrap();

        assert_eq!(comparison.years, vec![2020, 2021]);
        assert_eq!(comparison.rows.len(), 2);
        assert!(comparison.rows.iter().all(|r| r.counties.len() == 2));

        let queens_2020 = &comparison.rows[0].counties[1];
        assert_eq!(queens_2020.county_state, QUEENS);
        assert_eq!(queens_2020.total_branches, 0);

        let combined_2021 = &comparison.combined[1];
        assert_eq!(combined_2021.total_branches, 8);
        assert_eq!(combined_2021.county_count, 2);
        assert_eq!(combined_2021.bank_count, 2);
        assert_eq!(combined_2021.lmi_pct, 5.0 / 8.0);
    }

    #[test]
    fn test_combined_counts_distinct_banks() {
        let aggregates = aggregate(&[
            record("Bank A", COOK, 2021, 1, 0),
            record("Bank A", QUEENS, 2021, 1, 0),
        ]);
        let combined = combine_years(&aggregates.counties, &aggregates.banks, &[2021, 2022]);
        assert_eq!(combined[0].bank_count, 1);
        assert_eq!(combined[0].total_branches, 2);
        assert_eq!(combined[1].total_branches, 0);
        assert_eq!(combined[1].lmi_pct, 0.0);
    }

    #[test]
    fn test_benchmarks_against_county() {
        let aggregates = aggregate(&[
            record("Bank A", COOK, 2021, 4, 2),
            record("Bank B", COOK, 2021, 4, 0),
        ]);
        let result = benchmarks(&aggregates.banks, &aggregates.counties, 2021);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].bank_name, "Bank A");
        assert_eq!(result[0].county_lmi_pct, 0.25);
        assert_eq!(result[0].lmi_gap_points, 25.0);
        assert_eq!(result[1].lmi_gap_points, -25.0);
    }
}
