//! Market share rankings.
//!
//! Banks are ranked within each (county, year) by branch count, largest
//! first. Ties are broken by bank name using a case-insensitive ordinal
//! comparison, so every bank gets its own rank and the output does not
//! depend on input order.

use crate::analysis::aggregator::group_by_county_year;
use crate::analysis::ratio::share;
use crate::models::{BankYearSummary, CountyYearSummary, RankedEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Case-insensitive ordinal comparison of bank names.
///
/// Falls back to the exact names so that names differing only in case
/// still have a stable order.
pub fn compare_bank_names(a: &str, b: &str) -> Ordering {
    let folded_a = a.chars().flat_map(char::to_lowercase);
    let folded_b = b.chars().flat_map(char::to_lowercase);
    folded_a.cmp(folded_b).then_with(|| a.cmp(b))
}

/// Rank the banks of one county-year.
///
/// Only summaries matching the county's (county_state, year) are ranked.
pub fn rank_county_year(
    county: &CountyYearSummary,
    banks: &[&BankYearSummary],
) -> Vec<RankedEntry> {
    let mut members: Vec<&BankYearSummary> = banks
        .iter()
        .copied()
        .filter(|b| b.county_state == county.county_state && b.year == county.year)
        .collect();

    members.sort_by(|a, b| {
        b.total_branches
            .cmp(&a.total_branches)
            .then_with(|| compare_bank_names(&a.bank_name, &b.bank_name))
    });

    members
        .into_iter()
        .enumerate()
        .map(|(i, bank)| RankedEntry {
            county_state: county.county_state.clone(),
            year: county.year,
            bank_name: bank.bank_name.clone(),
            total_branches: bank.total_branches,
            market_share_pct: share(bank.total_branches, county.total_branches),
            rank: i + 1,
        })
        .collect()
}

/// Rank every county-year, ordered by county, year, rank.
pub fn rank_all(counties: &[CountyYearSummary], banks: &[BankYearSummary]) -> Vec<RankedEntry> {
    let grouped = group_by_county_year(banks);
    let mut ranked = Vec::new();

    for county in counties {
        if let Some(members) = grouped.get(&(county.county_state.clone(), county.year)) {
            ranked.extend(rank_county_year(county, members));
        }
    }

    ranked
}

/// Entries of one county-year, in rank order.
pub fn partition<'a>(entries: &'a [RankedEntry], county_state: &str, year: i32) -> Vec<&'a RankedEntry> {
    let mut members: Vec<&RankedEntry> = entries
        .iter()
        .filter(|e| e.county_state == county_state && e.year == year)
        .collect();
    members.sort_by_key(|e| e.rank);
    members
}

/// The banks that together hold a threshold share of a county's market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationLeaders {
    pub county_state: String,
    pub year: i32,
    /// Threshold as a fraction, e.g. 0.5.
    pub threshold: f64,
    /// Smallest rank prefix whose cumulative share reaches the threshold.
    pub leaders: Vec<RankedEntry>,
    /// Cumulative share of the leaders, in [0, 1].
    pub cumulative_share: f64,
}

/// Smallest prefix of a ranked partition reaching `threshold`.
///
/// Returns `None` for an empty partition. If the threshold cannot be
/// reached (an all-zero county) every bank is a leader.
pub fn concentration_leaders(
    partition: &[&RankedEntry],
    threshold: f64,
) -> Option<ConcentrationLeaders> {
    let first = partition.first()?;
    let mut leaders = Vec::new();
    let mut cumulative = 0.0;

    for entry in partition {
        cumulative += entry.market_share_pct;
        leaders.push((*entry).clone());
        if cumulative >= threshold {
            break;
        }
    }

    Some(ConcentrationLeaders {
        county_state: first.county_state.clone(),
        year: first.year,
        threshold,
        leaders,
        cumulative_share: cumulative.min(1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::analysis::ratio::to_percent;
    use crate::models::BranchRecord;

    const COOK: &str = "Cook County, Illinois";

    fn record(bank: &str, year: i32, total: u64) -> BranchRecord {
        BranchRecord {
            bank_name: bank.to_string(),
            year,
            county_state: COOK.to_string(),
            geography_id: String::new(),
            total_branches: total,
            lmi_branches: 0,
            minority_branches: 0,
        }
    }

    fn ranks(records: &[BranchRecord]) -> Vec<RankedEntry> {
        let aggregates = aggregate(records);
        rank_all(&aggregates.counties, &aggregates.banks)
    }

    #[test]
    fn test_two_bank_market_share() {
        let aggregates = aggregate(&[
            BranchRecord {
                lmi_branches: 2,
                minority_branches: 3,
                ..record("Bank A", 2021, 10)
            },
            BranchRecord {
                lmi_branches: 1,
                minority_branches: 1,
                ..record("Bank B", 2021, 5)
            },
        ]);
        assert_eq!(aggregates.counties[0].total_branches, 15);

        let ranked = rank_all(&aggregates.counties, &aggregates.banks);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].bank_name, "Bank A");
        assert_eq!(to_percent(ranked[0].market_share_pct), 66.67);
        assert_eq!(to_percent(ranked[1].market_share_pct), 33.33);
    }

    #[test]
    fn test_ties_break_alphabetically_without_shared_ranks() {
        let ranked = ranks(&[
            record("zeta bank", 2021, 4),
            record("Alpha Bank", 2021, 4),
            record("Mid Bank", 2021, 9),
            record("beta bank", 2021, 4),
        ]);

        let order: Vec<(&str, usize)> = ranked
            .iter()
            .map(|e| (e.bank_name.as_str(), e.rank))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Mid Bank", 1),
                ("Alpha Bank", 2),
                ("beta bank", 3),
                ("zeta bank", 4)
            ]
        );
    }

    #[test]
    fn test_ranking_is_permutation_invariant() {
        let records = vec![
            record("Bank C", 2021, 3),
            record("Bank A", 2021, 3),
            record("Bank B", 2021, 7),
            record("Bank D", 2022, 1),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        assert_eq!(ranks(&records), ranks(&reversed));
    }

    #[test]
    fn test_ranks_are_contiguous_per_partition() {
        let ranked = ranks(&[
            record("Bank A", 2020, 2),
            record("Bank B", 2020, 2),
            record("Bank C", 2020, 0),
            record("Bank A", 2021, 5),
        ]);

        for (year, expected) in [(2020, 3), (2021, 1)] {
            let members = partition(&ranked, COOK, year);
            let got: Vec<usize> = members.iter().map(|e| e.rank).collect();
            assert_eq!(got, (1..=expected).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_zero_county_total_yields_zero_share() {
        let ranked = ranks(&[record("Bank A", 2021, 0), record("Bank B", 2021, 0)]);
        assert!(ranked.iter().all(|e| e.market_share_pct == 0.0));
        assert_eq!(ranked[0].bank_name, "Bank A");
    }

    #[test]
    fn test_case_insensitive_name_comparison() {
        assert_eq!(compare_bank_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_bank_names("BANK", "bank"), Ordering::Less);
        assert_eq!(compare_bank_names("bank", "bank"), Ordering::Equal);
    }

    #[test]
    fn test_concentration_leaders() {
        let ranked = ranks(&[
            record("Bank A", 2021, 4),
            record("Bank B", 2021, 3),
            record("Bank C", 2021, 3),
        ]);
        let members = partition(&ranked, COOK, 2021);

        let leaders = concentration_leaders(&members, 0.5).unwrap();
        let names: Vec<&str> = leaders.leaders.iter().map(|e| e.bank_name.as_str()).collect();
        assert_eq!(names, vec!["Bank A", "Bank B"]);
        assert!((leaders.cumulative_share - 0.7).abs() < 1e-9);

        assert!(concentration_leaders(&[], 0.5).is_none());
    }
}
