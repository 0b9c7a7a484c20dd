//! Analysis modules.
//!
//! Pure, side-effect free stages that turn raw rows into summaries,
//! trends, rankings and comparisons.

pub mod aggregator;
pub mod compare;
pub mod normalize;
pub mod ranking;
pub mod ratio;
pub mod trends;

pub use aggregator::{aggregate, fill_county_years, Aggregates};
pub use compare::{benchmarks, combine_years, compare_counties, BankBenchmark, CombinedYearSummary, CountyComparison};
pub use normalize::{normalize, NormalizedRecords};
pub use ranking::{concentration_leaders, partition, rank_all, ConcentrationLeaders};
pub use trends::{bank_growth, bank_trends, county_trends, year_axis, BankGrowth};
