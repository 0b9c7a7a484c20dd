//! Record normalization.
//!
//! Validates raw rows and folds them into one [`BranchRecord`] per
//! (bank, county, year). Bad rows are logged, counted and skipped so a
//! single malformed row never aborts a run.

use crate::error::DataIntegrityError;
use crate::models::{BranchRecord, QueryResult, RawBranchRow, RecordKey, Vintage};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A row excluded from the canonical record set.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// County of the query result the row came from.
    pub county_state: String,
    /// Year of the query result the row came from.
    pub year: i32,
    /// Position of the row within its query result.
    pub index: usize,
    pub error: DataIntegrityError,
}

/// Output of normalization.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRecords {
    /// Deduplicated records in canonical (county, year, bank) order.
    pub records: Vec<BranchRecord>,
    /// Rows that failed validation.
    pub rejected: Vec<RejectedRow>,
    /// Number of raw rows inspected.
    pub rows_seen: usize,
    /// Rows folded into an already existing record.
    pub duplicates_merged: usize,
    /// Valid rows that came from the legacy feed.
    pub legacy_rows: usize,
}

impl NormalizedRecords {
    /// Returns true if no record survived normalization.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Validate a single raw row.
pub fn validate_row(row: &RawBranchRow) -> Result<(), DataIntegrityError> {
    if row.bank_name.trim().is_empty() {
        return Err(DataIntegrityError::MissingField("bank_name"));
    }
    if row.county_state.trim().is_empty() {
        return Err(DataIntegrityError::MissingField("county_state"));
    }
    if row.year <= 0 {
        return Err(DataIntegrityError::InvalidYear(row.year));
    }

    let counts = [
        ("total_branches", row.total_branches),
        ("lmi_branches", row.lmi_branches),
        ("minority_branches", row.minority_branches),
    ];
    for (field, value) in counts {
        if value < 0 {
            return Err(DataIntegrityError::NegativeCount { field, value });
        }
    }

    for (field, count) in [
        ("lmi_branches", row.lmi_branches),
        ("minority_branches", row.minority_branches),
    ] {
        if count > row.total_branches {
            return Err(DataIntegrityError::ExceedsTotal {
                field,
                count,
                total: row.total_branches,
            });
        }
    }

    Ok(())
}

/// Normalize every query result into a deduplicated record set.
pub fn normalize(results: &[QueryResult]) -> NormalizedRecords {
    let mut merged: BTreeMap<RecordKey, BranchRecord> = BTreeMap::new();
    let mut output = NormalizedRecords::default();

    for result in results {
        for (index, row) in result.rows.iter().enumerate() {
            output.rows_seen += 1;

            if let Err(error) = check_row(result, row) {
                warn!(
                    "Skipping row {} of {} {}: {}",
                    index, result.county_state, result.year, error
                );
                output.rejected.push(RejectedRow {
                    county_state: result.county_state.clone(),
                    year: result.year,
                    index,
                    error,
                });
                continue;
            }

            if row.vintage == Vintage::Legacy {
                output.legacy_rows += 1;
            }

            let record = to_record(row);
            match merged.get_mut(&record.key()) {
                Some(existing) => {
                    output.duplicates_merged += 1;
                    merge_into(existing, &record);
                }
                None => {
                    merged.insert(record.key(), record);
                }
            }
        }
    }

    output.records = merged.into_values().collect();

    debug!(
        "Normalized {} rows into {} records ({} rejected, {} merged, {} legacy)",
        output.rows_seen,
        output.records.len(),
        output.rejected.len(),
        output.duplicates_merged,
        output.legacy_rows
    );

    output
}

fn check_row(result: &QueryResult, row: &RawBranchRow) -> Result<(), DataIntegrityError> {
    validate_row(row)?;

    if row.county_state.trim() != result.county_state || row.year != result.year {
        return Err(DataIntegrityError::PairMismatch {
            county_state: row.county_state.clone(),
            year: row.year,
            expected: format!("{} {}", result.county_state, result.year),
        });
    }

    Ok(())
}

/// Convert a validated row. Counts are known to be non-negative here.
fn to_record(row: &RawBranchRow) -> BranchRecord {
    BranchRecord {
        bank_name: row.bank_name.trim().to_string(),
        year: row.year,
        county_state: row.county_state.trim().to_string(),
        geography_id: row.geography_id.trim().to_string(),
        total_branches: row.total_branches.unsigned_abs(),
        lmi_branches: row.lmi_branches.unsigned_abs(),
        minority_branches: row.minority_branches.unsigned_abs(),
    }
}

/// Duplicates are summed, never overwritten.
fn merge_into(existing: &mut BranchRecord, other: &BranchRecord) {
    existing.total_branches += other.total_branches;
    existing.lmi_branches += other.lmi_branches;
    existing.minority_branches += other.minority_branches;

    if existing.geography_id.is_empty() {
        existing.geography_id = other.geography_id.clone();
    } else if !other.geography_id.is_empty() && other.geography_id != existing.geography_id {
        debug!(
            "Conflicting geography ids for {} in {}: {} vs {}",
            existing.bank_name, existing.county_state, existing.geography_id, other.geography_id
        );
    }
}
