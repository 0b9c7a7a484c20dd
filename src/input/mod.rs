//! Input discovery and decoding.
//!
//! Query results arrive as files: a single `.csv` or `.json` file, or a
//! directory walked recursively for such files. Rows are then grouped
//! into one [`QueryResult`] per selected (county, year) pair.

use crate::models::{QueryResult, RawBranchRow, Selection};
use anyhow::{bail, Context, Result};
use chrono::Datelike;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Earliest year accepted on the command line.
pub const MIN_YEAR: i32 = 2000;

/// Years selected by `--years all`.
pub const ALL_YEARS: std::ops::RangeInclusive<i32> = 2017..=2024;

/// Extensions recognised as input files.
const EXTENSIONS: [&str; 2] = ["csv", "json"];

/// Rows decoded from the input files.
#[derive(Debug, Clone, Default)]
pub struct LoadedRows {
    pub rows: Vec<RawBranchRow>,
    /// Files that contributed rows.
    pub files: Vec<PathBuf>,
    /// CSV records that could not be decoded at all.
    pub undecodable: usize,
}

/// A JSON input file holds either bare rows or grouped query results.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Rows(Vec<RawBranchRow>),
    Results(Vec<QueryResult>),
}

/// Find input files under `path`, sorted by path.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Input path does not exist: {}", path.display());
    }

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str().unwrap_or("")))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_input_extension(e.path()))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    Ok(files)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn has_input_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load every row from a file or directory.
pub fn load(path: &Path) -> Result<LoadedRows> {
    let files = discover(path)?;
    if files.is_empty() {
        bail!("No .csv or .json files found in {}", path.display());
    }

    let mut loaded = LoadedRows::default();

    for file in files {
        let before = loaded.rows.len();
        match file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => loaded.rows.extend(read_json(&file)?),
            _ => {
                let (rows, undecodable) = read_csv(&file)?;
                loaded.rows.extend(rows);
                loaded.undecodable += undecodable;
            }
        }
        debug!("Read {} rows from {}", loaded.rows.len() - before, file.display());
        loaded.files.push(file);
    }

    Ok(loaded)
}

/// Decode a CSV file with a header row.
///
/// Records that do not decode are logged and counted, not fatal.
pub fn read_csv(path: &Path) -> Result<(Vec<RawBranchRow>, usize)> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    let mut undecodable = 0;

    for (line, record) in reader.deserialize::<RawBranchRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!("Skipping line {} of {}: {}", line + 2, path.display(), e);
                undecodable += 1;
            }
        }
    }

    Ok((rows, undecodable))
}

/// Decode a JSON file of rows or of grouped query results.
pub fn read_json(path: &Path) -> Result<Vec<RawBranchRow>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let input: JsonInput = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;

    Ok(match input {
        JsonInput::Rows(rows) => rows,
        JsonInput::Results(results) => results.into_iter().flat_map(|r| r.rows).collect(),
    })
}

/// Rows grouped by selected pair.
#[derive(Debug, Clone, Default)]
pub struct GroupedRows {
    /// One result per selected pair, in selection order.
    pub results: Vec<QueryResult>,
    /// Rows outside the selection.
    pub skipped: usize,
}

/// Group rows into one query result per selected (county, year) pair.
///
/// Pairs without rows get an empty result.
pub fn group_by_selection(selection: &Selection, rows: Vec<RawBranchRow>) -> GroupedRows {
    let mut buckets: BTreeMap<(String, i32), Vec<RawBranchRow>> = selection
        .pairs()
        .into_iter()
        .map(|pair| (pair, Vec::new()))
        .collect();

    let mut skipped = 0;
    for row in rows {
        let key = (row.county_state.trim().to_string(), row.year);
        match buckets.get_mut(&key) {
            Some(bucket) => bucket.push(row),
            None => {
                debug!("Row for {} {} is outside the selection", key.0, key.1);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} rows outside the selected counties and years", skipped);
    }

    let results = selection
        .pairs()
        .into_iter()
        .map(|(county_state, year)| {
            let rows = buckets
                .remove(&(county_state.clone(), year))
                .unwrap_or_default();
            QueryResult {
                county_state,
                year,
                rows,
            }
        })
        .collect();

    GroupedRows { results, skipped }
}

/// Selection covering every county and year present in the rows.
pub fn derive_selection(rows: &[RawBranchRow]) -> Selection {
    Selection::new(
        rows.iter().map(|r| r.county_state.clone()).collect(),
        rows.iter().map(|r| r.year).collect(),
    )
}

/// Parse `--years`: `all` or a comma-separated list.
pub fn parse_years(values: &[String]) -> Result<Vec<i32>> {
    let current = chrono::Utc::now().year();
    let mut years = Vec::new();

    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value.eq_ignore_ascii_case("all") {
            years.extend(ALL_YEARS);
            continue;
        }

        let year: i32 = value
            .parse()
            .with_context(|| format!("Invalid year: {}", value))?;
        if !(MIN_YEAR..=current).contains(&year) {
            bail!("Year {} is outside {}-{}", year, MIN_YEAR, current);
        }
        years.push(year);
    }

    years.sort_unstable();
    years.dedup();
    Ok(years)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vintage;
    use std::io::Write;
    use tempfile::TempDir;

    const HEADER: &str = "bank_name,year,geoid5,county_state,total_branches,lmict,mmct\n";

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn row(county: &str, year: i32) -> RawBranchRow {
        RawBranchRow {
            bank_name: "Bank A".to_string(),
            year,
            geography_id: "17031".to_string(),
            county_state: county.to_string(),
            total_branches: 3,
            lmi_branches: 1,
            minority_branches: 1,
            vintage: Vintage::Current,
        }
    }

    #[test]
    fn test_read_csv_with_source_column_names() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "cook.csv",
            &format!(
                "{}Bank A,2021,17031,\"Cook County, Illinois\",10,2,3\n",
                HEADER
            ),
        );

        let (rows, undecodable) = read_csv(&path).unwrap();
        assert_eq!(undecodable, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].county_state, "Cook County, Illinois");
        assert_eq!(rows[0].lmi_branches, 2);
        assert_eq!(rows[0].minority_branches, 3);
        assert_eq!(rows[0].vintage, Vintage::Current);
    }

    #[test]
    fn test_bad_csv_record_is_counted() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "bad.csv",
            &format!(
                "{}Bank A,2021,17031,\"Cook County, Illinois\",ten,2,3\nBank B,2021,17031,\"Cook County, Illinois\",4,1,1\n",
                HEADER
            ),
        );

        let (rows, undecodable) = read_csv(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(undecodable, 1);
    }

    #[test]
    fn test_read_json_grouped_results() {
        let dir = TempDir::new().unwrap();
        let results = vec![QueryResult {
            county_state: "Cook County, Illinois".to_string(),
            year: 2021,
            rows: vec![row("Cook County, Illinois", 2021)],
        }];
        let path = write_file(
            dir.path(),
            "results.json",
            &serde_json::to_string(&results).unwrap(),
        );

        let rows = read_json(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bank_name, "Bank A");
    }

    #[test]
    fn test_discover_walks_directories() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.csv", HEADER);
        write_file(dir.path(), "nested/a.json", "[]");
        write_file(dir.path(), "notes.txt", "ignored");
        write_file(dir.path(), ".hidden/c.csv", HEADER);

        let files = discover(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names.len(), 2);
        assert!(names.contains(&"b.csv".to_string()));
        assert!(names.iter().any(|n| n.ends_with("a.json")));
    }

    #[test]
    fn test_load_empty_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load(dir.path()).is_err());
        assert!(load(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_group_by_selection() {
        let cook = "Cook County, Illinois";
        let selection = Selection::new(vec![cook.to_string()], vec![2020, 2021]);
        let rows = vec![row(cook, 2021), row(cook, 2019), row("Queens County, New York", 2021)];

        let grouped = group_by_selection(&selection, rows);

        assert_eq!(grouped.skipped, 2);
        assert_eq!(grouped.results.len(), 2);
        assert_eq!(grouped.results[0].year, 2020);
        assert!(grouped.results[0].rows.is_empty());
        assert_eq!(grouped.results[1].rows.len(), 1);
    }

    #[test]
    fn test_derive_selection() {
        let rows = vec![
            row("Queens County, New York", 2021),
            row("Cook County, Illinois", 2020),
            row("Cook County, Illinois", 2021),
        ];
        let selection = derive_selection(&rows);
        assert_eq!(
            selection.counties,
            vec!["Cook County, Illinois", "Queens County, New York"]
        );
        assert_eq!(selection.years, vec![2020, 2021]);
    }

    #[test]
    fn test_parse_years() {
        let years = parse_years(&["2021".to_string(), " 2019 ".to_string(), "2021".to_string()]).unwrap();
        assert_eq!(years, vec![2019, 2021]);

        let all = parse_years(&["all".to_string()]).unwrap();
        assert_eq!(all.first(), Some(&2017));
        assert_eq!(all.last(), Some(&2024));

        assert!(parse_years(&["1999".to_string()]).is_err());
        assert!(parse_years(&["next".to_string()]).is_err());
    }
}
