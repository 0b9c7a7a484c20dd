//! Spreadsheet export.
//!
//! The workbook has a fixed sheet order and fixed columns per sheet, so
//! every report has the same layout whatever counties or years were
//! selected. The sheets are saved as a single `<stem>.xlsx` workbook.
//! Missing counts are written as 0 and a missing geography ID as
//! `unknown`, so no cell is ever blank.

use crate::analysis::ratio::to_percent;
use crate::error::ExportError;
use crate::models::{PctChange, TrendSeries};
use crate::report::model::ReportModel;
use crate::report::{Artifact, Exporter};
use rust_xlsxwriter::{Format, Worksheet};
use std::collections::BTreeMap;

/// Sheet names in workbook order.
pub const SHEETS: [&str; 5] = ["Summary", "By Bank", "By County", "Trends", "Raw Data"];

/// Label used for combined and county-wide rows.
pub const ALL_COUNTIES: &str = "All Selected Counties";
pub const ALL_BANKS: &str = "All Banks";

/// Geography ID for records whose input carried none.
pub const UNKNOWN_GEOGRAPHY: &str = "unknown";

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(u64),
    Signed(i64),
    /// A fraction, rendered as 0-100 with two decimals.
    Percent(f64),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn write(
        &self,
        worksheet: &mut Worksheet,
        row: u32,
        col: u16,
        percent: &Format,
    ) -> Result<(), ExportError> {
        match self {
            Cell::Text(s) => worksheet.write_string(row, col, s)?,
            Cell::Count(n) => worksheet.write_number(row, col, *n as f64)?,
            Cell::Signed(n) => worksheet.write_number(row, col, *n as f64)?,
            Cell::Percent(f) => {
                worksheet.write_number_with_format(row, col, to_percent(*f), percent)?
            }
        };
        Ok(())
    }
}

/// One sheet with its header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: &'static str, headers: &[&'static str]) -> Self {
        Self {
            name,
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Write header and rows into `worksheet`.
    fn write_to(
        &self,
        worksheet: &mut Worksheet,
        header: &Format,
        percent: &Format,
    ) -> Result<(), ExportError> {
        worksheet.set_name(self.name)?;
        for (col, title) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, header)?;
        }

        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.headers.len() {
                return Err(ExportError::Render {
                    exporter: "spreadsheet",
                    message: format!(
                        "row {} of sheet '{}' has {} cells, expected {}",
                        i,
                        self.name,
                        row.len(),
                        self.headers.len()
                    ),
                });
            }
            for (col, cell) in row.iter().enumerate() {
                cell.write(worksheet, i as u32 + 1, col as u16, percent)?;
            }
        }

        Ok(())
    }
}

/// All sheets of a report, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Encode as an `.xlsx` file, one worksheet per sheet in order.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, ExportError> {
        let mut book = rust_xlsxwriter::Workbook::new();
        let header = Format::new().set_bold();
        let percent = Format::new().set_num_format("0.00");

        for sheet in &self.sheets {
            sheet.write_to(book.add_worksheet(), &header, &percent)?;
        }

        Ok(book.save_to_buffer()?)
    }
}

/// Build the workbook for a report.
pub fn build_workbook(model: &ReportModel) -> Workbook {
    Workbook {
        sheets: vec![
            summary_sheet(model),
            bank_sheet(model),
            county_sheet(model),
            trends_sheet(model),
            raw_sheet(model),
        ],
    }
}

fn summary_sheet(model: &ReportModel) -> Sheet {
    let mut sheet = Sheet::new(
        SHEETS[0],
        &[
            "County",
            "Year",
            "Counties Reporting",
            "Total Branches",
            "Bank Count",
            "LMI Branches",
            "LMI %",
            "Minority Branches",
            "Minority %",
        ],
    );

    for year in &model.summary.overview {
        sheet.push(vec![
            Cell::text(ALL_COUNTIES),
            Cell::Signed(year.year as i64),
            Cell::Count(year.county_count as u64),
            Cell::Count(year.total_branches),
            Cell::Count(year.bank_count as u64),
            Cell::Count(year.lmi_branches),
            Cell::Percent(year.lmi_pct),
            Cell::Count(year.minority_branches),
            Cell::Percent(year.minority_pct),
        ]);
    }

    sheet
}

fn bank_sheet(model: &ReportModel) -> Sheet {
    let mut sheet = Sheet::new(
        SHEETS[1],
        &[
            "County",
            "Year",
            "Bank",
            "Rank",
            "Total Branches",
            "Market Share %",
            "LMI Branches",
            "LMI %",
            "Minority Branches",
            "Minority %",
        ],
    );

    let summaries: BTreeMap<(&str, i32, &str), _> = model
        .by_bank
        .summaries
        .iter()
        .map(|b| ((b.county_state.as_str(), b.year, b.bank_name.as_str()), b))
        .collect();

    for entry in &model.by_bank.rankings {
        let Some(bank) = summaries.get(&(
            entry.county_state.as_str(),
            entry.year,
            entry.bank_name.as_str(),
        )) else {
            continue;
        };
        sheet.push(vec![
            Cell::text(&entry.county_state),
            Cell::Signed(entry.year as i64),
            Cell::text(&entry.bank_name),
            Cell::Count(entry.rank as u64),
            Cell::Count(entry.total_branches),
            Cell::Percent(entry.market_share_pct),
            Cell::Count(bank.lmi_branches),
            Cell::Percent(bank.lmi_pct),
            Cell::Count(bank.minority_branches),
            Cell::Percent(bank.minority_pct),
        ]);
    }

    sheet
}

fn county_sheet(model: &ReportModel) -> Sheet {
    let mut sheet = Sheet::new(
        SHEETS[2],
        &[
            "County",
            "Year",
            "Total Branches",
            "Bank Count",
            "LMI Branches",
            "LMI %",
            "Minority Branches",
            "Minority %",
            "LMI/MMCT Upper Bound %",
        ],
    );

    for county in &model.by_county.summaries {
        sheet.push(vec![
            Cell::text(&county.county_state),
            Cell::Signed(county.year as i64),
            Cell::Count(county.total_branches),
            Cell::Count(county.bank_count as u64),
            Cell::Count(county.lmi_branches),
            Cell::Percent(county.lmi_pct),
            Cell::Count(county.minority_branches),
            Cell::Percent(county.minority_pct),
            Cell::Percent(county.overlap_upper_bound()),
        ]);
    }

    sheet
}

fn trend_rows(sheet: &mut Sheet, series: &TrendSeries) {
    let bank = series.entity.bank_name().unwrap_or(ALL_BANKS);

    for point in &series.points {
        let (change, status) = match point.pct_change {
            PctChange::Change(v) => (v, "change"),
            other => (0.0, other.label()),
        };
        let status = if point.observed { status } else { "no data" };

        sheet.push(vec![
            Cell::text(series.entity.county_state()),
            Cell::Signed(point.year as i64),
            Cell::text(bank),
            Cell::text(series.metric.to_string()),
            Cell::Count(point.value),
            Cell::Count(point.prior_year_value.unwrap_or(0)),
            Cell::Percent(change),
            Cell::text(status),
        ]);
    }
}

fn trends_sheet(model: &ReportModel) -> Sheet {
    let mut sheet = Sheet::new(
        SHEETS[3],
        &[
            "County",
            "Year",
            "Bank",
            "Metric",
            "Value",
            "Prior Year Value",
            "Change %",
            "Change Status",
        ],
    );

    for series in model.trends.counties.iter().chain(model.trends.banks.iter()) {
        trend_rows(&mut sheet, series);
    }

    sheet
}

fn raw_sheet(model: &ReportModel) -> Sheet {
    let mut sheet = Sheet::new(
        SHEETS[4],
        &[
            "County",
            "Year",
            "Bank",
            "Geography ID",
            "Total Branches",
            "LMI Branches",
            "Minority Branches",
        ],
    );

    for record in &model.raw_data {
        let geography_id = if record.geography_id.is_empty() {
            UNKNOWN_GEOGRAPHY
        } else {
            record.geography_id.as_str()
        };
        sheet.push(vec![
            Cell::text(&record.county_state),
            Cell::Signed(record.year as i64),
            Cell::text(&record.bank_name),
            Cell::text(geography_id),
            Cell::Count(record.total_branches),
            Cell::Count(record.lmi_branches),
            Cell::Count(record.minority_branches),
        ]);
    }

    sheet
}

pub struct SpreadsheetExporter;

impl Exporter for SpreadsheetExporter {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn render(&self, model: &ReportModel, file_stem: &str) -> Result<Vec<Artifact>, ExportError> {
        let bytes = build_workbook(model).to_xlsx()?;
        Ok(vec![Artifact::new(format!("{}.xlsx", file_stem), bytes)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::normalize;
    use crate::analysis::ratio::share;
    use crate::models::Selection;
    use crate::report::builder::tests::{sample_model, sample_results, sample_selection, COOK};
    use crate::report::builder::{analyze, ReportBuilder};
    use chrono::Utc;

    fn sheet<'a>(workbook: &'a Workbook, name: &str) -> &'a Sheet {
        workbook.sheets.iter().find(|s| s.name == name).unwrap()
    }

    fn find_row<'a>(sheet: &'a Sheet, prefix: &[Cell]) -> &'a [Cell] {
        sheet
            .rows
            .iter()
            .find(|row| row.starts_with(prefix))
            .map(|row| row.as_slice())
            .unwrap()
    }

    #[test]
    fn test_sheet_order_and_names() {
        let workbook = build_workbook(&sample_model());
        let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name).collect();
        assert_eq!(names, SHEETS);
    }

    #[test]
    fn test_columns_do_not_depend_on_selection() {
        let single = build_workbook(&sample_model());

        let selection = Selection::new(
            vec![COOK.to_string(), "Queens County, New York".to_string()],
            vec![2019, 2020, 2021],
        );
        let parts = analyze(&selection, normalize(&sample_results()), 0.5, |_| {});
        let multi = build_workbook(&ReportBuilder::new("run-2", Utc::now()).build(parts).unwrap());

        for (a, b) in single.sheets.iter().zip(multi.sheets.iter()) {
            assert_eq!(a.headers, b.headers);
        }
    }

    #[test]
    fn test_bank_rows_join_rankings_and_summaries() {
        let workbook = build_workbook(&sample_model());
        let row = find_row(
            sheet(&workbook, "By Bank"),
            &[Cell::text(COOK), Cell::Signed(2021), Cell::text("Bank A")],
        );
        assert_eq!(row[3], Cell::Count(1));
        assert_eq!(row[5], Cell::Percent(share(10, 15)));
        assert_eq!(to_percent(share(10, 15)), 66.67);
        assert_eq!(row[7], Cell::Percent(0.2));
    }

    #[test]
    fn test_missing_values_are_zero_not_blank() {
        let selection = Selection::new(
            vec![COOK.to_string(), "Queens County, New York".to_string()],
            vec![2020, 2021],
        );
        let parts = analyze(&selection, normalize(&sample_results()), 0.5, |_| {});
        let model = ReportBuilder::new("run-3", Utc::now()).build(parts).unwrap();
        let workbook = build_workbook(&model);

        let queens = find_row(
            sheet(&workbook, "By County"),
            &[Cell::text("Queens County, New York"), Cell::Signed(2021)],
        );
        assert_eq!(
            &queens[2..],
            &[
                Cell::Count(0),
                Cell::Count(0),
                Cell::Count(0),
                Cell::Percent(0.0),
                Cell::Count(0),
                Cell::Percent(0.0),
                Cell::Percent(0.0),
            ]
        );

        for sheet in &workbook.sheets {
            for row in &sheet.rows {
                assert_eq!(row.len(), sheet.headers.len());
                assert!(
                    !row.iter().any(|c| matches!(c, Cell::Text(s) if s.is_empty())),
                    "blank cell in {}",
                    sheet.name
                );
            }
        }
    }

    #[test]
    fn test_missing_geography_id_is_not_blank() {
        let mut results = sample_results();
        for row in &mut results[1].rows {
            row.geography_id = String::new();
        }

        let parts = analyze(&sample_selection(), normalize(&results), 0.5, |_| {});
        let model = ReportBuilder::new("run-4", Utc::now()).build(parts).unwrap();
        let workbook = build_workbook(&model);
        let raw = sheet(&workbook, "Raw Data");

        let bank_b = find_row(raw, &[Cell::text(COOK), Cell::Signed(2021), Cell::text("Bank B")]);
        assert_eq!(bank_b[3], Cell::text(UNKNOWN_GEOGRAPHY));
        let bank_a = find_row(raw, &[Cell::text(COOK), Cell::Signed(2021), Cell::text("Bank A")]);
        assert_eq!(bank_a[3], Cell::text(UNKNOWN_GEOGRAPHY));
        let bank_a_2020 = find_row(raw, &[Cell::text(COOK), Cell::Signed(2020), Cell::text("Bank A")]);
        assert_eq!(bank_a_2020[3], Cell::text("17031"));
    }

    #[test]
    fn test_trend_rows_label_county_series() {
        let workbook = build_workbook(&sample_model());
        let trends = sheet(&workbook, "Trends");

        let first = &trends.rows[0];
        assert_eq!(first[2], Cell::text(ALL_BANKS));
        assert_eq!(first[7], Cell::text("first observation"));
        assert_eq!(first[5], Cell::Count(0));
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let mut sheet = Sheet::new("Summary", &["County", "Year"]);
        sheet.push(vec![Cell::text("Cook County, Illinois")]);
        let workbook = Workbook { sheets: vec![sheet] };
        assert!(matches!(workbook.to_xlsx(), Err(ExportError::Render { .. })));
    }

    #[test]
    fn test_renders_single_workbook_file() {
        let artifacts = SpreadsheetExporter.render(&sample_model(), "cook").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].relative_path.to_str(), Some("cook.xlsx"));
        // xlsx is a zip container
        assert!(artifacts[0].bytes.starts_with(b"PK"));
    }
}
