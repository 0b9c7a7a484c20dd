//! Deterministic section text built purely from report statistics.

use crate::analysis::ratio::{pct_change, to_percent};
use crate::analysis::CombinedYearSummary;
use crate::models::PctChange;
use crate::report::model::{NarrativeSection, ReportModel};

/// Fallback text for a section. Identical models give identical text.
pub fn fallback_text(model: &ReportModel, section: NarrativeSection) -> String {
    let mut sentences = vec![headline(model)];

    match section {
        NarrativeSection::ExecutiveSummary => {
            sentences.extend(latest_totals(model));
            sentences.extend(leaders(model));
        }
        NarrativeSection::KeyFindings => {
            sentences.extend(latest_totals(model));
            sentences.extend(community_changes(model));
            sentences.extend(leaders(model));
        }
        NarrativeSection::Trends => {
            sentences.extend(community_changes(model));
        }
        NarrativeSection::BankStrategy => {
            sentences.extend(leaders(model));
            sentences.extend(growth(model));
        }
        NarrativeSection::CommunityImpact => {
            sentences.extend(latest_totals(model));
            sentences.extend(benchmarks(model));
        }
        NarrativeSection::Conclusion => {
            sentences.extend(community_changes(model));
        }
    }

    sentences.join(" ")
}

fn describe_change(label: &str, change: PctChange, start: u64, end: u64, from: i32, to: i32) -> String {
    match change {
        PctChange::Change(v) => format!(
            "{} changed by {:.2}% from {} to {} between {} and {}.",
            label,
            to_percent(v),
            start,
            end,
            from,
            to
        ),
        PctChange::NewEntrant => format!(
            "{} grew from 0 to {} between {} and {}.",
            label, end, from, to
        ),
        PctChange::FirstObservation => format!("{} stood at {} in {}.", label, end, to),
    }
}

fn headline(model: &ReportModel) -> String {
    match &model.summary.headline {
        Some(net) => describe_change(
            "Total branches",
            net.change,
            net.start_value,
            net.end_value,
            net.start_year,
            net.end_year,
        ),
        None => "No branches were recorded for the selected counties.".to_string(),
    }
}

/// First and last combined years that had reporting counties.
fn observed_span(model: &ReportModel) -> Option<(&CombinedYearSummary, &CombinedYearSummary)> {
    let mut observed = model.summary.overview.iter().filter(|y| y.county_count > 0);
    let first = observed.next()?;
    let last = model.summary.overview.last()?;
    Some((first, last))
}

fn latest_totals(model: &ReportModel) -> Option<String> {
    let latest = model.summary.overview.last()?;
    Some(format!(
        "In {}, {} banks operated {} branches in {}; {:.2}% were in LMI tracts and {:.2}% in majority-minority tracts.",
        latest.year,
        latest.bank_count,
        latest.total_branches,
        model.metadata.counties.join("; "),
        to_percent(latest.lmi_pct),
        to_percent(latest.minority_pct)
    ))
}

fn community_changes(model: &ReportModel) -> Vec<String> {
    let Some((first, last)) = observed_span(model) else {
        return Vec::new();
    };
    if first.year == last.year {
        return Vec::new();
    }

    vec![
        describe_change(
            "LMI tract branches",
            pct_change(first.lmi_branches, last.lmi_branches),
            first.lmi_branches,
            last.lmi_branches,
            first.year,
            last.year,
        ),
        describe_change(
            "Majority-minority tract branches",
            pct_change(first.minority_branches, last.minority_branches),
            first.minority_branches,
            last.minority_branches,
            first.year,
            last.year,
        ),
    ]
}

fn leaders(model: &ReportModel) -> Vec<String> {
    model
        .summary
        .leaders
        .iter()
        .map(|group| {
            let names: Vec<&str> = group.leaders.iter().map(|e| e.bank_name.as_str()).collect();
            format!(
                "In {}, {} held {:.2}% of branches in {}.",
                group.county_state,
                names.join(", "),
                to_percent(group.cumulative_share),
                group.year
            )
        })
        .collect()
}

fn growth(model: &ReportModel) -> Vec<String> {
    model
        .by_bank
        .growth
        .iter()
        .map(|g| {
            format!(
                "{} in {} went from {} to {} branches ({}).",
                g.bank_name, g.county_state, g.first_year_branches, g.last_year_branches, g.pct_change
            )
        })
        .collect()
}

fn benchmarks(model: &ReportModel) -> Option<String> {
    let year = model.latest_year()?;
    let total = model.by_bank.benchmarks.len();
    if total == 0 {
        return None;
    }
    let above = model
        .by_bank
        .benchmarks
        .iter()
        .filter(|b| b.lmi_gap_points > 0.0)
        .count();
    Some(format!(
        "{} of {} banks had a higher share of branches in LMI tracts than their county in {}.",
        above, total, year
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::builder::tests::sample_model;

    #[test]
    fn test_headline_sentence() {
        let model = sample_model();
        let text = fallback_text(&model, NarrativeSection::Trends);
        assert!(
            text.starts_with("Total branches changed by 25.00% from 12 to 15 between 2020 and 2021."),
            "{}",
            text
        );
        assert!(text.contains("LMI tract branches"));
    }

    #[test]
    fn test_every_section_has_text() {
        let model = sample_model();
        for section in NarrativeSection::ALL {
            assert!(!fallback_text(&model, section).is_empty());
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let model = sample_model();
        assert_eq!(
            fallback_text(&model, NarrativeSection::BankStrategy),
            fallback_text(&model, NarrativeSection::BankStrategy)
        );
    }

    #[test]
    fn test_change_wording() {
        assert_eq!(
            describe_change("Total branches", PctChange::NewEntrant, 0, 4, 2020, 2021),
            "Total branches grew from 0 to 4 between 2020 and 2021."
        );
        assert_eq!(
            describe_change("Total branches", PctChange::Change(-1.0), 8, 0, 2020, 2021),
            "Total branches changed by -100.00% from 8 to 0 between 2020 and 2021."
        );
    }

    #[test]
    fn test_leaders_sentence() {
        let model = sample_model();
        let text = fallback_text(&model, NarrativeSection::ExecutiveSummary);
        assert!(text.contains("In Cook County, Illinois, Bank A held 66.67% of branches in 2021."));
    }
}
