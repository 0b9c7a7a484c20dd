//! Instruction templates for each narrative section.

use crate::narrative::NarrativeRequest;
use crate::report::model::NarrativeSection;

/// System prompt shared by every section.
pub const SYSTEM_PROMPT: &str = r#"You are a banking analyst writing sections of a report on bank branch networks.
Write plain prose grounded only in the statistics you are given.
Do not invent numbers, banks, or counties that are not in the data."#;

/// Tract definitions included in every instruction.
pub const DEFINITIONS: &str = r#"IMPORTANT DEFINITIONS:
- LMICT = Low-to-Moderate Income Census Tracts (areas with median family income below 80% of area median)
- MMCT = Majority-Minority Census Tracts (areas where minority populations represent more than 50% of total population)
- LMI/MMCT = Branches serving both low-to-moderate income and majority-minority communities"#;

/// Instruction for one section.
pub fn instruction(section: NarrativeSection) -> &'static str {
    match section {
        NarrativeSection::ExecutiveSummary => {
            r#"Write a concise executive summary of the branch analysis.

Focus on:
- Key trends in branch counts
- Market concentration among major banks
- MMCT percentage changes around 2022 (2020 census effect)
- 2-3 paragraphs maximum

Describe observable patterns without suggesting underlying causes."#
        }
        NarrativeSection::KeyFindings => {
            r#"List 3-5 key findings from the analysis.

Focus on:
- Most significant trends and patterns
- MMCT changes around 2022 (2020 census effect)
- Format as bullet points starting with "•"

Present factual patterns without speculating about strategic implications."#
        }
        NarrativeSection::Trends => {
            r#"Analyze overall branch trends.

Focus on:
- Overall branch count trends and year-over-year changes
- Three categories: LMICT, MMCT, and LMI/MMCT
- MMCT percentage changes around 2022 (2020 census effect)
- 2-3 paragraphs maximum

Describe what the data demonstrates without attributing intent."#
        }
        NarrativeSection::BankStrategy => {
            r#"Analyze market concentration among the listed banks.

Focus on:
- Market concentration patterns among major banks
- Branch growth or decline of the leading banks
- Differences in serving LMICT and MMCT communities
- 2-3 paragraphs maximum

Report measurable patterns without speculating about bank strategies."#
        }
        NarrativeSection::CommunityImpact => {
            r#"Analyze community banking patterns.

Focus on:
- How banks serve different community types (LMICT, MMCT, LMI/MMCT)
- Bank shares compared to county averages
- 2020 census impact on MMCT designations (effective 2022)
- 2-3 paragraphs maximum

Describe banking access patterns without inferring underlying causes."#
        }
        NarrativeSection::Conclusion => {
            r#"Write the conclusion of the report.

Focus on:
- The key data patterns across the period
- The three community categories (LMICT, MMCT, LMI/MMCT)
- Observable trends and their measurable effects
- 2-3 paragraphs maximum

Synthesize key data insights without making policy suggestions."#
        }
    }
}

/// Full user prompt for a request.
pub fn render_prompt(request: &NarrativeRequest) -> String {
    format!(
        "Section: {}\n\n{}\n\n{}\n\nData:\n{}\n",
        request.section.title(),
        request.instruction,
        DEFINITIONS,
        request.digest
    )
}
