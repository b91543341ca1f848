// Text and JSON renditions of a report.

use tabled::{settings::Style, Table, Tabled};

use crate::survey::dashboards::*;
use crate::survey::*;

#[derive(Tabled, Clone)]
struct HeadlineRow {
    #[tabled(rename = "Indicator")]
    indicator: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn headline_row<T: ToString>(indicator: &'static str, value: Option<T>) -> HeadlineRow {
    HeadlineRow {
        indicator,
        value: value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
    }
}

/// A markdown table, or a placeholder when there is nothing to show.
fn markdown_table<T: Tabled + Clone>(rows: &[T]) -> String {
    if rows.is_empty() {
        return "(no rows)\n".to_string();
    }
    format!("{}\n", Table::new(rows.to_vec()).with(Style::markdown()))
}

fn section<T: Tabled + Clone>(out: &mut String, title: &str, rows: &[T]) {
    out.push_str(&format!("\n## {}\n\n", title));
    out.push_str(&markdown_table(rows));
}

fn infrastructure_text(r: &InfrastructureReport) -> String {
    let h = &r.headline;
    let mut out = String::from("# Infrastructure survey\n");
    let headline = vec![
        headline_row("interviews", Some(h.interviews)),
        headline_row("zones", h.zones),
        headline_row("sewage coverage (%)", h.sewage_coverage_pct),
        headline_row("vs national coverage (pp)", h.sewage_delta_vs_national),
        headline_row("homes without bathroom", Some(h.homes_without_bathroom)),
        headline_row("homes without bathroom (%)", h.homes_without_bathroom_pct),
        headline_row("mean vulnerability", h.mean_vulnerability),
    ];
    section(&mut out, "Headline", &headline);
    out.push_str(&format!("\n{} row(s) selected\n", r.selected_rows));
    section(&mut out, "Service coverage", &r.service_coverage);
    if let Some(rows) = &r.coverage_by_zone {
        section(&mut out, "Coverage by zone", rows);
    }
    for d in [&r.education, &r.occupation].into_iter().flatten() {
        section(&mut out, &d.title, &d.rows);
    }
    if let Some(rows) = &r.priority_neighborhoods {
        section(&mut out, "Priority neighborhoods", rows);
    }
    out
}

fn energy_text(r: &EnergyReport) -> String {
    let h = &r.headline;
    let mut out = String::from("# Energy survey\n");
    let headline = vec![
        headline_row("respondents", Some(h.respondents)),
        headline_row("mean satisfaction", h.mean_satisfaction),
        headline_row("vs neutral", h.satisfaction_delta_vs_neutral),
        headline_row("mean per capita income", h.mean_per_capita_income),
        headline_row("mean commitment (%)", h.mean_commitment_pct),
        headline_row("vs poverty threshold (pp)", h.commitment_delta_vs_threshold),
        headline_row("energy poor", Some(h.energy_poor)),
        headline_row("energy poor (%)", h.energy_poor_pct),
        headline_row("median income", h.median_income),
    ];
    section(&mut out, "Headline", &headline);
    for d in r.distributions.iter() {
        section(&mut out, &d.title, &d.rows);
    }
    for m in r.means.iter() {
        section(&mut out, &m.title, &m.rows);
    }
    section(&mut out, "Energy poverty", &r.poverty_split);
    section(&mut out, "Highest commitment", &r.extreme_cases);
    section(&mut out, "Quality ratings", &r.correlations);
    out
}

pub fn report_text(report: &Report) -> String {
    match report {
        Report::Infrastructure(r) => infrastructure_text(r),
        Report::Energy(r) => energy_text(r),
    }
}

pub fn print_report(report: &Report) {
    println!("{}", report_text(report));
}

pub fn report_json(report: &Report) -> SurveyResult<String> {
    serde_json::to_string_pretty(report).context(SerializingReportSnafu {})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_report() -> Report {
        Report::Energy(EnergyReport {
            headline: EnergyHeadline {
                respondents: 2,
                mean_satisfaction: Some(7.5),
                satisfaction_delta_vs_neutral: Some(2.5),
                mean_per_capita_income: None,
                mean_commitment_pct: Some(12.0),
                commitment_delta_vs_threshold: Some(2.0),
                energy_poor: 1,
                energy_poor_pct: Some(50.0),
                median_income: Some(900.0),
            },
            distributions: vec![Distribution {
                title: "state".to_string(),
                rows: vec![CountRow {
                    answer: "SP".to_string(),
                    count: 2,
                }],
            }],
            means: vec![],
            poverty_split: vec![],
            extreme_cases: vec![],
            correlations: vec![],
        })
    }

    #[test]
    fn text_has_markdown_tables() {
        let text = report_text(&small_report());
        assert!(text.starts_with("# Energy survey"));
        assert!(text.contains("## state"));
        assert!(text.contains("| SP "));
        let line = text
            .lines()
            .find(|l| l.contains("mean per capita income"))
            .unwrap();
        assert!(line.contains("| -"));
        assert!(text.contains("(no rows)"));
    }

    #[test]
    fn json_is_tagged_with_the_survey() {
        let js: serde_json::Value = serde_json::from_str(&report_json(&small_report()).unwrap()).unwrap();
        assert_eq!(js["survey"], "energy");
        assert_eq!(js["headline"]["energyPoor"], 1);
        assert!(js["headline"]["meanPerCapitaIncome"].is_null());
    }
}
