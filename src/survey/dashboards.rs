// The two dashboards, computed from an enriched table.

use serde::Serialize;
use survey_metrics::stats::{percent, round_decimals};
use tabled::Tabled;

use crate::survey::config_reader::Settings;
use crate::survey::*;

/// Sewage coverage of the country, in percent.
pub const NATIONAL_SEWAGE_COVERAGE_PCT: f64 = 54.0;
/// The middle of the 1 to 10 satisfaction scale.
pub const NEUTRAL_SATISFACTION: f64 = 5.0;

const SERVICES: [Field; 4] = [
    Field::PipedWater,
    Field::SewageCollection,
    Field::GarbageCollection,
    Field::RegularElectricity,
];

const QUALITY_RATINGS: [Field; 3] = [
    Field::SupplyContinuity,
    Field::VoltageStability,
    Field::RestorationSpeed,
];

fn round2(x: f64) -> f64 {
    round_decimals(x, 2)
}

fn round2_opt(x: Option<f64>) -> Option<f64> {
    x.map(round2)
}

pub(crate) fn display_opt(x: &Option<f64>) -> String {
    match x {
        Some(v) => format!("{}", v),
        None => "-".to_string(),
    }
}

pub(crate) fn display_opt_str(x: &Option<String>) -> String {
    x.clone().unwrap_or_else(|| "-".to_string())
}

/// A section that cannot be computed because a column is absent is left out
/// of the report. Other errors are not expected here and propagate.
fn optional<T>(section: &str, res: Result<T, MetricsError>) -> Result<Option<T>, MetricsError> {
    match res {
        Ok(x) => Ok(Some(x)),
        Err(MetricsError::MissingColumns { columns }) => {
            warn!(
                "section {}: left out, missing column(s): {}",
                section,
                columns.join(", ")
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CountRow {
    #[tabled(rename = "Answer")]
    pub answer: String,
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MeanRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Mean")]
    pub mean: f64,
    #[tabled(rename = "Rows")]
    pub rows: usize,
}

/// A titled table of counts per answer.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Distribution {
    pub title: String,
    pub rows: Vec<CountRow>,
}

/// A titled table of means per group.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GroupMeans {
    pub title: String,
    pub rows: Vec<MeanRow>,
}

fn distribution(
    table: &EnrichedTable,
    title: &str,
    field: Field,
    order: GroupOrder,
    filters: &[RowFilter],
) -> Result<Option<Distribution>, MetricsError> {
    let query = AggregateQuery::counts(field).order(order).filters(filters);
    let res = optional(title, aggregate(table, &query))?;
    Ok(res.map(|groups| Distribution {
        title: title.to_string(),
        rows: groups
            .into_iter()
            .map(|g| CountRow {
                answer: g.group,
                count: g.rows,
            })
            .collect(),
    }))
}

fn group_means(
    table: &EnrichedTable,
    title: &str,
    query: AggregateQuery,
) -> Result<Option<GroupMeans>, MetricsError> {
    let res = optional(title, aggregate(table, &query))?;
    Ok(res.map(|groups| GroupMeans {
        title: title.to_string(),
        rows: groups
            .into_iter()
            .map(|g| MeanRow {
                group: g.group,
                mean: round2(g.value),
                rows: g.rows,
            })
            .collect(),
    }))
}

// ********* Infrastructure **********

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureHeadline {
    pub interviews: usize,
    pub zones: Option<usize>,
    pub sewage_coverage_pct: Option<f64>,
    pub sewage_delta_vs_national: Option<f64>,
    pub homes_without_bathroom: usize,
    pub homes_without_bathroom_pct: Option<f64>,
    pub mean_vulnerability: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRow {
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Coverage (%)")]
    pub coverage_pct: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCoverageRow {
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[tabled(rename = "Piped water (%)", display_with = "display_opt")]
    pub piped_water_pct: Option<f64>,
    #[tabled(rename = "Sewage (%)", display_with = "display_opt")]
    pub sewage_pct: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodRow {
    #[tabled(rename = "Neighborhood")]
    pub neighborhood: String,
    #[tabled(rename = "Vulnerability")]
    pub mean_vulnerability: f64,
    #[tabled(rename = "Bathrooms", display_with = "display_opt")]
    pub mean_bathrooms: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureReport {
    pub headline: InfrastructureHeadline,
    pub selected_rows: usize,
    pub service_coverage: Vec<CoverageRow>,
    pub coverage_by_zone: Option<Vec<ZoneCoverageRow>>,
    pub education: Option<Distribution>,
    pub occupation: Option<Distribution>,
    pub priority_neighborhoods: Option<Vec<NeighborhoodRow>>,
}

fn affirmative_pct(
    table: &EnrichedTable,
    field: Field,
    filters: &[RowFilter],
) -> Result<Option<f64>, MetricsError> {
    let s = summarize(table, Measure::Affirmative(field), filters)?;
    Ok(s.mean.map(|m| round2(m * 100.0)))
}

impl InfrastructureReport {
    pub fn build(table: &EnrichedTable, settings: &Settings) -> Result<Self, MetricsError> {
        let filters = settings.filters.as_slice();

        // The headline describes the whole survey, the sections the selection.
        let interviews = table.len();
        let sewage = optional(
            "sewage coverage",
            affirmative_pct(table, Field::SewageCollection, &[]),
        )?
        .flatten();
        let no_bathroom = count_where(
            table,
            Measure::Derived(DerivedMetric::Bathrooms),
            &[],
            |v| v == 0.0,
        )?;
        let headline = InfrastructureHeadline {
            interviews,
            zones: optional("zones", distinct(table, Field::Zone, &[]))?.map(|z| z.len()),
            sewage_coverage_pct: sewage,
            sewage_delta_vs_national: sewage.map(|s| round2(s - NATIONAL_SEWAGE_COVERAGE_PCT)),
            homes_without_bathroom: no_bathroom,
            homes_without_bathroom_pct: round2_opt(percent(no_bathroom, interviews)),
            mean_vulnerability: round2_opt(
                summarize(
                    table,
                    Measure::Derived(DerivedMetric::VulnerabilityScore),
                    &[],
                )?
                .mean,
            ),
        };
        debug!("InfrastructureReport: headline: {:?}", headline);

        let selected_rows = selected_rows(table, filters)?.len();

        let mut service_coverage: Vec<CoverageRow> = Vec::new();
        for field in SERVICES.iter() {
            let pct = optional(field.name(), affirmative_pct(table, *field, filters))?.flatten();
            if let Some(coverage_pct) = pct {
                service_coverage.push(CoverageRow {
                    service: field.name().to_string(),
                    coverage_pct,
                });
            }
        }

        let coverage_by_zone = optional("coverage by zone", coverage_by_zone(table, filters))?;

        let education = distribution(
            table,
            "education",
            Field::Education,
            GroupOrder::ByValue(SortDirection::Descending),
            filters,
        )?;
        let occupation = distribution(
            table,
            "occupation",
            Field::Occupation,
            GroupOrder::ByValue(SortDirection::Descending),
            filters,
        )?;

        let priority_neighborhoods = optional(
            "priority neighborhoods",
            priority_neighborhoods(table, settings.top_n, filters),
        )?;

        Ok(InfrastructureReport {
            headline,
            selected_rows,
            service_coverage,
            coverage_by_zone,
            education,
            occupation,
            priority_neighborhoods,
        })
    }
}

fn coverage_by_zone(
    table: &EnrichedTable,
    filters: &[RowFilter],
) -> Result<Vec<ZoneCoverageRow>, MetricsError> {
    let by_zone = |field: Field| -> Result<Vec<GroupValue>, MetricsError> {
        let q = AggregateQuery::new(Field::Zone, Measure::Affirmative(field), Reducer::Mean)
            .filters(filters);
        aggregate(table, &q)
    };
    let water = by_zone(Field::PipedWater)?;
    let sewage = by_zone(Field::SewageCollection)?;
    let lookup = |groups: &[GroupValue], zone: &str| -> Option<f64> {
        groups
            .iter()
            .find(|g| g.group == zone)
            .map(|g| round2(g.value * 100.0))
    };
    Ok(distinct(table, Field::Zone, filters)?
        .into_iter()
        .map(|zone| ZoneCoverageRow {
            piped_water_pct: lookup(&water, &zone),
            sewage_pct: lookup(&sewage, &zone),
            zone,
        })
        .collect())
}

fn priority_neighborhoods(
    table: &EnrichedTable,
    n: usize,
    filters: &[RowFilter],
) -> Result<Vec<NeighborhoodRow>, MetricsError> {
    let ranked = top_n_by(
        table,
        Field::Neighborhood,
        Measure::Derived(DerivedMetric::VulnerabilityScore),
        n,
        SortDirection::Descending,
        filters,
    )?;
    let bathrooms = aggregate(
        table,
        &AggregateQuery::new(
            Field::Neighborhood,
            Measure::Derived(DerivedMetric::Bathrooms),
            Reducer::Mean,
        )
        .filters(filters),
    )?;
    Ok(ranked
        .into_iter()
        .map(|g| NeighborhoodRow {
            mean_bathrooms: bathrooms
                .iter()
                .find(|b| b.group == g.group)
                .map(|b| round2(b.value)),
            neighborhood: g.group,
            mean_vulnerability: round2(g.value),
        })
        .collect())
}

// ********* Energy **********

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnergyHeadline {
    pub respondents: usize,
    pub mean_satisfaction: Option<f64>,
    pub satisfaction_delta_vs_neutral: Option<f64>,
    pub mean_per_capita_income: Option<f64>,
    pub mean_commitment_pct: Option<f64>,
    pub commitment_delta_vs_threshold: Option<f64>,
    pub energy_poor: usize,
    pub energy_poor_pct: Option<f64>,
    pub median_income: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtremeCaseRow {
    #[tabled(rename = "State", display_with = "display_opt_str")]
    pub state: Option<String>,
    #[tabled(rename = "Per capita income", display_with = "display_opt")]
    pub per_capita_income: Option<f64>,
    #[tabled(rename = "Commitment (%)")]
    pub commitment_pct: f64,
    #[tabled(rename = "Satisfaction", display_with = "display_opt")]
    pub satisfaction: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRow {
    #[tabled(rename = "Rating")]
    pub rating: String,
    #[tabled(rename = "Correlation with satisfaction", display_with = "display_opt")]
    pub pearson: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnergyReport {
    pub headline: EnergyHeadline,
    pub distributions: Vec<Distribution>,
    pub means: Vec<GroupMeans>,
    pub poverty_split: Vec<CountRow>,
    pub extreme_cases: Vec<ExtremeCaseRow>,
    pub correlations: Vec<CorrelationRow>,
}

impl EnergyReport {
    pub fn build(table: &EnrichedTable, settings: &Settings) -> Result<Self, MetricsError> {
        let filters = settings.filters.as_slice();
        let threshold = settings.options.energy.poverty_threshold_pct;
        let respondents = selected_rows(table, filters)?.len();

        let satisfaction = optional(
            "satisfaction",
            summarize(table, Measure::Numeric(Field::OverallSatisfaction), filters),
        )?
        .and_then(|s| s.mean);
        let commitment = summarize(
            table,
            Measure::Derived(DerivedMetric::CommitmentPct),
            filters,
        )?
        .mean;
        let energy_poor = count_where(
            table,
            Measure::Derived(DerivedMetric::EnergyPoverty),
            filters,
            |v| v > 0.0,
        )?;
        let headline = EnergyHeadline {
            respondents,
            mean_satisfaction: round2_opt(satisfaction),
            satisfaction_delta_vs_neutral: satisfaction.map(|s| round2(s - NEUTRAL_SATISFACTION)),
            mean_per_capita_income: round2_opt(
                summarize(
                    table,
                    Measure::Derived(DerivedMetric::PerCapitaIncome),
                    filters,
                )?
                .mean,
            ),
            mean_commitment_pct: round2_opt(commitment),
            commitment_delta_vs_threshold: commitment.map(|c| round2(c - threshold)),
            energy_poor,
            energy_poor_pct: round2_opt(percent(energy_poor, respondents)),
            median_income: optional(
                "median income",
                summarize(table, Measure::Numeric(Field::MonthlyIncome), filters),
            )?
            .and_then(|s| s.median),
        };
        debug!("EnergyReport: headline: {:?}", headline);

        let by_count = || GroupOrder::ByValue(SortDirection::Descending);
        let income_order = GroupOrder::Canonical(settings.income_band_order.clone());
        let distributions: Vec<Distribution> = vec![
            distribution(table, "gender", Field::Gender, by_count(), filters)?,
            distribution(table, "education", Field::Education, by_count(), filters)?,
            distribution(table, "age band", Field::AgeBand, GroupOrder::Lexical, filters)?,
            distribution(table, "state", Field::State, by_count(), filters)?,
            distribution(
                table,
                "income band",
                Field::IncomeBand,
                income_order.clone(),
                filters,
            )?,
            distribution(
                table,
                "satisfaction score",
                Field::OverallSatisfaction,
                GroupOrder::Numeric,
                filters,
            )?,
        ]
        .into_iter()
        .flatten()
        .collect();

        let mean_of = |group_by: Field, measure: Measure, order: GroupOrder| {
            AggregateQuery::new(group_by, measure, Reducer::Mean)
                .order(order)
                .filters(filters)
        };
        let ascending = || GroupOrder::ByValue(SortDirection::Ascending);
        let commitment_m = Measure::Derived(DerivedMetric::CommitmentPct);
        let satisfaction_m = Measure::Numeric(Field::OverallSatisfaction);
        let means: Vec<GroupMeans> = vec![
            group_means(
                table,
                "commitment by income band",
                mean_of(Field::IncomeBand, commitment_m, income_order.clone()),
            )?,
            group_means(
                table,
                "satisfaction by income band",
                mean_of(Field::IncomeBand, satisfaction_m, income_order),
            )?,
            group_means(
                table,
                "satisfaction by education",
                mean_of(Field::Education, satisfaction_m, ascending()),
            )?,
            group_means(
                table,
                "satisfaction by state",
                mean_of(Field::State, satisfaction_m, ascending()),
            )?,
            group_means(
                table,
                "per capita income by education",
                mean_of(
                    Field::Education,
                    Measure::Derived(DerivedMetric::PerCapitaIncome),
                    ascending(),
                ),
            )?,
        ]
        .into_iter()
        .flatten()
        .collect();

        let poverty_split = vec![
            CountRow {
                answer: "energy poor".to_string(),
                count: energy_poor,
            },
            CountRow {
                answer: "not energy poor".to_string(),
                count: respondents - energy_poor,
            },
        ];

        let extreme_cases = extreme_cases(table, settings.top_n, filters)?;

        let mut correlations: Vec<CorrelationRow> = Vec::new();
        for field in QUALITY_RATINGS.iter() {
            let r = optional(
                field.name(),
                correlation(
                    table,
                    Measure::Numeric(*field),
                    Measure::Numeric(Field::OverallSatisfaction),
                    filters,
                ),
            )?;
            if let Some(pearson) = r {
                correlations.push(CorrelationRow {
                    rating: field.name().to_string(),
                    pearson: pearson.map(|x| round_decimals(x, 3)),
                });
            }
        }

        Ok(EnergyReport {
            headline,
            distributions,
            means,
            poverty_split,
            extreme_cases,
            correlations,
        })
    }
}

fn extreme_cases(
    table: &EnrichedTable,
    n: usize,
    filters: &[RowFilter],
) -> Result<Vec<ExtremeCaseRow>, MetricsError> {
    let rows = top_n_rows(
        table,
        Measure::Derived(DerivedMetric::CommitmentPct),
        n,
        SortDirection::Descending,
        filters,
    )?;
    let text_of = |row: usize, field: Field| -> Option<String> {
        table
            .text(row, field)
            .ok()
            .flatten()
            .map(|s| s.into_owned())
    };
    let satisfaction = if table.has_field(Field::OverallSatisfaction) {
        table.measure_values(Measure::Numeric(Field::OverallSatisfaction))?
    } else {
        vec![None; table.len()]
    };
    Ok(rows
        .into_iter()
        .map(|row| {
            let d = &table.derived()[row];
            ExtremeCaseRow {
                state: text_of(row, Field::State),
                per_capita_income: round2_opt(d.per_capita_income),
                commitment_pct: d.commitment_pct.unwrap_or_default(),
                satisfaction: satisfaction[row],
            }
        })
        .collect())
}

// ********* Report **********

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "survey", rename_all = "camelCase")]
pub enum Report {
    Infrastructure(InfrastructureReport),
    Energy(EnergyReport),
}

impl Report {
    pub fn build(table: &EnrichedTable, settings: &Settings) -> Result<Report, MetricsError> {
        info!("Report::build: {} dashboard", settings.kind.name());
        match settings.kind {
            SurveyKind::Infrastructure => {
                InfrastructureReport::build(table, settings).map(Report::Infrastructure)
            }
            SurveyKind::Energy => EnergyReport::build(table, settings).map(Report::Energy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::config_reader::*;
    use std::path::Path;

    fn settings(json: &str) -> Settings {
        let config: DashboardConfig = serde_json::from_str(json).unwrap();
        let root = format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"));
        validate_config(&config, Some(Path::new(&root))).unwrap()
    }

    fn report(json: &str) -> Report {
        let s = settings(json);
        let table = load_and_enrich(&s.source, &s.schema, &s.options).unwrap();
        Report::build(&table, &s).unwrap()
    }

    #[test]
    fn infrastructure_report() {
        let r = report(r#"{ "survey": "infrastructure", "inputPath": "infrastructure.csv", "topN": 3 }"#);
        let r = match r {
            Report::Infrastructure(r) => r,
            x => panic!("unexpected report {:?}", x),
        };
        assert_eq!(r.headline.interviews, 8);
        assert_eq!(r.headline.zones, Some(3));
        // 4 homes out of 8 have sewage collection.
        assert_eq!(r.headline.sewage_coverage_pct, Some(50.0));
        assert_eq!(r.headline.sewage_delta_vs_national, Some(-4.0));
        assert_eq!(r.headline.homes_without_bathroom, 1);
        assert_eq!(r.headline.homes_without_bathroom_pct, Some(12.5));
        assert_eq!(r.headline.mean_vulnerability, Some(3.25));
        assert_eq!(r.service_coverage.len(), 4);
        assert_eq!(r.service_coverage[0].coverage_pct, 75.0);

        let zones = r.coverage_by_zone.unwrap();
        assert_eq!(zones[0].zone, "Norte");
        assert_eq!(zones[0].piped_water_pct, Some(50.0));
        assert_eq!(zones[0].sewage_pct, Some(0.0));

        let top = r.priority_neighborhoods.unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].neighborhood, "Jardim Esperança");
        assert_eq!(top[0].mean_vulnerability, 6.5);
        assert_eq!(top[0].mean_bathrooms, Some(0.5));
    }

    #[test]
    fn infrastructure_report_with_zone_filter() {
        let r = report(
            r#"{ "survey": "infrastructure", "inputPath": "infrastructure.csv", "filters": { "zone": ["Sul"] } }"#,
        );
        let r = match r {
            Report::Infrastructure(r) => r,
            x => panic!("unexpected report {:?}", x),
        };
        // The headline ignores the selection.
        assert_eq!(r.headline.interviews, 8);
        assert_eq!(r.selected_rows, 2);
        let education = r.education.unwrap();
        assert_eq!(education.rows.len(), 2);
        let top = r.priority_neighborhoods.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].neighborhood, "Vila Nova");
        assert_eq!(top[0].mean_vulnerability, 3.0);
    }

    #[test]
    fn energy_report() {
        let r = report(r#"{ "survey": "energy", "inputPath": "energy.csv", "topN": 2 }"#);
        let r = match r {
            Report::Energy(r) => r,
            x => panic!("unexpected report {:?}", x),
        };
        assert_eq!(r.headline.respondents, 8);
        // 6, 9, 4, 5, 2, 8, 7 (one missing)
        assert_eq!(r.headline.mean_satisfaction, Some(5.86));
        assert_eq!(r.headline.satisfaction_delta_vs_neutral, Some(0.86));
        assert_eq!(r.headline.energy_poor, 3);
        assert_eq!(r.headline.energy_poor_pct, Some(37.5));
        assert_eq!(r.headline.median_income, Some(1100.0));
        assert_eq!(
            r.poverty_split.iter().map(|c| c.count).collect::<Vec<_>>(),
            vec![3, 5]
        );

        let bands = r
            .distributions
            .iter()
            .find(|d| d.title == "income band")
            .unwrap();
        let labels: Vec<&str> = bands.rows.iter().map(|c| c.answer.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Até 600",
                "De 601 a 1500",
                "De 1501 a 2000",
                "De 2501 a 3000",
                "Acima de 5000"
            ]
        );

        assert_eq!(r.extreme_cases.len(), 2);
        assert_eq!(r.extreme_cases[0].state.as_deref(), Some("SP"));
        assert_eq!(r.extreme_cases[0].commitment_pct, 20.0);
        assert_eq!(r.extreme_cases[0].per_capita_income, Some(250.0));
        assert_eq!(r.extreme_cases[1].satisfaction, Some(4.0));

        assert_eq!(r.correlations.len(), 3);
        for c in r.correlations.iter() {
            let p = c.pearson.unwrap();
            assert!((-1.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn missing_optional_columns_drop_sections() {
        let r = report(
            r#"{ "survey": "energy", "inputPath": "energy.csv",
                 "columns": { "gender": { "exact": "GENERO" }, "supply_continuity": { "exact": "X" } } }"#,
        );
        let r = match r {
            Report::Energy(r) => r,
            x => panic!("unexpected report {:?}", x),
        };
        assert!(r.distributions.iter().all(|d| d.title != "gender"));
        assert_eq!(r.distributions.len(), 5);
        assert_eq!(r.correlations.len(), 2);
    }
}
