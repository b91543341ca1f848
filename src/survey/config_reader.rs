use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::survey::*;

/// How a column is referenced in the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnSpec {
    Exact(String),
    Contains(String),
    FirstOf(Vec<ColumnSpec>),
}

impl ColumnSpec {
    pub fn column_ref(&self) -> ColumnRef {
        match self {
            ColumnSpec::Exact(s) => ColumnRef::Exact(s.clone()),
            ColumnSpec::Contains(s) => ColumnRef::Contains(s.clone()),
            ColumnSpec::FirstOf(specs) => {
                ColumnRef::FirstOf(specs.iter().map(|s| s.column_ref()).collect())
            }
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(rename = "unparseableCount")]
    pub unparseable_count: Option<String>,
    #[serde(rename = "zeroDenominator")]
    pub zero_denominator: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VulnerabilityConfig {
    #[serde(rename = "poorFinishPhrases")]
    pub poor_finish_phrases: Option<Vec<String>>,
    #[serde(rename = "poorFinishWeight")]
    pub poor_finish_weight: Option<u32>,
    #[serde(rename = "illiterateLabel")]
    pub illiterate_label: Option<String>,
    #[serde(rename = "illiterateWeight")]
    pub illiterate_weight: Option<u32>,
    #[serde(rename = "unemployedLabel")]
    pub unemployed_label: Option<String>,
    #[serde(rename = "unemployedWeight")]
    pub unemployed_weight: Option<u32>,
    #[serde(rename = "noBathroomWeight")]
    pub no_bathroom_weight: Option<u32>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyConfig {
    #[serde(rename = "povertyThresholdPct")]
    pub poverty_threshold_pct: Option<f64>,
    #[serde(rename = "lowIncomePerCapita")]
    pub low_income_per_capita: Option<f64>,
    #[serde(rename = "lowEducationPhrases")]
    pub low_education_phrases: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub survey: Option<String>,
    #[serde(rename = "inputPath")]
    pub input_path: Option<String>,
    #[serde(rename = "inputType")]
    pub input_type: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSpec>,
    #[serde(default)]
    pub precomputed: BTreeMap<String, String>,
    #[serde(rename = "affirmativeLabel")]
    pub affirmative_label: Option<String>,
    #[serde(rename = "numericPolicy")]
    pub numeric_policy: Option<PolicyConfig>,
    pub vulnerability: Option<VulnerabilityConfig>,
    pub energy: Option<EnergyConfig>,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(rename = "topN")]
    pub top_n: Option<usize>,
    #[serde(rename = "incomeBandOrder")]
    pub income_band_order: Option<Vec<String>>,
}

/// Everything a dashboard run needs, checked.
#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub kind: SurveyKind,
    pub source: DataSource,
    pub schema: Schema,
    pub options: EnrichOptions,
    pub filters: Vec<RowFilter>,
    pub top_n: usize,
    pub income_band_order: Vec<String>,
}

pub const DEFAULT_TOP_N: usize = 10;

pub fn read_config(path: &str) -> SurveyResult<DashboardConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: DashboardConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    info!("read_config: {:?}", config);
    Ok(config)
}

fn validate_policy(config: &Option<PolicyConfig>) -> SurveyResult<NumericPolicy> {
    let mut policy = NumericPolicy::default();
    if let Some(c) = config {
        if let Some(s) = &c.unparseable_count {
            policy.unparseable_count = match s.as_str() {
                "zero" => UnparseableCount::Zero,
                "fail" => UnparseableCount::Fail,
                x => {
                    return InvalidConfigSnafu {
                        reason: format!("unparseableCount must be zero or fail, not {:?}", x),
                    }
                    .fail()
                }
            };
        }
        if let Some(s) = &c.zero_denominator {
            policy.zero_denominator = match s.as_str() {
                "lenient" => ZeroDenominator::Lenient,
                "fail" => ZeroDenominator::Fail,
                x => {
                    return InvalidConfigSnafu {
                        reason: format!("zeroDenominator must be lenient or fail, not {:?}", x),
                    }
                    .fail()
                }
            };
        }
    }
    Ok(policy)
}

fn validate_vulnerability(config: &Option<VulnerabilityConfig>) -> VulnerabilityRules {
    let mut rules = VulnerabilityRules::default();
    if let Some(c) = config.clone() {
        if let Some(x) = c.poor_finish_phrases {
            rules.poor_finish_phrases = x;
        }
        if let Some(x) = c.poor_finish_weight {
            rules.poor_finish_weight = x;
        }
        if let Some(x) = c.illiterate_label {
            rules.illiterate_label = x;
        }
        if let Some(x) = c.illiterate_weight {
            rules.illiterate_weight = x;
        }
        if let Some(x) = c.unemployed_label {
            rules.unemployed_label = x;
        }
        if let Some(x) = c.unemployed_weight {
            rules.unemployed_weight = x;
        }
        if let Some(x) = c.no_bathroom_weight {
            rules.no_bathroom_weight = x;
        }
    }
    rules
}

fn validate_energy(config: &Option<EnergyConfig>) -> SurveyResult<EnergyRules> {
    let mut rules = EnergyRules::default();
    if let Some(c) = config.clone() {
        if let Some(x) = c.poverty_threshold_pct {
            ensure!(
                x.is_finite() && x >= 0.0,
                InvalidConfigSnafu {
                    reason: format!(
                        "povertyThresholdPct must be a non-negative number, not {}",
                        x
                    ),
                }
            );
            rules.poverty_threshold_pct = x;
        }
        if let Some(x) = c.low_income_per_capita {
            ensure!(
                x.is_finite(),
                InvalidConfigSnafu {
                    reason: "lowIncomePerCapita must be a number",
                }
            );
            rules.low_income_per_capita = x;
        }
        if let Some(x) = c.low_education_phrases {
            rules.low_education_phrases = x;
        }
    }
    Ok(rules)
}

fn validate_schema(config: &DashboardConfig, kind: SurveyKind) -> SurveyResult<Schema> {
    let mut schema = Schema::defaults(kind);
    for (name, spec) in config.columns.iter() {
        let field: Field = name.parse().context(MetricsSnafu {})?;
        schema.columns.insert(field, spec.column_ref());
    }
    for (name, column) in config.precomputed.iter() {
        let metric: DerivedMetric = name.parse().context(MetricsSnafu {})?;
        schema.precomputed.insert(metric, column.clone());
    }
    if let Some(label) = &config.affirmative_label {
        schema.affirmative = label.clone();
    }
    Ok(schema)
}

fn validate_filters(config: &DashboardConfig) -> SurveyResult<Vec<RowFilter>> {
    let mut res: Vec<RowFilter> = Vec::new();
    for (name, values) in config.filters.iter() {
        let field: Field = name.parse().context(MetricsSnafu {})?;
        ensure!(
            !values.is_empty(),
            InvalidConfigSnafu {
                reason: format!("the filter on {} has no allowed value", field),
            }
        );
        res.push(RowFilter {
            field,
            allowed: values.iter().map(|v| v.trim().to_string()).collect(),
        });
    }
    Ok(res)
}

/// Checks a configuration and turns it into the settings of a run.
///
/// A relative input path is resolved against `root`, the directory of the
/// configuration file.
pub fn validate_config(config: &DashboardConfig, root: Option<&Path>) -> SurveyResult<Settings> {
    let kind: SurveyKind = config
        .survey
        .as_deref()
        .context(InvalidConfigSnafu {
            reason: "the survey must be given (infrastructure or energy)",
        })?
        .parse()
        .context(MetricsSnafu {})?;

    let input = config.input_path.as_deref().context(InvalidConfigSnafu {
        reason: "no input file was given",
    })?;
    let path: PathBuf = match root {
        Some(r) if Path::new(input).is_relative() => r.join(input),
        _ => PathBuf::from(input),
    };
    let path = path.display().to_string();
    let input_type = InputType::infer(&path, config.input_type.as_deref())?;
    debug!("validate_config: input {:?} read as {}", path, input_type);

    let top_n = config.top_n.unwrap_or(DEFAULT_TOP_N);
    ensure!(
        top_n > 0,
        InvalidConfigSnafu {
            reason: "topN must be at least 1",
        }
    );

    let options = EnrichOptions {
        metrics: kind.requested_metrics(),
        policy: validate_policy(&config.numeric_policy)?,
        vulnerability: validate_vulnerability(&config.vulnerability),
        energy: validate_energy(&config.energy)?,
    };

    Ok(Settings {
        kind,
        source: DataSource {
            path,
            input_type,
            worksheet: config.excel_worksheet_name.clone(),
        },
        schema: validate_schema(config, kind)?,
        options,
        filters: validate_filters(config)?,
        top_n,
        income_band_order: config
            .income_band_order
            .clone()
            .unwrap_or_else(|| INCOME_BAND_ORDER.iter().map(|s| s.to_string()).collect()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(js: &str) -> DashboardConfig {
        serde_json::from_str(js).unwrap()
    }

    #[test]
    fn full_configuration() {
        let config = parse(
            r#"{
                "survey": "energy",
                "inputPath": "respostas.xlsx",
                "excelWorksheetName": "Form1",
                "columns": {
                    "state": { "exact": "UF" },
                    "overall_satisfaction": { "firstOf": [ { "contains": "satisfação" }, { "exact": "NOTA" } ] }
                },
                "precomputed": { "commitment_pct": "Comp" },
                "numericPolicy": { "unparseableCount": "fail", "zeroDenominator": "lenient" },
                "energy": { "povertyThresholdPct": 8.0 },
                "filters": { "state": ["SP", " RJ "] },
                "topN": 3
            }"#,
        );
        let s = validate_config(&config, Some(Path::new("/data"))).unwrap();
        assert_eq!(s.kind, SurveyKind::Energy);
        assert_eq!(s.source.path, "/data/respostas.xlsx");
        assert_eq!(s.source.input_type, InputType::Xlsx);
        assert_eq!(s.source.worksheet.as_deref(), Some("Form1"));
        assert_eq!(s.schema.columns[&Field::State], ColumnRef::exact("UF"));
        assert_eq!(
            s.schema.columns[&Field::OverallSatisfaction],
            ColumnRef::FirstOf(vec![
                ColumnRef::contains("satisfação"),
                ColumnRef::exact("NOTA")
            ])
        );
        assert_eq!(
            s.schema.precomputed[&DerivedMetric::CommitmentPct],
            "Comp".to_string()
        );
        assert_eq!(s.options.policy.unparseable_count, UnparseableCount::Fail);
        assert_eq!(s.options.policy.zero_denominator, ZeroDenominator::Lenient);
        assert_eq!(s.options.energy.poverty_threshold_pct, 8.0);
        assert_eq!(s.options.energy.low_income_per_capita, 660.0);
        assert_eq!(s.filters, vec![RowFilter::new(Field::State, &["SP", "RJ"])]);
        assert_eq!(s.top_n, 3);
        assert_eq!(s.income_band_order.len(), 10);
    }

    #[test]
    fn defaults_for_a_minimal_configuration() {
        let config = parse(r#"{ "survey": "infrastructure", "inputPath": "/abs/pesquisa.csv" }"#);
        let s = validate_config(&config, Some(Path::new("/data"))).unwrap();
        assert_eq!(s.source.path, "/abs/pesquisa.csv");
        assert_eq!(s.schema, Schema::defaults(SurveyKind::Infrastructure));
        assert_eq!(s.options, EnrichOptions::for_survey(SurveyKind::Infrastructure));
        assert_eq!(s.top_n, DEFAULT_TOP_N);
        assert!(s.filters.is_empty());
    }

    #[test]
    fn invalid_configurations() {
        let no_survey = parse(r#"{ "inputPath": "a.csv" }"#);
        assert!(matches!(
            validate_config(&no_survey, None),
            Err(SurveyError::InvalidConfig { .. })
        ));

        let unknown_field = parse(
            r#"{ "survey": "energy", "inputPath": "a.csv", "columns": { "salary": { "exact": "X" } } }"#,
        );
        assert!(matches!(
            validate_config(&unknown_field, None),
            Err(SurveyError::Metrics {
                source: MetricsError::UnknownName { .. }
            })
        ));

        let bad_policy = parse(
            r#"{ "survey": "energy", "inputPath": "a.csv", "numericPolicy": { "zeroDenominator": "ignore" } }"#,
        );
        assert!(matches!(
            validate_config(&bad_policy, None),
            Err(SurveyError::InvalidConfig { .. })
        ));

        let zero_top = parse(r#"{ "survey": "energy", "inputPath": "a.csv", "topN": 0 }"#);
        assert!(matches!(
            validate_config(&zero_top, None),
            Err(SurveyError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn poverty_threshold_may_be_zero() {
        let zero = parse(
            r#"{ "survey": "energy", "inputPath": "a.csv", "energy": { "povertyThresholdPct": 0.0 } }"#,
        );
        let s = validate_config(&zero, None).unwrap();
        assert_eq!(s.options.energy.poverty_threshold_pct, 0.0);

        let negative = parse(
            r#"{ "survey": "energy", "inputPath": "a.csv", "energy": { "povertyThresholdPct": -1.0 } }"#,
        );
        match validate_config(&negative, None) {
            Err(SurveyError::InvalidConfig { reason }) => {
                assert!(reason.contains("non-negative"), "{}", reason)
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn fixture_configurations_parse() {
        for name in ["energy_config.json", "infrastructure_config.json"] {
            let path = format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name);
            let config = read_config(&path).unwrap();
            let root = Path::new(&path).parent().map(|p| p.to_path_buf());
            validate_config(&config, root.as_deref()).unwrap();
        }
    }
}
