// ********* Input data structures ***********

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;

use snafu::{OptionExt, Snafu};

/// The content of one cell in a survey table.
///
/// Delimited text only ever produces `Text` and `Empty`. Spreadsheets keep the
/// numeric type of the cell.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Builds a cell from a raw text field. Blank text is `Empty`.
    pub fn from_text(s: &str) -> Cell {
        let t = s.trim();
        if t.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(t.to_string())
        }
    }

    /// The trimmed text of the cell. Whole numbers are rendered without a
    /// fractional part, so that a spreadsheet `3.0` groups with a CSV `3`.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(Cow::Borrowed(s.trim())),
            Cell::Number(f) if !f.is_finite() => None,
            Cell::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(Cow::Owned(format!("{}", *f as i64)))
            }
            Cell::Number(f) => Some(Cow::Owned(f.to_string())),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(f) if f.is_finite() => Some(*f),
            Cell::Number(_) => None,
            Cell::Text(s) => parse_number(s),
        }
    }
}

/// Parses a numeric answer. Accepts a decimal comma when no decimal point is
/// present (`"87,5"`).
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(x) = s.parse::<f64>() {
        return if x.is_finite() { Some(x) } else { None };
    }
    if s.contains(',') && !s.contains('.') {
        return s
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite());
    }
    None
}

// ********* Schema **********

/// Which of the two surveys a table comes from.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SurveyKind {
    /// Socioeconomic and urban infrastructure survey.
    Infrastructure,
    /// Electric utility customer satisfaction survey.
    Energy,
}

impl SurveyKind {
    pub fn name(&self) -> &'static str {
        match self {
            SurveyKind::Infrastructure => "infrastructure",
            SurveyKind::Energy => "energy",
        }
    }

    /// The derived metrics a dashboard for this survey needs.
    pub fn requested_metrics(&self) -> BTreeSet<DerivedMetric> {
        let metrics: &[DerivedMetric] = match self {
            SurveyKind::Infrastructure => &[
                DerivedMetric::Bathrooms,
                DerivedMetric::Showers,
                DerivedMetric::Faucets,
                DerivedMetric::StorageLiters,
                DerivedMetric::SanitationIndex,
                DerivedMetric::VulnerabilityScore,
            ],
            SurveyKind::Energy => &[
                DerivedMetric::PerCapitaIncome,
                DerivedMetric::CommitmentPct,
                DerivedMetric::EnergyPoverty,
                DerivedMetric::VulnerabilityMulti,
            ],
        };
        metrics.iter().cloned().collect()
    }
}

impl FromStr for SurveyKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<SurveyKind, MetricsError> {
        match s.trim().to_lowercase().as_str() {
            "infrastructure" | "infra" => Ok(SurveyKind::Infrastructure),
            "energy" => Ok(SurveyKind::Energy),
            _ => UnknownNameSnafu {
                kind: "survey",
                name: s,
            }
            .fail(),
        }
    }
}

/// Canonical semantic names for the survey questions.
///
/// All downstream logic refers to these names. The mapping to the actual
/// question text of a file is held by a [`Schema`].
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Field {
    Zone,
    Neighborhood,
    Education,
    Occupation,
    DwellingFinish,
    Bathrooms,
    Showers,
    Faucets,
    StorageCapacity,
    PipedWater,
    SewageCollection,
    GarbageCollection,
    RegularElectricity,
    State,
    Gender,
    AgeBand,
    IncomeBand,
    MonthlyIncome,
    MonthlyBill,
    HouseholdSize,
    OverallSatisfaction,
    SupplyContinuity,
    VoltageStability,
    RestorationSpeed,
}

impl Field {
    pub const ALL: [Field; 24] = [
        Field::Zone,
        Field::Neighborhood,
        Field::Education,
        Field::Occupation,
        Field::DwellingFinish,
        Field::Bathrooms,
        Field::Showers,
        Field::Faucets,
        Field::StorageCapacity,
        Field::PipedWater,
        Field::SewageCollection,
        Field::GarbageCollection,
        Field::RegularElectricity,
        Field::State,
        Field::Gender,
        Field::AgeBand,
        Field::IncomeBand,
        Field::MonthlyIncome,
        Field::MonthlyBill,
        Field::HouseholdSize,
        Field::OverallSatisfaction,
        Field::SupplyContinuity,
        Field::VoltageStability,
        Field::RestorationSpeed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Zone => "zone",
            Field::Neighborhood => "neighborhood",
            Field::Education => "education",
            Field::Occupation => "occupation",
            Field::DwellingFinish => "dwelling_finish",
            Field::Bathrooms => "bathrooms",
            Field::Showers => "showers",
            Field::Faucets => "faucets",
            Field::StorageCapacity => "storage_capacity",
            Field::PipedWater => "piped_water",
            Field::SewageCollection => "sewage_collection",
            Field::GarbageCollection => "garbage_collection",
            Field::RegularElectricity => "regular_electricity",
            Field::State => "state",
            Field::Gender => "gender",
            Field::AgeBand => "age_band",
            Field::IncomeBand => "income_band",
            Field::MonthlyIncome => "monthly_income",
            Field::MonthlyBill => "monthly_bill",
            Field::HouseholdSize => "household_size",
            Field::OverallSatisfaction => "overall_satisfaction",
            Field::SupplyContinuity => "supply_continuity",
            Field::VoltageStability => "voltage_stability",
            Field::RestorationSpeed => "restoration_speed",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Field {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Field, MetricsError> {
        let needle = s.trim().to_lowercase();
        Field::ALL
            .iter()
            .find(|f| f.name() == needle)
            .cloned()
            .context(UnknownNameSnafu { kind: "field", name: s })
    }
}

/// How a semantic field is located among the headers of a table.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum ColumnRef {
    /// The header, once trimmed, is exactly this text.
    Exact(String),
    /// The first header whose lowercase form contains this lowercase fragment.
    Contains(String),
    /// The first of several references that matches.
    FirstOf(Vec<ColumnRef>),
}

impl ColumnRef {
    pub fn exact(s: &str) -> ColumnRef {
        ColumnRef::Exact(s.to_string())
    }

    pub fn contains(s: &str) -> ColumnRef {
        ColumnRef::Contains(s.to_string())
    }

    /// Finds the index of the matching header.
    pub fn resolve(&self, headers: &[String]) -> Option<usize> {
        match self {
            ColumnRef::Exact(name) => headers.iter().position(|h| h.trim() == name.trim()),
            ColumnRef::Contains(fragment) => {
                let fragment = fragment.to_lowercase();
                headers
                    .iter()
                    .position(|h| h.to_lowercase().contains(&fragment))
            }
            ColumnRef::FirstOf(refs) => refs.iter().find_map(|r| r.resolve(headers)),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Exact(name) => write!(f, "\"{}\"", name),
            ColumnRef::Contains(fragment) => write!(f, "containing \"{}\"", fragment),
            ColumnRef::FirstOf(refs) => {
                let parts: Vec<String> = refs.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", parts.join(" or "))
            }
        }
    }
}

/// A declared mapping from semantic fields to the columns of a survey file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Schema {
    pub columns: BTreeMap<Field, ColumnRef>,
    /// Columns that may already carry a derived metric. When present in a
    /// table, their values are used instead of recomputing the metric.
    pub precomputed: BTreeMap<DerivedMetric, String>,
    /// The answer that counts as "yes" in service-access questions.
    pub affirmative: String,
}

impl Schema {
    /// The question texts of the original questionnaires.
    pub fn defaults(kind: SurveyKind) -> Schema {
        let (columns, precomputed): (Vec<(Field, ColumnRef)>, Vec<(DerivedMetric, &str)>) =
            match kind {
                SurveyKind::Infrastructure => (
                    vec![
                        (Field::Zone, ColumnRef::exact("Zona")),
                        (Field::Neighborhood, ColumnRef::exact("Endereço (BAIRRO)")),
                        (Field::Education, ColumnRef::exact("Escolaridade")),
                        (Field::Occupation, ColumnRef::exact("Qual a sua ocupação")),
                        (
                            Field::DwellingFinish,
                            ColumnRef::exact(
                                "OBSERVAÇÃO DO ENTREVISTADOR: Padrão de acabamento do imóvel",
                            ),
                        ),
                        (
                            Field::Bathrooms,
                            ColumnRef::exact("Quantos banheiros possuem na sua residência?"),
                        ),
                        (
                            Field::Showers,
                            ColumnRef::exact("Quantos chuveiros possuem na sua residência?"),
                        ),
                        (
                            Field::Faucets,
                            ColumnRef::exact("Quantas torneiras possuem na residência?"),
                        ),
                        (
                            Field::StorageCapacity,
                            ColumnRef::exact("Qual a capacidade de armazenamento em média?"),
                        ),
                        (Field::PipedWater, ColumnRef::exact("Tem água encanada?")),
                        (
                            Field::SewageCollection,
                            ColumnRef::exact("Tem coleta de esgoto?"),
                        ),
                        (
                            Field::GarbageCollection,
                            ColumnRef::exact("Tem coleta de lixo?"),
                        ),
                        (
                            Field::RegularElectricity,
                            ColumnRef::exact("Tem energia elétrica regularizada?"),
                        ),
                    ],
                    vec![
                        (DerivedMetric::Bathrooms, "num_banheiros"),
                        (DerivedMetric::Showers, "num_chuveiros"),
                        (DerivedMetric::Faucets, "num_torneiras"),
                        (DerivedMetric::StorageLiters, "capacidade_litros"),
                        (DerivedMetric::SanitationIndex, "indice_saneamento"),
                        (DerivedMetric::VulnerabilityScore, "vulnerabilidade"),
                    ],
                ),
                SurveyKind::Energy => (
                    vec![
                        (Field::State, ColumnRef::exact("ESTADO")),
                        (
                            Field::Gender,
                            ColumnRef::exact("Com qual gênero você se identifica?"),
                        ),
                        (Field::AgeBand, ColumnRef::exact("Qual é a sua idade?")),
                        (
                            Field::Education,
                            ColumnRef::exact("Qual é o seu grau de escolaridade?"),
                        ),
                        (Field::IncomeBand, ColumnRef::exact("Faixa Renda")),
                        (
                            Field::MonthlyIncome,
                            ColumnRef::exact("Qual a renda mensal da sua família?"),
                        ),
                        (
                            Field::MonthlyBill,
                            ColumnRef::exact(
                                "Quanto mais ou menos você paga por mês em sua conta de luz?",
                            ),
                        ),
                        (
                            Field::HouseholdSize,
                            ColumnRef::exact("Quantas pessoas moram na sua casa?"),
                        ),
                        (
                            Field::OverallSatisfaction,
                            ColumnRef::FirstOf(vec![
                                ColumnRef::contains("satisfação geral"),
                                ColumnRef::exact("SATISFACAO_GERAL"),
                            ]),
                        ),
                        (
                            Field::SupplyContinuity,
                            ColumnRef::exact("De 1 a 10, qual nota você dá para o fornecimento de energia sem interrupção, ou seja, não faltar luz na sua casa?"),
                        ),
                        (
                            Field::VoltageStability,
                            ColumnRef::exact("De 1 a 10, que nota você dá para a variação da energia, ou seja, sem ficar alternando luz forte com luz fraca na sua casa?"),
                        ),
                        (
                            Field::RestorationSpeed,
                            ColumnRef::exact("De 1 a 10, qual nota você atribui para a rapidez na volta da energia quando falta energia na sua casa, ou seja, o tempo que leva para a energia voltar, quando falta?"),
                        ),
                    ],
                    vec![
                        (DerivedMetric::PerCapitaIncome, "Renda Per Capita"),
                        (DerivedMetric::CommitmentPct, "Comprometimento (%)"),
                    ],
                ),
            };
        Schema {
            columns: columns.into_iter().collect(),
            precomputed: precomputed
                .into_iter()
                .map(|(m, s)| (m, s.to_string()))
                .collect(),
            affirmative: "Sim".to_string(),
        }
    }

    pub fn with_column(mut self, field: Field, column: ColumnRef) -> Schema {
        self.columns.insert(field, column);
        self
    }

    /// Human readable reference to the column of a field, for error messages.
    pub fn describe(&self, field: Field) -> String {
        match self.columns.get(&field) {
            Some(c) => format!("{} ({})", field, c),
            None => format!("{} (no column declared)", field),
        }
    }
}

// ********* Derived metrics **********

/// The columns computed once after a table is loaded.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum DerivedMetric {
    Bathrooms,
    Showers,
    Faucets,
    StorageLiters,
    SanitationIndex,
    VulnerabilityScore,
    PerCapitaIncome,
    CommitmentPct,
    EnergyPoverty,
    VulnerabilityMulti,
}

impl DerivedMetric {
    /// All the metrics, in an order where each metric comes after the
    /// metrics it depends on.
    pub const ALL: [DerivedMetric; 10] = [
        DerivedMetric::Bathrooms,
        DerivedMetric::Showers,
        DerivedMetric::Faucets,
        DerivedMetric::StorageLiters,
        DerivedMetric::SanitationIndex,
        DerivedMetric::VulnerabilityScore,
        DerivedMetric::PerCapitaIncome,
        DerivedMetric::CommitmentPct,
        DerivedMetric::EnergyPoverty,
        DerivedMetric::VulnerabilityMulti,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DerivedMetric::Bathrooms => "bathrooms",
            DerivedMetric::Showers => "showers",
            DerivedMetric::Faucets => "faucets",
            DerivedMetric::StorageLiters => "storage_liters",
            DerivedMetric::SanitationIndex => "sanitation_index",
            DerivedMetric::VulnerabilityScore => "vulnerability_score",
            DerivedMetric::PerCapitaIncome => "per_capita_income",
            DerivedMetric::CommitmentPct => "commitment_pct",
            DerivedMetric::EnergyPoverty => "energy_poverty",
            DerivedMetric::VulnerabilityMulti => "vulnerability_multi",
        }
    }

    /// The raw fields read when the metric is computed (and not taken from a
    /// precomputed column).
    pub fn source_fields(&self) -> &'static [Field] {
        match self {
            DerivedMetric::Bathrooms => &[Field::Bathrooms],
            DerivedMetric::Showers => &[Field::Showers],
            DerivedMetric::Faucets => &[Field::Faucets],
            DerivedMetric::StorageLiters => &[Field::StorageCapacity],
            DerivedMetric::SanitationIndex => &[],
            DerivedMetric::VulnerabilityScore => {
                &[Field::DwellingFinish, Field::Education, Field::Occupation]
            }
            DerivedMetric::PerCapitaIncome => &[Field::MonthlyIncome, Field::HouseholdSize],
            DerivedMetric::CommitmentPct => &[Field::MonthlyBill, Field::MonthlyIncome],
            DerivedMetric::EnergyPoverty => &[],
            DerivedMetric::VulnerabilityMulti => &[Field::Education],
        }
    }

    pub fn dependencies(&self) -> &'static [DerivedMetric] {
        match self {
            DerivedMetric::SanitationIndex => &[
                DerivedMetric::Bathrooms,
                DerivedMetric::Showers,
                DerivedMetric::Faucets,
                DerivedMetric::StorageLiters,
            ],
            DerivedMetric::VulnerabilityScore => &[DerivedMetric::Bathrooms],
            DerivedMetric::EnergyPoverty => &[DerivedMetric::CommitmentPct],
            DerivedMetric::VulnerabilityMulti => &[
                DerivedMetric::PerCapitaIncome,
                DerivedMetric::CommitmentPct,
                DerivedMetric::EnergyPoverty,
            ],
            _ => &[],
        }
    }

    /// Counters are whole numbers extracted from free-text quantity answers.
    pub fn is_counter(&self) -> bool {
        matches!(
            self,
            DerivedMetric::Bathrooms
                | DerivedMetric::Showers
                | DerivedMetric::Faucets
                | DerivedMetric::StorageLiters
        )
    }
}

impl Display for DerivedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DerivedMetric {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<DerivedMetric, MetricsError> {
        let needle = s.trim().to_lowercase();
        DerivedMetric::ALL
            .iter()
            .find(|m| m.name() == needle)
            .cloned()
            .context(UnknownNameSnafu { kind: "metric", name: s })
    }
}

// ********* Policies and rules **********

/// What to do with a quantity answer that has no digits in it.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UnparseableCount {
    /// Count it as zero.
    Zero,
    Fail,
}

/// What to do when a ratio has a zero denominator.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ZeroDenominator {
    /// Per-row ratios are undefined. A normalization term over a column whose
    /// maximum is zero contributes zero.
    Lenient,
    Fail,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct NumericPolicy {
    pub unparseable_count: UnparseableCount,
    pub zero_denominator: ZeroDenominator,
}

impl NumericPolicy {
    pub const LENIENT: NumericPolicy = NumericPolicy {
        unparseable_count: UnparseableCount::Zero,
        zero_denominator: ZeroDenominator::Lenient,
    };

    pub const STRICT: NumericPolicy = NumericPolicy {
        unparseable_count: UnparseableCount::Fail,
        zero_denominator: ZeroDenominator::Fail,
    };
}

impl Default for NumericPolicy {
    fn default() -> Self {
        NumericPolicy::LENIENT
    }
}

/// Trigger conditions and weights of the infrastructure vulnerability score.
#[derive(PartialEq, Debug, Clone)]
pub struct VulnerabilityRules {
    /// Case-insensitive fragments of the interviewer's note on the dwelling
    /// finish that denote a precarious home.
    pub poor_finish_phrases: Vec<String>,
    pub poor_finish_weight: u32,
    pub illiterate_label: String,
    pub illiterate_weight: u32,
    pub unemployed_label: String,
    pub unemployed_weight: u32,
    pub no_bathroom_weight: u32,
}

impl Default for VulnerabilityRules {
    fn default() -> Self {
        VulnerabilityRules {
            poor_finish_phrases: vec![
                "sem reboco".to_string(),
                "madeira".to_string(),
                "tijolo aparente".to_string(),
            ],
            poor_finish_weight: 4,
            illiterate_label: "Não alfabetizado".to_string(),
            illiterate_weight: 3,
            unemployed_label: "Desempregado".to_string(),
            unemployed_weight: 3,
            no_bathroom_weight: 3,
        }
    }
}

/// Thresholds of the energy survey metrics.
#[derive(PartialEq, Debug, Clone)]
pub struct EnergyRules {
    /// Share of income above which a household is in energy poverty.
    pub poverty_threshold_pct: f64,
    /// Per-capita income below which a household counts as low income.
    pub low_income_per_capita: f64,
    /// Case-insensitive fragments of education answers that count as low
    /// education.
    pub low_education_phrases: Vec<String>,
}

impl Default for EnergyRules {
    fn default() -> Self {
        EnergyRules {
            poverty_threshold_pct: 10.0,
            low_income_per_capita: 660.0,
            low_education_phrases: vec!["não alfabetizado".to_string(), "fundamental".to_string()],
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct EnrichOptions {
    pub metrics: BTreeSet<DerivedMetric>,
    pub policy: NumericPolicy,
    pub vulnerability: VulnerabilityRules,
    pub energy: EnergyRules,
}

impl EnrichOptions {
    pub fn for_survey(kind: SurveyKind) -> EnrichOptions {
        EnrichOptions {
            metrics: kind.requested_metrics(),
            policy: NumericPolicy::default(),
            vulnerability: VulnerabilityRules::default(),
            energy: EnergyRules::default(),
        }
    }

    pub fn with_policy(mut self, policy: NumericPolicy) -> EnrichOptions {
        self.policy = policy;
        self
    }
}

/// Income bands of the energy survey, from the lowest to the highest.
pub const INCOME_BAND_ORDER: [&str; 10] = [
    "Até 600",
    "De 601 a 1500",
    "De 1501 a 2000",
    "De 2001 a 2500",
    "De 2501 a 3000",
    "De 3001 a 3500",
    "De 3501 a 4000",
    "De 4001 a 4500",
    "De 4501 a 5000",
    "Acima de 5000",
];

// ******** Queries *********

/// The per-row value that a query reduces.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Measure {
    Derived(DerivedMetric),
    /// A raw numeric answer (ratings, income, ...).
    Numeric(Field),
    /// 1.0 when the answer is the affirmative token, 0.0 otherwise. A missing
    /// answer counts as 0.0.
    Affirmative(Field),
    /// 1.0 for every row.
    Rows,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Reducer {
    Mean,
    /// Number of rows with a defined value.
    Count,
    Sum,
    Max,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordering of the groups in an aggregate view.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum GroupOrder {
    /// Order of first appearance among the selected rows.
    Appearance,
    Lexical,
    /// Labels compared as numbers. Labels that are not numbers come last,
    /// in lexical order.
    Numeric,
    /// A fixed order. Groups outside the list are left out.
    Canonical(Vec<String>),
    /// By reduced value. Ties keep the order of appearance.
    ByValue(SortDirection),
}

/// Keeps the rows whose answer for `field` is one of `allowed`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RowFilter {
    pub field: Field,
    pub allowed: BTreeSet<String>,
}

impl RowFilter {
    pub fn new(field: Field, allowed: &[&str]) -> RowFilter {
        RowFilter {
            field,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AggregateQuery {
    pub group_by: Field,
    pub measure: Measure,
    pub reducer: Reducer,
    pub order: GroupOrder,
    pub filters: Vec<RowFilter>,
}

impl AggregateQuery {
    pub fn new(group_by: Field, measure: Measure, reducer: Reducer) -> AggregateQuery {
        AggregateQuery {
            group_by,
            measure,
            reducer,
            order: GroupOrder::Appearance,
            filters: Vec::new(),
        }
    }

    /// Number of rows per group, largest first.
    pub fn counts(group_by: Field) -> AggregateQuery {
        AggregateQuery::new(group_by, Measure::Rows, Reducer::Count)
            .order(GroupOrder::ByValue(SortDirection::Descending))
    }

    pub fn order(mut self, order: GroupOrder) -> AggregateQuery {
        self.order = order;
        self
    }

    pub fn filters(mut self, filters: &[RowFilter]) -> AggregateQuery {
        self.filters = filters.to_vec();
        self
    }
}

// ******** Output data structures *********

/// One entry of an aggregate view.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupValue {
    pub group: String,
    pub value: f64,
    /// Number of selected rows in the group.
    pub rows: usize,
}

/// Descriptive statistics over the defined values of a measure.
#[derive(PartialEq, Debug, Clone)]
pub struct Summary {
    /// Selected rows.
    pub rows: usize,
    /// Selected rows with a defined value.
    pub defined: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Errors that prevent a table from being enriched or queried.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum MetricsError {
    #[snafu(display("missing required column(s): {}", columns.join(", ")))]
    MissingColumns { columns: Vec<String> },

    #[snafu(display(
        "row {row}: no quantity could be read from {content:?} in column \"{column}\""
    ))]
    UnreadableCount {
        row: usize,
        column: String,
        content: String,
    },

    #[snafu(display("row {row}: cannot compute {metric}: division by zero"))]
    DivisionByZero { row: usize, metric: DerivedMetric },

    #[snafu(display("cannot normalize column \"{column}\": its maximum is zero"))]
    ZeroColumnMaximum { column: String },

    #[snafu(display("invalid query: {reason}"))]
    InvalidQuery { reason: String },

    #[snafu(display("unknown {kind} name: {name:?}"))]
    UnknownName { kind: String, name: String },
}
