pub mod builder;
pub mod cache;
mod config;
pub mod manual;
mod query;
pub mod stats;

use log::{debug, info};
use snafu::ensure;

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};

pub use crate::config::*;
pub use crate::query::*;

use crate::stats::round_decimals;

static EMPTY_CELL: Cell = Cell::Empty;

/// A survey table as read from a file: one row per respondent.
///
/// All rows have exactly as many cells as there are headers.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name.trim())
    }
}

/// The derived columns of one respondent.
///
/// A value is `None` when its metric was not requested, or when it is
/// undefined for this row (missing answers, zero denominators under the
/// lenient policy).
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DerivedRow {
    pub bathrooms: Option<u64>,
    pub showers: Option<u64>,
    pub faucets: Option<u64>,
    pub storage_liters: Option<u64>,
    pub sanitation_index: Option<f64>,
    pub vulnerability_score: Option<u32>,
    pub per_capita_income: Option<f64>,
    pub commitment_pct: Option<f64>,
    pub energy_poverty: Option<bool>,
    pub vulnerability_multi: Option<u8>,
}

impl DerivedRow {
    pub fn value(&self, metric: DerivedMetric) -> Option<f64> {
        match metric {
            DerivedMetric::Bathrooms => self.bathrooms.map(|x| x as f64),
            DerivedMetric::Showers => self.showers.map(|x| x as f64),
            DerivedMetric::Faucets => self.faucets.map(|x| x as f64),
            DerivedMetric::StorageLiters => self.storage_liters.map(|x| x as f64),
            DerivedMetric::SanitationIndex => self.sanitation_index,
            DerivedMetric::VulnerabilityScore => self.vulnerability_score.map(|x| x as f64),
            DerivedMetric::PerCapitaIncome => self.per_capita_income,
            DerivedMetric::CommitmentPct => self.commitment_pct,
            DerivedMetric::EnergyPoverty => self.energy_poverty.map(|b| if b { 1.0 } else { 0.0 }),
            DerivedMetric::VulnerabilityMulti => self.vulnerability_multi.map(|x| x as f64),
        }
    }

    fn counter(&self, metric: DerivedMetric) -> Option<u64> {
        match metric {
            DerivedMetric::Bathrooms => self.bathrooms,
            DerivedMetric::Showers => self.showers,
            DerivedMetric::Faucets => self.faucets,
            DerivedMetric::StorageLiters => self.storage_liters,
            _ => None,
        }
    }

    fn set_counter(&mut self, metric: DerivedMetric, count: u64) {
        match metric {
            DerivedMetric::Bathrooms => self.bathrooms = Some(count),
            DerivedMetric::Showers => self.showers = Some(count),
            DerivedMetric::Faucets => self.faucets = Some(count),
            DerivedMetric::StorageLiters => self.storage_liters = Some(count),
            _ => {}
        }
    }

    // Values read back from a precomputed column.
    fn set_number(&mut self, metric: DerivedMetric, x: Option<f64>) {
        let whole = x.filter(|v| *v >= 0.0).map(|v| v.trunc());
        match metric {
            DerivedMetric::SanitationIndex => self.sanitation_index = x,
            DerivedMetric::VulnerabilityScore => self.vulnerability_score = whole.map(|v| v as u32),
            DerivedMetric::PerCapitaIncome => self.per_capita_income = x,
            DerivedMetric::CommitmentPct => self.commitment_pct = x,
            DerivedMetric::EnergyPoverty => self.energy_poverty = x.map(|v| v != 0.0),
            DerivedMetric::VulnerabilityMulti => self.vulnerability_multi = whole.map(|v| v as u8),
            m => {
                if let Some(v) = whole {
                    self.set_counter(m, v as u64)
                }
            }
        }
    }
}

/// A raw table together with its derived columns.
///
/// Built once by [`enrich`], never mutated afterwards.
#[derive(PartialEq, Debug, Clone)]
pub struct EnrichedTable {
    raw: RawTable,
    schema: Schema,
    columns: BTreeMap<Field, usize>,
    metrics: BTreeSet<DerivedMetric>,
    derived: Vec<DerivedRow>,
}

impl EnrichedTable {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn raw(&self) -> &RawTable {
        &self.raw
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The metrics that were computed, dependencies included.
    pub fn metrics(&self) -> &BTreeSet<DerivedMetric> {
        &self.metrics
    }

    pub fn derived(&self) -> &[DerivedRow] {
        &self.derived
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// The column index of a field, or a schema error naming it.
    pub fn column(&self, field: Field) -> Result<usize, MetricsError> {
        match self.columns.get(&field) {
            Some(idx) => Ok(*idx),
            None => MissingColumnsSnafu {
                columns: vec![self.schema.describe(field)],
            }
            .fail(),
        }
    }

    pub fn text(&self, row: usize, field: Field) -> Result<Option<Cow<'_, str>>, MetricsError> {
        let col = self.column(field)?;
        Ok(self.raw.cell(row, col).as_text())
    }

    /// The value of a measure for every row.
    pub fn measure_values(&self, measure: Measure) -> Result<Vec<Option<f64>>, MetricsError> {
        let res = match measure {
            Measure::Rows => vec![Some(1.0); self.len()],
            Measure::Derived(metric) => {
                ensure!(
                    self.metrics.contains(&metric),
                    InvalidQuerySnafu {
                        reason: format!("{} was not computed for this table", metric),
                    }
                );
                self.derived.iter().map(|d| d.value(metric)).collect()
            }
            Measure::Numeric(field) => {
                let col = self.column(field)?;
                (0..self.len())
                    .map(|row| self.raw.cell(row, col).as_number())
                    .collect()
            }
            Measure::Affirmative(field) => {
                let col = self.column(field)?;
                let yes = self.schema.affirmative.trim();
                (0..self.len())
                    .map(|row| match self.raw.cell(row, col).as_text() {
                        Some(s) if s == yes => Some(1.0),
                        _ => Some(0.0),
                    })
                    .collect()
            }
        };
        Ok(res)
    }
}

/// Reads a whole quantity out of a free-text answer: the first run of ASCII
/// digits. Numeric cells are truncated. A run too long for a `u64` saturates.
/// Returns `None` when nothing can be read.
pub fn extract_count(cell: &Cell) -> Option<u64> {
    match cell {
        Cell::Number(f) if f.is_finite() && *f >= 0.0 => Some(f.trunc() as u64),
        Cell::Number(_) | Cell::Empty => None,
        Cell::Text(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.is_empty() {
                None
            } else {
                // Only an overflow can fail here.
                Some(digits.parse::<u64>().unwrap_or(u64::MAX))
            }
        }
    }
}

/// Computes the derived columns of a raw table.
///
/// Arguments:
/// * `raw` the table as read from the source
/// * `schema` where each semantic field lives in this table
/// * `options` the metrics to compute, the numeric policy and the rules
///
/// All the columns needed by the requested metrics are checked before any
/// computation: if some are missing, the error lists all of them.
pub fn enrich(
    raw: RawTable,
    schema: &Schema,
    options: &EnrichOptions,
) -> Result<EnrichedTable, MetricsError> {
    info!(
        "enrich: {} rows, {} columns, metrics: {:?}",
        raw.len(),
        raw.headers.len(),
        options.metrics
    );

    let columns = resolve_columns(&raw.headers, schema);
    debug!("enrich: resolved columns: {:?}", columns);

    let metrics = metric_closure(&options.metrics);
    let precomputed: BTreeMap<DerivedMetric, usize> = metrics
        .iter()
        .filter_map(|m| {
            schema
                .precomputed
                .get(m)
                .and_then(|name| raw.column_index(name))
                .map(|idx| (*m, idx))
        })
        .collect();
    if !precomputed.is_empty() {
        info!("enrich: reusing precomputed columns for {:?}", precomputed.keys());
    }

    let missing: BTreeSet<Field> = metrics
        .iter()
        .filter(|m| !precomputed.contains_key(m))
        .flat_map(|m| m.source_fields().iter().cloned())
        .filter(|f| !columns.contains_key(f))
        .collect();
    ensure!(
        missing.is_empty(),
        MissingColumnsSnafu {
            columns: missing
                .iter()
                .map(|f| schema.describe(*f))
                .collect::<Vec<String>>(),
        }
    );

    let mut derived: Vec<DerivedRow> = vec![DerivedRow::default(); raw.len()];
    let ctx = Context {
        raw: &raw,
        schema,
        columns: &columns,
        options,
    };

    for metric in DerivedMetric::ALL.iter().filter(|m| metrics.contains(m)) {
        if let Some(col) = precomputed.get(metric) {
            ctx.fill_precomputed(*metric, *col, &mut derived)?;
            continue;
        }
        match metric {
            m if m.is_counter() => ctx.fill_counter(*m, &mut derived)?,
            DerivedMetric::SanitationIndex => ctx.fill_sanitation(&mut derived)?,
            DerivedMetric::VulnerabilityScore => ctx.fill_vulnerability(&mut derived),
            DerivedMetric::PerCapitaIncome => ctx.fill_per_capita(&mut derived)?,
            DerivedMetric::CommitmentPct => ctx.fill_commitment(&mut derived)?,
            DerivedMetric::EnergyPoverty => ctx.fill_energy_poverty(&mut derived),
            DerivedMetric::VulnerabilityMulti => ctx.fill_vulnerability_multi(&mut derived),
            _ => {}
        }
    }

    info!("enrich: computed {:?} over {} rows", metrics, derived.len());
    Ok(EnrichedTable {
        raw,
        schema: schema.clone(),
        columns,
        metrics,
        derived,
    })
}

fn resolve_columns(headers: &[String], schema: &Schema) -> BTreeMap<Field, usize> {
    schema
        .columns
        .iter()
        .filter_map(|(field, column)| column.resolve(headers).map(|idx| (*field, idx)))
        .collect()
}

// The requested metrics and everything they depend on.
fn metric_closure(requested: &BTreeSet<DerivedMetric>) -> BTreeSet<DerivedMetric> {
    let mut res: BTreeSet<DerivedMetric> = BTreeSet::new();
    let mut stack: Vec<DerivedMetric> = requested.iter().cloned().collect();
    while let Some(m) = stack.pop() {
        if res.insert(m) {
            stack.extend(m.dependencies().iter().cloned());
        }
    }
    res
}

fn contains_any(haystack: &str, phrases: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    phrases
        .iter()
        .any(|p| !p.is_empty() && haystack.contains(&p.to_lowercase()))
}

struct Context<'a> {
    raw: &'a RawTable,
    schema: &'a Schema,
    columns: &'a BTreeMap<Field, usize>,
    options: &'a EnrichOptions,
}

impl<'a> Context<'a> {
    // Only called for fields whose presence has been checked.
    fn cell(&self, row: usize, field: Field) -> &'a Cell {
        match self.columns.get(&field) {
            Some(col) => self.raw.cell(row, *col),
            None => &EMPTY_CELL,
        }
    }

    fn count_or_policy(
        &self,
        row: usize,
        cell: &Cell,
        column: &str,
    ) -> Result<u64, MetricsError> {
        match extract_count(cell) {
            Some(n) => Ok(n),
            None => match self.options.policy.unparseable_count {
                UnparseableCount::Zero => Ok(0),
                UnparseableCount::Fail => UnreadableCountSnafu {
                    row: row + 1,
                    column,
                    content: cell.as_text().map(|s| s.into_owned()).unwrap_or_default(),
                }
                .fail(),
            },
        }
    }

    fn fill_precomputed(
        &self,
        metric: DerivedMetric,
        col: usize,
        derived: &mut [DerivedRow],
    ) -> Result<(), MetricsError> {
        let column = self.raw.headers[col].clone();
        for (row, d) in derived.iter_mut().enumerate() {
            let cell = self.raw.cell(row, col);
            if metric.is_counter() {
                let n = self.count_or_policy(row, cell, &column)?;
                d.set_counter(metric, n);
            } else {
                d.set_number(metric, cell.as_number());
            }
        }
        Ok(())
    }

    fn fill_counter(
        &self,
        metric: DerivedMetric,
        derived: &mut [DerivedRow],
    ) -> Result<(), MetricsError> {
        let field = metric.source_fields()[0];
        let column = self.schema.describe(field);
        for (row, d) in derived.iter_mut().enumerate() {
            let n = self.count_or_policy(row, self.cell(row, field), &column)?;
            d.set_counter(metric, n);
        }
        Ok(())
    }

    fn fill_sanitation(&self, derived: &mut [DerivedRow]) -> Result<(), MetricsError> {
        let counters = DerivedMetric::SanitationIndex.dependencies();
        let mut maxima: Vec<u64> = Vec::new();
        for m in counters.iter() {
            let max = derived
                .iter()
                .filter_map(|d| d.counter(*m))
                .max()
                .unwrap_or(0);
            if max == 0 && self.options.policy.zero_denominator == ZeroDenominator::Fail {
                return ZeroColumnMaximumSnafu {
                    column: m.name(),
                }
                .fail();
            }
            maxima.push(max);
        }
        debug!("fill_sanitation: column maxima: {:?}", maxima);

        for d in derived.iter_mut() {
            let mut index = 0.0;
            for (m, max) in counters.iter().zip(maxima.iter()) {
                // A column that is zero everywhere contributes nothing.
                if *max > 0 {
                    let v = d.counter(*m).unwrap_or(0) as f64;
                    index += v / (*max as f64) * 2.5;
                }
            }
            d.sanitation_index = Some(index);
        }
        Ok(())
    }

    fn fill_vulnerability(&self, derived: &mut [DerivedRow]) {
        let rules = &self.options.vulnerability;
        for (row, d) in derived.iter_mut().enumerate() {
            // Weights come from the configuration, the sum saturates.
            let mut score: u32 = 0;
            if let Some(finish) = self.cell(row, Field::DwellingFinish).as_text() {
                if contains_any(&finish, &rules.poor_finish_phrases) {
                    score = score.saturating_add(rules.poor_finish_weight);
                }
            }
            if self.cell(row, Field::Education).as_text().as_deref()
                == Some(rules.illiterate_label.trim())
            {
                score = score.saturating_add(rules.illiterate_weight);
            }
            if self.cell(row, Field::Occupation).as_text().as_deref()
                == Some(rules.unemployed_label.trim())
            {
                score = score.saturating_add(rules.unemployed_weight);
            }
            if d.bathrooms == Some(0) {
                score = score.saturating_add(rules.no_bathroom_weight);
            }
            debug!("fill_vulnerability: row {} score {}", row + 1, score);
            d.vulnerability_score = Some(score);
        }
    }

    // numerator / denominator, following the zero denominator policy.
    fn ratio(
        &self,
        row: usize,
        metric: DerivedMetric,
        numerator: Option<f64>,
        denominator: Option<f64>,
    ) -> Result<Option<f64>, MetricsError> {
        match (numerator, denominator) {
            (Some(_), Some(den)) if den == 0.0 => match self.options.policy.zero_denominator {
                ZeroDenominator::Lenient => Ok(None),
                ZeroDenominator::Fail => DivisionByZeroSnafu {
                    row: row + 1,
                    metric,
                }
                .fail(),
            },
            (Some(num), Some(den)) => Ok(Some(num / den)),
            _ => Ok(None),
        }
    }

    fn fill_per_capita(&self, derived: &mut [DerivedRow]) -> Result<(), MetricsError> {
        for (row, d) in derived.iter_mut().enumerate() {
            let income = self.cell(row, Field::MonthlyIncome).as_number();
            let size = self.cell(row, Field::HouseholdSize).as_number();
            d.per_capita_income = self.ratio(row, DerivedMetric::PerCapitaIncome, income, size)?;
        }
        Ok(())
    }

    fn fill_commitment(&self, derived: &mut [DerivedRow]) -> Result<(), MetricsError> {
        for (row, d) in derived.iter_mut().enumerate() {
            let bill = self.cell(row, Field::MonthlyBill).as_number();
            let income = self.cell(row, Field::MonthlyIncome).as_number();
            d.commitment_pct = self
                .ratio(row, DerivedMetric::CommitmentPct, bill, income)?
                .map(|x| round_decimals(x * 100.0, 2));
        }
        Ok(())
    }

    fn fill_energy_poverty(&self, derived: &mut [DerivedRow]) {
        let threshold = self.options.energy.poverty_threshold_pct;
        for d in derived.iter_mut() {
            d.energy_poverty = Some(d.commitment_pct.map(|c| c > threshold).unwrap_or(false));
        }
    }

    fn fill_vulnerability_multi(&self, derived: &mut [DerivedRow]) {
        let rules = &self.options.energy;
        for (row, d) in derived.iter_mut().enumerate() {
            let low_income = d
                .per_capita_income
                .map(|p| p < rules.low_income_per_capita)
                .unwrap_or(false);
            let low_education = self
                .cell(row, Field::Education)
                .as_text()
                .map(|s| contains_any(&s, &rules.low_education_phrases))
                .unwrap_or(false);
            let poor = d.energy_poverty.unwrap_or(false);
            d.vulnerability_multi =
                Some([low_income, low_education, poor].iter().filter(|b| **b).count() as u8);
        }
    }
}
