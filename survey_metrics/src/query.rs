// Grouped views and statistics over an enriched table.

use std::collections::HashMap;

use log::debug;
use snafu::ensure;

use crate::config::*;
use crate::stats;
use crate::EnrichedTable;

/// The indices of the rows that pass all the filters.
///
/// A row whose filtered answer is missing never passes.
pub fn selected_rows(
    table: &EnrichedTable,
    filters: &[RowFilter],
) -> Result<Vec<usize>, MetricsError> {
    let mut cols: Vec<(usize, &RowFilter)> = Vec::new();
    for f in filters {
        cols.push((table.column(f.field)?, f));
    }
    let raw = table.raw();
    let res: Vec<usize> = (0..table.len())
        .filter(|row| {
            cols.iter().all(|(col, f)| match raw.cell(*row, *col).as_text() {
                Some(s) => f.allowed.contains(&*s),
                None => false,
            })
        })
        .collect();
    debug!(
        "selected_rows: {} of {} rows pass {} filter(s)",
        res.len(),
        table.len(),
        filters.len()
    );
    Ok(res)
}

fn reduce(values: &[f64], reducer: Reducer) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match reducer {
        Reducer::Mean => stats::mean(values),
        Reducer::Count => Some(values.len() as f64),
        Reducer::Sum => Some(values.iter().sum()),
        Reducer::Max => values.iter().cloned().reduce(f64::max),
    }
}

fn numeric_key(s: &str) -> (bool, f64) {
    match parse_number(s) {
        Some(x) => (false, x),
        None => (true, 0.0),
    }
}

/// Groups the selected rows by a field and reduces a measure per group.
///
/// Rows without an answer for the grouping field are left out. Groups with
/// no defined value are left out as well: a view never carries a NaN.
pub fn aggregate(
    table: &EnrichedTable,
    query: &AggregateQuery,
) -> Result<Vec<GroupValue>, MetricsError> {
    let group_col = table.column(query.group_by)?;
    let values = table.measure_values(query.measure)?;
    let rows = selected_rows(table, &query.filters)?;

    // (label, defined values, selected rows), in order of appearance.
    let mut groups: Vec<(String, Vec<f64>, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let label = match table.raw().cell(row, group_col).as_text() {
            Some(s) => s.into_owned(),
            None => continue,
        };
        let pos = match index.get(&label) {
            Some(pos) => *pos,
            None => {
                index.insert(label.clone(), groups.len());
                groups.push((label, Vec::new(), 0));
                groups.len() - 1
            }
        };
        let g = &mut groups[pos];
        g.2 += 1;
        if let Some(v) = values[row] {
            g.1.push(v);
        }
    }

    let mut res: Vec<GroupValue> = groups
        .into_iter()
        .filter_map(|(group, vals, rows)| {
            reduce(&vals, query.reducer).map(|value| GroupValue { group, value, rows })
        })
        .collect();

    match &query.order {
        GroupOrder::Appearance => {}
        GroupOrder::Lexical => res.sort_by(|a, b| a.group.cmp(&b.group)),
        GroupOrder::Numeric => res.sort_by(|a, b| {
            let (ka, kb) = (numeric_key(&a.group), numeric_key(&b.group));
            ka.0.cmp(&kb.0)
                .then(ka.1.total_cmp(&kb.1))
                .then(a.group.cmp(&b.group))
        }),
        GroupOrder::Canonical(order) => {
            let mut ordered: Vec<GroupValue> = Vec::new();
            for label in order {
                if ordered.iter().any(|g| g.group == *label) {
                    continue;
                }
                if let Some(g) = res.iter().find(|g| g.group == *label) {
                    ordered.push(g.clone());
                }
            }
            res = ordered;
        }
        GroupOrder::ByValue(SortDirection::Ascending) => {
            res.sort_by(|a, b| a.value.total_cmp(&b.value))
        }
        GroupOrder::ByValue(SortDirection::Descending) => {
            res.sort_by(|a, b| b.value.total_cmp(&a.value))
        }
    }
    debug!("aggregate: {:?} -> {} group(s)", query, res.len());
    Ok(res)
}

/// The `n` groups with the highest (or lowest) mean of a measure.
///
/// Ties keep the order of appearance. Groups without any defined value of the
/// measure are not ranked. Fewer than `n` groups are returned when there are
/// not enough.
pub fn top_n_by(
    table: &EnrichedTable,
    group_by: Field,
    measure: Measure,
    n: usize,
    direction: SortDirection,
    filters: &[RowFilter],
) -> Result<Vec<GroupValue>, MetricsError> {
    ensure!(
        n > 0,
        InvalidQuerySnafu {
            reason: "the number of groups to keep must be at least 1",
        }
    );
    let query = AggregateQuery::new(group_by, measure, Reducer::Mean)
        .order(GroupOrder::ByValue(direction))
        .filters(filters);
    let mut res = aggregate(table, &query)?;
    res.truncate(n);
    Ok(res)
}

/// The indices of the `n` rows with the highest (or lowest) value of a
/// measure. Rows without a value are never returned.
pub fn top_n_rows(
    table: &EnrichedTable,
    measure: Measure,
    n: usize,
    direction: SortDirection,
    filters: &[RowFilter],
) -> Result<Vec<usize>, MetricsError> {
    ensure!(
        n > 0,
        InvalidQuerySnafu {
            reason: "the number of rows to keep must be at least 1",
        }
    );
    let values = table.measure_values(measure)?;
    let mut rows: Vec<(usize, f64)> = selected_rows(table, filters)?
        .into_iter()
        .filter_map(|row| values[row].map(|v| (row, v)))
        .collect();
    match direction {
        SortDirection::Ascending => rows.sort_by(|a, b| a.1.total_cmp(&b.1)),
        SortDirection::Descending => rows.sort_by(|a, b| b.1.total_cmp(&a.1)),
    }
    Ok(rows.into_iter().take(n).map(|(row, _)| row).collect())
}

fn defined_values(
    table: &EnrichedTable,
    measure: Measure,
    filters: &[RowFilter],
) -> Result<(usize, Vec<f64>), MetricsError> {
    let values = table.measure_values(measure)?;
    let rows = selected_rows(table, filters)?;
    let defined: Vec<f64> = rows.iter().filter_map(|row| values[*row]).collect();
    Ok((rows.len(), defined))
}

/// Descriptive statistics of a measure over the selected rows.
pub fn summarize(
    table: &EnrichedTable,
    measure: Measure,
    filters: &[RowFilter],
) -> Result<Summary, MetricsError> {
    let (rows, values) = defined_values(table, measure, filters)?;
    Ok(Summary {
        rows,
        defined: values.len(),
        sum: values.iter().sum(),
        mean: stats::mean(&values),
        median: stats::median(&values),
        min: values.iter().cloned().reduce(f64::min),
        max: values.iter().cloned().reduce(f64::max),
    })
}

/// Number of selected rows whose value satisfies a predicate.
pub fn count_where<P>(
    table: &EnrichedTable,
    measure: Measure,
    filters: &[RowFilter],
    predicate: P,
) -> Result<usize, MetricsError>
where
    P: Fn(f64) -> bool,
{
    let (_, values) = defined_values(table, measure, filters)?;
    Ok(values.into_iter().filter(|v| predicate(*v)).count())
}

/// Pearson correlation of two measures over the rows where both are defined.
pub fn correlation(
    table: &EnrichedTable,
    a: Measure,
    b: Measure,
    filters: &[RowFilter],
) -> Result<Option<f64>, MetricsError> {
    let va = table.measure_values(a)?;
    let vb = table.measure_values(b)?;
    let pairs: Vec<(f64, f64)> = selected_rows(table, filters)?
        .into_iter()
        .filter_map(|row| match (va[row], vb[row]) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        })
        .collect();
    Ok(stats::pearson(&pairs))
}

/// The distinct answers of a field among the selected rows, in order of
/// appearance.
pub fn distinct(
    table: &EnrichedTable,
    field: Field,
    filters: &[RowFilter],
) -> Result<Vec<String>, MetricsError> {
    let col = table.column(field)?;
    let mut res: Vec<String> = Vec::new();
    for row in selected_rows(table, filters)? {
        if let Some(s) = table.raw().cell(row, col).as_text() {
            if !res.iter().any(|r| r.as_str() == &*s) {
                res.push(s.into_owned());
            }
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;
    use crate::enrich;

    fn energy() -> EnrichedTable {
        let mut b = TableBuilder::with_headers(&[
            "ESTADO",
            "Faixa Renda",
            "Qual a renda mensal da sua família?",
            "Quanto mais ou menos você paga por mês em sua conta de luz?",
            "Quantas pessoas moram na sua casa?",
            "Qual é o seu grau de escolaridade?",
            "SATISFACAO_GERAL",
        ]);
        b.add_text_row(&["SP", "De 601 a 1500", "1000", "200", "4", "Fundamental", "6"]);
        b.add_text_row(&["RJ", "Acima de 5000", "6000", "150", "2", "Superior", "9"]);
        b.add_text_row(&["SP", "Até 600", "500", "100", "2", "Médio", "4"]);
        b.add_text_row(&["MG", "De 601 a 1500", "1200", "60", "3", "Médio", ""]);
        b.add_text_row(&["RJ", "Até 600", "0", "80", "1", "Fundamental", "5"]);
        b.add_text_row(&["", "Até 600", "400", "50", "1", "Médio", "2"]);
        let schema = Schema::defaults(SurveyKind::Energy);
        enrich(b.build(), &schema, &EnrichOptions::for_survey(SurveyKind::Energy)).unwrap()
    }

    fn groups(res: &[GroupValue]) -> Vec<(&str, f64)> {
        res.iter().map(|g| (g.group.as_str(), g.value)).collect()
    }

    #[test]
    fn counts_by_state() {
        let t = energy();
        let res = aggregate(&t, &AggregateQuery::counts(Field::State)).unwrap();
        // The row without a state is left out. Ties keep appearance order.
        assert_eq!(groups(&res), vec![("SP", 2.0), ("RJ", 2.0), ("MG", 1.0)]);
    }

    #[test]
    fn mean_commitment_by_state_skips_undefined() {
        let t = energy();
        let q = AggregateQuery::new(
            Field::State,
            Measure::Derived(DerivedMetric::CommitmentPct),
            Reducer::Mean,
        );
        let res = aggregate(&t, &q).unwrap();
        // RJ: 2.5 and an undefined value for the zero income.
        assert_eq!(groups(&res), vec![("SP", 20.0), ("RJ", 2.5), ("MG", 5.0)]);
        assert_eq!(res[1].rows, 2);
    }

    #[test]
    fn canonical_order_drops_unknown_groups() {
        let t = energy();
        let order: Vec<String> = INCOME_BAND_ORDER.iter().map(|s| s.to_string()).collect();
        let q = AggregateQuery::counts(Field::IncomeBand).order(GroupOrder::Canonical(order));
        let res = aggregate(&t, &q).unwrap();
        assert_eq!(
            groups(&res),
            vec![
                ("Até 600", 3.0),
                ("De 601 a 1500", 2.0),
                ("Acima de 5000", 1.0)
            ]
        );
    }

    #[test]
    fn filters_restrict_rows() {
        let t = energy();
        let filters = vec![RowFilter::new(Field::State, &["SP", "MG"])];
        let s = summarize(&t, Measure::Numeric(Field::OverallSatisfaction), &filters).unwrap();
        assert_eq!(s.rows, 3);
        assert_eq!(s.defined, 2);
        assert_eq!(s.mean, Some(5.0));
        assert_eq!(s.min, Some(4.0));
        assert_eq!(s.max, Some(6.0));
    }

    #[test]
    fn top_groups_by_mean() {
        let t = energy();
        let res = top_n_by(
            &t,
            Field::State,
            Measure::Numeric(Field::OverallSatisfaction),
            2,
            SortDirection::Descending,
            &[],
        )
        .unwrap();
        assert_eq!(groups(&res), vec![("RJ", 7.0), ("SP", 5.0)]);

        let all = top_n_by(
            &t,
            Field::State,
            Measure::Numeric(Field::OverallSatisfaction),
            10,
            SortDirection::Ascending,
            &[],
        )
        .unwrap();
        // MG has no rating at all.
        assert_eq!(groups(&all), vec![("SP", 5.0), ("RJ", 7.0)]);
    }

    #[test]
    fn top_zero_is_invalid() {
        let t = energy();
        let res = top_n_by(
            &t,
            Field::State,
            Measure::Rows,
            0,
            SortDirection::Descending,
            &[],
        );
        assert!(matches!(res, Err(MetricsError::InvalidQuery { .. })));
    }

    #[test]
    fn top_rows_by_commitment() {
        let t = energy();
        let rows = top_n_rows(
            &t,
            Measure::Derived(DerivedMetric::CommitmentPct),
            2,
            SortDirection::Descending,
            &[],
        )
        .unwrap();
        assert_eq!(rows, vec![0, 2]);
    }

    #[test]
    fn count_of_energy_poor() {
        let t = energy();
        let n = count_where(
            &t,
            Measure::Derived(DerivedMetric::EnergyPoverty),
            &[],
            |v| v > 0.0,
        )
        .unwrap();
        // 20%, 20% and 12.5%
        assert_eq!(n, 3);
    }

    #[test]
    fn correlation_of_income_and_rating() {
        let t = energy();
        let r = correlation(
            &t,
            Measure::Numeric(Field::MonthlyIncome),
            Measure::Numeric(Field::OverallSatisfaction),
            &[],
        )
        .unwrap()
        .unwrap();
        assert!(r > 0.0 && r <= 1.0);
    }

    #[test]
    fn distinct_in_appearance_order() {
        let t = energy();
        assert_eq!(
            distinct(&t, Field::State, &[]).unwrap(),
            vec!["SP".to_string(), "RJ".to_string(), "MG".to_string()]
        );
    }

    #[test]
    fn unknown_field_is_a_schema_error() {
        let t = energy();
        let res = aggregate(&t, &AggregateQuery::counts(Field::Neighborhood));
        assert!(matches!(res, Err(MetricsError::MissingColumns { .. })));
    }

    #[test]
    fn affirmative_share() {
        let mut b = TableBuilder::with_headers(&["Zona", "Tem água encanada?"]);
        b.add_text_row(&["Norte", "Sim"]);
        b.add_text_row(&["Norte", "Não"]);
        b.add_text_row(&["Sul", "Sim"]);
        b.add_text_row(&["Norte", ""]);
        let mut opts = EnrichOptions::for_survey(SurveyKind::Infrastructure);
        opts.metrics.clear();
        let t = enrich(b.build(), &Schema::defaults(SurveyKind::Infrastructure), &opts).unwrap();
        let q = AggregateQuery::new(
            Field::Zone,
            Measure::Affirmative(Field::PipedWater),
            Reducer::Mean,
        );
        let res = aggregate(&t, &q).unwrap();
        assert_eq!(res[0].group, "Norte");
        assert!((res[0].value - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(res[1].value, 1.0);
    }
}
