use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_metrics::cache::{DatasetCache, SourceKey};
use survey_metrics::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::survey::config_reader::*;
use crate::survey::dashboards::Report;

pub mod config_reader;
pub mod dashboards;
mod io_common;
mod io_csv;
mod io_xlsx;
mod render;

pub use io_common::InputType;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SurveyError {
    #[snafu(display("Error reading file {path}: {source}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{path}: malformed record {lineno}: {source}"))]
    CsvRecord {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("{path}: the file has no header row"))]
    MissingHeader { path: String },
    #[snafu(display("Error opening Excel file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("{path}: no worksheet named {name:?}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display(
        "{path}: the workbook has several worksheets ({names}), the worksheet name must be provided"
    ))]
    AmbiguousWorksheet { path: String, names: String },
    #[snafu(display("{path}: the worksheet is empty"))]
    EmptyExcel { path: String },
    #[snafu(display("unknown input type {input_type:?} (expected csv or xlsx)"))]
    UnknownInputType { input_type: String },
    #[snafu(display("Error opening JSON file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Metrics { source: MetricsError },
    #[snafu(display("invalid filter {filter:?}: expected field=value"))]
    InvalidFilter { filter: String },
    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfig { reason: String },
    #[snafu(display("Error writing the report to {path}: {source}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the report: {source}"))]
    SerializingReport { source: serde_json::Error },
    #[snafu(display("Difference detected between the report and the reference {path}"))]
    ReferenceMismatch { path: String },
}

pub type SurveyResult<T> = Result<T, SurveyError>;

/// Where a survey table is read from.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DataSource {
    pub path: String,
    pub input_type: InputType,
    pub worksheet: Option<String>,
}

fn read_source(source: &DataSource) -> SurveyResult<Vec<u8>> {
    info!("read_source: reading {:?}", source.path);
    fs::read(&source.path).context(ReadingFileSnafu {
        path: source.path.clone(),
    })
}

fn enrich_content(
    source: &DataSource,
    content: &[u8],
    schema: &Schema,
    options: &EnrichOptions,
) -> SurveyResult<EnrichedTable> {
    let raw = match source.input_type {
        InputType::Csv => io_csv::read_csv_table(&source.path, content)?,
        InputType::Xlsx => {
            io_xlsx::read_xlsx_table(&source.path, content.to_vec(), source.worksheet.as_deref())?
        }
    };
    info!(
        "enrich_content: {}: {} rows, {} columns",
        io_common::simplify_file_name(&source.path),
        raw.len(),
        raw.headers.len()
    );
    enrich(raw, schema, options).context(MetricsSnafu {})
}

/// Reads a survey table and computes its derived columns.
pub fn load_and_enrich(
    source: &DataSource,
    schema: &Schema,
    options: &EnrichOptions,
) -> SurveyResult<EnrichedTable> {
    let content = read_source(source)?;
    enrich_content(source, &content, schema, options)
}

/// A dashboard session: the enriched tables loaded so far.
#[derive(Debug, Default)]
pub struct Session {
    cache: DatasetCache,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Like [`load_and_enrich`], but returns the table of a previous call
    /// when neither the file content nor the settings changed.
    pub fn load(
        &mut self,
        source: &DataSource,
        schema: &Schema,
        options: &EnrichOptions,
    ) -> SurveyResult<Arc<EnrichedTable>> {
        let content = read_source(source)?;
        let key = SourceKey::new(&source.path, &content, schema, options);
        self.cache
            .get_or_insert_with(key, || enrich_content(source, &content, schema, options))
    }

    pub fn invalidate(&mut self, path: &str) -> bool {
        self.cache.invalidate(path)
    }

    pub fn clear(&mut self) {
        self.cache.clear()
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }
}

fn read_reference(path: &str) -> SurveyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

/// Compares a report with a reference file. Differences are printed.
pub fn check_reference(report_js: &str, reference_path: &str) -> SurveyResult<()> {
    let reference = read_reference(reference_path)?;
    let pretty_reference =
        serde_json::to_string_pretty(&reference).context(SerializingReportSnafu {})?;
    // Both sides go through a JSON value so that the key order is the same.
    let report: JSValue = serde_json::from_str(report_js).context(SerializingReportSnafu {})?;
    let pretty_report =
        serde_json::to_string_pretty(&report).context(SerializingReportSnafu {})?;
    if pretty_reference != pretty_report {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(pretty_reference.as_str(), pretty_report.as_str(), "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("check_reference: the report matches {}", reference_path);
    Ok(())
}

// Command-line values take precedence over the configuration file.
fn merge_args(config: &mut DashboardConfig, args: &Args) -> SurveyResult<()> {
    if let Some(s) = &args.survey {
        config.survey = Some(s.clone());
    }
    if let Some(p) = &args.input {
        config.input_path = Some(p.clone());
    }
    if let Some(t) = &args.input_type {
        config.input_type = Some(t.clone());
    }
    if let Some(w) = &args.excel_worksheet_name {
        config.excel_worksheet_name = Some(w.clone());
    }
    if let Some(n) = args.top {
        config.top_n = Some(n);
    }
    // A field filtered on the command line replaces the filter of the file.
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for f in args.filter.iter() {
        let (field, value) = f.split_once('=').context(InvalidFilterSnafu { filter: f })?;
        ensure!(
            !field.trim().is_empty() && !value.trim().is_empty(),
            InvalidFilterSnafu { filter: f }
        );
        filters
            .entry(field.trim().to_string())
            .or_default()
            .push(value.trim().to_string());
    }
    config.filters.extend(filters);
    Ok(())
}

fn write_output(report_js: &str, out: &str) -> SurveyResult<()> {
    if out == "stdout" {
        println!("{}", report_js);
        Ok(())
    } else {
        info!("write_output: writing the report to {}", out);
        fs::write(out, report_js).context(WritingOutputSnafu { path: out })
    }
}

/// Loads the survey described by the command line and prints its dashboard.
pub fn run_dashboard(args: &Args) -> SurveyResult<()> {
    let (mut config, root) = match &args.config {
        Some(path) => {
            let config = read_config(path)?;
            let root = Path::new(path).parent().map(|p| p.to_path_buf());
            (config, root)
        }
        None => (DashboardConfig::default(), None),
    };
    merge_args(&mut config, args)?;
    debug!("run_dashboard: config: {:?}", config);

    let settings = validate_config(&config, root.as_deref())?;
    info!(
        "run_dashboard: {} survey from {:?}",
        settings.kind.name(),
        settings.source.path
    );

    let mut session = Session::new();
    let table = session.load(&settings.source, &settings.schema, &settings.options)?;

    let report = Report::build(&table, &settings).context(MetricsSnafu {})?;
    render::print_report(&report);

    let report_js = render::report_json(&report)?;
    if let Some(out) = &args.out {
        write_output(&report_js, out)?;
    }
    if let Some(reference) = &args.reference {
        check_reference(&report_js, reference)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn data_path(name: &str) -> String {
        format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn csv_source(name: &str) -> DataSource {
        DataSource {
            path: data_path(name),
            input_type: InputType::Csv,
            worksheet: None,
        }
    }

    fn args_for(config: &str) -> Args {
        Args {
            config: Some(data_path(config)),
            reference: None,
            out: None,
            input: None,
            input_type: None,
            survey: None,
            excel_worksheet_name: None,
            filter: vec![],
            top: None,
            verbose: false,
        }
    }

    fn temp_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("surveydash-{}-{}", std::process::id(), name));
        p.display().to_string()
    }

    #[test]
    fn infrastructure_fixture_enriches() {
        let kind = SurveyKind::Infrastructure;
        let table = load_and_enrich(
            &csv_source("infrastructure.csv"),
            &Schema::defaults(kind),
            &EnrichOptions::for_survey(kind),
        )
        .unwrap();
        assert_eq!(table.len(), 8);
        let scores: Vec<Option<u32>> = table
            .derived()
            .iter()
            .map(|d| d.vulnerability_score)
            .collect();
        assert_eq!(
            scores,
            vec![
                Some(10),
                Some(0),
                Some(3),
                Some(0),
                Some(6),
                Some(4),
                Some(0),
                Some(3)
            ]
        );
        for d in table.derived() {
            let idx = d.sanitation_index.unwrap();
            assert!((0.0..=10.0).contains(&idx));
        }
    }

    #[test]
    fn energy_fixture_enriches() {
        let kind = SurveyKind::Energy;
        let table = load_and_enrich(
            &csv_source("energy.csv"),
            &Schema::defaults(kind),
            &EnrichOptions::for_survey(kind),
        )
        .unwrap();
        assert_eq!(table.len(), 8);
        let commitment: Vec<Option<f64>> =
            table.derived().iter().map(|d| d.commitment_pct).collect();
        assert_eq!(
            commitment,
            vec![
                Some(20.0),
                Some(2.5),
                Some(20.0),
                Some(5.0),
                None,
                Some(12.5),
                Some(6.67),
                Some(3.0)
            ]
        );
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let kind = SurveyKind::Energy;
        let res = load_and_enrich(
            &csv_source("does_not_exist.csv"),
            &Schema::defaults(kind),
            &EnrichOptions::for_survey(kind),
        );
        assert!(matches!(res, Err(SurveyError::ReadingFile { .. })));
    }

    #[test]
    fn wrong_survey_is_a_schema_error() {
        let res = load_and_enrich(
            &csv_source("energy.csv"),
            &Schema::defaults(SurveyKind::Infrastructure),
            &EnrichOptions::for_survey(SurveyKind::Infrastructure),
        );
        match res {
            Err(SurveyError::Metrics {
                source: MetricsError::MissingColumns { columns },
            }) => assert_eq!(columns.len(), 7),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn session_reuses_tables() {
        let kind = SurveyKind::Energy;
        let schema = Schema::defaults(kind);
        let options = EnrichOptions::for_survey(kind);
        let source = csv_source("energy.csv");
        let mut session = Session::new();
        let a = session.load(&source, &schema, &options).unwrap();
        let b = session.load(&source, &schema, &options).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(session.cache_stats(), (1, 1));

        assert!(session.invalidate(&source.path));
        let c = session.load(&source, &schema, &options).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*a, *c);

        session.clear();
        assert!(!session.invalidate(&source.path));
    }

    #[test]
    fn filters_from_the_command_line() {
        let mut config = DashboardConfig::default();
        let mut args = args_for("energy_config.json");
        args.filter = vec!["state=SP".to_string(), "state = RJ".to_string()];
        args.top = Some(3);
        merge_args(&mut config, &args).unwrap();
        assert_eq!(
            config.filters.get("state"),
            Some(&vec!["SP".to_string(), "RJ".to_string()])
        );
        assert_eq!(config.top_n, Some(3));

        args.filter = vec!["state".to_string()];
        assert!(matches!(
            merge_args(&mut config, &args),
            Err(SurveyError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn reference_round_trip() {
        let out = temp_path("energy_report.json");
        let mut args = args_for("energy_config.json");
        args.out = Some(out.clone());
        run_dashboard(&args).unwrap();

        // The report just written is its own reference.
        args.out = None;
        args.reference = Some(out.clone());
        run_dashboard(&args).unwrap();

        // Another selection of rows gives another report.
        args.filter = vec!["state=SP".to_string()];
        let res = run_dashboard(&args);
        assert!(matches!(res, Err(SurveyError::ReferenceMismatch { .. })));
        let _ = fs::remove_file(out);
    }

    #[test]
    fn infrastructure_dashboard_runs() {
        let mut args = args_for("infrastructure_config.json");
        args.top = Some(2);
        run_dashboard(&args).unwrap();
    }
}
