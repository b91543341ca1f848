use clap::Parser;

/// This program computes the dashboards of household surveys.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the survey, its columns and the settings of the dashboard.
    /// For more information about the file format, read the documentation of the survey_metrics::manual module.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference report in JSON format. If provided, surveydash will
    /// check that the computed report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the report will be written in JSON format to the given
    /// location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The survey table. Setting this option overrides the path that may be specified
    /// with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv or xlsx) The type of the input. Guessed from the file extension when not given.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (infrastructure or energy) The survey the input comes from.
    #[clap(long, value_parser)]
    pub survey: Option<String>,

    /// When using an Excel file with several worksheets, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (field=value, repeatable) Only keeps the rows with this answer. Filters on the same field
    /// are combined with 'or', filters on different fields with 'and'.
    #[clap(long, value_parser)]
    pub filter: Vec<String>,

    /// (default 10) The number of entries in the rankings of the dashboard.
    #[clap(long, value_parser)]
    pub top: Option<usize>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
