// Primitives for reading CSV files.

use survey_metrics::builder::TableBuilder;

use crate::survey::{io_common::strip_bom, *};

/// Reads a delimited table. The first record is the header.
pub fn read_csv_table(path: &str, content: &[u8]) -> SurveyResult<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(strip_bom(content));
    let mut records = rdr.records();

    let header = records
        .next()
        .context(MissingHeaderSnafu { path })?
        .context(CsvRecordSnafu { path, lineno: 1usize })?;
    let headers: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    debug!("read_csv_table: headers: {:?}", headers);

    let mut builder = TableBuilder::new(&headers);
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvRecordSnafu { path, lineno })?;
        let fields: Vec<&str> = line.iter().collect();
        builder.add_text_row(&fields);
    }
    debug!("read_csv_table: {} rows", builder.num_rows());
    Ok(builder.build())
}
