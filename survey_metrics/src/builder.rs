pub use crate::config::*;
use crate::RawTable;

/// A builder for assembling a survey table row by row.
///
/// Readers of files and tests both go through it, so that every table has
/// rectangular rows and clean headers.
///
/// ```
/// use survey_metrics::builder::TableBuilder;
/// use survey_metrics::Cell;
///
/// let mut builder = TableBuilder::with_headers(&["\u{feff}Zona", "Escolaridade"]);
/// builder.add_text_row(&["Norte", "Médio completo"]);
/// builder.add_row(vec![Cell::from_text("Sul")]);
///
/// let table = builder.build();
/// assert_eq!(table.headers[0], "Zona");
/// assert_eq!(table.rows[1], vec![Cell::from_text("Sul"), Cell::Empty]);
/// ```
pub struct TableBuilder {
    pub(crate) _headers: Vec<String>,
    pub(crate) _rows: Vec<Vec<Cell>>,
}

impl TableBuilder {
    pub fn new(headers: &[String]) -> TableBuilder {
        TableBuilder {
            _headers: headers.iter().map(|h| clean_header(h)).collect(),
            _rows: Vec::new(),
        }
    }

    pub fn with_headers(headers: &[&str]) -> TableBuilder {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        TableBuilder::new(&headers)
    }

    /// Adds a row. Missing trailing cells are empty, extra cells are dropped.
    pub fn add_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self._headers.len(), Cell::Empty);
        self._rows.push(cells);
    }

    /// Adds a row of raw text fields.
    pub fn add_text_row(&mut self, fields: &[&str]) {
        let cells: Vec<Cell> = fields.iter().map(|s| Cell::from_text(s)).collect();
        self.add_row(cells)
    }

    pub fn num_rows(&self) -> usize {
        self._rows.len()
    }

    /// Finishes the table. Rows where every cell is empty are left out.
    pub fn build(self) -> RawTable {
        let rows: Vec<Vec<Cell>> = self
            ._rows
            .into_iter()
            .filter(|r| r.iter().any(|c| *c != Cell::Empty))
            .collect();
        RawTable {
            headers: self._headers,
            rows,
        }
    }
}

fn clean_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_string()
}
