use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xlsx};
use survey_metrics::builder::TableBuilder;

use crate::survey::*;

/// Reads a worksheet. The first row is the header.
pub fn read_xlsx_table(
    path: &str,
    content: Vec<u8>,
    worksheet: Option<&str>,
) -> SurveyResult<RawTable> {
    let wrange = get_range(path, content, worksheet)?;

    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    let headers: Vec<String> = header
        .iter()
        .map(|c| {
            cell_of(c)
                .as_text()
                .map(|s| s.into_owned())
                .unwrap_or_default()
        })
        .collect();
    debug!("read_xlsx_table: header: {:?}", headers);

    let mut builder = TableBuilder::new(&headers);
    for row in iter {
        builder.add_row(row.iter().map(cell_of).collect());
    }
    debug!("read_xlsx_table: {} rows", builder.num_rows());
    Ok(builder.build())
}

fn cell_of(c: &DataType) -> Cell {
    match c {
        DataType::Empty => Cell::Empty,
        DataType::String(s) => Cell::from_text(s),
        DataType::Float(f) => Cell::Number(*f),
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Bool(b) => Cell::Text(b.to_string()),
        DataType::Error(_) => Cell::Empty,
        other => Cell::from_text(&other.to_string()),
    }
}

fn get_range(
    path: &str,
    content: Vec<u8>,
    worksheet_name_o: Option<&str>,
) -> SurveyResult<Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(content)).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        workbook
            .worksheet_range(worksheet_name)
            .context(MissingWorksheetSnafu {
                path,
                name: worksheet_name,
            })?
            .context(OpeningExcelSnafu { path })
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => EmptyExcelSnafu { path }.fail(),
            [(worksheet_name, wrange)] => {
                debug!("get_range: using the only worksheet {:?}", worksheet_name);
                Ok(wrange.clone())
            }
            _ => AmbiguousWorksheetSnafu {
                path,
                names: all_worksheets
                    .iter()
                    .map(|(n, _)| n.clone())
                    .collect::<Vec<String>>()
                    .join(", "),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_keep_their_type() {
        assert_eq!(cell_of(&DataType::Float(3.5)), Cell::Number(3.5));
        assert_eq!(cell_of(&DataType::Int(2)), Cell::Number(2.0));
        assert_eq!(
            cell_of(&DataType::String(" Sim ".to_string())),
            Cell::Text("Sim".to_string())
        );
        assert_eq!(cell_of(&DataType::String("  ".to_string())), Cell::Empty);
        assert_eq!(cell_of(&DataType::Empty), Cell::Empty);
    }

    fn workbook(name: &str) -> (String, Vec<u8>) {
        let path = format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name);
        let content = std::fs::read(&path).unwrap();
        (path, content)
    }

    #[test]
    fn reads_the_only_worksheet() {
        let (path, content) = workbook("infrastructure_small.xlsx");
        let t = read_xlsx_table(&path, content, None).unwrap();
        assert_eq!(
            t.headers,
            vec![
                "Zona".to_string(),
                "Quantos banheiros possuem na sua residência?".to_string(),
                "Tem água encanada?".to_string()
            ]
        );
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows[0][0], Cell::Text("Norte".to_string()));
        assert_eq!(t.rows[0][1], Cell::Number(2.0));
        assert_eq!(t.rows[1][1], Cell::Text("1 banheiro".to_string()));
        assert_eq!(t.rows[1][2], Cell::Text("Não".to_string()));
        assert_eq!(t.rows[2][1], Cell::Empty);
    }

    #[test]
    fn named_worksheet() {
        let (path, content) = workbook("two_sheets.xlsx");
        let t = read_xlsx_table(&path, content, Some("Resumo")).unwrap();
        assert_eq!(t.headers, vec!["Indicador".to_string(), "Valor".to_string()]);
        assert_eq!(t.rows[0][1], Cell::Number(3.0));
    }

    #[test]
    fn several_worksheets_need_a_name() {
        let (path, content) = workbook("two_sheets.xlsx");
        match read_xlsx_table(&path, content, None) {
            Err(SurveyError::AmbiguousWorksheet { names, .. }) => {
                assert_eq!(names, "Respostas, Resumo")
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn unknown_worksheet() {
        let (path, content) = workbook("infrastructure_small.xlsx");
        match read_xlsx_table(&path, content, Some("Planilha1")) {
            Err(SurveyError::MissingWorksheet { name, .. }) => assert_eq!(name, "Planilha1"),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn not_a_workbook() {
        let res = read_xlsx_table("x.xlsx", b"Zona,Escolaridade\n".to_vec(), None);
        assert!(matches!(res, Err(SurveyError::OpeningExcel { .. })));
    }
}
