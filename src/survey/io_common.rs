use std::fmt::Display;
use std::path::Path;

use crate::survey::*;

/// The file formats a survey table can be read from.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Csv,
    Xlsx,
}

impl InputType {
    /// The declared type, or the one suggested by the file extension.
    pub fn infer(path: &str, declared: Option<&str>) -> SurveyResult<InputType> {
        let name = match declared {
            Some(t) => t.trim().to_lowercase(),
            None => Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_else(|| "csv".to_string()),
        };
        match name.as_str() {
            "csv" | "txt" => Ok(InputType::Csv),
            "xlsx" | "excel" => Ok(InputType::Xlsx),
            _ => UnknownInputTypeSnafu { input_type: name }.fail(),
        }
    }
}

impl Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputType::Csv => write!(f, "csv"),
            InputType::Xlsx => write!(f, "xlsx"),
        }
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

pub fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content)
}
