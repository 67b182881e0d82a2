//! Reading CSV and spreadsheet uploads into a table of strings

use calamine::{Reader, Sheets};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::AnalysisError;

/// File formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    /// Pick the format from a file name's extension
    pub fn from_name(name: &str) -> Result<Self, AnalysisError> {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(FileFormat::Spreadsheet),
            _ => Err(AnalysisError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Header row plus data rows, all cells as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Cell text, empty when the row is short
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Read a stored document
pub fn read_table_from_path(path: &Path) -> Result<RawTable, AnalysisError> {
    let name = path.to_string_lossy();
    match FileFormat::from_name(&name)? {
        FileFormat::Csv => {
            let bytes = std::fs::read(path)?;
            read_csv(&bytes)
        }
        FileFormat::Spreadsheet => {
            let sheets = calamine::open_workbook_auto(path)
                .map_err(|e| AnalysisError::Spreadsheet(e.to_string()))?;
            read_first_sheet(sheets)
        }
    }
}

/// Read an upload that is only held in memory
pub fn read_table_from_bytes(name: &str, bytes: &[u8]) -> Result<RawTable, AnalysisError> {
    match FileFormat::from_name(name)? {
        FileFormat::Csv => read_csv(bytes),
        FileFormat::Spreadsheet => {
            let sheets = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
                .map_err(|e| AnalysisError::Spreadsheet(e.to_string()))?;
            read_first_sheet(sheets)
        }
    }
}

/// Parse CSV text, sniffing the delimiter from the header line
pub fn read_csv(bytes: &[u8]) -> Result<RawTable, AnalysisError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(bytes))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

/// The most frequent of `;`, tab and `,` on the first line wins
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
    [b';', b'\t', b',']
        .into_iter()
        .map(|d| (d, first_line.iter().filter(|&&b| b == d).count()))
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(_, n)| n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

fn read_first_sheet<RS: Read + Seek>(mut sheets: Sheets<RS>) -> Result<RawTable, AnalysisError> {
    let range = sheets
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| AnalysisError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows().map(|row| {
        row.iter().map(|cell| cell.to_string().trim().to_string()).collect::<Vec<_>>()
    });

    let headers = rows.next().unwrap_or_default();
    let rows = rows
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(FileFormat::from_name("trial.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_name("trial.xlsx").unwrap(), FileFormat::Spreadsheet);
        assert!(matches!(
            FileFormat::from_name("trial.txt"),
            Err(AnalysisError::UnsupportedFormat(_))
        ));
        assert!(FileFormat::from_name("noext").is_err());
    }

    #[test]
    fn test_semicolon_csv_with_decimal_commas() {
        let text = "\u{feff}Time ; Goniometry Leg Angle\n0,0;12,5\n0,1;13,0\n\n";
        let table = read_csv(text.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Time", "Goniometry Leg Angle"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), "13,0");
    }

    #[test]
    fn test_short_rows_are_padded_on_read() {
        let table = read_csv(b"Time,Knee Angle,Hip Angle\n0,10,20\n1,11\n").unwrap();
        assert_eq!(table.cell(1, 2), "");
        assert_eq!(table.column_index("Hip Angle"), Some(2));
    }

    #[test]
    fn test_tab_delimiter() {
        let table = read_csv(b"Time\tKnee Angle\n0\t10\n").unwrap();
        assert_eq!(table.headers.len(), 2);
    }

    #[test]
    fn test_invalid_spreadsheet_bytes() {
        let result = read_table_from_bytes("broken.xlsx", b"not a zip");
        assert!(matches!(result, Err(AnalysisError::Spreadsheet(_))));
    }
}
