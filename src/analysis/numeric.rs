//! Turning spreadsheet text into numbers

use serde::{Deserialize, Serialize};

/// How decimal separators are interpreted in a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// Every `,` is a decimal separator (`12,5` → 12.5)
    DecimalComma,
    /// If any cell in the column has a `,`, `.` is a thousands separator and
    /// `,` the decimal one (`1.234,5` → 1234.5); otherwise plain parsing
    Robust,
}

/// Parse a column; unparseable cells become `None`
pub fn coerce_column<S: AsRef<str>>(cells: &[S], format: NumberFormat) -> Vec<Option<f64>> {
    let comma_decimals = match format {
        NumberFormat::DecimalComma => true,
        NumberFormat::Robust => cells.iter().any(|c| c.as_ref().contains(',')),
    };

    cells
        .iter()
        .map(|cell| {
            let cell = cell.as_ref().trim();
            if !comma_decimals {
                return parse_number(cell);
            }
            match format {
                NumberFormat::DecimalComma => parse_number(&cell.replace(',', ".")),
                NumberFormat::Robust => parse_number(&cell.replace('.', "").replace(',', ".")),
            }
        })
        .collect()
}

/// Finite numbers only; `NaN` and `inf` count as missing
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_comma() {
        let values = coerce_column(&["12,5", " 3 ", "abc", "", "1.5"], NumberFormat::DecimalComma);
        assert_eq!(values, vec![Some(12.5), Some(3.0), None, None, Some(1.5)]);
    }

    #[test]
    fn test_robust_with_thousands_separator() {
        let values = coerce_column(&["1.234,5", "7,25", "10"], NumberFormat::Robust);
        assert_eq!(values, vec![Some(1234.5), Some(7.25), Some(10.0)]);
    }

    #[test]
    fn test_robust_without_commas_keeps_dots() {
        let values = coerce_column(&["1.5", "-2.25", "x"], NumberFormat::Robust);
        assert_eq!(values, vec![Some(1.5), Some(-2.25), None]);
    }

    #[test]
    fn test_non_finite_is_missing() {
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("-0.5"), Some(-0.5));
    }
}
