//! Column detection and the parsed time series

use serde::{Deserialize, Serialize};

use super::loader::RawTable;
use super::numeric::{coerce_column, NumberFormat};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

const ANGLE_KEYWORDS: &[&str] = &["angle", "goniometry", "ângulo", "angulo"];

/// One joint-angle column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AngleSeries {
    /// Column header in the file
    pub column: String,
    /// Name shown to clinicians
    pub label: String,
    /// One value per retained row
    pub values: Vec<Option<f64>>,
}

impl AngleSeries {
    /// Valid samples with their time stamps
    pub fn points<'a>(&'a self, time: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
        time.iter()
            .zip(self.values.iter())
            .filter_map(|(t, v)| v.map(|v| (*t, v)))
    }
}

/// A goniometry recording with a valid time axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    /// File the data came from
    pub source: String,
    pub time_column: String,
    pub time: Vec<f64>,
    pub series: Vec<AngleSeries>,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.time.len()
    }

    /// Elapsed time between the first and last sample
    pub fn duration(&self) -> Option<f64> {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => Some(last - first),
            _ => None,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.label.as_str()).collect()
    }
}

/// Locate the time column and the angle columns.
///
/// Configured preferred columns win when present; otherwise any header that
/// mentions an angle keyword is used.
pub fn detect_columns(headers: &[String], config: &AnalysisConfig) -> Result<(usize, Vec<usize>), AnalysisError> {
    let time = config
        .time_column_candidates
        .iter()
        .find_map(|candidate| headers.iter().position(|h| h == candidate));

    let preferred: Vec<usize> = config
        .preferred_angle_columns
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == name))
        .collect();

    let angles = if preferred.is_empty() {
        headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != time)
            .filter(|(_, h)| {
                let lower = h.to_lowercase();
                ANGLE_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .map(|(i, _)| i)
            .collect()
    } else {
        preferred
    };

    match time {
        Some(time) if !angles.is_empty() => Ok((time, angles)),
        _ => Err(AnalysisError::MissingColumns { found: headers.to_vec() }),
    }
}

/// Label shown for a column: configured name, else title-cased header
pub fn display_label(column: &str, config: &AnalysisConfig) -> String {
    if let Some(name) = config.display_names.get(column) {
        return name.clone();
    }
    column
        .replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Build a dataset from a raw table.
///
/// Rows without a valid time are dropped, then angle columns without any
/// valid value are dropped.
pub fn build_dataset(
    source: &str,
    table: &RawTable,
    format: NumberFormat,
    config: &AnalysisConfig,
) -> Result<Dataset, AnalysisError> {
    let (time_idx, angle_idxs) = detect_columns(&table.headers, config)?;

    let column_cells = |idx: usize| {
        (0..table.rows.len())
            .map(|row| table.cell(row, idx))
            .collect::<Vec<&str>>()
    };

    let time_raw = coerce_column(&column_cells(time_idx), format);
    let keep: Vec<usize> = time_raw
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|_| i))
        .collect();

    if keep.is_empty() {
        return Err(AnalysisError::NoValidTime);
    }

    let time: Vec<f64> = keep.iter().filter_map(|&i| time_raw[i]).collect();

    let series: Vec<AngleSeries> = angle_idxs
        .into_iter()
        .filter_map(|idx| {
            let raw = coerce_column(&column_cells(idx), format);
            let values: Vec<Option<f64>> = keep.iter().map(|&i| raw[i]).collect();
            if values.iter().all(Option::is_none) {
                return None;
            }
            let column = table.headers[idx].clone();
            Some(AngleSeries {
                label: display_label(&column, config),
                column,
                values,
            })
        })
        .collect();

    if series.is_empty() {
        return Err(AnalysisError::NoValidAngles);
    }

    tracing::debug!(
        "Parsed {}: {} rows, {} angle columns",
        source,
        time.len(),
        series.len()
    );

    Ok(Dataset {
        source: source.to_string(),
        time_column: table.headers[time_idx].clone(),
        time,
        series,
    })
}
