//! Summary statistics per angle column

use serde::{Deserialize, Serialize};

use super::dataset::{AngleSeries, Dataset};

/// Min/max/mean of one angle column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AngleStats {
    /// Display label
    pub name: String,
    /// Column header
    pub column: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Range of motion (max - min)
    pub range: f64,
    /// Number of valid samples
    pub samples: usize,
    /// Time at which the maximum was reached
    pub time_of_max: Option<f64>,
    /// Time at which the minimum was reached
    pub time_of_min: Option<f64>,
}

impl AngleStats {
    /// `None` when the series has no valid value
    pub fn from_series(series: &AngleSeries, time: &[f64]) -> Option<Self> {
        let mut samples = 0usize;
        let mut sum = 0.0;
        let mut min: Option<(f64, f64)> = None;
        let mut max: Option<(f64, f64)> = None;

        for (t, v) in series.points(time) {
            samples += 1;
            sum += v;
            if min.map_or(true, |(m, _)| v < m) {
                min = Some((v, t));
            }
            if max.map_or(true, |(m, _)| v > m) {
                max = Some((v, t));
            }
        }

        let (min, time_of_min) = min?;
        let (max, time_of_max) = max?;

        Some(Self {
            name: series.label.clone(),
            column: series.column.clone(),
            min,
            max,
            mean: sum / samples as f64,
            range: max - min,
            samples,
            time_of_max: Some(time_of_max),
            time_of_min: Some(time_of_min),
        })
    }

    /// Clinician-facing strings: comma decimals and a degree sign
    pub fn formatted(&self) -> FormattedStats {
        FormattedStats {
            name: self.name.clone(),
            min: format_degrees(Some(self.min), None),
            max: format_degrees(Some(self.max), None),
            mean: format_degrees(Some(self.mean), Some(1)),
            range: format_degrees(Some(self.range), Some(1)),
        }
    }
}

/// Statistics rendered for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormattedStats {
    pub name: String,
    pub min: String,
    pub max: String,
    pub mean: String,
    pub range: String,
}

/// Statistics for every series of a dataset
pub fn compute_stats(dataset: &Dataset) -> Vec<AngleStats> {
    dataset
        .series
        .iter()
        .filter_map(|s| AngleStats::from_series(s, &dataset.time))
        .collect()
}

/// Format an angle as `12,5°`; `-` when missing.
///
/// Without `decimals` the value keeps its natural precision, but always shows
/// at least one decimal (`12` → `12,0°`).
pub fn format_degrees(value: Option<f64>, decimals: Option<usize>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "-".to_string();
    };
    let text = match decimals {
        Some(d) => format!("{:.*}", d, value),
        None => {
            let text = format!("{}", value);
            if text.contains('.') { text } else { format!("{}.0", text) }
        }
    };
    format!("{}°", text.replace('.', ","))
}
