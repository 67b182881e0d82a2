//! Goniometry file analysis
//!
//! Provides:
//! - CSV/Excel loading into a string table
//! - Time and joint-angle column detection
//! - Decimal-comma aware numeric coercion
//! - Per-column statistics and plotly-compatible chart data
//! - An LRU cache of parsed patient documents

pub mod loader;
pub mod numeric;
pub mod dataset;
pub mod stats;
pub mod chart;
pub mod cache;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

pub use loader::{FileFormat, RawTable, read_table_from_bytes, read_table_from_path};
pub use numeric::NumberFormat;
pub use dataset::{AngleSeries, Dataset, build_dataset, detect_columns, display_label};
pub use stats::{AngleStats, FormattedStats, compute_stats, format_degrees};
pub use chart::ChartFigure;
pub use cache::DatasetCache;

/// Everything a client needs to show one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: String,
    pub time_column: String,
    pub rows: usize,
    /// Angle columns that had data
    pub columns: Vec<String>,
    pub duration: Option<f64>,
    pub stats: Vec<AngleStats>,
    pub formatted: Vec<FormattedStats>,
    pub chart: ChartFigure,
}

impl AnalysisReport {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let stats = compute_stats(dataset);
        let formatted = stats.iter().map(AngleStats::formatted).collect();

        Self {
            source: dataset.source.clone(),
            time_column: dataset.time_column.clone(),
            rows: dataset.rows(),
            columns: dataset.series.iter().map(|s| s.column.clone()).collect(),
            duration: dataset.duration(),
            stats,
            formatted,
            chart: ChartFigure::joint_angles(dataset),
        }
    }
}

/// Parse a stored document
pub fn load_dataset_from_path(
    path: &Path,
    format: NumberFormat,
    config: &AnalysisConfig,
) -> Result<Dataset, AnalysisError> {
    let table = read_table_from_path(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    build_dataset(&source, &table, format, config)
}

/// Parse an upload held in memory
pub fn load_dataset_from_bytes(
    name: &str,
    bytes: &[u8],
    format: NumberFormat,
    config: &AnalysisConfig,
) -> Result<Dataset, AnalysisError> {
    let table = read_table_from_bytes(name, bytes)?;
    build_dataset(name, &table, format, config)
}
