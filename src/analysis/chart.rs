//! Chart data in the JSON shape plotly.js expects
//!
//! Only the figure description is produced here; drawing it is up to the client.

use serde::{Deserialize, Serialize};

use super::dataset::Dataset;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartFigure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

/// A line trace; gaps are `null`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub autosize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Axis {
    pub title: Title,
}

impl Axis {
    fn titled(text: &str) -> Self {
        Self { title: Title { text: text.to_string() } }
    }
}

impl ChartFigure {
    /// One line per angle column against time
    pub fn joint_angles(dataset: &Dataset) -> Self {
        let data = dataset
            .series
            .iter()
            .map(|series| Trace {
                kind: "scatter".to_string(),
                mode: "lines".to_string(),
                name: series.label.clone(),
                x: dataset.time.clone(),
                y: series.values.clone(),
            })
            .collect();

        Self {
            data,
            layout: Layout {
                title: Title { text: "Joint Angles".to_string() },
                xaxis: Axis::titled("Time"),
                yaxis: Axis::titled("Angle (°)"),
                autosize: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dataset::AngleSeries;

    #[test]
    fn test_figure_json_shape() {
        let dataset = Dataset {
            source: "t.csv".to_string(),
            time_column: "Time".to_string(),
            time: vec![0.0, 0.5],
            series: vec![AngleSeries {
                column: "Goniometry Leg Angle".to_string(),
                label: "Shank".to_string(),
                values: vec![Some(1.5), None],
            }],
        };

        let json = serde_json::to_value(ChartFigure::joint_angles(&dataset)).unwrap();
        assert_eq!(json["data"][0]["type"], "scatter");
        assert_eq!(json["data"][0]["mode"], "lines");
        assert_eq!(json["data"][0]["name"], "Shank");
        assert_eq!(json["data"][0]["y"][1], serde_json::Value::Null);
        assert_eq!(json["layout"]["xaxis"]["title"]["text"], "Time");
        assert_eq!(json["layout"]["autosize"], true);
    }
}
