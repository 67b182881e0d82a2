//! Integration tests for loading and summarising goniometry files

use datai::analysis::{
    load_dataset_from_bytes, load_dataset_from_path, read_table_from_path, AnalysisReport, DatasetCache,
    NumberFormat,
};
use datai::config::AnalysisConfig;
use datai::AnalysisError;
use std::io::Write;
use tempfile::TempDir;

/// Cell written into a generated worksheet
enum Cell {
    Text(&'static str),
    Number(f64),
}

/// A minimal single-sheet .xlsx; `None` rows are left out of the sheet
fn workbook(rows: &[Option<Vec<Cell>>]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let Some(cells) = row else { continue };
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in cells.iter().enumerate() {
            let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            match cell {
                Cell::Text(text) => sheet.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#
                )),
                Cell::Number(value) => sheet.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#)),
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Coleta" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#
                .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#
                .to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in parts {
        archive.start_file(name, SimpleFileOptions::default()).unwrap();
        archive.write_all(content.as_bytes()).unwrap();
    }
    archive.finish().unwrap().into_inner()
}

fn gait_workbook() -> Vec<u8> {
    use Cell::{Number, Text};
    workbook(&[
        Some(vec![Text("Time"), Text("Goniometry UpLeg Angle"), Text("Goniometry Leg Angle")]),
        Some(vec![Number(0.0), Number(12.5), Number(-4.0)]),
        // A gap in the sheet becomes an empty row that is skipped
        None,
        Some(vec![Number(0.5), Number(32.5), Number(-14.0)]),
        Some(vec![Number(1.0), Number(22.0), Number(-9.0)]),
    ])
}

fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content).unwrap();
    path
}

#[test]
fn test_semicolon_file_with_comma_decimals() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "patient.csv",
        "\u{feff}Time;Goniometry UpLeg Angle;Goniometry Leg Angle;Notes\n\
         0,0;10,5;-5,0;start\n\
         0,1;20,0;;\n\
         ;99,0;99,0;no time\n\
         0,2;30,5;-10,0;end\n"
            .as_bytes(),
    );

    let dataset = load_dataset_from_path(&path, NumberFormat::DecimalComma, &AnalysisConfig::default()).unwrap();
    assert_eq!(dataset.source, "patient.csv");
    assert_eq!(dataset.time_column, "Time");
    // The row without a time is dropped
    assert_eq!(dataset.time, vec![0.0, 0.1, 0.2]);

    let report = AnalysisReport::from_dataset(&dataset);
    assert_eq!(report.columns, vec!["Goniometry UpLeg Angle", "Goniometry Leg Angle"]);

    let thigh = &report.stats[0];
    assert_eq!(thigh.name, "Thigh");
    assert_eq!((thigh.min, thigh.max), (10.5, 30.5));
    assert_eq!(thigh.time_of_max, Some(0.2));
    assert_eq!(report.formatted[0].mean, "20,3°");

    // The empty shank cell is skipped, not treated as zero
    let shank = &report.stats[1];
    assert_eq!(shank.samples, 2);
    assert_eq!(shank.mean, -7.5);
    assert_eq!(report.chart.data[1].y, vec![Some(-5.0), None, Some(-10.0)]);
}

#[test]
fn test_keyword_detection_without_preferred_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "knee.csv",
        b"Tempo,right_knee_angle,Marker X\n0,5,1\n1,15,2\n2,10,3\n",
    );

    let dataset = load_dataset_from_path(&path, NumberFormat::Robust, &AnalysisConfig::default()).unwrap();
    assert_eq!(dataset.time_column, "Tempo");
    assert_eq!(dataset.labels(), vec!["Right Knee Angle"]);
    assert_eq!(dataset.duration(), Some(2.0));

    let report = AnalysisReport::from_dataset(&dataset);
    assert_eq!(report.stats[0].range, 10.0);
    assert_eq!(report.formatted[0].range, "10,0°");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_dataset_from_path(&dir.path().join("gone.csv"), NumberFormat::Robust, &AnalysisConfig::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Io(_)));
}

#[test]
fn test_file_without_angles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "flat.csv", b"Time,Speed\n0,1\n1,2\n");

    let err = load_dataset_from_path(&path, NumberFormat::Robust, &AnalysisConfig::default()).unwrap_err();
    match err {
        AnalysisError::MissingColumns { found } => assert_eq!(found, vec!["Time", "Speed"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_cache_reloads_after_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "walk.csv", b"Time;Knee Angle\n0;1\n1;2\n");
    let config = AnalysisConfig::default();
    let cache = DatasetCache::new(4);

    let first = cache.get_or_load(&path, NumberFormat::DecimalComma, &config).await.unwrap();
    assert_eq!(first.rows(), 2);

    write_file(&dir, "walk.csv", b"Time;Knee Angle\n0;1\n1;2\n2;3\n");
    let cached = cache.get_or_load(&path, NumberFormat::DecimalComma, &config).await.unwrap();
    assert_eq!(cached.rows(), 2);

    cache.invalidate(std::slice::from_ref(&path)).await;
    let reloaded = cache.get_or_load(&path, NumberFormat::DecimalComma, &config).await.unwrap();
    assert_eq!(reloaded.rows(), 3);
}

#[test]
fn test_xlsx_first_sheet_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "coleta.xlsx", &gait_workbook());

    let table = read_table_from_path(&path).unwrap();
    assert_eq!(table.headers, vec!["Time", "Goniometry UpLeg Angle", "Goniometry Leg Angle"]);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.cell(1, 1), "32.5");

    let dataset = load_dataset_from_path(&path, NumberFormat::DecimalComma, &AnalysisConfig::default()).unwrap();
    assert_eq!(dataset.time, vec![0.0, 0.5, 1.0]);

    let report = AnalysisReport::from_dataset(&dataset);
    assert_eq!(report.stats[0].name, "Thigh");
    assert_eq!((report.stats[0].min, report.stats[0].max), (12.5, 32.5));
    assert_eq!(report.formatted[0].mean, "22,3°");
    assert_eq!(report.stats[1].name, "Shank");
    assert_eq!(report.formatted[1].min, "-14,0°");
}

#[test]
fn test_xlsx_upload_from_bytes() {
    let dataset = load_dataset_from_bytes(
        "coleta.xlsx",
        &gait_workbook(),
        NumberFormat::Robust,
        &AnalysisConfig::default(),
    )
    .unwrap();
    assert_eq!(dataset.rows(), 3);
    assert_eq!(dataset.labels(), vec!["Thigh", "Shank"]);
}
