//! End-to-end conversion tests
//!
//! Each test writes real Shapefiles into a temp directory and reads them
//! back with the `shapefile` crate.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kmz2shp_core::{convert_path, ConvertError, ConvertOptions, TableKind};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Shape};
use tempfile::TempDir;
use zip::write::{SimpleFileOptions, ZipWriter};

const NS: &str = "http://www.opengis.net/kml/2.2";
const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

fn kml(body: &str) -> String {
    format!(r#"{DECLARATION}<kml xmlns="{NS}"><Document>{body}</Document></kml>"#)
}

fn write_kml(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, kml(body)).unwrap();
    path
}

fn write_kmz(dir: &TempDir, name: &str, member: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("files/icon.png", options).unwrap();
    zip.write_all(b"\x89PNG").unwrap();
    zip.start_file(member, options).unwrap();
    zip.write_all(kml(body).as_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

fn read(path: &Path) -> Vec<(Shape, Record)> {
    shapefile::read(path).unwrap()
}

fn text(record: &Record, field: &str) -> Option<String> {
    match record.get(field) {
        Some(FieldValue::Character(value)) => value.clone(),
        other => panic!("expected character field {field}, got {other:?}"),
    }
}

fn number(record: &Record, field: &str) -> Option<f64> {
    match record.get(field) {
        Some(FieldValue::Numeric(value)) => *value,
        other => panic!("expected numeric field {field}, got {other:?}"),
    }
}

#[test]
fn test_single_point_round_trip() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "single.kml",
        "<Placemark><name>Googleplex</name>\
         <Point><coordinates>-122.084075,37.4220033,0</coordinates></Point></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].kind, TableKind::Point);
    assert_eq!(tables[0].path, dir.path().join("single_point.shp"));
    assert_eq!(tables[0].feature_count, 1);

    let records = read(&tables[0].path);
    assert_eq!(records.len(), 1);
    let (shape, record) = &records[0];
    match shape {
        Shape::Point(p) => {
            assert!((p.x - -122.084_075).abs() < 1e-9);
            assert!((p.y - 37.422_003_3).abs() < 1e-9);
        }
        other => panic!("expected point, got {other}"),
    }
    assert_eq!(text(record, "name").as_deref(), Some("Googleplex"));

    let prj = fs::read_to_string(dir.path().join("single_point.prj")).unwrap();
    assert!(prj.contains("WGS_1984"));
    assert!(dir.path().join("single_point.shx").exists());
    assert!(dir.path().join("single_point.dbf").exists());
}

#[test]
fn test_point_and_line_give_two_tables() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "mixed.kml",
        "<Placemark><name>Stop</name><Point><coordinates>1,1</coordinates></Point></Placemark>\
         <Folder><Placemark><name>Route</name>\
         <LineString><coordinates>0,0,10 1,1,20 2,0,30</coordinates></LineString>\
         </Placemark></Folder>",
    );
    let base = dir.path().join("out").join("transit");

    let tables = convert_path(&input, Some(&base), &ConvertOptions::default()).unwrap();
    let paths: Vec<&Path> = tables.iter().map(|t| t.path.as_path()).collect();
    assert_eq!(
        paths,
        [
            dir.path().join("out/transit_point.shp").as_path(),
            dir.path().join("out/transit_line.shp").as_path()
        ]
    );

    let lines = read(&tables[1].path);
    match &lines[0].0 {
        Shape::Polyline(line) => {
            assert_eq!(line.parts().len(), 1);
            assert_eq!(line.parts()[0].len(), 3);
        }
        other => panic!("expected polyline, got {other}"),
    }
}

#[test]
fn test_polygon_with_hole() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "park.kml",
        "<Placemark><name>Park</name><Polygon>\
         <outerBoundaryIs><LinearRing>\
         <coordinates>0,0 0,10 10,10 10,0 0,0</coordinates>\
         </LinearRing></outerBoundaryIs>\
         <innerBoundaryIs><LinearRing>\
         <coordinates>2,2 4,2 4,4 2,4 2,2</coordinates>\
         </LinearRing></innerBoundaryIs>\
         </Polygon></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables[0].kind, TableKind::Polygon);

    let records = read(&tables[0].path);
    match &records[0].0 {
        Shape::Polygon(polygon) => {
            assert_eq!(polygon.rings().len(), 2);
            assert!(matches!(polygon.rings()[0], PolygonRing::Outer(_)));
            assert!(matches!(polygon.rings()[1], PolygonRing::Inner(_)));
        }
        other => panic!("expected polygon, got {other}"),
    }
}

#[test]
fn test_attribute_types_survive() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "wells.kml",
        r#"<Placemark><name>Well 1</name>
             <description><![CDATA[<table>
               <tr><th>Depth (m)</th><td>120.5</td></tr>
               <tr><th>Capacity</th><td>300</td></tr>
               <tr><th>Operator</th><td>Acme</td></tr>
               <tr><th>Inspected</th><td>&lt;Null&gt;</td></tr>
             </table>]]></description>
             <Point><coordinates>3,4</coordinates></Point></Placemark>
           <Placemark><name>Well 2</name>
             <ExtendedData><SchemaData>
               <SimpleData name="Capacity">-15</SimpleData>
             </SchemaData></ExtendedData>
             <Point><coordinates>5,6</coordinates></Point></Placemark>"#,
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    let names: Vec<&str> = tables[0].fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["Capacity", "Depth_m", "Inspected", "Operator", "name"]);

    let records = read(&tables[0].path);
    assert_eq!(records.len(), 2);
    let first = &records[0].1;
    assert_eq!(number(first, "Capacity"), Some(300.0));
    assert_eq!(number(first, "Depth_m"), Some(120.5));
    assert_eq!(text(first, "Operator").as_deref(), Some("Acme"));
    assert_eq!(text(first, "Inspected"), None);

    let second = &records[1].1;
    assert_eq!(number(second, "Capacity"), Some(-15.0));
    assert_eq!(number(second, "Depth_m"), None);
    assert_eq!(text(second, "name").as_deref(), Some("Well 2"));
}

#[test]
fn test_long_field_names_are_distinct() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "long.kml",
        r#"<Placemark><ExtendedData>
             <Data name="verylongfield1"><value>a</value></Data>
             <Data name="verylongfield2"><value>b</value></Data>
             <Data name="verylongfield3"><value>c</value></Data>
           </ExtendedData><Point><coordinates>0,0</coordinates></Point></Placemark>"#,
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    let record = &read(&tables[0].path)[0].1;
    assert_eq!(text(record, "verylongfi").as_deref(), Some("a"));
    assert_eq!(text(record, "verylong_1").as_deref(), Some("b"));
    assert_eq!(text(record, "verylong_2").as_deref(), Some("c"));
}

#[test]
fn test_kmz_input() {
    let dir = TempDir::new().unwrap();
    let input = write_kmz(
        &dir,
        "bundle.kmz",
        "doc.kml",
        "<Placemark><name>Zipped</name><Point><coordinates>7,8</coordinates></Point></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables[0].path, dir.path().join("bundle_point.shp"));
    let record = &read(&tables[0].path)[0].1;
    assert_eq!(text(record, "name").as_deref(), Some("Zipped"));
}

#[test]
fn test_kmz_detected_by_magic() {
    let dir = TempDir::new().unwrap();
    let input = write_kmz(
        &dir,
        "download",
        "layers/Roads.KML",
        "<Placemark><LineString><coordinates>0,0 5,5</coordinates></LineString></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables[0].kind, TableKind::LineString);
    assert_eq!(tables[0].path, dir.path().join("download_line.shp"));
}

#[test]
fn test_multigeometry_points_use_multipoint() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "multi.kml",
        "<Placemark><name>Pair</name><MultiGeometry>\
         <Point><coordinates>0,0</coordinates></Point><Point><coordinates>1,1</coordinates></Point>\
         </MultiGeometry></Placemark>\
         <Placemark><name>Single</name><Point><coordinates>2,2</coordinates></Point></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables.len(), 1);
    let records = read(&tables[0].path);
    let counts: Vec<usize> = records
        .iter()
        .map(|(shape, _)| match shape {
            Shape::Multipoint(mp) => mp.points().len(),
            other => panic!("expected multipoint, got {other}"),
        })
        .collect();
    assert_eq!(counts, [2, 1]);
}

#[test]
fn test_mixed_multigeometry_is_split() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "site.kml",
        "<Placemark><name>Site</name><MultiGeometry>\
         <Point><coordinates>0,0</coordinates></Point>\
         <LineString><coordinates>0,0 1,0</coordinates></LineString>\
         </MultiGeometry></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables.len(), 2);
    let point = &read(&tables[0].path)[0].1;
    let line = &read(&tables[1].path)[0].1;
    assert_eq!(text(point, "name").as_deref(), Some("Site_0"));
    assert_eq!(text(line, "name").as_deref(), Some("Site_1"));
}

#[test]
fn test_null_geometry_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "partial.kml",
        "<Placemark><name>Here</name><Point><coordinates>1,2</coordinates></Point></Placemark>\
         <Placemark><name>Nowhere</name><Point><coordinates>bad</coordinates></Point></Placemark>",
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].feature_count, 1);
    assert!(!dir.path().join("partial_nogeom.dbf").exists());
}

#[test]
fn test_null_geometry_kept_in_attribute_table() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(&dir, "empty.kml", "<Placemark><name>Nowhere</name></Placemark>");

    let err = convert_path(&input, None, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Conversion(_)));

    let options = ConvertOptions {
        skip_null_geometry: false,
    };
    let tables = convert_path(&input, None, &options).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].kind, TableKind::Attributes);
    assert_eq!(tables[0].path, dir.path().join("empty_nogeom.dbf"));

    let records = shapefile::dbase::read(&tables[0].path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(text(&records[0], "name").as_deref(), Some("Nowhere"));
}

#[test]
fn test_no_placemarks_is_error() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(&dir, "blank.kml", "<Folder><name>Nothing here</name></Folder>");
    let err = convert_path(&input, None, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Conversion(_)));
}

#[test]
fn test_malformed_xml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.kml");
    fs::write(&input, "<kml><Document><Placemark></Document>").unwrap();
    let err = convert_path(&input, None, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Parse(_)));
}

#[test]
fn test_kmz_without_kml_is_extraction_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("images.kmz");
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    zip.start_file("icon.png", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"\x89PNG").unwrap();
    zip.finish().unwrap();

    let err = convert_path(&path, None, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Extraction(ref m) if m.contains("icon.png")));
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = convert_path(&dir.path().join("nope.kml"), None, &ConvertOptions::default())
        .unwrap_err();
    assert!(matches!(err, ConvertError::Conversion(ref m) if m.contains("not found")));
}

#[test]
fn test_large_integer_kept_exactly() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "parcels.kml",
        r#"<Placemark><name>Lot</name>
             <ExtendedData><Data name="ParcelID"><value>1234567890123456789</value></Data>
             </ExtendedData>
             <Point><coordinates>1,2</coordinates></Point></Placemark>
           <Placemark><name>Lot 2</name>
             <ExtendedData><Data name="ParcelID"><value>42</value></Data></ExtendedData>
             <Point><coordinates>3,4</coordinates></Point></Placemark>"#,
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    let records = read(&tables[0].path);
    assert_eq!(
        text(&records[0].1, "ParcelID").as_deref(),
        Some("1234567890123456789")
    );
    assert_eq!(text(&records[1].1, "ParcelID").as_deref(), Some("42"));
}

#[test]
fn test_huge_float_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "stars.kml",
        r#"<Placemark><name>Far</name>
             <ExtendedData><Data name="Distance"><value>1.5e300</value></Data></ExtendedData>
             <Point><coordinates>1,2</coordinates></Point></Placemark>
           <Placemark><name>Near</name>
             <ExtendedData><Data name="Distance"><value>4.2</value></Data></ExtendedData>
             <Point><coordinates>3,4</coordinates></Point></Placemark>"#,
    );

    let tables = convert_path(&input, None, &ConvertOptions::default()).unwrap();
    let records = read(&tables[0].path);
    assert_eq!(records.len(), 2);
    assert_eq!(text(&records[0].1, "Distance").as_deref(), Some("1.5e300"));
    assert_eq!(text(&records[1].1, "Distance").as_deref(), Some("4.2"));
}

#[test]
fn test_non_utf8_kml_is_extraction_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("latin1.kml");
    fs::write(
        &input,
        b"<kml><Document><Placemark><name>Caf\xe9</name></Placemark></Document></kml>",
    )
    .unwrap();

    let err = convert_path(&input, None, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Extraction(ref m) if m.contains("UTF-8")));
}

#[test]
fn test_unwritable_output_is_write_error() {
    let dir = TempDir::new().unwrap();
    let input = write_kml(
        &dir,
        "stop.kml",
        "<Placemark><name>Stop</name><Point><coordinates>1,2</coordinates></Point></Placemark>",
    );
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"regular file").unwrap();

    let base = blocker.join("out").join("stop");
    let err = convert_path(&input, Some(&base), &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Write(_)));
}
