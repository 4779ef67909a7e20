//! # kmz2shp-core
//!
//! KML/KMZ to ESRI Shapefile conversion.
//!
//! This crate reads Google Earth documents, recovers geometry and
//! attributes from every placemark, and writes one Shapefile per geometry
//! kind with a DBF schema inferred from the attribute values.
//!
//! ## Supported Inputs
//!
//! | Format | Extension | Description |
//! |--------|-----------|-------------|
//! | KML | `.kml` | Keyhole Markup Language (OGC 2.2, legacy Google namespaces) |
//! | KMZ | `.kmz` | Zipped KML (`doc.kml` or the first `.kml` member) |
//!
//! Files with other extensions are sniffed for the ZIP magic bytes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use kmz2shp_core::{convert_path, ConvertOptions};
//!
//! // Writes landmarks_point.shp, landmarks_line.shp, ... next to the input
//! let tables = convert_path(Path::new("landmarks.kmz"), None, &ConvertOptions::default())?;
//!
//! for table in &tables {
//!     println!("{}: {} feature(s)", table.path.display(), table.feature_count);
//! }
//! # Ok::<(), kmz2shp_core::ConvertError>(())
//! ```
//!
//! ### Converting in memory
//!
//! ```
//! use std::path::Path;
//! use kmz2shp_core::{convert_document, ConvertOptions, MemoryWriter};
//!
//! let text = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
//!   <Placemark>
//!     <name>Gate</name>
//!     <description><![CDATA[<table><tr><td>Height</td><td>2.5</td></tr></table>]]></description>
//!     <Point><coordinates>-122.08,37.42,0</coordinates></Point>
//!   </Placemark>
//! </Document></kml>"#;
//!
//! let mut writer = MemoryWriter::new();
//! let options = ConvertOptions::default();
//! let tables = convert_document(text, Path::new("gates"), &options, &mut writer)?;
//! assert_eq!(tables.len(), 1);
//! assert_eq!(tables[0].path, Path::new("gates_point.shp"));
//! # Ok::<(), kmz2shp_core::ConvertError>(())
//! ```
//!
//! ## Output Tables
//!
//! | Geometry | Suffix | Shape type |
//! |----------|--------|------------|
//! | Point, MultiPoint | `_point.shp` | Point (MultiPoint if any feature has several points) |
//! | LineString, MultiLineString | `_line.shp` | PolyLine |
//! | Polygon, MultiPolygon | `_polygon.shp` | Polygon |
//! | none (kept on request) | `_nogeom.dbf` | attribute table only |
//!
//! Geometry collections are split into their members; with more than one
//! member each part is named `<name>_<index>`.
//!
//! ## Attributes
//!
//! | Source | Rule |
//! |--------|------|
//! | `<description>` HTML | each `<tr>` with a `th`/`td` or `td`/`td` pair |
//! | `<ExtendedData>` | `SimpleData` and `Data`/`value`, overriding the description |
//! | `<name>` | always written to the `name` field |
//!
//! Values become integers, floats, text or null. Field names are cleaned to
//! `[A-Za-z0-9_]` and shortened to the DBF limit of 10 characters, with
//! `_1`, `_2`, ... suffixes on collision.
//!
//! ## Coordinates
//!
//! Output is always WGS84 (EPSG:4326) longitude/latitude. Altitude is
//! discarded. No reprojection, validation or repair is performed.

pub mod attributes;
pub mod converter;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod kml;
pub mod kmz;
pub mod schema;
pub mod writer;
pub mod xml;

pub use attributes::{coerce, AttributeValue, Attributes};
pub use converter::{
    build_features, build_schema, convert_document, convert_path, group_features, output_path,
    ConvertOptions, Feature, OutputGroup, TableKind, WrittenTable,
};
pub use error::{ConvertError, Result};
pub use fields::{resolve_field_names, FieldMapping};
pub use geometry::{classify, Coord, Geometry, GeometryClass, Polygon};
pub use kml::{KmlDocument, Placemark};
pub use kmz::{extract_kml, is_kmz, KmzArchive};
pub use schema::{FieldDef, FieldType, ShapeLayout, TableSchema, WGS84};
pub use writer::{
    MemoryTable, MemoryWriter, Properties, ShapefileTable, ShapefileWriter, TableWriter,
};
