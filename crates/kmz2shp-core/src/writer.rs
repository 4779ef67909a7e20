//! Table writers
//!
//! The converter hands each output table to a [`TableWriter`]: open with a
//! schema, write one record per feature, close. [`ShapefileWriter`] writes
//! ESRI Shapefiles (`.shp`, `.shx`, `.dbf`, plus `.prj` and `.cpg`);
//! [`MemoryWriter`] keeps everything in memory for callers that want the
//! records without touching the disk.
//!
//! ## Shapefile notes
//!
//! | Layout | Accepted geometries | Shape type |
//! |--------|---------------------|------------|
//! | `Point` | `Point` | Point |
//! | `MultiPoint` | `Point`, `MultiPoint` | MultiPoint |
//! | `Polyline` | `LineString`, `MultiLineString` | PolyLine |
//! | `Polygon` | `Polygon`, `MultiPolygon` | Polygon |
//! | `None` | no geometry | `.dbf` only |
//!
//! A line part needs two vertices in the Shapefile format; a single-vertex
//! part is written with its vertex repeated.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use shapefile::dbase::{self, FieldName, FieldValue, TableWriterBuilder};
use shapefile::{Multipoint, Point, Polygon, PolygonRing, Polyline};

use crate::attributes::AttributeValue;
use crate::error::{ConvertError, Result};
use crate::geometry::{self, Coord, Geometry};
use crate::schema::{
    fits_numeric_column, FieldType, ShapeLayout, TableSchema, FLOAT_DECIMALS, FLOAT_WIDTH,
    INTEGER_WIDTH,
};

/// Attribute values of one record, keyed by resolved field name
pub type Properties = BTreeMap<String, AttributeValue>;

/// Sink for output tables
pub trait TableWriter {
    /// An open table
    type Table;

    /// Create a table at `path` with the given schema
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Write`] if the table cannot be created.
    fn open(&mut self, path: &Path, schema: &TableSchema) -> Result<Self::Table>;

    /// Append one record
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Write`] if the record does not fit the table.
    fn write_record(
        &mut self,
        table: &mut Self::Table,
        geometry: Option<&Geometry>,
        properties: &Properties,
    ) -> Result<()>;

    /// Finish a table
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Write`] if the table cannot be finalized or its
    /// headers do not match what was written.
    fn close(&mut self, table: Self::Table) -> Result<()>;
}

// =============================================================================
// Shapefile
// =============================================================================

/// Writes tables as ESRI Shapefiles
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapefileWriter;

impl ShapefileWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

enum Sink {
    Shapes(shapefile::Writer<BufWriter<File>>),
    Attributes(dbase::TableWriter<BufWriter<File>>),
}

/// An open Shapefile (or attribute-only `.dbf`)
pub struct ShapefileTable {
    path: PathBuf,
    schema: TableSchema,
    sink: Sink,
    records: usize,
}

impl ShapefileTable {
    /// Path of the main file (`.shp`, or `.dbf` for attribute-only tables)
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn field_name(name: &str) -> Result<FieldName> {
    FieldName::try_from(name)
        .map_err(|e| ConvertError::Write(format!("Invalid DBF field name '{name}': {e:?}")))
}

fn table_builder(schema: &TableSchema) -> Result<TableWriterBuilder> {
    let mut builder = TableWriterBuilder::new();
    for field in &schema.fields {
        let name = field_name(&field.name)?;
        builder = match field.field_type {
            FieldType::Text { width } => builder.add_character_field(name, width),
            FieldType::Float => builder.add_numeric_field(name, FLOAT_WIDTH, FLOAT_DECIMALS),
            FieldType::Integer => builder.add_numeric_field(name, INTEGER_WIDTH, 0),
        };
    }
    Ok(builder)
}

fn write_error(path: &Path, err: impl Display) -> ConvertError {
    ConvertError::Write(format!("{}: {err}", path.display()))
}

/// Write the `.prj` and `.cpg` sidecar files
fn write_sidecars(path: &Path, schema: &TableSchema) -> Result<()> {
    for (extension, contents) in [("prj", schema.crs.wkt), ("cpg", "UTF-8")] {
        let sidecar = path.with_extension(extension);
        fs::write(&sidecar, contents).map_err(|e| write_error(&sidecar, e))?;
    }
    Ok(())
}

fn read_header(path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut header = vec![0u8; len];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map_err(|e| write_error(path, e))?;
    Ok(header)
}

/// Check the file length recorded in a `.shp`/`.shx` header (16-bit words,
/// big-endian, offset 24)
fn check_shape_header(path: &Path) -> Result<()> {
    let header = read_header(path, 100)?;
    let words = u32::from_be_bytes([header[24], header[25], header[26], header[27]]);
    let actual = fs::metadata(path).map_err(|e| write_error(path, e))?.len();
    if u64::from(words) * 2 != actual {
        return Err(write_error(
            path,
            format!("header declares {} bytes but file has {actual}", u64::from(words) * 2),
        ));
    }
    Ok(())
}

/// Check the record count in a `.dbf` header (little-endian, offset 4)
fn check_dbf_header(path: &Path, records: usize) -> Result<()> {
    let header = read_header(path, 32)?;
    let count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if usize::try_from(count).ok() != Some(records) {
        return Err(write_error(
            path,
            format!("header declares {count} records but {records} were written"),
        ));
    }
    Ok(())
}

/// Longest prefix of `text` that fits in `width` bytes
fn truncate_to_width(text: &str, width: usize) -> &str {
    if text.len() <= width {
        return text;
    }
    let mut end = width;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn dbase_record(schema: &TableSchema, properties: &Properties) -> dbase::Record {
    let mut record = dbase::Record::default();
    for field in &schema.fields {
        let value = properties
            .get(&field.name)
            .unwrap_or(&AttributeValue::Null);
        let value = match (field.field_type, field.field_type.convert(value)) {
            (FieldType::Text { width }, AttributeValue::Text(text)) => FieldValue::Character(
                Some(truncate_to_width(&text, usize::from(width)).to_string()),
            ),
            (FieldType::Text { .. }, _) => FieldValue::Character(None),
            (_, value) if !fits_numeric_column(&value) => {
                warn!("Value {value} does not fit numeric field {}, writing null", field.name);
                FieldValue::Numeric(None)
            }
            (_, AttributeValue::Float(v)) => FieldValue::Numeric(Some(v)),
            // Exact: fits_numeric_column bounds integers to 2^53
            #[allow(clippy::cast_precision_loss)]
            (_, AttributeValue::Integer(v)) => FieldValue::Numeric(Some(v as f64)),
            (_, _) => FieldValue::Numeric(None),
        };
        record.insert(field.name.clone(), value);
    }
    record
}

#[inline]
fn point(c: Coord) -> Point {
    Point::new(c.x, c.y)
}

fn line_part(coords: &[Coord]) -> Vec<Point> {
    let mut part: Vec<Point> = coords.iter().copied().map(point).collect();
    if part.len() == 1 {
        part.push(part[0]);
    }
    part
}

fn polygon_rings(polygon: &geometry::Polygon, rings: &mut Vec<PolygonRing<Point>>) {
    rings.push(PolygonRing::Outer(
        polygon.exterior.iter().copied().map(point).collect(),
    ));
    for hole in &polygon.interiors {
        rings.push(PolygonRing::Inner(hole.iter().copied().map(point).collect()));
    }
}

fn mismatch(layout: ShapeLayout, geometry: Option<&Geometry>) -> ConvertError {
    ConvertError::Write(format!(
        "Cannot write {} into a {layout:?} table",
        geometry.map_or("null geometry", Geometry::type_name)
    ))
}

impl TableWriter for ShapefileWriter {
    type Table = ShapefileTable;

    fn open(&mut self, path: &Path, schema: &TableSchema) -> Result<ShapefileTable> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }

        let builder = table_builder(schema)?;
        let (path, sink) = if schema.layout == ShapeLayout::None {
            let path = path.with_extension("dbf");
            let writer = builder.build_with_file_dest(&path)?;
            (path, Sink::Attributes(writer))
        } else {
            let path = path.with_extension("shp");
            let writer = shapefile::Writer::from_path(&path, builder)?;
            (path, Sink::Shapes(writer))
        };
        write_sidecars(&path, schema)?;

        debug!("Opened {:?} table {}", schema.layout, path.display());
        Ok(ShapefileTable {
            path,
            schema: schema.clone(),
            sink,
            records: 0,
        })
    }

    fn write_record(
        &mut self,
        table: &mut ShapefileTable,
        geometry: Option<&Geometry>,
        properties: &Properties,
    ) -> Result<()> {
        let record = dbase_record(&table.schema, properties);
        let layout = table.schema.layout;

        let writer = match &mut table.sink {
            Sink::Attributes(writer) => {
                writer.write_record(&record)?;
                table.records += 1;
                return Ok(());
            }
            Sink::Shapes(writer) => writer,
        };

        match (layout, geometry) {
            (ShapeLayout::Point, Some(Geometry::Point(c))) => {
                writer.write_shape_and_record(&point(*c), &record)?;
            }
            (ShapeLayout::MultiPoint, Some(Geometry::Point(c))) => {
                writer.write_shape_and_record(&Multipoint::new(vec![point(*c)]), &record)?;
            }
            (ShapeLayout::MultiPoint, Some(Geometry::MultiPoint(coords))) => {
                let points = coords.iter().copied().map(point).collect();
                writer.write_shape_and_record(&Multipoint::new(points), &record)?;
            }
            (ShapeLayout::Polyline, Some(Geometry::LineString(coords))) => {
                writer.write_shape_and_record(&Polyline::new(line_part(coords)), &record)?;
            }
            (ShapeLayout::Polyline, Some(Geometry::MultiLineString(lines))) => {
                let parts = lines.iter().map(|l| line_part(l)).collect();
                writer.write_shape_and_record(&Polyline::with_parts(parts), &record)?;
            }
            (ShapeLayout::Polygon, Some(Geometry::Polygon(polygon))) => {
                let mut rings = Vec::with_capacity(1 + polygon.interiors.len());
                polygon_rings(polygon, &mut rings);
                writer.write_shape_and_record(&Polygon::with_rings(rings), &record)?;
            }
            (ShapeLayout::Polygon, Some(Geometry::MultiPolygon(polygons))) => {
                let mut rings = Vec::new();
                for polygon in polygons {
                    polygon_rings(polygon, &mut rings);
                }
                writer.write_shape_and_record(&Polygon::with_rings(rings), &record)?;
            }
            (layout, geometry) => return Err(mismatch(layout, geometry)),
        }
        table.records += 1;
        Ok(())
    }

    fn close(&mut self, table: ShapefileTable) -> Result<()> {
        let ShapefileTable {
            path, sink, records, ..
        } = table;

        match sink {
            Sink::Attributes(mut writer) => {
                writer.close().map_err(|e| write_error(&path, e))?;
            }
            Sink::Shapes(writer) => {
                // Headers are rewritten when the writer is dropped
                drop(writer);
                check_shape_header(&path)?;
                check_shape_header(&path.with_extension("shx"))?;
            }
        }
        check_dbf_header(&path.with_extension("dbf"), records)?;

        debug!("Closed {} ({records} records)", path.display());
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// A table held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub path: PathBuf,
    pub schema: TableSchema,
    pub records: Vec<(Option<Geometry>, Properties)>,
}

/// Collects closed tables in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    tables: Vec<MemoryTable>,
}

impl MemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables closed so far, in close order
    #[must_use]
    pub fn tables(&self) -> &[MemoryTable] {
        &self.tables
    }

    /// Take ownership of the closed tables
    #[must_use]
    pub fn into_tables(self) -> Vec<MemoryTable> {
        self.tables
    }
}

impl TableWriter for MemoryWriter {
    type Table = MemoryTable;

    fn open(&mut self, path: &Path, schema: &TableSchema) -> Result<MemoryTable> {
        Ok(MemoryTable {
            path: path.to_path_buf(),
            schema: schema.clone(),
            records: Vec::new(),
        })
    }

    fn write_record(
        &mut self,
        table: &mut MemoryTable,
        geometry: Option<&Geometry>,
        properties: &Properties,
    ) -> Result<()> {
        let converted = table
            .schema
            .fields
            .iter()
            .map(|field| {
                let value = properties.get(&field.name).unwrap_or(&AttributeValue::Null);
                (field.name.clone(), field.field_type.convert(value))
            })
            .collect();
        table.records.push((geometry.cloned(), converted));
        Ok(())
    }

    fn close(&mut self, table: MemoryTable) -> Result<()> {
        self.tables.push(table);
        Ok(())
    }
}
