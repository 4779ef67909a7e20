//! Conversion pipeline
//!
//! Parse the document, turn placemarks into features, group them by
//! geometry kind, derive one schema per group and hand each group to a
//! [`TableWriter`].

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::attributes::{
    extract_from_description, extract_from_extended_data, AttributeValue, Attributes,
};
use crate::error::{ConvertError, Result};
use crate::fields::resolve_field_names;
use crate::geometry::{self, classify, Geometry, GeometryClass};
use crate::kml::{KmlDocument, Placemark};
use crate::kmz;
use crate::schema::{FieldDef, FieldType, ShapeLayout, TableSchema};
use crate::writer::{Properties, ShapefileWriter, TableWriter};

/// Reserved attribute holding the placemark name
pub const NAME_FIELD: &str = "name";

/// Conversion options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Drop placemarks whose geometry is missing or unusable
    pub skip_null_geometry: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            skip_null_geometry: true,
        }
    }
}

/// A placemark reduced to geometry, attributes and name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Attributes,
    pub name: String,
}

impl Feature {
    /// Attribute values as written: the properties plus the reserved name
    #[must_use]
    pub fn table_values(&self) -> Attributes {
        let mut values = self.properties.clone();
        values.insert(NAME_FIELD.to_string(), AttributeValue::Text(self.name.clone()));
        values
    }
}

/// Kind of output table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Point,
    LineString,
    Polygon,
    /// Features kept without geometry
    Attributes,
}

impl TableKind {
    /// File name suffix of the table
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::LineString => "line",
            Self::Polygon => "polygon",
            Self::Attributes => "nogeom",
        }
    }

    /// File extension of the table's main file
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Attributes => "dbf",
            _ => "shp",
        }
    }

    const fn from_class(class: GeometryClass) -> Option<Self> {
        match class {
            GeometryClass::Point => Some(Self::Point),
            GeometryClass::LineString => Some(Self::LineString),
            GeometryClass::Polygon => Some(Self::Polygon),
            GeometryClass::GeometryCollection => None,
        }
    }
}

/// Features sharing one output table
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGroup {
    pub kind: TableKind,
    pub features: Vec<Feature>,
}

impl OutputGroup {
    /// Shape layout of the group's table
    ///
    /// Point groups holding any multipoint use the multipoint layout.
    #[must_use]
    pub fn layout(&self) -> ShapeLayout {
        match self.kind {
            TableKind::Point
                if self
                    .features
                    .iter()
                    .any(|f| matches!(f.geometry, Some(Geometry::MultiPoint(_)))) =>
            {
                ShapeLayout::MultiPoint
            }
            TableKind::Point => ShapeLayout::Point,
            TableKind::LineString => ShapeLayout::Polyline,
            TableKind::Polygon => ShapeLayout::Polygon,
            TableKind::Attributes => ShapeLayout::None,
        }
    }
}

/// Descriptor of a written table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenTable {
    pub kind: TableKind,
    /// `.shp` path, or `.dbf` for attribute-only tables
    pub path: PathBuf,
    pub feature_count: usize,
    pub fields: Vec<FieldDef>,
}

/// Turn placemarks into features
///
/// Description table values are merged first and `ExtendedData` values
/// second, so extended data wins on duplicate keys.
#[must_use]
pub fn build_features(placemarks: &[Placemark<'_, '_>], options: &ConvertOptions) -> Vec<Feature> {
    let mut features = Vec::with_capacity(placemarks.len());
    let mut dropped = 0usize;

    for placemark in placemarks {
        let geometry = geometry::convert(placemark.geometry);
        if geometry.is_none() && options.skip_null_geometry {
            debug!("Dropping placemark '{}': no usable geometry", placemark.name);
            dropped += 1;
            continue;
        }

        let mut properties = extract_from_description(placemark.description.as_deref());
        properties.extend(extract_from_extended_data(placemark.extended_data));

        features.push(Feature {
            geometry,
            properties,
            name: placemark.name.clone(),
        });
    }

    if dropped > 0 {
        info!("Dropped {dropped} placemark(s) without usable geometry");
    }
    features
}

/// Split a collection feature into one feature per member, recursively
fn expand(feature: Feature, out: &mut Vec<(TableKind, Feature)>) {
    let Feature {
        geometry,
        properties,
        name,
    } = feature;

    match geometry {
        None => out.push((
            TableKind::Attributes,
            Feature {
                geometry: None,
                properties,
                name,
            },
        )),
        Some(Geometry::GeometryCollection(members)) => {
            let count = members.len();
            for (i, member) in members.into_iter().enumerate() {
                let name = if count > 1 {
                    format!("{name}_{i}")
                } else {
                    name.clone()
                };
                expand(
                    Feature {
                        geometry: Some(member),
                        properties: properties.clone(),
                        name,
                    },
                    out,
                );
            }
        }
        Some(geometry) => {
            if let Some(kind) = TableKind::from_class(classify(&geometry)) {
                out.push((
                    kind,
                    Feature {
                        geometry: Some(geometry),
                        properties,
                        name,
                    },
                ));
            }
        }
    }
}

/// Group features by table kind, expanding geometry collections
///
/// Groups appear in the order their first feature does.
#[must_use]
pub fn group_features(features: Vec<Feature>) -> Vec<OutputGroup> {
    let mut expanded = Vec::with_capacity(features.len());
    for feature in features {
        expand(feature, &mut expanded);
    }

    let mut groups: Vec<OutputGroup> = Vec::new();
    for (kind, feature) in expanded {
        match groups.iter_mut().find(|g| g.kind == kind) {
            Some(group) => group.features.push(feature),
            None => groups.push(OutputGroup {
                kind,
                features: vec![feature],
            }),
        }
    }
    groups
}

/// Derive the schema of a table from the values it will hold
///
/// Keys are sorted before name resolution so the same rows always give the
/// same field names.
///
/// # Errors
///
/// Returns [`ConvertError::FieldMapping`] if the keys cannot be mapped to
/// unique DBF field names.
pub fn build_schema(layout: ShapeLayout, rows: &[Attributes]) -> Result<TableSchema> {
    let keys: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .chain(std::iter::once(NAME_FIELD))
        .collect();
    let keys: Vec<&str> = keys.into_iter().collect();
    let mapping = resolve_field_names(&keys)?;

    let fields = mapping
        .iter()
        .map(|(original, resolved)| FieldDef {
            name: resolved.to_string(),
            original: original.to_string(),
            field_type: FieldType::infer(rows.iter().filter_map(|row| row.get(original))),
        })
        .collect();

    Ok(TableSchema::new(layout, fields))
}

/// Path of a table: `<base>_<suffix>.shp` (`.dbf` for attribute-only tables)
#[must_use]
pub fn output_path(base: &Path, kind: TableKind) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!("_{}.{}", kind.suffix(), kind.extension()));
    PathBuf::from(name)
}

fn write_group<W: TableWriter>(
    group: &OutputGroup,
    output_base: &Path,
    writer: &mut W,
) -> Result<WrittenTable> {
    let rows: Vec<Attributes> = group.features.iter().map(Feature::table_values).collect();
    let schema = build_schema(group.layout(), &rows)?;
    let path = output_path(output_base, group.kind);

    let mut table = writer.open(&path, &schema)?;
    for (feature, row) in group.features.iter().zip(&rows) {
        let properties: Properties = schema
            .fields
            .iter()
            .filter_map(|f| row.get(&f.original).map(|v| (f.name.clone(), v.clone())))
            .collect();
        writer.write_record(&mut table, feature.geometry.as_ref(), &properties)?;
    }
    writer.close(table)?;

    info!(
        "Wrote {} feature(s) to {}",
        group.features.len(),
        path.display()
    );
    Ok(WrittenTable {
        kind: group.kind,
        path,
        feature_count: group.features.len(),
        fields: schema.fields,
    })
}

/// Convert KML text into tables written through `writer`
///
/// # Errors
///
/// - [`ConvertError::Parse`] if the text is not well-formed XML
/// - [`ConvertError::Conversion`] if there are no placemarks, or none
///   survives geometry conversion
/// - [`ConvertError::FieldMapping`] if field names cannot be resolved
/// - any error from the writer
pub fn convert_document<W: TableWriter>(
    text: &str,
    output_base: &Path,
    options: &ConvertOptions,
    writer: &mut W,
) -> Result<Vec<WrittenTable>> {
    let document = KmlDocument::parse(text)?;
    let placemarks = document.placemarks();
    if placemarks.is_empty() {
        return Err(ConvertError::Conversion(
            "No Placemark elements found in KML".to_string(),
        ));
    }
    info!("Found {} placemark(s)", placemarks.len());

    let features = build_features(&placemarks, options);
    if features.is_empty() {
        return Err(ConvertError::Conversion(
            "No valid geometries found in KML".to_string(),
        ));
    }

    let groups = group_features(features);
    debug!(
        "Writing {} table(s): {:?}",
        groups.len(),
        groups.iter().map(|g| g.kind).collect::<Vec<_>>()
    );

    groups
        .iter()
        .map(|group| write_group(group, output_base, writer))
        .collect()
}

/// Convert a KML or KMZ file to Shapefiles
///
/// Without `output_base`, tables are written next to the input using its
/// path without extension as the base.
///
/// # Errors
///
/// Returns [`ConvertError::Conversion`] if the input does not exist and
/// [`ConvertError::Extraction`] if a KML file is not valid UTF-8, plus
/// everything [`convert_document`] and [`kmz::extract_kml`] can return.
pub fn convert_path(
    input: &Path,
    output_base: Option<&Path>,
    options: &ConvertOptions,
) -> Result<Vec<WrittenTable>> {
    if !input.exists() {
        return Err(ConvertError::Conversion(format!(
            "Input file not found: {}",
            input.display()
        )));
    }

    let text = if kmz::is_kmz(input) {
        debug!("Reading {} as KMZ", input.display());
        kmz::extract_kml(input)?
    } else {
        let bytes = fs::read(input)?;
        String::from_utf8(bytes).map_err(|e| {
            ConvertError::Extraction(format!("Failed to read {} as UTF-8: {e}", input.display()))
        })?
    };

    let default_base = input.with_extension("");
    let output_base = output_base.unwrap_or(&default_base);
    convert_document(&text, output_base, options, &mut ShapefileWriter::new())
}
