//! KML geometry to canonical 2D geometry conversion
//!
//! Converts `Point`, `LineString`, `LinearRing`, `Polygon` and
//! `MultiGeometry` subtrees into [`Geometry`] values. Altitude is parsed and
//! dropped: Shapefiles written by this crate are strictly 2D.
//!
//! Conversion never fails outward. Anything unusable (no coordinate text, no
//! valid tuple, polygon without outer boundary, empty `MultiGeometry`) turns
//! into `None`, or into a skipped member inside a `MultiGeometry`.
//!
//! ## Example
//!
//! ```
//! use kmz2shp_core::geometry::{convert, Coord, Geometry};
//!
//! let doc = roxmltree::Document::parse(
//!     "<Point><coordinates>-122.084075,37.4220033,0</coordinates></Point>",
//! ).unwrap();
//! let geometry = convert(Some(doc.root_element()));
//! assert_eq!(geometry, Some(Geometry::Point(Coord::new(-122.084075, 37.4220033))));
//! ```

use crate::xml::{element_text, find_child, find_children, local_name};
use log::debug;
use roxmltree::Node;
use serde::Serialize;
use thiserror::Error;

/// A 2D coordinate (longitude, latitude)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Coord {
    /// Longitude (degrees)
    pub x: f64,
    /// Latitude (degrees)
    pub y: f64,
}

impl Coord {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A polygon: one exterior ring and zero or more holes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

/// Canonical geometry model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Polygon),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Polygon>),
    GeometryCollection(Vec<Geometry>),
}

/// Base geometry class used to route features to output tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeometryClass {
    Point,
    LineString,
    Polygon,
    /// Must be expanded into its members before grouping
    GeometryCollection,
}

impl Geometry {
    /// Geometry type name as used in KML/Simple Features
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPoint(_) => "MultiPoint",
            Self::MultiLineString(_) => "MultiLineString",
            Self::MultiPolygon(_) => "MultiPolygon",
            Self::GeometryCollection(_) => "GeometryCollection",
        }
    }
}

/// Map a geometry to its base class
///
/// - Point, `MultiPoint` → `Point`
/// - `LineString`, `MultiLineString` → `LineString`
/// - Polygon, `MultiPolygon` → `Polygon`
/// - `GeometryCollection` → `GeometryCollection`
#[must_use]
pub const fn classify(geometry: &Geometry) -> GeometryClass {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryClass::Point,
        Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryClass::LineString,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeometryClass::Polygon,
        Geometry::GeometryCollection(_) => GeometryClass::GeometryCollection,
    }
}

/// Internal conversion failure, always turned into `None` by [`convert`]
#[derive(Debug, Error)]
enum GeometryError {
    #[error("{0} has no coordinates")]
    MissingCoordinates(&'static str),

    #[error("no valid coordinates found")]
    NoValidCoordinates,

    #[error("Polygon has no outer boundary")]
    MissingOuterBoundary,

    #[error("boundary has no LinearRing")]
    MissingRing,

    #[error("MultiGeometry has no valid geometries")]
    EmptyMultiGeometry,

    #[error("unsupported geometry element <{0}>")]
    Unsupported(String),
}

type GeometryResult<T> = std::result::Result<T, GeometryError>;

const GEOMETRY_TAGS: [&str; 5] = ["Point", "LineString", "Polygon", "MultiGeometry", "LinearRing"];

/// Convert a KML geometry element to a [`Geometry`]
///
/// Returns `None` for a missing node, an unsupported element or any
/// malformed content.
#[must_use]
pub fn convert(node: Option<Node>) -> Option<Geometry> {
    let node = node?;
    match convert_node(node) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            debug!("Dropping <{}> geometry: {e}", local_name(&node));
            None
        }
    }
}

fn convert_node(node: Node) -> GeometryResult<Geometry> {
    match local_name(&node) {
        "Point" => convert_point(node),
        "LineString" | "LinearRing" => convert_linestring(node).map(Geometry::LineString),
        "Polygon" => convert_polygon(node).map(Geometry::Polygon),
        "MultiGeometry" => convert_multigeometry(node),
        other => Err(GeometryError::Unsupported(other.to_string())),
    }
}

/// Parse a KML coordinate string into 2D coordinates
///
/// KML format is `lon,lat[,alt] lon,lat[,alt] ...`. Tuples with fewer than
/// two components or non-numeric components are skipped; altitude is
/// discarded. Returns an empty vector if nothing valid is found.
#[must_use]
pub fn parse_coordinates(text: &str) -> Vec<Coord> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let x = parts.next()?.trim().parse::<f64>().ok()?;
            let y = parts.next()?.trim().parse::<f64>().ok()?;
            Some(Coord::new(x, y))
        })
        .collect()
}

fn coordinates_of(node: Node, owner: &'static str) -> GeometryResult<Vec<Coord>> {
    let text = find_child(node, "coordinates")
        .and_then(element_text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(GeometryError::MissingCoordinates(owner))?;

    let coords = parse_coordinates(&text);
    if coords.is_empty() {
        return Err(GeometryError::NoValidCoordinates);
    }
    Ok(coords)
}

fn convert_point(node: Node) -> GeometryResult<Geometry> {
    let coords = coordinates_of(node, "Point")?;
    Ok(Geometry::Point(coords[0]))
}

fn convert_linestring(node: Node) -> GeometryResult<Vec<Coord>> {
    coordinates_of(node, "LineString")
}

fn boundary_ring(boundary: Node) -> GeometryResult<Vec<Coord>> {
    let ring = find_child(boundary, "LinearRing").ok_or(GeometryError::MissingRing)?;
    coordinates_of(ring, "LinearRing")
}

fn convert_polygon(node: Node) -> GeometryResult<Polygon> {
    let outer = find_child(node, "outerBoundaryIs").ok_or(GeometryError::MissingOuterBoundary)?;
    let exterior = boundary_ring(outer)?;

    let interiors = find_children(node, "innerBoundaryIs")
        .into_iter()
        .filter_map(|inner| match boundary_ring(inner) {
            Ok(ring) => Some(ring),
            Err(e) => {
                debug!("Skipping polygon hole: {e}");
                None
            }
        })
        .collect();

    Ok(Polygon {
        exterior,
        interiors,
    })
}

fn convert_multigeometry(node: Node) -> GeometryResult<Geometry> {
    let members: Vec<Geometry> = node
        .children()
        .filter(|child| child.is_element() && GEOMETRY_TAGS.contains(&local_name(child)))
        .filter_map(|child| convert(Some(child)))
        .collect();

    if members.is_empty() {
        return Err(GeometryError::EmptyMultiGeometry);
    }

    Ok(collect_members(members))
}

/// Build a homogeneous multi-geometry when every member is the same simple
/// type, a `GeometryCollection` otherwise
fn collect_members(members: Vec<Geometry>) -> Geometry {
    if members.iter().all(|g| matches!(g, Geometry::Point(_))) {
        return Geometry::MultiPoint(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Point(c) => Some(c),
                    _ => None,
                })
                .collect(),
        );
    }
    if members.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        return Geometry::MultiLineString(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::LineString(line) => Some(line),
                    _ => None,
                })
                .collect(),
        );
    }
    if members.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        return Geometry::MultiPolygon(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Polygon(p) => Some(p),
                    _ => None,
                })
                .collect(),
        );
    }
    Geometry::GeometryCollection(members)
}
