//! Attribute extraction from placemark descriptions and `ExtendedData`
//!
//! Descriptions exported by ArcGIS, QGIS and Google Earth usually carry the
//! feature attributes as an HTML table:
//!
//! ```html
//! <table>
//!   <tr><th>Population</th><td>10000</td></tr>
//!   <tr><td>Area</td><td>5.5</td></tr>
//! </table>
//! ```
//!
//! `ExtendedData` carries them as `<SimpleData name="...">` or
//! `<Data name="..."><value>...</value></Data>` elements.
//!
//! Both extractors are total: a broken table or block gives an empty map,
//! never an error. Values are coerced with [`coerce`].

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use roxmltree::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::xml::local_name;

/// Literal token some exporters use for a missing value
pub const NULL_TOKEN: &str = "<Null>";

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    /// Never produced by [`coerce`]; available to callers building features
    /// by hand
    Boolean(bool),
}

impl AttributeValue {
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(v) => write!(f, "{v}"),
            // Shortest round-trip form, exponent notation at extreme magnitudes
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => f.write_str(v),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Flat attribute map, keys unique
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Coerce a raw attribute string to a typed value
///
/// Rules, in order:
/// - empty or `<Null>` → `Null`
/// - no `.` and (after one optional leading `-`) only ASCII digits → `Integer`
/// - contains `.` and parses as `f64` → `Float`
/// - anything else → the trimmed text
///
/// Digit strings too large for `i64` stay text.
#[must_use]
pub fn coerce(raw: &str) -> AttributeValue {
    let value = raw.trim();
    if value.is_empty() || value == NULL_TOKEN {
        return AttributeValue::Null;
    }

    if !value.contains('.') {
        let digits = value.strip_prefix('-').unwrap_or(value);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(int) = value.parse::<i64>() {
                return AttributeValue::Integer(int);
            }
        }
    } else if let Ok(float) = value.parse::<f64>() {
        return AttributeValue::Float(float);
    }

    AttributeValue::Text(value.to_string())
}

/// Trimmed text content of an HTML element
#[inline]
fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Key/value pair from one table row, if the row has a supported shape
///
/// Supported shapes: one `<th>` with exactly one `<td>`, or exactly two
/// `<td>`.
fn row_pair(row: &ElementRef, th: &Selector, td: &Selector) -> Option<(String, String)> {
    let header = row.select(th).next();
    let cells: Vec<ElementRef> = row.select(td).collect();

    let (key, value) = match (header, cells.as_slice()) {
        (Some(header), [value]) => (cell_text(&header), cell_text(value)),
        (_, [key, value]) => (cell_text(key), cell_text(value)),
        _ => return None,
    };

    (!key.is_empty()).then_some((key, value))
}

/// Extract attributes from an HTML description
///
/// Returns an empty map when the description is missing, has no table rows,
/// or cannot be processed.
#[must_use]
pub fn extract_from_description(html: Option<&str>) -> Attributes {
    let Some(html) = html.filter(|h| !h.trim().is_empty()) else {
        return Attributes::new();
    };

    let (Ok(tr), Ok(th), Ok(td)) = (
        Selector::parse("tr"),
        Selector::parse("th"),
        Selector::parse("td"),
    ) else {
        debug!("Invalid table selectors, skipping description");
        return Attributes::new();
    };

    let fragment = Html::parse_fragment(html);
    let mut attributes = Attributes::new();

    for row in fragment.select(&tr) {
        match row_pair(&row, &th, &td) {
            Some((key, value)) => {
                attributes.insert(key, coerce(&value));
            }
            None => debug!("Skipping table row without a key/value shape"),
        }
    }

    attributes
}

/// Text of the first child element named `value`, any namespace
fn data_value(data: Node) -> Option<String> {
    data.children()
        .find(|c| c.is_element() && local_name(c) == "value")
        .and_then(|v| v.text())
        .map(str::to_string)
}

/// Extract attributes from an `ExtendedData` element
///
/// Handles `SimpleData` (including under `SchemaData`) and `Data`/`value`
/// pairs anywhere below the block. Elements without a `name` attribute or
/// without text are skipped.
#[must_use]
pub fn extract_from_extended_data(block: Option<Node>) -> Attributes {
    let mut attributes = Attributes::new();
    let Some(block) = block else {
        return attributes;
    };

    for element in block.descendants().filter(Node::is_element) {
        let entry = match local_name(&element) {
            "SimpleData" => element
                .attribute("name")
                .zip(element.text().map(str::to_string)),
            "Data" => element.attribute("name").zip(data_value(element)),
            _ => continue,
        };

        match entry {
            Some((name, text)) if !name.is_empty() && !text.is_empty() => {
                attributes.insert(name.to_string(), coerce(&text));
            }
            _ => debug!("Skipping <{}> without name or value", local_name(&element)),
        }
    }

    attributes
}
