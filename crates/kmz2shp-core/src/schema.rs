//! Output table schema: column types, shape layout and CRS

use serde::Serialize;

use crate::attributes::AttributeValue;

/// Minimum width of a text column
pub const MIN_TEXT_WIDTH: usize = 80;

/// Extra room added to the longest observed text value
pub const TEXT_WIDTH_HEADROOM: usize = 10;

/// Maximum DBF character field width
pub const MAX_TEXT_WIDTH: usize = 254;

/// Total width of a float column (DBF numeric)
pub const FLOAT_WIDTH: u8 = 24;

/// Decimal places of a float column
pub const FLOAT_DECIMALS: u8 = 15;

/// Total width of an integer column (DBF numeric, no decimals)
pub const INTEGER_WIDTH: u8 = 18;

/// Largest integer magnitude a numeric column stores exactly (2^53)
pub const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Float magnitudes at or above this overflow a float column
pub const MAX_FLOAT_MAGNITUDE: f64 = 1e22;

/// Whether a numeric column can store `value` without loss
///
/// Numeric columns go through `f64` and a fixed-width decimal rendering, so
/// integers beyond 2^53 and floats that are not finite or whose integer
/// part needs more than 22 digits do not fit. Non-numeric values always
/// pass.
#[must_use]
pub fn fits_numeric_column(value: &AttributeValue) -> bool {
    match value {
        AttributeValue::Integer(v) => v.unsigned_abs() <= MAX_EXACT_INTEGER,
        AttributeValue::Float(v) => v.is_finite() && v.abs() < MAX_FLOAT_MAGNITUDE,
        _ => true,
    }
}

/// Byte length of a value as stored in a text column
fn text_len(value: &AttributeValue) -> usize {
    match value {
        AttributeValue::Text(text) => text.len(),
        other => other.to_string().len(),
    }
}

/// Coordinate reference system of the written tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Crs {
    pub epsg: u32,
    #[serde(skip)]
    pub wkt: &'static str,
}

/// WGS84 geographic coordinates (EPSG:4326)
pub const WGS84: Crs = Crs {
    epsg: 4326,
    wkt: concat!(
        r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984","#,
        r#"SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
        r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#
    ),
};

/// DBF column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// Character column of the given width
    Text { width: u8 },
    /// Numeric column with decimals
    Float,
    /// Numeric column without decimals
    Integer,
}

impl FieldType {
    /// Text column used when every value is null
    pub const DEFAULT_TEXT: Self = Self::Text {
        width: MIN_TEXT_WIDTH as u8,
    };

    /// Infer a column type from the values a column will hold
    ///
    /// Any text or boolean makes a text column sized to the longest value
    /// (in bytes, floor 80, plus 10, capped at 254). Otherwise floats win over
    /// integers; an all-null column is an 80-wide text column. A numeric
    /// column holding a value it cannot store exactly (see
    /// [`fits_numeric_column`]) becomes a text column instead.
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a AttributeValue>,
    {
        let mut has_text = false;
        let mut has_float = false;
        let mut has_int = false;
        let mut overflow = false;
        let mut max_len = MIN_TEXT_WIDTH;

        for value in values {
            match value {
                AttributeValue::Null => continue,
                AttributeValue::Integer(_) => has_int = true,
                AttributeValue::Float(_) => has_float = true,
                AttributeValue::Text(_) | AttributeValue::Boolean(_) => has_text = true,
            }
            overflow |= !fits_numeric_column(value);
            max_len = max_len.max(text_len(value));
        }

        if has_text || overflow {
            let width = (max_len + TEXT_WIDTH_HEADROOM).min(MAX_TEXT_WIDTH);
            // width <= 254 always fits
            Self::Text {
                width: u8::try_from(width).unwrap_or(u8::MAX),
            }
        } else if has_float {
            Self::Float
        } else if has_int {
            Self::Integer
        } else {
            Self::DEFAULT_TEXT
        }
    }

    /// Convert a value to what this column stores
    ///
    /// Text columns stringify non-null values; numeric columns keep numbers
    /// and turn anything else into null.
    #[must_use]
    pub fn convert(&self, value: &AttributeValue) -> AttributeValue {
        match (self, value) {
            (_, AttributeValue::Null) => AttributeValue::Null,
            (Self::Text { .. }, AttributeValue::Text(text)) => AttributeValue::Text(text.clone()),
            (Self::Text { .. }, other) => AttributeValue::Text(other.to_string()),
            (Self::Float, AttributeValue::Float(v)) => AttributeValue::Float(*v),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, AttributeValue::Integer(v)) => AttributeValue::Float(*v as f64),
            (Self::Integer, AttributeValue::Integer(v)) => AttributeValue::Integer(*v),
            (Self::Float | Self::Integer, _) => AttributeValue::Null,
        }
    }
}

/// One column of an output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    /// Resolved DBF field name (≤10 characters)
    pub name: String,
    /// Original attribute key
    pub original: String,
    pub field_type: FieldType,
}

/// Shape type stored in a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShapeLayout {
    Point,
    MultiPoint,
    Polyline,
    Polygon,
    /// Attribute-only table
    None,
}

/// Everything a table writer needs to create a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub layout: ShapeLayout,
    pub fields: Vec<FieldDef>,
    pub crs: Crs,
}

impl TableSchema {
    #[must_use]
    pub fn new(layout: ShapeLayout, fields: Vec<FieldDef>) -> Self {
        Self {
            layout,
            fields,
            crs: WGS84,
        }
    }

    /// Field definition by resolved name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}
