//! Error types for KML/KMZ to Shapefile conversion

use std::io;
use thiserror::Error;

/// Errors that can occur while converting a document
///
/// Geometry- and attribute-level problems never show up here: they degrade to
/// a missing geometry, an empty attribute map, or a dropped placemark.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// KMZ archive unreadable, no KML member, or KML not valid UTF-8
    #[error("KMZ extraction error: {0}")]
    Extraction(String),

    /// Document is not well-formed XML
    #[error("KML parsing error: {0}")]
    Parse(String),

    /// No unique field name could be derived for an attribute key
    #[error("Field mapping error: {0}")]
    FieldMapping(String),

    /// The table writer failed
    #[error("Shapefile write error: {0}")]
    Write(String),

    /// Document-level failure (no placemarks, no usable geometry, missing input)
    #[error("Conversion error: {0}")]
    Conversion(String),
}

impl From<zip::result::ZipError> for ConvertError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Extraction(err.to_string())
    }
}

impl From<shapefile::Error> for ConvertError {
    fn from(err: shapefile::Error) -> Self {
        Self::Write(err.to_string())
    }
}

impl From<shapefile::dbase::Error> for ConvertError {
    fn from(err: shapefile::dbase::Error) -> Self {
        Self::Write(err.to_string())
    }
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;
