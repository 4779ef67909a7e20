//! KMZ (zipped KML) support
//!
//! A KMZ is a ZIP archive holding a root `doc.kml` plus icons and overlays.
//! Some exporters name the document differently, so any `.kml` member is
//! accepted when `doc.kml` is missing.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::debug;
use zip::ZipArchive;

use crate::error::{ConvertError, Result};

/// Preferred KML member name inside a KMZ (compared case-insensitively)
pub const DOC_KML: &str = "doc.kml";

/// ZIP local file header magic
const ZIP_MAGIC: &[u8; 2] = b"PK";

/// Pick the KML member of a KMZ
///
/// Prefers `doc.kml` (any case), then the first member ending in `.kml`
/// (any case).
#[must_use]
pub fn select_kml_member<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(DOC_KML))
        .or_else(|| {
            names
                .iter()
                .find(|name| name.to_ascii_lowercase().ends_with(".kml"))
        })
        .copied()
}

/// Read access to a KMZ archive
pub struct KmzArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl KmzArchive<BufReader<File>> {
    /// Open a KMZ file
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Extraction`] if the file is not a ZIP archive.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file)).map_err(|e| {
            ConvertError::Extraction(format!(
                "{} is not a valid KMZ (ZIP) archive: {e}",
                path.display()
            ))
        })
    }
}

impl<R: Read + Seek> KmzArchive<R> {
    /// Wrap any seekable reader holding ZIP data
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Extraction`] if the data is not a ZIP archive.
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        Ok(Self { archive })
    }

    /// Names of all members, in archive order
    #[must_use]
    pub fn member_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Raw bytes of one member
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Extraction`] if the member is missing or
    /// cannot be decompressed.
    pub fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut member = self.archive.by_name(name)?;
        let mut bytes = Vec::new();
        member
            .read_to_end(&mut bytes)
            .map_err(|e| ConvertError::Extraction(format!("Failed to read '{name}': {e}")))?;
        Ok(bytes)
    }

    /// Extract the KML document text
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Extraction`] if there is no KML member or it
    /// is not valid UTF-8.
    pub fn extract_kml(&mut self) -> Result<String> {
        let names = self.member_names();
        let member = select_kml_member(names.iter().map(String::as_str))
            .ok_or_else(|| {
                ConvertError::Extraction(format!(
                    "No KML file found in archive. Available files: {}",
                    names.join(", ")
                ))
            })?
            .to_string();

        debug!("Reading KML member '{member}'");
        let bytes = self.read_member(&member)?;
        String::from_utf8(bytes).map_err(|e| {
            ConvertError::Extraction(format!("Failed to decode KML content as UTF-8: {e}"))
        })
    }
}

/// Extract the KML text from a KMZ file
///
/// # Errors
///
/// See [`KmzArchive::open`] and [`KmzArchive::extract_kml`].
pub fn extract_kml(path: &Path) -> Result<String> {
    KmzArchive::open(path)?.extract_kml()
}

/// Whether a file should be treated as KMZ
///
/// `.kmz` and `.kml` extensions decide directly; anything else is sniffed for
/// the ZIP magic bytes.
#[must_use]
pub fn is_kmz(path: &Path) -> bool {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("kmz") => true,
        Some("kml") => false,
        _ => {
            let mut magic = [0u8; 2];
            File::open(path)
                .and_then(|mut f| f.read_exact(&mut magic))
                .is_ok_and(|()| &magic == ZIP_MAGIC)
        }
    }
}
