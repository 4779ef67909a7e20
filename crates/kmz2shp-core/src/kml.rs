//! KML document parsing
//!
//! Walks a KML document and yields one [`Placemark`] per `<Placemark>`
//! element, wherever it sits (`Document`, nested `Folder`s, or the root).
//! Geometry and `ExtendedData` are kept as borrowed XML subtrees; turning
//! them into values is the job of [`crate::geometry`] and
//! [`crate::attributes`].
//!
//! ## Example
//!
//! ```
//! use kmz2shp_core::kml::KmlDocument;
//!
//! let text = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
//!     <Placemark><name>HQ</name><Point><coordinates>1,2</coordinates></Point></Placemark>
//! </Document></kml>"#;
//! let document = KmlDocument::parse(text)?;
//! let placemarks = document.placemarks();
//! assert_eq!(placemarks.len(), 1);
//! assert_eq!(placemarks[0].name, "HQ");
//! # Ok::<(), kmz2shp_core::ConvertError>(())
//! ```

use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::error::{ConvertError, Result};
use crate::xml::{element_text, find_child, find_descendants, local_name};

/// Name given to placemarks without a `<name>` (or with an empty one)
pub const UNNAMED: &str = "Unnamed";

/// Geometry child elements, in lookup priority order
pub const GEOMETRY_PRIORITY: [&str; 5] =
    ["MultiGeometry", "LineString", "Polygon", "Point", "LinearRing"];

/// One `<Placemark>` with its raw parts
#[derive(Debug, Clone)]
pub struct Placemark<'a, 'input> {
    /// Placemark name, `"Unnamed"` if absent or empty
    pub name: String,
    /// Raw description (usually HTML)
    pub description: Option<String>,
    /// `styleUrl` reference
    pub style_url: Option<String>,
    /// `ExtendedData` subtree
    pub extended_data: Option<Node<'a, 'input>>,
    /// Geometry subtree (first match in [`GEOMETRY_PRIORITY`] order)
    pub geometry: Option<Node<'a, 'input>>,
}

impl<'a, 'input> Placemark<'a, 'input> {
    /// Extract a placemark from a `<Placemark>` element
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Parse`] if `node` is not a `Placemark` element.
    pub fn from_node(node: Node<'a, 'input>) -> Result<Self> {
        if !node.is_element() || local_name(&node) != "Placemark" {
            return Err(ConvertError::Parse(format!(
                "expected <Placemark>, found {:?}",
                node.tag_name().name()
            )));
        }

        let name = find_child(node, "name")
            .and_then(element_text)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED.to_string());

        let description = find_child(node, "description").and_then(element_text);

        let style_url = find_child(node, "styleUrl")
            .and_then(element_text)
            .map(|s| s.trim().to_string());

        let geometry = GEOMETRY_PRIORITY
            .iter()
            .find_map(|tag| find_child(node, tag));

        Ok(Self {
            name,
            description,
            style_url,
            extended_data: find_child(node, "ExtendedData"),
            geometry,
        })
    }
}

/// A parsed KML document
#[derive(Debug)]
pub struct KmlDocument<'input> {
    document: Document<'input>,
}

impl<'input> KmlDocument<'input> {
    /// Parse KML text
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Parse`] if the text is not well-formed XML.
    pub fn parse(text: &'input str) -> Result<Self> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let document = Document::parse_with_options(text, options)
            .map_err(|e| ConvertError::Parse(format!("Invalid KML XML: {e}")))?;
        Ok(Self { document })
    }

    /// Root element of the document
    #[must_use]
    pub fn root(&self) -> Node<'_, 'input> {
        self.document.root_element()
    }

    /// All placemarks in document order
    ///
    /// Placemarks that cannot be extracted are logged and skipped.
    #[must_use]
    pub fn placemarks(&self) -> Vec<Placemark<'_, 'input>> {
        let elements = find_descendants(self.root(), "Placemark");
        debug!("Found {} <Placemark> element(s)", elements.len());

        elements
            .into_iter()
            .filter_map(|element| match Placemark::from_node(element) {
                Ok(placemark) => Some(placemark),
                Err(e) => {
                    warn!("Skipping malformed placemark: {e}");
                    None
                }
            })
            .collect()
    }
}
