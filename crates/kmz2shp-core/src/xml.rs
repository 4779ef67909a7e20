//! Namespace-tolerant element lookup shared by the KML parser and the
//! geometry converter.
//!
//! KML files in the wild either declare the OGC namespace, one of the older
//! Google namespaces, or nothing at all. Every lookup tries the declared
//! namespaces first and falls back to elements without a namespace.

use roxmltree::Node;

/// OGC KML 2.2 namespace
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Namespaces treated as "the KML namespace" by lookups
pub const KML_NAMESPACES: [&str; 4] = [
    KML_NAMESPACE,
    "http://earth.google.com/kml/2.2",
    "http://earth.google.com/kml/2.1",
    "http://earth.google.com/kml/2.0",
];

#[inline]
fn is_kml_element(node: &Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node
            .tag_name()
            .namespace()
            .is_some_and(|ns| KML_NAMESPACES.contains(&ns))
}

#[inline]
fn is_bare_element(node: &Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local && node.tag_name().namespace().is_none()
}

/// Find the first child element named `local`, KML namespace first
pub fn find_child<'a, 'input>(parent: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    parent
        .children()
        .find(|n| is_kml_element(n, local))
        .or_else(|| parent.children().find(|n| is_bare_element(n, local)))
}

/// Find all child elements named `local`
///
/// Returns the namespaced matches if there are any, otherwise the matches
/// without a namespace.
pub fn find_children<'a, 'input>(parent: Node<'a, 'input>, local: &str) -> Vec<Node<'a, 'input>> {
    let namespaced: Vec<_> = parent
        .children()
        .filter(|n| is_kml_element(n, local))
        .collect();
    if !namespaced.is_empty() {
        return namespaced;
    }
    parent
        .children()
        .filter(|n| is_bare_element(n, local))
        .collect()
}

/// Find all descendant elements named `local`, same namespace rule as
/// [`find_children`]
pub fn find_descendants<'a, 'input>(root: Node<'a, 'input>, local: &str) -> Vec<Node<'a, 'input>> {
    let namespaced: Vec<_> = root
        .descendants()
        .filter(|n| is_kml_element(n, local))
        .collect();
    if !namespaced.is_empty() {
        return namespaced;
    }
    root.descendants()
        .filter(|n| is_bare_element(n, local))
        .collect()
}

/// Text of an element: its direct text and CDATA children concatenated
///
/// Returns `None` when the element has no text at all.
pub fn element_text(node: Node) -> Option<String> {
    let mut text = String::new();
    let mut found = false;
    for child in node.children().filter(Node::is_text) {
        if let Some(part) = child.text() {
            text.push_str(part);
            found = true;
        }
    }
    found.then_some(text)
}

/// Local tag name of an element, namespace stripped
#[inline]
pub fn local_name<'a>(node: &Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}
