//! Namespace-aware element queries shared by every manifest reader
//!
//! The default namespace is taken from the root element's effective
//! namespace, so POMs with `xmlns="http://maven.apache.org/POM/4.0.0"`, with a
//! prefixed namespace, or with no namespace at all are queried the same way.

use roxmltree::{Document, Node};

/// Query context bound to a document's default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    namespace: Option<String>,
}

impl NamespaceContext {
    /// Detect the namespace from the root element
    pub fn detect(doc: &Document<'_>) -> Self {
        Self {
            namespace: doc.root_element().tag_name().namespace().map(str::to_string),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Element with local name `local` in the document namespace
    pub fn is(&self, node: Node<'_, '_>, local: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == local
            && node.tag_name().namespace() == self.namespace()
    }

    /// First matching child element
    pub fn child<'a, 'input>(&self, node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
        node.children().find(|c| self.is(*c, local))
    }

    /// All matching child elements, in document order
    pub fn children<'a, 'input: 'a>(
        &'a self,
        node: Node<'a, 'input>,
        local: &'a str,
    ) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        node.children().filter(move |c| self.is(*c, local))
    }

    /// All matching descendant elements, in document order
    pub fn descendants<'a, 'input: 'a>(
        &'a self,
        node: Node<'a, 'input>,
        local: &'a str,
    ) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        node.descendants().filter(move |c| self.is(*c, local))
    }

    /// Trimmed text of the first matching child; `None` when missing or blank
    pub fn child_text<'a, 'input>(&self, node: Node<'a, 'input>, local: &str) -> Option<&'a str> {
        self.child(node, local)
            .and_then(|c| c.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_default_namespace() {
        let doc = Document::parse(r#"<project xmlns="http://maven.apache.org/POM/4.0.0"><a>1</a></project>"#).unwrap();
        let ns = NamespaceContext::detect(&doc);
        assert_eq!(ns.namespace(), Some("http://maven.apache.org/POM/4.0.0"));
        assert_eq!(ns.child_text(doc.root_element(), "a"), Some("1"));
    }

    #[test]
    fn test_detects_prefixed_namespace() {
        let doc = Document::parse(r#"<m:project xmlns:m="urn:pom"><m:a> x </m:a><a>y</a></m:project>"#).unwrap();
        let ns = NamespaceContext::detect(&doc);
        assert_eq!(ns.namespace(), Some("urn:pom"));
        // Un-namespaced <a> does not match the document namespace
        assert_eq!(ns.children(doc.root_element(), "a").count(), 1);
        assert_eq!(ns.child_text(doc.root_element(), "a"), Some("x"));
    }

    #[test]
    fn test_no_namespace() {
        let doc = Document::parse("<project><a></a></project>").unwrap();
        let ns = NamespaceContext::detect(&doc);
        assert_eq!(ns.namespace(), None);
        assert!(ns.child(doc.root_element(), "a").is_some());
        assert_eq!(ns.child_text(doc.root_element(), "a"), None);
    }
}
