//! Minimal XMPP element model.
//!
//! Stream framing and stanza parsing live outside this crate. Everything here consumes and
//! produces [`Element`] values: a name, attributes (the namespace is the `xmlns` attribute),
//! character data and child elements.

use std::fmt;

/// Well-known namespaces.
pub mod ns {
    /// SASL negotiation namespace (RFC 6120, section 6).
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Namespace of defined stream error conditions.
    pub const STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
    /// Namespace of the `stream:` prefix.
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// Resource binding namespace.
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
}

/// An XML element as handed over by the stream layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Starts building an element with the given name.
    pub fn builder<N: Into<String>>(name: N) -> ElementBuilder {
        ElementBuilder {
            element: Element {
                name: name.into(),
                ..Element::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of the attribute `name`, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the `xmlns` attribute.
    pub fn namespace(&self) -> Option<&str> {
        self.attribute("xmlns")
    }

    /// Character data of the element. Empty when the element has none.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns the first child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// Builder for [`Element`].
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    element: Element,
}

impl ElementBuilder {
    /// Sets an attribute, replacing any previous value with the same name.
    pub fn attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.element.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.element.attributes.push((key, value)),
        }
        self
    }

    pub fn namespace<V: Into<String>>(self, namespace: V) -> Self {
        self.attribute("xmlns", namespace)
    }

    pub fn text<T: Into<String>>(mut self, text: T) -> Self {
        self.element.text = text.into();
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.element.children.push(child);
        self
    }

    pub fn children<I: IntoIterator<Item = Element>>(mut self, children: I) -> Self {
        self.element.children.extend(children);
        self
    }

    pub fn build(self) -> Element {
        self.element
    }
}

fn escape(fmt: &mut fmt::Formatter, value: &str) -> fmt::Result {
    for chr in value.chars() {
        match chr {
            '&' => fmt.write_str("&amp;")?,
            '<' => fmt.write_str("&lt;")?,
            '>' => fmt.write_str("&gt;")?,
            '"' => fmt.write_str("&quot;")?,
            '\'' => fmt.write_str("&apos;")?,
            _ => write!(fmt, "{}", chr)?,
        }
    }
    Ok(())
}

impl fmt::Display for Element {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "<{}", self.name)?;
        for (key, value) in &self.attributes {
            write!(fmt, " {}=\"", key)?;
            escape(fmt, value)?;
            fmt.write_str("\"")?;
        }
        if self.text.is_empty() && self.children.is_empty() {
            return fmt.write_str("/>");
        }
        fmt.write_str(">")?;
        escape(fmt, &self.text)?;
        for child in &self.children {
            write!(fmt, "{}", child)?;
        }
        write!(fmt, "</{}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ns, Element};

    #[test]
    fn test_builder_and_accessors() {
        let elem = Element::builder("auth")
            .namespace(ns::SASL)
            .attribute("mechanism", "PLAIN")
            .attribute("mechanism", "SCRAM-SHA-1")
            .text("AGZvbwBiYXI=")
            .build();
        assert_eq!(elem.name(), "auth");
        assert_eq!(elem.namespace(), Some(ns::SASL));
        assert_eq!(elem.attribute("mechanism"), Some("SCRAM-SHA-1"));
        assert_eq!(elem.attribute("missing"), None);
        assert_eq!(elem.text(), "AGZvbwBiYXI=");
        assert!(elem.children().is_empty());
    }

    #[test]
    fn test_display_escapes() {
        let elem = Element::builder("failure")
            .namespace(ns::SASL)
            .child(Element::builder("text").text("a<b & \"c\"").build())
            .child(Element::builder("not-authorized").build())
            .build();
        assert_eq!(
            elem.to_string(),
            "<failure xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\">\
             <text>a&lt;b &amp; &quot;c&quot;</text><not-authorized/></failure>"
        );
        assert_eq!(elem.child("not-authorized").map(Element::name), Some("not-authorized"));
    }
}
