//! Owned, mutable HTML tree.
//!
//! Documents are parsed with `scraper` (html5ever) and copied into a plain
//! recursive tree so that rewrite stages can rebuild child lists freely.
//! Serialization writes the tree back out as HTML.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// A node in the owned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// True for text nodes holding only whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(t) if t.trim().is_empty())
    }
}

/// An element and its attributes.
///
/// Parsed attributes come in the order scraper yields them (sorted by name);
/// attributes added later are appended, and replaced ones keep their slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant (preorder) matching `pred`.
    pub fn find(&self, pred: &impl Fn(&Element) -> bool) -> Option<&Element> {
        for child in self.child_elements() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_mut(&mut self, pred: &impl Fn(&Element) -> bool) -> Option<&mut Element> {
        for child in &mut self.children {
            let Node::Element(el) = child else { continue };
            if pred(el) {
                return Some(el);
            }
            if let Some(found) = el.find_mut(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Detach and return the first descendant (preorder) matching `pred`.
    pub fn remove_first(&mut self, pred: &impl Fn(&Element) -> bool) -> Option<Element> {
        for i in 0..self.children.len() {
            let Node::Element(el) = &mut self.children[i] else {
                continue;
            };
            if pred(el) {
                return match self.children.remove(i) {
                    Node::Element(el) => Some(el),
                    _ => None,
                };
            }
            if let Some(found) = el.remove_first(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Visit every descendant element, preorder.
    pub fn walk(&self, f: &mut impl FnMut(&Element)) {
        for child in self.child_elements() {
            f(child);
            child.walk(f);
        }
    }

    /// Visit every descendant element mutably, preorder.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        for child in &mut self.children {
            if let Node::Element(el) = child {
                f(el);
                el.walk_mut(f);
            }
        }
    }

    /// Rebuild descendants bottom-up.
    ///
    /// `f` receives each element after its own children have been rewritten
    /// and returns the nodes that take its place: itself, its children
    /// (unwrap), or nothing (remove).
    pub fn rewrite(&mut self, f: &mut impl FnMut(Element) -> Vec<Node>) {
        let children = std::mem::take(&mut self.children);
        for node in children {
            match node {
                Node::Element(mut el) => {
                    el.rewrite(f);
                    self.children.extend(f(el));
                }
                other => self.children.push(other),
            }
        }
    }

    /// Merge adjacent text nodes and drop empty ones, recursively.
    pub fn normalize_text(&mut self) {
        let children = std::mem::take(&mut self.children);
        for node in children {
            match node {
                Node::Text(text) if text.is_empty() => {}
                Node::Text(text) => match self.children.last_mut() {
                    Some(Node::Text(prev)) => prev.push_str(&text),
                    _ => self.children.push(Node::Text(text)),
                },
                Node::Element(mut el) => {
                    el.normalize_text();
                    self.children.push(Node::Element(el));
                }
                other => self.children.push(other),
            }
        }
    }

    /// Serialized children.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        write_children(self, &mut out);
        out
    }

    /// Serialized element including its own tags.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Comment(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A full HTML document rooted at `<html>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Parse HTML text. html5ever recovers from any malformed input, so this
    /// never fails; a missing `<html>`/`<head>`/`<body>` is synthesized.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self {
            root: convert_element(parsed.root_element()),
        }
    }

    pub fn body(&self) -> Option<&Element> {
        self.root.child_elements().find(|el| el.is("body"))
    }

    pub fn body_mut(&mut self) -> Option<&mut Element> {
        self.root.children.iter_mut().find_map(|n| match n {
            Node::Element(el) if el.is("body") => Some(el),
            _ => None,
        })
    }

    /// Every `id` attribute value in the tree.
    pub fn ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        if let Some(id) = self.root.attr("id") {
            ids.insert(id.to_string());
        }
        self.root.walk(&mut |el| {
            if let Some(id) = el.attr("id") {
                ids.insert(id.to_string());
            }
        });
        ids
    }

    /// Serialize with a leading doctype.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        write_element(&self.root, &mut out);
        out
    }
}

fn convert_element(el: ElementRef<'_>) -> Element {
    let value = el.value();
    let mut element = Element::new(value.name());
    element.attrs = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => element.children.push(Node::Text(String::from(&**text))),
            scraper::Node::Comment(comment) => {
                element.children.push(Node::Comment(String::from(&**comment)))
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    element.children.push(Node::Element(convert_element(child_el)));
                }
            }
            _ => {}
        }
    }
    element
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        return;
    }

    // The parser drops one newline right after these start tags.
    if matches!(el.name.as_str(), "pre" | "textarea" | "listing")
        && el
            .children
            .first()
            .and_then(Node::as_text)
            .is_some_and(|t| t.starts_with('\n'))
    {
        out.push('\n');
    }

    write_children(el, out);

    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn write_children(el: &Element, out: &mut String) {
    let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
    for child in &el.children {
        match child {
            Node::Element(child) => write_element(child, out),
            Node::Text(text) if raw => out.push_str(text),
            Node::Text(text) => escape_text(text, out),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Escape text for inclusion in HTML built from strings.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_synthesizes_document_skeleton() {
        let doc = Document::parse("<p>hello</p>");
        assert!(doc.root.is("html"));
        let body = doc.body().expect("body");
        assert_eq!(body.text_content(), "hello");
    }

    #[test]
    fn serializes_void_and_escaped_content() {
        let doc = Document::parse(r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp;&nbsp;3<br>x</p>"#);
        let p = doc.body().unwrap().find(&|el| el.is("p")).unwrap();
        assert_eq!(
            p.outer_html(),
            r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp;&nbsp;3<br>x</p>"#
        );
    }

    #[test]
    fn reparse_is_stable() {
        let src = "<html><head><title>T</title></head><body>\n<div id=\"a\"><pre>\nline\n</pre><!-- c --></div></body></html>";
        let once = Document::parse(src).to_html();
        let twice = Document::parse(&once).to_html();
        assert_eq!(once, twice);
        assert!(once.starts_with("<!DOCTYPE html><html>"));
    }

    #[test]
    fn collects_ids_everywhere() {
        let doc = Document::parse(
            r#"<div id="intro"><h2 id="setup">S</h2><span id="x-1"></span></div>"#,
        );
        let ids = doc.ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("setup"));
    }

    #[test]
    fn rewrite_unwraps_and_removes() {
        let mut doc = Document::parse("<div><b>keep <i>me</i></b><button>x</button></div>");
        let body = doc.body_mut().unwrap();
        body.rewrite(&mut |el| match el.name.as_str() {
            "b" => el.children,
            "button" => Vec::new(),
            _ => vec![Node::Element(el)],
        });
        assert_eq!(body.inner_html(), "<div>keep <i>me</i></div>");
    }

    #[test]
    fn remove_first_is_preorder() {
        let mut doc = Document::parse("<div><p class=\"x\">1</p></div><p class=\"x\">2</p>");
        let body = doc.body_mut().unwrap();
        let removed = body.remove_first(&|el| el.has_class("x")).unwrap();
        assert_eq!(removed.text_content(), "1");
        assert_eq!(body.inner_html(), "<div></div><p class=\"x\">2</p>");
    }

    #[test]
    fn normalize_text_merges_runs() {
        let mut el = Element::new("code");
        el.children = vec![
            Node::Text("a".into()),
            Node::Text(String::new()),
            Node::Text("b".into()),
            Node::Element(Element::new("br")),
            Node::Text("c".into()),
        ];
        el.normalize_text();
        assert_eq!(el.children.len(), 3);
        assert_eq!(el.children[0].as_text(), Some("ab"));
    }

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html(r#"<a href="x">Tom's & co</a>"#), "&lt;a href=&quot;x&quot;&gt;Tom&#39;s &amp; co&lt;/a&gt;");
    }
}
