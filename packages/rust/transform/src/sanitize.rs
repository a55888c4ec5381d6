//! Allowlist sanitizer.
//!
//! Keeps only allowlisted tags and attributes. A disallowed tag is discarded
//! but its (sanitized) children are kept, except for raw-text containers
//! which go with their content. URL attributes are limited to a fixed set of
//! schemes. Comments are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::dom::{Document, Element, Node};

/// Bumped whenever the tag, attribute, or scheme sets below change.
pub const ALLOWLIST_VERSION: u32 = 1;

const ALLOWED_TAGS: &[&str] = &[
    "html", "head", "body", "title", "meta", "link", "section", "header", "footer", "nav",
    "article", "aside", "h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "span", "a", "img", "ul",
    "ol", "li", "table", "thead", "tbody", "tr", "th", "td", "pre", "code", "blockquote", "hr",
    "br", "em", "strong", "i", "b", "u", "sup", "sub",
];

const GLOBAL_ATTRS: &[&str] = &["id", "class", "style", "title"];
const ANCHOR_ATTRS: &[&str] = &["href", "title", "id", "class", "style", "target", "rel"];
const IMAGE_ATTRS: &[&str] = &["src", "alt", "title", "width", "height", "style"];

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Dropped together with everything inside them.
const NON_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "option", "noscript"];

/// Attributes whose values are URLs.
const URL_ATTRS: &[&str] = &["href", "src"];

/// Class substrings marking framework scaffolding `<div>`s.
pub(crate) const SCAFFOLD_MARKERS: &[&str] = &["gatsby", "course-content"];

/// The tag/attribute/scheme sets a sanitized document may contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    pub tags: HashSet<String>,
    /// Attributes permitted on any allowed tag.
    pub global_attrs: HashSet<String>,
    /// Extra attributes per tag.
    pub tag_attrs: HashMap<String, HashSet<String>>,
    pub schemes: HashSet<String>,
}

impl Default for Allowlist {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        Self {
            tags: set(ALLOWED_TAGS),
            global_attrs: set(GLOBAL_ATTRS),
            tag_attrs: HashMap::from([
                ("a".to_string(), set(ANCHOR_ATTRS)),
                ("img".to_string(), set(IMAGE_ATTRS)),
            ]),
            schemes: set(ALLOWED_SCHEMES),
        }
    }
}

impl Allowlist {
    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_ascii_lowercase())
    }

    pub fn allows_attr(&self, tag: &str, attr: &str) -> bool {
        let attr = attr.to_ascii_lowercase();
        self.global_attrs.contains(&attr)
            || self
                .tag_attrs
                .get(&tag.to_ascii_lowercase())
                .is_some_and(|attrs| attrs.contains(&attr))
    }

    /// Whether a URL attribute value may be kept.
    ///
    /// Relative URLs pass; protocol-relative URLs and unlisted schemes don't.
    pub fn allows_url(&self, value: &str) -> bool {
        static SCHEME_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^([a-z][a-z0-9.+\-]*):").expect("valid regex"));

        let compact: String = value
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
            .collect::<String>()
            .to_ascii_lowercase();

        if compact.starts_with("//") {
            return false;
        }
        match SCHEME_RE.captures(&compact) {
            Some(caps) => self.schemes.contains(&caps[1]),
            None => true,
        }
    }
}

/// Applies an [`Allowlist`] to documents.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    allowlist: Allowlist,
}

impl Sanitizer {
    pub fn new(allowlist: Allowlist) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Sanitize serialized HTML.
    pub fn sanitize(&self, html: &str) -> String {
        let mut doc = Document::parse(html);
        self.clean(&mut doc);
        doc.to_html()
    }

    /// Sanitize a parsed document in place.
    pub fn clean(&self, doc: &mut Document) {
        self.filter_attrs(&mut doc.root);
        self.clean_children(&mut doc.root);
    }

    fn clean_children(&self, parent: &mut Element) {
        let children = std::mem::take(&mut parent.children);
        for node in children {
            match node {
                Node::Text(text) => parent.children.push(Node::Text(text)),
                Node::Comment(_) => {}
                Node::Element(mut el) => {
                    let tag = el.name.to_ascii_lowercase();
                    if NON_TEXT_TAGS.contains(&tag.as_str()) {
                        continue;
                    }
                    self.clean_children(&mut el);
                    if tag == "div" && is_scaffold(&el) {
                        parent.children.extend(el.children);
                    } else if self.allowlist.allows_tag(&tag) {
                        self.filter_attrs(&mut el);
                        parent.children.push(Node::Element(el));
                    } else {
                        parent.children.extend(el.children);
                    }
                }
            }
        }
    }

    fn filter_attrs(&self, el: &mut Element) {
        let tag = el.name.to_ascii_lowercase();
        el.attrs.retain(|(name, value)| {
            let name = name.to_ascii_lowercase();
            if !self.allowlist.allows_attr(&tag, &name) {
                return false;
            }
            // Highlight spans never carry inline styles.
            if tag == "span" && name == "style" {
                return false;
            }
            !URL_ATTRS.contains(&name.as_str()) || self.allowlist.allows_url(value)
        });
    }
}

/// A `<div>` whose class contains a scaffolding marker.
pub(crate) fn is_scaffold(el: &Element) -> bool {
    el.attr("class")
        .is_some_and(|class| SCAFFOLD_MARKERS.iter().any(|m| class.contains(m)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(html: &str) -> String {
        let out = Sanitizer::default().sanitize(html);
        let doc = Document::parse(&out);
        doc.body().unwrap().inner_html()
    }

    #[test]
    fn drops_disallowed_tags_keeping_text() {
        assert_eq!(
            body_of("<p>Press <kbd>Ctrl</kbd> <button>Copy</button></p>"),
            "<p>Press Ctrl Copy</p>"
        );
    }

    #[test]
    fn removes_script_and_style_with_content() {
        assert_eq!(
            body_of("<div>a<script>alert(1)</script><noscript>js off</noscript>b</div>"),
            "<div>ab</div>"
        );
    }

    #[test]
    fn filters_attributes_per_tag() {
        let out = body_of(
            r#"<p onclick="x()" data-x="1" id="p1">t</p><a href="/x" target="_blank" onmouseover="y">l</a><img src="imgs/a.png" alt="A" loading="lazy">"#,
        );
        assert_eq!(
            out,
            r#"<p id="p1">t</p><a href="/x" target="_blank">l</a><img alt="A" src="imgs/a.png">"#
        );
    }

    #[test]
    fn rejects_unsafe_schemes_and_protocol_relative() {
        let list = Allowlist::default();
        assert!(list.allows_url("https://site.example/a"));
        assert!(list.allows_url("mailto:someone@site.example"));
        assert!(list.allows_url("0-a.html#intro"));
        assert!(list.allows_url("imgs/x/y.png"));
        assert!(!list.allows_url("javascript:alert(1)"));
        assert!(!list.allows_url(" JavaScript:alert(1)"));
        assert!(!list.allows_url("java\tscript:alert(1)"));
        assert!(!list.allows_url("//evil.example/x.png"));
        assert!(!list.allows_url("data:image/png;base64,AAAA"));

        let out = body_of(r#"<a href="javascript:alert(1)">x</a><img src="//cdn.example/a.png">"#);
        assert_eq!(out, "<a>x</a><img>");
    }

    #[test]
    fn unwraps_scaffold_divs() {
        assert_eq!(
            body_of(r#"<div class="gatsby-wrapper"><div class="course-content-inner"><p>x</p></div></div>"#),
            "<p>x</p>"
        );
    }

    #[test]
    fn tag_matching_ignores_case() {
        let list = Allowlist::default();
        assert!(list.allows_tag("DIV"));
        assert!(list.allows_attr("IMG", "SRC"));
        assert!(!list.allows_attr("p", "src"));
    }

    #[test]
    fn strips_span_styles_and_comments() {
        assert_eq!(
            body_of(r#"<span style="color:red" class="hl">x</span><!-- note -->"#),
            r#"<span class="hl">x</span>"#
        );
    }
}
