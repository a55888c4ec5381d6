//! Stage 9: collapse redundant `<div>` wrappers.

use crate::dom::{Element, Node};
use crate::sanitize::is_scaffold;

/// Bottom-up, so a chain of anonymous wrappers collapses in one pass.
pub(super) fn collapse_wrappers(root: &mut Element) {
    root.rewrite(&mut |el| {
        if !el.is("div") {
            return vec![Node::Element(el)];
        }
        if is_scaffold(&el) {
            return el.children;
        }
        if !el.has_attr("id") && !el.has_attr("class") {
            if let Some(only) = sole_element(&el) {
                let mut el = el;
                return vec![el.children.swap_remove(only)];
            }
        }
        vec![Node::Element(el)]
    });
}

/// Index of the only element child, when everything else is whitespace
/// text or comments.
fn sole_element(el: &Element) -> Option<usize> {
    let mut found = None;
    for (i, child) in el.children.iter().enumerate() {
        match child {
            Node::Element(_) if found.is_none() => found = Some(i),
            Node::Element(_) => return None,
            Node::Text(_) if child.is_blank_text() => {}
            Node::Text(_) => return None,
            Node::Comment(_) => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn collapse(html: &str) -> String {
        let mut doc = Document::parse(html);
        collapse_wrappers(&mut doc.root);
        doc.body().unwrap().inner_html()
    }

    #[test]
    fn anonymous_single_child_div_is_replaced() {
        assert_eq!(collapse("<div>\n  <div><p>x</p></div>\n</div>"), "<p>x</p>");
    }

    #[test]
    fn divs_with_text_or_identity_are_kept() {
        assert_eq!(collapse("<div>intro <p>x</p></div>"), "<div>intro <p>x</p></div>");
        assert_eq!(collapse(r#"<div id="a"><p>x</p></div>"#), r#"<div id="a"><p>x</p></div>"#);
        assert_eq!(collapse("<div><p>1</p><p>2</p></div>"), "<div><p>1</p><p>2</p></div>");
    }

    #[test]
    fn scaffold_divs_are_unwrapped() {
        assert_eq!(
            collapse(r#"<div class="gatsby-focus-wrapper"><h2>a</h2><p>b</p></div>"#),
            "<h2>a</h2><p>b</p>"
        );
    }
}
