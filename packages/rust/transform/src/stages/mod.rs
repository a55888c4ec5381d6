//! Ordered rewrite stages over one parsed document.
//!
//! Each stage takes the tree produced by the previous one. Order matters:
//! images are rewritten before links are resolved, code blocks are
//! flattened before links inside them are skipped, and wrapper divs are
//! collapsed last so earlier stages still see the original structure.

mod code;
mod heading;
mod images;
mod links;
mod wrappers;

use crate::dom::{Document, Element, Node};
use crate::{LessonInfo, TransformOptions};

/// Per-document counters gathered while the stages run.
#[derive(Debug, Default)]
pub(crate) struct StageReport {
    pub image_urls: Vec<String>,
    pub links_rewritten: usize,
    pub links_unwrapped: usize,
}

/// Run stages 1–9 in order.
pub(crate) fn run_pipeline(
    doc: &mut Document,
    opts: &TransformOptions,
    lesson: Option<&LessonInfo>,
) -> StageReport {
    let mut report = StageReport::default();

    strip_inline_styles(&mut doc.root);
    images::rewrite_images(&mut doc.root, opts, &mut report.image_urls);
    wrap_tables(&mut doc.root);
    strip_ui_controls(&mut doc.root);
    code::restructure_code_blocks(&mut doc.root);
    links::resolve_links(&mut doc.root, opts, &mut report);
    heading::normalize_lesson_heading(doc, opts, lesson);
    heading::normalize_exercise_banners(&mut doc.root, &opts.accent_color);
    wrappers::collapse_wrappers(&mut doc.root);

    report
}

// ---------------------------------------------------------------------------
// Stage 1: Strip inline styles
// ---------------------------------------------------------------------------

fn strip_inline_styles(root: &mut Element) {
    root.remove_attr("style");
    root.walk_mut(&mut |el| el.remove_attr("style"));
}

// ---------------------------------------------------------------------------
// Stage 3: Wrap tables
// ---------------------------------------------------------------------------

const TABLE_WRAPPER_CLASS: &str = "table-wrapper";

/// Wrap each `<table>` in `<div class="table-wrapper">` unless its parent
/// already is one.
fn wrap_tables(parent: &mut Element) {
    let already_wrapped = parent.is("div") && parent.has_class(TABLE_WRAPPER_CLASS);
    for child in &mut parent.children {
        let Node::Element(el) = child else { continue };
        wrap_tables(el);
        if el.is("table") && !already_wrapped {
            let wrapper = Element::new("div").with_attr("class", TABLE_WRAPPER_CLASS);
            let table = std::mem::replace(el, wrapper);
            el.children.push(Node::Element(table));
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 4: Strip UI-only controls
// ---------------------------------------------------------------------------

const CONTROL_CLASSES: &[&str] = &["copy-button", "copy-code-button"];

/// Elements that only run in a live page.
const LIVE_ONLY_TAGS: &[&str] = &["script", "noscript", "template"];

fn strip_ui_controls(root: &mut Element) {
    root.rewrite(&mut |el| {
        let is_control = CONTROL_CLASSES.iter().any(|c| el.has_class(c))
            || LIVE_ONLY_TAGS.iter().any(|t| el.is(t));
        if is_control {
            Vec::new()
        } else {
            vec![Node::Element(el)]
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(html: &str) -> Document {
        Document::parse(html)
    }

    #[test]
    fn strips_every_style_attribute() {
        let mut doc = body(r#"<div style="a"><p style="b">x</p><img style="c" src="a.png"></div>"#);
        strip_inline_styles(&mut doc.root);
        assert!(!doc.to_html().contains("style="));
    }

    #[test]
    fn wraps_tables_once() {
        let mut doc = body("<table><tr><td>1</td></tr></table>");
        wrap_tables(&mut doc.root);
        wrap_tables(&mut doc.root);
        let html = doc.body().unwrap().inner_html();
        assert!(html.starts_with(r#"<div class="table-wrapper"><table>"#));
        assert_eq!(html.matches("table-wrapper").count(), 1);
    }

    #[test]
    fn removes_copy_buttons_and_scripts() {
        let mut doc = body(
            r#"<pre><button class="copy-button">Copy</button><code>x</code></pre><div class="copy-code-button">c</div><script>1</script>"#,
        );
        strip_ui_controls(&mut doc.root);
        assert_eq!(doc.body().unwrap().inner_html(), "<pre><code>x</code></pre>");
    }
}
