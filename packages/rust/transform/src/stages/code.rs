//! Stage 5: flatten syntax-highlighted code blocks.
//!
//! Token spans become plain text. Per-line wrappers survive, each followed
//! by a line break, and runs of highlighted lines are grouped into one
//! `code-highlight-group` span.

use crate::dom::{Element, Node};

const TOKEN_LINE: &str = "token-line";
const HIGHLIGHT_LINE: &str = "gatsby-highlight-code-line";
const HIGHLIGHT_GROUP: &str = "code-highlight-group";

pub(super) fn restructure_code_blocks(root: &mut Element) {
    root.walk_mut(&mut |el| {
        if el.is("pre") {
            el.walk_mut(&mut |inner| {
                if inner.is("code") {
                    restructure(inner);
                }
            });
        }
    });
}

fn restructure(code: &mut Element) {
    let mut has_token_lines = false;
    flatten_spans(code, &mut has_token_lines);
    code.normalize_text();

    if has_token_lines {
        terminate_lines(code);
        code.normalize_text();
    }

    group_highlighted_lines(code);
}

fn is_line_wrapper(el: &Element) -> bool {
    el.is("span") && (el.has_class(TOKEN_LINE) || el.has_class(HIGHLIGHT_LINE))
}

/// Replace token spans with their text and dissolve earlier groups; keep
/// line wrappers.
fn flatten_spans(parent: &mut Element, has_token_lines: &mut bool) {
    let children = std::mem::take(&mut parent.children);
    for node in children {
        let Node::Element(mut el) = node else {
            parent.children.push(node);
            continue;
        };
        if !el.is("span") {
            flatten_spans(&mut el, has_token_lines);
            parent.children.push(Node::Element(el));
        } else if is_line_wrapper(&el) {
            *has_token_lines |= el.has_class(TOKEN_LINE);
            el.remove_attr("style");
            flatten_spans(&mut el, has_token_lines);
            parent.children.push(Node::Element(el));
        } else if el.has_class(HIGHLIGHT_GROUP) {
            flatten_spans(&mut el, has_token_lines);
            parent.children.extend(el.children);
        } else {
            parent.children.push(Node::Text(el.text_content()));
        }
    }
}

/// Make sure every line wrapper is followed by a newline text or `<br>`.
fn terminate_lines(parent: &mut Element) {
    let children = std::mem::take(&mut parent.children);
    let mut iter = children.into_iter().peekable();
    while let Some(node) = iter.next() {
        let Node::Element(mut el) = node else {
            parent.children.push(node);
            continue;
        };
        terminate_lines(&mut el);
        let needs_newline = is_line_wrapper(&el)
            && !match iter.peek() {
                Some(Node::Text(text)) => text.starts_with('\n'),
                Some(Node::Element(next)) => next.is("br"),
                _ => false,
            };
        parent.children.push(Node::Element(el));
        if needs_newline {
            parent.children.push(Node::Text("\n".into()));
        }
    }
}

/// Move each run of highlighted lines, plus the newline-only text between
/// them, into a single group span.
fn group_highlighted_lines(code: &mut Element) {
    let children = std::mem::take(&mut code.children);
    let mut group: Option<Element> = None;

    for node in children {
        let joins_group = match &node {
            Node::Element(el) => el.is("span") && el.has_class(HIGHLIGHT_LINE),
            Node::Text(text) => group.is_some() && text.chars().all(|c| c == '\n'),
            Node::Comment(_) => false,
        };
        if joins_group {
            group
                .get_or_insert_with(|| Element::new("span").with_attr("class", HIGHLIGHT_GROUP))
                .children
                .push(node);
        } else {
            if let Some(done) = group.take() {
                code.children.push(Node::Element(done));
            }
            code.children.push(node);
        }
    }
    if let Some(done) = group {
        code.children.push(Node::Element(done));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn code_html(html: &str) -> String {
        let mut doc = Document::parse(html);
        restructure_code_blocks(&mut doc.root);
        let pre = doc.body().unwrap().find(&|el| el.is("pre")).unwrap();
        pre.inner_html()
    }

    #[test]
    fn unwraps_token_spans_to_text() {
        let out = code_html(
            r#"<pre><code><span class="token keyword">const</span> x <span class="token operator">=</span> <span class="token string">"a
b"</span></code></pre>"#,
        );
        assert_eq!(out, "<code>const x = \"a\nb\"</code>");
    }

    #[test]
    fn token_lines_get_newlines() {
        let out = code_html(
            r#"<pre><code><span class="token-line"><span class="token">a</span></span><span class="token-line">b</span><br><span class="token-line">c</span>
</code></pre>"#,
        );
        assert_eq!(
            out,
            "<code><span class=\"token-line\">a</span>\n<span class=\"token-line\">b</span><br><span class=\"token-line\">c</span>\n</code>"
        );
    }

    #[test]
    fn highlighted_runs_are_grouped() {
        let out = code_html(concat!(
            "<pre><code>",
            "plain\n",
            r#"<span class="gatsby-highlight-code-line">one</span>"#,
            "\n",
            r#"<span class="gatsby-highlight-code-line">two</span>"#,
            "\nrest\n",
            "</code></pre>"
        ));
        assert_eq!(
            out,
            concat!(
                "<code>plain\n",
                r#"<span class="code-highlight-group"><span class="gatsby-highlight-code-line">one</span>"#,
                "\n",
                r#"<span class="gatsby-highlight-code-line">two</span></span>"#,
                "\nrest\n</code>"
            )
        );
    }

    #[test]
    fn grouping_is_stable_on_rerun() {
        let src = concat!(
            "<pre><code>",
            r#"<span class="token-line gatsby-highlight-code-line">one</span>"#,
            r#"<span class="token-line">two</span>"#,
            "</code></pre>"
        );
        let once = code_html(src);
        let again = code_html(&format!("<pre>{once}</pre>"));
        assert_eq!(once, again);
        assert!(once.contains("code-highlight-group"));
    }

    #[test]
    fn code_outside_pre_is_untouched() {
        let mut doc = Document::parse(r#"<p><code><span class="token">x</span></code></p>"#);
        restructure_code_blocks(&mut doc.root);
        assert!(doc.to_html().contains(r#"<span class="token">x</span>"#));
    }
}
