//! Stages 7 and 8: accent-colored lesson header and exercise containers.

use crate::dom::{Document, Element, Node};
use crate::{LessonInfo, TransformOptions};

const LETTER_MARKER: &str = "letter";
const BADGE_CLASS: &str = "lesson-badge";
const EXERCISE_CLASS: &str = "exercise";

/// Replace the page `<h1>` and the old letter marker with a composite
/// header block at the top of `<body>`.
pub(super) fn normalize_lesson_heading(
    doc: &mut Document,
    opts: &TransformOptions,
    lesson: Option<&LessonInfo>,
) {
    let accent = opts.accent_color.as_str();

    if let Some(lesson) = lesson.filter(|l| !l.lesson_letter.is_empty() && !l.lesson_title.is_empty()) {
        let has_heading = doc.root.find(&|el| el.is("h1")).is_some();
        let has_marker = doc.root.find(&|el| el.has_class(LETTER_MARKER)).is_some();

        if has_heading && has_marker {
            doc.root.remove_first(&|el| el.is("h1"));
            doc.root.remove_first(&|el| el.has_class(LETTER_MARKER));

            if let Some(body) = doc.body_mut() {
                body.children.insert(0, Node::Element(header_block(lesson, accent)));
            }
        }
    }

    // Badges from an earlier run lost their inline style in stage 1.
    doc.root.walk_mut(&mut |el| {
        if el.has_class(BADGE_CLASS) {
            el.set_attr("style", badge_style(accent));
        }
    });
}

fn header_block(lesson: &LessonInfo, accent: &str) -> Element {
    let badge = Element::new("div")
        .with_attr("class", BADGE_CLASS)
        .with_attr("style", badge_style(accent))
        .with_child(Node::Element(
            Element::new("span")
                .with_attr("class", "badge-letter")
                .with_child(Node::Text(lesson.lesson_letter.clone())),
        ));

    let heading = Element::new("h2")
        .with_attr("class", "lesson-header")
        .with_attr("id", lesson.lesson_id.as_str())
        .with_child(Node::Text(lesson.lesson_title.clone()));

    Element::new("div")
        .with_attr("class", "lesson-row")
        .with_child(Node::Element(badge))
        .with_child(Node::Element(heading))
}

fn badge_style(accent: &str) -> String {
    format!("border-color: {accent};")
}

/// Replace each `.banner.tasks` element with an accent-colored
/// `<div class="exercise">` holding the same content.
pub(super) fn normalize_exercise_banners(root: &mut Element, accent: &str) {
    let style = format!("background: {accent}; border: 1px solid {accent};");
    root.rewrite(&mut |el| {
        if el.has_class("banner") && el.has_class("tasks") {
            let mut exercise = Element::new("div")
                .with_attr("class", EXERCISE_CLASS)
                .with_attr("style", style.as_str());
            exercise.children = el.children;
            vec![Node::Element(exercise)]
        } else if el.is("div") && el.has_class(EXERCISE_CLASS) {
            let mut el = el;
            el.set_attr("style", style.as_str());
            vec![Node::Element(el)]
        } else {
            vec![Node::Element(el)]
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson() -> LessonInfo {
        LessonInfo {
            lesson_id: "0-a".into(),
            lesson_letter: "a".into(),
            lesson_title: "Intro".into(),
        }
    }

    fn opts() -> TransformOptions {
        TransformOptions {
            accent_color: "#ccc".into(),
            ..TransformOptions::default()
        }
    }

    #[test]
    fn builds_header_block() {
        let mut doc = Document::parse(
            r#"<div class="content"><span class="letter">a</span><h1>Old title</h1><p>Body</p></div>"#,
        );
        normalize_lesson_heading(&mut doc, &opts(), Some(&lesson()));
        let html = doc.body().unwrap().inner_html();
        assert_eq!(
            html,
            concat!(
                r#"<div class="lesson-row"><div class="lesson-badge" style="border-color: #ccc;">"#,
                r#"<span class="badge-letter">a</span></div>"#,
                r#"<h2 class="lesson-header" id="0-a">Intro</h2></div>"#,
                r#"<div class="content"><p>Body</p></div>"#
            )
        );
    }

    #[test]
    fn needs_both_markers_and_lesson_info() {
        let src = "<h1>Title only</h1>";
        let mut doc = Document::parse(src);
        normalize_lesson_heading(&mut doc, &opts(), Some(&lesson()));
        assert!(doc.to_html().contains("<h1>Title only</h1>"));

        let mut doc = Document::parse(r#"<h1>T</h1><span class="letter">a</span>"#);
        normalize_lesson_heading(&mut doc, &opts(), None);
        assert!(doc.to_html().contains("<h1>T</h1>"));
    }

    #[test]
    fn banners_become_exercises() {
        let mut doc = Document::parse(r#"<div class="banner tasks"><h3>Exercises 0.1</h3></div>"#);
        normalize_exercise_banners(&mut doc.root, "#f00");
        assert_eq!(
            doc.body().unwrap().inner_html(),
            r#"<div class="exercise" style="background: #f00; border: 1px solid #f00;"><h3>Exercises 0.1</h3></div>"#
        );
    }

    #[test]
    fn existing_exercises_are_recolored() {
        let mut doc = Document::parse(r#"<div class="exercise"><p>x</p></div>"#);
        normalize_exercise_banners(&mut doc.root, "#0f0");
        assert!(doc.to_html().contains("background: #0f0;"));
    }
}
