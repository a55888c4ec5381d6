//! HTML transformation for scraped course lessons.
//!
//! This crate provides:
//! - [`dom`] — owned HTML tree parsed with `scraper`
//! - [`index`] — cross-document fragment and URL maps ([`build_index`])
//! - [`transform`] — the ordered rewrite pipeline for one document
//! - [`sanitize`] — the allowlist [`Sanitizer`]
//! - [`emoji`] — emoji replace/remove policy

pub mod dom;
pub mod emoji;
pub mod index;
pub mod sanitize;
mod stages;

use std::sync::Arc;

use tracing::debug;

use coursebook_shared::{EmojiMode, Lesson, RawDocument, Result, SiteConfig};

pub use dom::{Document, Element, Node};
pub use emoji::apply_emoji_policy;
pub use index::{DocumentIndex, FragmentIndex, UrlMap, build_index, normalize_path};
pub use sanitize::{ALLOWLIST_VERSION, Allowlist, Sanitizer};

/// Everything one transform invocation reads besides the HTML itself.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Part accent color, applied to images, badges, and exercises.
    pub accent_color: String,
    /// Read-only snapshot shared by every document in the batch.
    pub index: Arc<DocumentIndex>,
    pub site: SiteConfig,
    /// Record original image URLs in [`TransformedDocument::image_urls`].
    pub collect_image_urls: bool,
    pub emoji_mode: EmojiMode,
    /// Directory rewritten image sources point into.
    pub images_root: String,
    pub sanitizer: Arc<Sanitizer>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            accent_color: "#ccc".into(),
            index: Arc::default(),
            site: SiteConfig::default(),
            collect_image_urls: false,
            emoji_mode: EmojiMode::default(),
            images_root: "imgs".into(),
            sanitizer: Arc::default(),
        }
    }
}

impl TransformOptions {
    /// Same options with a different accent color.
    pub fn with_accent(&self, accent: impl Into<String>) -> Self {
        Self {
            accent_color: accent.into(),
            ..self.clone()
        }
    }
}

/// Lesson identity used to build the header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonInfo {
    pub lesson_id: String,
    pub lesson_letter: String,
    pub lesson_title: String,
}

impl From<&Lesson> for LessonInfo {
    fn from(lesson: &Lesson) -> Self {
        Self {
            lesson_id: lesson.lesson_id.clone(),
            lesson_letter: lesson.lesson_letter.clone(),
            lesson_title: lesson.lesson_title.clone(),
        }
    }
}

/// Result of transforming one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedDocument {
    pub html: String,
    /// Original absolute image URLs in document order, not de-duplicated.
    pub image_urls: Vec<String>,
    pub links_rewritten: usize,
    /// Links replaced by their text because their target could not be resolved.
    pub links_unwrapped: usize,
}

/// Run the full pipeline over one document.
pub fn transform(
    raw_html: &str,
    opts: &TransformOptions,
    lesson: Option<&LessonInfo>,
) -> TransformedDocument {
    let mut doc = Document::parse(raw_html);
    let report = stages::run_pipeline(&mut doc, opts, lesson);

    opts.sanitizer.clean(&mut doc);
    let html = apply_emoji_policy(&doc.to_html(), opts.emoji_mode);

    debug!(
        images = report.image_urls.len(),
        links_rewritten = report.links_rewritten,
        links_unwrapped = report.links_unwrapped,
        "document transformed"
    );

    TransformedDocument {
        html,
        image_urls: report.image_urls,
        links_rewritten: report.links_rewritten,
        links_unwrapped: report.links_unwrapped,
    }
}

/// Decode and transform a raw document.
pub fn transform_document(
    raw: &RawDocument,
    opts: &TransformOptions,
    lesson: Option<&LessonInfo>,
) -> Result<TransformedDocument> {
    Ok(transform(raw.text()?, opts, lesson))
}
