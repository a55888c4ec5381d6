//! Core domain types: the course manifest and raw documents.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoursebookError, Result};

// ---------------------------------------------------------------------------
// Lesson / Part
// ---------------------------------------------------------------------------

/// A single lesson page within a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Globally unique identifier, e.g. `0-a`.
    #[serde(rename = "lessonID")]
    pub lesson_id: String,
    /// Letter shown in the lesson badge.
    #[serde(rename = "lessonLetter")]
    pub lesson_letter: String,
    /// Human-readable lesson title.
    #[serde(rename = "lessonTitle")]
    pub lesson_title: String,
    /// Source URL of the lesson page.
    pub url: String,
}

impl Lesson {
    /// Output filename for this lesson (`{lessonID}.html`).
    pub fn filename(&self) -> String {
        format!("{}.html", self.lesson_id)
    }
}

/// A course part: a cover page followed by an ordered list of lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "partID")]
    pub part_id: u32,
    #[serde(rename = "partName")]
    pub part_name: String,
    #[serde(rename = "partTitle")]
    pub part_title: String,
    /// Source URL of the part's landing page.
    #[serde(rename = "partUrl")]
    pub part_url: String,
    /// Cover illustration URL.
    #[serde(default)]
    pub banner: Option<String>,
    /// Per-part accent color (any CSS color value).
    #[serde(rename = "accentColor", default)]
    pub accent_color: Option<String>,
    /// Part description as an HTML fragment.
    #[serde(rename = "partDescription", default)]
    pub part_description: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Part {
    /// Output filename of this part's cover page (`{partID}-cover.html`).
    pub fn cover_filename(&self) -> String {
        format!("{}-cover.html", self.part_id)
    }

    /// Accent color, falling back to `default` when the manifest has none.
    pub fn accent_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.accent_color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Ordered list of parts; the sole input describing course structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub parts: Vec<Part>,
}

/// What an output filename refers to in the manifest.
#[derive(Debug, Clone, Copy)]
pub enum ManifestEntry<'a> {
    Cover(&'a Part),
    Lesson(&'a Part, &'a Lesson),
}

impl<'a> ManifestEntry<'a> {
    /// The owning part.
    pub fn part(&self) -> &'a Part {
        match self {
            Self::Cover(part) | Self::Lesson(part, _) => part,
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)
            .map_err(|e| CoursebookError::manifest(format!("invalid manifest JSON: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load the manifest from disk. Any failure here is fatal to the run.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoursebookError::manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        let manifest = Self::from_json(&json)?;
        tracing::debug!(
            path = %path.display(),
            parts = manifest.parts.len(),
            lessons = manifest.lessons().count(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Reject manifests whose IDs would produce colliding filenames.
    pub fn validate(&self) -> Result<()> {
        let mut part_ids = HashSet::new();
        let mut lesson_ids = HashSet::new();
        for part in &self.parts {
            if !part_ids.insert(part.part_id) {
                return Err(CoursebookError::manifest(format!(
                    "duplicate partID {}",
                    part.part_id
                )));
            }
            for lesson in &part.lessons {
                if lesson.lesson_id.trim().is_empty() {
                    return Err(CoursebookError::manifest(format!(
                        "part {} has a lesson with an empty lessonID",
                        part.part_id
                    )));
                }
                if !lesson_ids.insert(lesson.lesson_id.as_str()) {
                    return Err(CoursebookError::manifest(format!(
                        "duplicate lessonID {:?}",
                        lesson.lesson_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// All lessons in manifest order, paired with their part.
    pub fn lessons(&self) -> impl Iterator<Item = (&Part, &Lesson)> {
        self.parts
            .iter()
            .flat_map(|part| part.lessons.iter().map(move |lesson| (part, lesson)))
    }

    /// Find the manifest entry an output filename belongs to.
    pub fn locate(&self, filename: &str) -> Option<ManifestEntry<'_>> {
        for part in &self.parts {
            if part.cover_filename() == filename {
                return Some(ManifestEntry::Cover(part));
            }
            if let Some(lesson) = part.lessons.iter().find(|l| l.filename() == filename) {
                return Some(ManifestEntry::Lesson(part, lesson));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// RawDocument
// ---------------------------------------------------------------------------

/// Scraped HTML for one lesson or cover, keyed by its output filename.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Decode the document as UTF-8 HTML text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| CoursebookError::document_parse(&self.filename, e.to_string()))
    }
}
