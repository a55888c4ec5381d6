//! Book content assembly.
//!
//! Turns the cleaned lessons and cover pages into an ordered list of
//! [`BookRecord`]s plus metadata and a table of contents, written as
//! `book.json` for an external EPUB/PDF renderer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Datelike, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use coursebook_shared::{
    AppConfig, CoursebookError, EmojiMode, ExportType, Manifest, OutputPaths, Part, Result,
};
use coursebook_transform::dom::{Document, Element, Node, escape_html};
use coursebook_transform::{Sanitizer, apply_emoji_policy};

use crate::covers::render_cover;
use crate::images::{ImageFetcher, load_image_list, relative_image_path};

const AUTHOR: &str = "University of Helsinki, Department of Computer Science";
const PUBLISHER: &str = "University of Helsinki";
const DESCRIPTION: &str = "Full Stack Open is a free online course that teaches modern web \
development with JavaScript. It covers React, Node.js, GraphQL, TypeScript, and more.";
const TOC_TITLE: &str = "Course contents";
const NO_EXERCISES: &str = "No exercises for this lesson";

static BARE_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://(#.*)?$").expect("valid regex"));
static LOCAL_HTML_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.html(#.*)?$").expect("valid regex"));
static REMOTE_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(https?|file|data):").expect("valid regex"));

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Book-level metadata handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub description: String,
    pub toc_title: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub lang: String,
}

/// One chapter of the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub exclude_from_toc: bool,
    #[serde(default)]
    pub before_toc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub filename: String,
    /// 1 for part covers, 2 for lessons.
    pub level: u8,
}

/// Everything written to `book.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub metadata: BookMetadata,
    pub content: Vec<BookRecord>,
    pub navigation: Vec<TocEntry>,
}

/// Options for one book assembly.
#[derive(Debug, Clone)]
pub struct BookOptions {
    pub export_type: ExportType,
    pub language: String,
    pub emoji_mode: EmojiMode,
    pub chapter_numbers: bool,
    pub default_accent: String,
}

impl From<&AppConfig> for BookOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            export_type: config.content.export_type,
            language: config.content.language.clone(),
            emoji_mode: config.content.emoji_mode,
            chapter_numbers: config.content.chapter_numbers,
            default_accent: config.content.default_accent_color.clone(),
        }
    }
}

/// Summary of a book assembly.
#[derive(Debug, Clone)]
pub struct BookReport {
    pub book_path: PathBuf,
    pub records: usize,
    /// Lessons with no cleaned file.
    pub missing_lessons: Vec<String>,
    /// Images fetched again because they were missing on disk.
    pub refetched: usize,
    /// Images dropped from the book because they could not be recovered.
    pub missing_images: Vec<String>,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Assemble the book and write `book.json`.
#[instrument(skip_all, fields(export_type = %opts.export_type, lang = %opts.language))]
pub async fn assemble_book(paths: &OutputPaths, opts: &BookOptions) -> Result<BookReport> {
    let manifest = Manifest::load(&paths.data_json)?;
    info!(parts = manifest.parts.len(), "preparing book content");

    let metadata = book_metadata(opts, Local::now().date_naive());
    let mut localizer = ImageLocalizer::new(paths).await?;
    let sanitizer = Sanitizer::default();

    let mut content = vec![BookRecord {
        title: "Title".into(),
        content: title_page(&metadata),
        filename: None,
        exclude_from_toc: true,
        before_toc: true,
    }];
    let mut missing_lessons = Vec::new();

    for part in &manifest.parts {
        content.push(BookRecord {
            title: format!("{}: {}.", part.part_name, part.part_title),
            content: cover_content(part, &paths.covers, &opts.default_accent, &sanitizer).await,
            filename: Some(format!("{}-cover", part.part_id)),
            exclude_from_toc: false,
            before_toc: false,
        });

        for lesson in &part.lessons {
            let path = paths.clean.join(lesson.filename());
            let html = match tokio::fs::read_to_string(&path).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(lesson = %lesson.lesson_id, path = %path.display(), error = %e, "cleaned lesson missing, skipping");
                    missing_lessons.push(lesson.lesson_id.clone());
                    continue;
                }
            };

            let mut doc = Document::parse(&html);
            localizer.localize(&mut doc).await;
            rewrite_book_links(&mut doc.root);
            let body = select_content(&doc, opts.export_type, &lesson.lesson_id);

            content.push(BookRecord {
                title: format!("{}. {}", lesson.lesson_letter, lesson.lesson_title),
                content: apply_emoji_policy(&body, opts.emoji_mode),
                filename: Some(lesson.lesson_id.clone()),
                exclude_from_toc: false,
                before_toc: false,
            });
        }
    }

    let navigation = build_navigation(&content, opts.chapter_numbers);
    let book = Book {
        metadata,
        content,
        navigation,
    };

    let json = serde_json::to_string_pretty(&book)
        .map_err(|e| CoursebookError::validation(format!("cannot serialize book: {e}")))?;
    if let Some(parent) = paths.book_json.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoursebookError::io(parent, e))?;
    }
    tokio::fs::write(&paths.book_json, json)
        .await
        .map_err(|e| CoursebookError::io(&paths.book_json, e))?;

    let report = BookReport {
        book_path: paths.book_json.clone(),
        records: book.content.len(),
        missing_lessons,
        refetched: localizer.refetched,
        missing_images: localizer.missing.into_iter().collect(),
    };
    info!(
        records = report.records,
        refetched = report.refetched,
        missing_images = report.missing_images.len(),
        path = %report.book_path.display(),
        "book content written"
    );
    Ok(report)
}

/// Title and metadata for the export type, language and date.
pub fn book_metadata(opts: &BookOptions, date: chrono::NaiveDate) -> BookMetadata {
    let year = date.year();
    let lang = &opts.language;
    let title = match opts.export_type {
        ExportType::ExercisesOnly => format!("Full Stack Open {year} Exercises ({lang})"),
        ExportType::CourseOnly => format!("Full Stack Open {year} (Course Only, {lang})"),
        ExportType::Full => format!("Full Stack Open {year} ({lang})"),
    };
    BookMetadata {
        title,
        author: AUTHOR.into(),
        publisher: PUBLISHER.into(),
        description: DESCRIPTION.into(),
        toc_title: TOC_TITLE.into(),
        date: date.format("%Y-%m-%d").to_string(),
        lang: lang.clone(),
    }
}

fn title_page(metadata: &BookMetadata) -> String {
    format!(
        "<div class=\"title-page\"><h1>{}</h1><p class=\"author\">{}</p><p class=\"publisher\">{}</p></div>",
        escape_html(&metadata.title),
        escape_html(&metadata.author),
        escape_html(&metadata.publisher)
    )
}

/// Body of the part's cover page, rendered on the spot when the cover
/// stage has not been run.
async fn cover_content(part: &Part, covers_dir: &Path, default_accent: &str, sanitizer: &Sanitizer) -> String {
    let path = covers_dir.join(part.cover_filename());
    let html = match tokio::fs::read_to_string(&path).await {
        Ok(html) => html,
        Err(_) => {
            debug!(part = part.part_id, "no cover file, rendering cover");
            render_cover(part, default_accent, sanitizer)
        }
    };
    Document::parse(&html)
        .body()
        .map(Element::inner_html)
        .unwrap_or_default()
}

/// The part of a lesson that goes into the book for `export_type`.
pub fn select_content(doc: &Document, export_type: ExportType, lesson_id: &str) -> String {
    let is_exercise = |el: &Element| el.has_class("exercise");
    match export_type {
        ExportType::Full => doc.body().map(Element::inner_html).unwrap_or_default(),
        ExportType::ExercisesOnly => match doc.root.find(&is_exercise) {
            Some(exercise) => exercise.inner_html(),
            None => {
                warn!(lesson = %lesson_id, "no exercises for lesson");
                NO_EXERCISES.to_string()
            }
        },
        ExportType::CourseOnly => {
            let mut doc = doc.clone();
            doc.root.remove_first(&is_exercise);
            doc.body().map(Element::inner_html).unwrap_or_default()
        }
    }
}

/// Point local `.html` links at the renderer's `.xhtml` chapters and unwrap
/// links with a bare scheme.
pub fn rewrite_book_links(root: &mut Element) {
    root.rewrite(&mut |mut el| {
        if !el.is("a") {
            return vec![Node::Element(el)];
        }
        let Some(href) = el.attr("href").map(str::trim) else {
            return vec![Node::Element(el)];
        };
        if BARE_SCHEME_RE.is_match(href) {
            return el.children;
        }
        if href.contains(".html") && !href.starts_with("http") {
            let rewritten = LOCAL_HTML_RE.replace(href, ".xhtml${1}").into_owned();
            el.set_attr("href", rewritten);
        }
        vec![Node::Element(el)]
    });
}

/// Table of contents: covers at level 1, lessons at level 2.
///
/// With `chapter_numbers`, each cover title is prefixed with its part's
/// chapter number.
pub fn build_navigation(content: &[BookRecord], chapter_numbers: bool) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    let mut chapter = 0;
    for (i, record) in content.iter().enumerate() {
        if record.exclude_from_toc {
            continue;
        }
        let filename = record
            .filename
            .clone()
            .unwrap_or_else(|| format!("chapter-{i}"));
        let is_cover = filename.ends_with("-cover");
        let title = if is_cover && chapter_numbers {
            chapter += 1;
            format!("{chapter}. {}", record.title)
        } else {
            record.title.clone()
        };
        toc.push(TocEntry {
            title,
            filename,
            level: if is_cover { 1 } else { 2 },
        });
    }
    toc
}

// ---------------------------------------------------------------------------
// Image localization
// ---------------------------------------------------------------------------

/// Makes relative image sources absolute `file://` URLs, refetching images
/// missing on disk once.
struct ImageLocalizer {
    clean_dir: PathBuf,
    images_dir: PathBuf,
    /// Path below the images directory → original URL.
    sources: HashMap<String, String>,
    fetcher: ImageFetcher,
    checked: HashSet<String>,
    missing: HashSet<String>,
    refetched: usize,
}

impl ImageLocalizer {
    async fn new(paths: &OutputPaths) -> Result<Self> {
        let urls = if paths.imgs_json.exists() {
            load_image_list(&paths.imgs_json).await?
        } else {
            Vec::new()
        };
        let sources = urls
            .into_iter()
            .filter_map(|url| {
                let parsed = Url::parse(&url).ok()?;
                Some((relative_image_path(&parsed), url))
            })
            .collect();

        Ok(Self {
            clean_dir: paths.clean.clone(),
            images_dir: paths.imgs.clone(),
            sources,
            fetcher: ImageFetcher::new(&paths.imgs)?,
            checked: HashSet::new(),
            missing: HashSet::new(),
            refetched: 0,
        })
    }

    async fn localize(&mut self, doc: &mut Document) {
        let mut sources = Vec::new();
        doc.root.walk(&mut |el| {
            if !el.is("img") {
                return;
            }
            if let Some(src) = el.attr("src").map(str::trim).filter(|s| is_local(s)) {
                sources.push(src.to_string());
            }
        });

        for src in sources {
            if self.checked.insert(src.clone()) {
                self.ensure_on_disk(&src).await;
            }
        }

        let clean_dir = self.clean_dir.clone();
        let missing = &self.missing;
        doc.root.rewrite(&mut |mut el| {
            if !el.is("img") {
                return vec![Node::Element(el)];
            }
            let Some(src) = el.attr("src").map(|s| s.trim().to_string()) else {
                return vec![Node::Element(el)];
            };
            if !is_local(&src) {
                return vec![Node::Element(el)];
            }
            if missing.contains(&src) {
                return Vec::new();
            }
            if let Some(url) = file_url(&clean_dir.join(&src)) {
                el.set_attr("src", url);
            }
            vec![Node::Element(el)]
        });
    }

    /// Refetch `src` once if it is not on disk; remember it as missing when
    /// that fails.
    async fn ensure_on_disk(&mut self, src: &str) {
        let path = self.clean_dir.join(src);
        if path.exists() {
            return;
        }

        let relative = path
            .strip_prefix(&self.images_dir)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"));
        let url = relative.and_then(|r| self.sources.get(&r).cloned());

        let recovered = match &url {
            Some(url) => match self.fetcher.download(url).await {
                Ok(_) => {
                    self.refetched += 1;
                    true
                }
                Err(e) => {
                    debug!(%url, error = %e, "refetch failed");
                    false
                }
            },
            None => false,
        };

        if !recovered {
            let err = CoursebookError::AssetMissing {
                path: path.clone(),
                url: url.unwrap_or_default(),
            };
            warn!(error = %err, "removing image from book");
            self.missing.insert(src.to_string());
        }
    }
}

fn is_local(src: &str) -> bool {
    !src.is_empty() && !REMOTE_SRC_RE.is_match(src)
}

fn file_url(path: &Path) -> Option<String> {
    let absolute = std::path::absolute(path).ok()?;
    Url::from_file_path(absolute).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts(export_type: ExportType) -> BookOptions {
        BookOptions {
            export_type,
            language: "en".into(),
            emoji_mode: EmojiMode::Replace,
            chapter_numbers: false,
            default_accent: "#ccc".into(),
        }
    }

    const LESSON: &str = r#"<html><body><div class="lesson-row">a</div><p>Text</p><div class="exercise"><h3>Exercises</h3></div><p>After</p></body></html>"#;

    #[test]
    fn metadata_title_depends_on_export_type() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let full = book_metadata(&opts(ExportType::Full), date);
        assert_eq!(full.title, "Full Stack Open 2025 (en)");
        assert_eq!(full.date, "2025-03-07");
        assert_eq!(
            book_metadata(&opts(ExportType::CourseOnly), date).title,
            "Full Stack Open 2025 (Course Only, en)"
        );
        assert_eq!(
            book_metadata(&opts(ExportType::ExercisesOnly), date).title,
            "Full Stack Open 2025 Exercises (en)"
        );
    }

    #[test]
    fn export_types_select_content() {
        let doc = Document::parse(LESSON);
        let full = select_content(&doc, ExportType::Full, "0-a");
        assert!(full.contains("Exercises") && full.contains("After"));

        let course = select_content(&doc, ExportType::CourseOnly, "0-a");
        assert!(!course.contains("Exercises"));
        assert!(course.contains("<p>After</p>"));

        assert_eq!(select_content(&doc, ExportType::ExercisesOnly, "0-a"), "<h3>Exercises</h3>");
        let plain = Document::parse("<p>none</p>");
        assert_eq!(select_content(&plain, ExportType::ExercisesOnly, "0-b"), NO_EXERCISES);
    }

    #[test]
    fn local_links_point_at_xhtml() {
        let mut doc = Document::parse(
            r#"<a href="0-b.html">b</a><a href="0-a.html#setup">s</a><a href="https://x.example/a.html">x</a><a href="http://">bare</a>"#,
        );
        rewrite_book_links(&mut doc.root);
        assert_eq!(
            doc.body().unwrap().inner_html(),
            r#"<a href="0-b.xhtml">b</a><a href="0-a.xhtml#setup">s</a><a href="https://x.example/a.html">x</a>bare"#
        );
    }

    #[test]
    fn navigation_levels_and_chapter_numbers() {
        let record = |title: &str, filename: Option<&str>, exclude: bool| BookRecord {
            title: title.into(),
            content: String::new(),
            filename: filename.map(String::from),
            exclude_from_toc: exclude,
            before_toc: exclude,
        };
        let content = vec![
            record("Title", None, true),
            record("Part 0: Basics.", Some("0-cover"), false),
            record("a. Intro", Some("0-a"), false),
            record("Part 1: React.", Some("1-cover"), false),
        ];

        let toc = build_navigation(&content, true);
        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].title, "1. Part 0: Basics.");
        assert_eq!(toc[0].level, 1);
        assert_eq!(toc[1].title, "a. Intro");
        assert_eq!(toc[1].level, 2);
        assert_eq!(toc[2].title, "2. Part 1: React.");

        let plain = build_navigation(&content, false);
        assert_eq!(plain[0].title, "Part 0: Basics.");
    }

    /// Manifest with one part and one lesson whose cleaned HTML references
    /// three local images.
    fn setup(server_uri: &str) -> (tempfile::TempDir, OutputPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "imgs");
        std::fs::create_dir_all(paths.imgs.join("static")).unwrap();

        let manifest = r##"[{"partID":0,"partName":"Part 0","partTitle":"Basics","partUrl":"https://site.example/en/part0","banner":null,"accentColor":"#ccc","partDescription":"<p>About</p>","lessons":[{"lessonID":"0-a","lessonLetter":"a","lessonTitle":"Intro","url":"https://site.example/en/part0/intro"}]}]"##;
        std::fs::write(&paths.data_json, manifest).unwrap();
        std::fs::write(paths.imgs.join("static/here.png"), b"img").unwrap();
        let urls = vec![
            format!("{server_uri}/static/here.png"),
            format!("{server_uri}/static/refetch.png"),
            format!("{server_uri}/static/gone.png"),
        ];
        std::fs::write(&paths.imgs_json, serde_json::to_string(&urls).unwrap()).unwrap();
        std::fs::write(
            paths.clean.join("0-a.html"),
            concat!(
                r#"<html><body><p>Hi 🚀 <a href="0-a.html#top">top</a></p>"#,
                r#"<img src="imgs/static/here.png"><img src="imgs/static/refetch.png"><img src="imgs/static/gone.png">"#,
                r#"</body></html>"#
            ),
        )
        .unwrap();
        (dir, paths)
    }

    #[tokio::test]
    async fn assembles_book_and_recovers_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/refetch.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (_dir, paths) = setup(&server.uri());
        let report = assemble_book(&paths, &opts(ExportType::Full)).await.unwrap();

        assert_eq!(report.records, 3);
        assert_eq!(report.refetched, 1);
        assert_eq!(report.missing_images, vec!["imgs/static/gone.png".to_string()]);
        assert!(paths.imgs.join("static/refetch.png").exists());

        let book: Book =
            serde_json::from_str(&std::fs::read_to_string(&paths.book_json).unwrap()).unwrap();
        assert!(book.content[0].before_toc);
        assert_eq!(book.content[1].title, "Part 0: Basics.");
        assert!(book.content[1].content.contains("cover-description-page"));

        let lesson = &book.content[2];
        assert_eq!(lesson.title, "a. Intro");
        assert_eq!(lesson.filename.as_deref(), Some("0-a"));
        assert!(lesson.content.contains(":rocket:"));
        assert!(lesson.content.contains(r#"href="0-a.xhtml#top""#));
        assert_eq!(lesson.content.matches("<img").count(), 2);
        assert!(lesson.content.contains("file://"));
        assert!(!lesson.content.contains("gone.png"));

        assert_eq!(book.navigation.len(), 2);
        assert_eq!(book.metadata.toc_title, "Course contents");
    }

    #[tokio::test]
    async fn missing_lesson_is_skipped() {
        let server = MockServer::start().await;
        let (_dir, paths) = setup(&server.uri());
        std::fs::remove_file(paths.clean.join("0-a.html")).unwrap();

        let report = assemble_book(&paths, &opts(ExportType::CourseOnly)).await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.missing_lessons, vec!["0-a".to_string()]);
    }
}
