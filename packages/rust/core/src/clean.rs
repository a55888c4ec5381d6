//! Clean stage: raw scraped HTML → transformed, allowlisted HTML.
//!
//! Two passes over `fetched-data/raw/`:
//! 1. index every document (fragment IDs, source URL map)
//! 2. transform each document through the [`TaskRunner`] and write it to
//!    `fetched-data/clean/`
//!
//! The image URLs collected in pass 2 are written to `imgs.json` for the
//! image stage.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use coursebook_runner::{ProgressReporter, TaskRunner};
use coursebook_shared::{
    AppConfig, CoursebookError, Manifest, ManifestEntry, OutputPaths, RawDocument, Result,
};
use coursebook_transform::{
    LessonInfo, Sanitizer, TransformOptions, TransformedDocument, build_index, transform_document,
};

/// Raw document filenames the clean stage picks up.
static RAW_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.]+\.html$").expect("valid regex"));

/// One unit of work for the runner.
#[derive(Clone)]
struct CleanJob {
    position: usize,
    doc: Arc<RawDocument>,
    opts: Arc<TransformOptions>,
    lesson: Option<LessonInfo>,
}

/// What a finished job hands back.
struct CleanedFile {
    position: usize,
    image_urls: Vec<String>,
    links_rewritten: usize,
    links_unwrapped: usize,
}

/// Summary of a clean run.
#[derive(Debug, Clone)]
pub struct CleanReport {
    pub documents: usize,
    pub cleaned: usize,
    /// (filename, error message) for every document that failed.
    pub failed: Vec<(String, String)>,
    pub skipped: usize,
    /// Distinct image URLs written to `imgs.json`.
    pub images: usize,
    pub links_rewritten: usize,
    pub links_unwrapped: usize,
    pub elapsed: Duration,
}

/// Run the clean stage over `paths.raw`.
#[instrument(skip_all, fields(raw = %paths.raw.display()))]
pub async fn clean_documents(
    config: &AppConfig,
    paths: &OutputPaths,
    runner: &TaskRunner,
    progress: &dyn ProgressReporter,
) -> Result<CleanReport> {
    let start = Instant::now();

    let manifest = Manifest::load(&paths.data_json)?;
    let documents = read_raw_documents(&paths.raw)?;
    info!(count = documents.len(), "raw documents found");

    // Pass 1
    let index = Arc::new(build_index(&manifest, &documents, &config.site));

    tokio::fs::create_dir_all(&paths.clean)
        .await
        .map_err(|e| CoursebookError::io(&paths.clean, e))?;

    let base = TransformOptions {
        accent_color: config.content.default_accent_color.clone(),
        index,
        site: config.site.clone(),
        collect_image_urls: true,
        emoji_mode: config.content.emoji_mode,
        images_root: config.content.images_dir.clone(),
        sanitizer: Arc::new(Sanitizer::default()),
    };

    let jobs: Vec<CleanJob> = documents
        .into_iter()
        .enumerate()
        .map(|(position, doc)| {
            let (accent, lesson) = lookup(&manifest, &doc.filename, &base.accent_color);
            CleanJob {
                position,
                opts: Arc::new(base.with_accent(accent)),
                doc: Arc::new(doc),
                lesson,
            }
        })
        .collect();
    let total = jobs.len();

    // Pass 2
    let clean_dir = Arc::new(paths.clean.clone());
    let batch = runner
        .run(
            jobs,
            move |job: CleanJob| {
                let clean_dir = Arc::clone(&clean_dir);
                async move { clean_one(job, &clean_dir).await }
            },
            progress,
        )
        .await;

    let failed: Vec<(String, String)> = batch
        .errors
        .into_iter()
        .map(|e| (e.item.doc.filename.clone(), e.error.to_string()))
        .collect();
    for (file, error) in &failed {
        warn!(%file, %error, "document failed to clean");
    }

    let mut cleaned = batch.results;
    cleaned.sort_by_key(|c| c.position);
    let images = write_image_list(&paths.imgs_json, &cleaned).await?;

    let report = CleanReport {
        documents: total,
        cleaned: cleaned.len(),
        failed,
        skipped: batch.skipped,
        images,
        links_rewritten: cleaned.iter().map(|c| c.links_rewritten).sum(),
        links_unwrapped: cleaned.iter().map(|c| c.links_unwrapped).sum(),
        elapsed: start.elapsed(),
    };
    info!(
        cleaned = report.cleaned,
        failed = report.failed.len(),
        images = report.images,
        duration_ms = report.elapsed.as_millis() as u64,
        "clean stage completed"
    );
    Ok(report)
}

/// Read every matching `*.html` file in `dir`, sorted by filename.
pub fn read_raw_documents(dir: &Path) -> Result<Vec<RawDocument>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoursebookError::io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CoursebookError::io(dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if RAW_FILE_RE.is_match(&name) {
            names.push(name);
        } else {
            debug!(file = %name, "skipping non-document file");
        }
    }
    names.sort();

    names
        .into_iter()
        .map(|name| {
            let path = dir.join(&name);
            let bytes = std::fs::read(&path).map_err(|e| CoursebookError::io(&path, e))?;
            Ok(RawDocument::new(name, bytes))
        })
        .collect()
}

/// Accent color and lesson identity for an output filename.
///
/// Files the manifest does not name still get their part's accent when the
/// filename starts with a known part ID.
fn lookup(manifest: &Manifest, filename: &str, default_accent: &str) -> (String, Option<LessonInfo>) {
    match manifest.locate(filename) {
        Some(entry) => {
            let lesson = match entry {
                ManifestEntry::Lesson(_, lesson) => Some(LessonInfo::from(lesson)),
                ManifestEntry::Cover(_) => None,
            };
            (entry.part().accent_or(default_accent).to_string(), lesson)
        }
        None => {
            let accent = filename
                .split_once('-')
                .and_then(|(id, _)| id.parse::<u32>().ok())
                .and_then(|id| manifest.parts.iter().find(|p| p.part_id == id))
                .map_or(default_accent, |part| part.accent_or(default_accent));
            (accent.to_string(), None)
        }
    }
}

async fn clean_one(job: CleanJob, clean_dir: &Path) -> Result<CleanedFile> {
    let CleanJob {
        position,
        doc,
        opts,
        lesson,
    } = job;

    let filename = doc.filename.clone();
    let transformed: TransformedDocument = tokio::task::spawn_blocking(move || {
        transform_document(&doc, &opts, lesson.as_ref())
    })
    .await
    .map_err(|e| CoursebookError::document_parse(&filename, format!("transform task failed: {e}")))??;

    let output = clean_dir.join(&filename);
    tokio::fs::write(&output, transformed.html.as_bytes())
        .await
        .map_err(|e| CoursebookError::io(&output, e))?;
    debug!(file = %filename, images = transformed.image_urls.len(), "document cleaned");

    Ok(CleanedFile {
        position,
        image_urls: transformed.image_urls,
        links_rewritten: transformed.links_rewritten,
        links_unwrapped: transformed.links_unwrapped,
    })
}

/// Write the de-duplicated image list in first-seen order. Returns its length.
async fn write_image_list(path: &Path, cleaned: &[CleanedFile]) -> Result<usize> {
    let mut seen = HashSet::new();
    let urls: Vec<&str> = cleaned
        .iter()
        .flat_map(|c| c.image_urls.iter().map(String::as_str))
        .filter(|url| seen.insert(*url))
        .collect();

    let json = serde_json::to_string_pretty(&urls)
        .map_err(|e| CoursebookError::validation(format!("cannot serialize image list: {e}")))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| CoursebookError::io(path, e))?;
    Ok(urls.len())
}
