//! Cover stage: one `{partID}-cover.html` page per course part.

use std::path::Path;

use tracing::{debug, info, instrument};

use coursebook_runner::{ItemOutcome, ProgressReporter};
use coursebook_shared::{CoursebookError, Manifest, OutputPaths, Part, Result};
use coursebook_transform::Sanitizer;
use coursebook_transform::dom::{Document, escape_html};

/// Write a cover page for every part in the manifest. Returns the number of
/// covers written.
#[instrument(skip_all, fields(covers = %paths.covers.display()))]
pub async fn create_covers(
    paths: &OutputPaths,
    default_accent: &str,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    let manifest = Manifest::load(&paths.data_json)?;
    write_covers(&manifest, &paths.covers, default_accent, progress).await
}

/// Write covers for `manifest` into `dir`.
pub async fn write_covers(
    manifest: &Manifest,
    dir: &Path,
    default_accent: &str,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoursebookError::io(dir, e))?;

    let sanitizer = Sanitizer::default();
    let total = manifest.parts.len();
    progress.batch_started(total);

    for (i, part) in manifest.parts.iter().enumerate() {
        let html = render_cover(part, default_accent, &sanitizer);
        let path = dir.join(part.cover_filename());
        tokio::fs::write(&path, html)
            .await
            .map_err(|e| CoursebookError::io(&path, e))?;
        debug!(part = part.part_id, path = %path.display(), "cover written");
        progress.item_finished(i + 1, total, &ItemOutcome::Succeeded { attempts: 1 });
    }

    progress.batch_finished(total, 0);
    info!(count = total, "cover pages generated");
    Ok(total)
}

/// Cover HTML for one part: title page, banner page, description page.
///
/// The banner page is left out when the part has no banner.
pub fn render_cover(part: &Part, default_accent: &str, sanitizer: &Sanitizer) -> String {
    let accent = escape_html(part.accent_or(default_accent));
    let name = escape_html(&part.part_name);
    let title = escape_html(&part.part_title);
    let page_style = format!("background-color: {accent}; border: 1px solid {accent};");

    let mut description = Document::parse(&part.part_description);
    sanitizer.clean(&mut description);
    let description = description
        .body()
        .map(|body| body.inner_html())
        .unwrap_or_default();

    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{name}</title>\n</head>\n<body>\n\
         <div class=\"cover-title-page\"><h1>{name}<br><span class=\"weight-normal\">{title}</span></h1></div>\n"
    );

    if let Some(banner) = part.banner.as_deref().filter(|b| !b.trim().is_empty()) {
        html.push_str(&format!(
            "<div class=\"cover-image-page\" style=\"{page_style}\"><img src=\"{}\" alt=\"Part {} cover illustration\"></div>\n",
            escape_html(banner),
            part.part_id
        ));
    }

    html.push_str(&format!(
        "<div class=\"cover-description-page\" style=\"{page_style}\">{description}</div>\n</body>\n</html>\n"
    ));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursebook_runner::SilentProgress;

    fn part() -> Part {
        Part {
            part_id: 3,
            part_name: "Part 3".into(),
            part_title: "Servers & <Node>".into(),
            part_url: "https://site.example/en/part3".into(),
            banner: Some("https://site.example/static/banner.svg".into()),
            accent_color: Some("#abc".into()),
            part_description: r#"<p onclick="x()">Build <b>APIs</b></p><script>bad()</script>"#.into(),
            lessons: vec![],
        }
    }

    #[test]
    fn cover_escapes_names_and_sanitizes_description() {
        let html = render_cover(&part(), "#ccc", &Sanitizer::default());
        assert!(html.contains(r#"<span class="weight-normal">Servers &amp; &lt;Node&gt;</span>"#));
        assert!(html.contains(r#"alt="Part 3 cover illustration""#));
        assert!(html.contains("background-color: #abc; border: 1px solid #abc;"));
        assert!(html.contains("<p>Build <b>APIs</b></p>"));
        assert!(!html.contains("onclick"));
        assert!(!html.contains("bad()"));
    }

    #[test]
    fn cover_without_banner_has_no_image_page() {
        let mut part = part();
        part.banner = None;
        part.accent_color = None;
        let html = render_cover(&part, "#ccc", &Sanitizer::default());
        assert!(!html.contains("cover-image-page"));
        assert!(html.contains("background-color: #ccc;"));
    }

    #[tokio::test]
    async fn writes_one_cover_per_part() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest { parts: vec![part()] };
        let count = write_covers(&manifest, dir.path(), "#ccc", &SilentProgress)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(dir.path().join("3-cover.html").exists());
    }
}
