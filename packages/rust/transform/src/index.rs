//! Cross-document index: fragment IDs per output file and the source-URL map.
//!
//! Built once over every raw document before any transform runs, then shared
//! read-only (behind an `Arc`) by all transform invocations.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};
use url::Url;

use coursebook_shared::{Manifest, RawDocument, Result, SiteConfig};

use crate::dom::Document;

/// Output filename → every `id` attribute value in that document.
pub type FragmentIndex = HashMap<String, HashSet<String>>;

/// Normalized source URL path → output filename.
pub type UrlMap = HashMap<String, String>;

/// Read-only snapshot consumed by link resolution.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    pub fragments: FragmentIndex,
    pub urls: UrlMap,
}

impl DocumentIndex {
    /// Output filename for a normalized path.
    ///
    /// A path that already names an output file (a raw document or any
    /// manifest target, covers included) resolves to itself, so links
    /// rewritten by an earlier run stay valid.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        if let Some(file) = self.urls.get(path) {
            return Some(file);
        }
        if let Some((file, _)) = self.fragments.get_key_value(path) {
            return Some(file);
        }
        self.urls.values().find(|file| *file == path).map(String::as_str)
    }

    pub fn has_fragment(&self, filename: &str, fragment: &str) -> bool {
        self.fragments
            .get(filename)
            .is_some_and(|ids| ids.contains(fragment))
    }
}

/// Build both maps. Documents that fail to parse get an empty fragment set.
#[instrument(skip_all, fields(documents = documents.len()))]
pub fn build_index(manifest: &Manifest, documents: &[RawDocument], site: &SiteConfig) -> DocumentIndex {
    let mut urls = UrlMap::new();
    for part in &manifest.parts {
        urls.insert(manifest_path(&part.part_url, site), part.cover_filename());
        for lesson in &part.lessons {
            urls.insert(manifest_path(&lesson.url, site), lesson.filename());
        }
    }

    let mut fragments = FragmentIndex::with_capacity(documents.len());
    for doc in documents {
        let ids = match collect_fragments(doc) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(file = %doc.filename, error = %e, "cannot index document, using empty fragment set");
                HashSet::new()
            }
        };
        fragments.insert(doc.filename.clone(), ids);
    }

    debug!(urls = urls.len(), files = fragments.len(), "document index built");
    DocumentIndex { fragments, urls }
}

/// Every `id` attribute value in one raw document.
pub fn collect_fragments(doc: &RawDocument) -> Result<HashSet<String>> {
    let text = doc.text()?;
    Ok(Document::parse(text).ids())
}

/// Reduce a same-site href (no fragment) to the key space of the [`UrlMap`].
///
/// An absolute URL on the site's domain keeps only its path. A single
/// trailing slash is stripped unless the path is the root.
pub fn normalize_path(href: &str, site: &SiteConfig) -> String {
    let path = match Url::parse(href) {
        Ok(url) if url.host_str().is_some_and(|host| site.is_site_host(host)) => {
            url.path().to_string()
        }
        _ => href.to_string(),
    };
    strip_trailing_slash(path)
}

/// Manifest URLs are always reduced to their path, whatever their host.
fn manifest_path(url: &str, site: &SiteConfig) -> String {
    match Url::parse(url) {
        Ok(parsed) => strip_trailing_slash(parsed.path().to_string()),
        Err(_) => normalize_path(url, site),
    }
}

fn strip_trailing_slash(mut path: String) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig::parse("https://site.example").unwrap()
    }

    fn manifest() -> Manifest {
        Manifest::from_json(
            r##"[{
              "partID": 0, "partName": "Part 0", "partTitle": "Fundamentals",
              "partUrl": "https://site.example/en/part0/",
              "accentColor": "#ccc", "partDescription": "",
              "lessons": [
                { "lessonID": "0-a", "lessonLetter": "a", "lessonTitle": "Intro",
                  "url": "https://site.example/en/part0/intro/" }
              ]
            }]"##,
        )
        .unwrap()
    }

    #[test]
    fn normalizes_site_urls_to_paths() {
        let site = site();
        assert_eq!(normalize_path("https://site.example/en/part0/", &site), "/en/part0");
        assert_eq!(normalize_path("/en/part0/intro/", &site), "/en/part0/intro");
        assert_eq!(normalize_path("/", &site), "/");
        assert_eq!(normalize_path("https://site.example/", &site), "/");
        assert_eq!(normalize_path("https://other.example/a/", &site), "https://other.example/a");
    }

    #[test]
    fn builds_url_map_and_fragments() {
        let docs = vec![
            RawDocument::new("0-a.html", r#"<h1 id="intro">x</h1><p id="setup">y</p>"#),
            RawDocument::new("0-cover.html", "<p>cover</p>"),
        ];
        let index = build_index(&manifest(), &docs, &site());

        assert_eq!(index.urls.get("/en/part0").map(String::as_str), Some("0-cover.html"));
        assert_eq!(index.urls.get("/en/part0/intro").map(String::as_str), Some("0-a.html"));
        assert!(index.has_fragment("0-a.html", "intro"));
        assert!(index.has_fragment("0-a.html", "setup"));
        assert!(!index.has_fragment("0-a.html", "missing"));
        assert!(index.fragments["0-cover.html"].is_empty());
    }

    #[test]
    fn unparseable_document_gets_empty_set() {
        let docs = vec![
            RawDocument::new("0-a.html", vec![0xc3, 0x28, b'<']),
            RawDocument::new("0-b.html", r#"<p id="ok"></p>"#),
        ];
        let index = build_index(&manifest(), &docs, &site());
        assert!(index.fragments["0-a.html"].is_empty());
        assert!(index.has_fragment("0-b.html", "ok"));
    }

    #[test]
    fn resolve_accepts_output_filenames() {
        let docs = vec![RawDocument::new("0-a.html", "<p></p>")];
        let index = build_index(&manifest(), &docs, &site());
        assert_eq!(index.resolve("/en/part0/intro"), Some("0-a.html"));
        assert_eq!(index.resolve("0-a.html"), Some("0-a.html"));
        assert_eq!(index.resolve("/en/part9"), None);
    }

    #[test]
    fn resolve_accepts_cover_filenames_without_raw_documents() {
        let docs = vec![RawDocument::new("0-a.html", "<p></p>")];
        let index = build_index(&manifest(), &docs, &site());
        assert!(!index.fragments.contains_key("0-cover.html"));
        assert_eq!(index.resolve("/en/part0"), Some("0-cover.html"));
        assert_eq!(index.resolve("0-cover.html"), Some("0-cover.html"));
        assert_eq!(index.resolve("9-cover.html"), None);
    }

    #[test]
    fn www_host_is_the_same_site() {
        let site = site();
        assert_eq!(normalize_path("https://www.site.example/en/part0/", &site), "/en/part0");
    }
}
