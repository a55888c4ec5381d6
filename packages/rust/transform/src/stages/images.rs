//! Stage 2: point every `<img>` at the local images directory.

use url::Url;

use crate::TransformOptions;
use crate::dom::Element;

const DEFAULT_ALT: &str = "Image";

pub(super) fn rewrite_images(root: &mut Element, opts: &TransformOptions, collected: &mut Vec<String>) {
    let local_prefix = format!("{}/", opts.images_root);

    root.walk_mut(&mut |el| {
        if !el.is("img") {
            return;
        }

        if let Some(src) = el.attr("src").filter(|s| !s.is_empty()) {
            if !src.starts_with(&local_prefix) {
                if let Some(url) = resolve_src(src, &opts.site.base_url) {
                    if opts.collect_image_urls {
                        collected.push(url.to_string());
                    }
                    let local = format!("{}/{}", opts.images_root, url.path().trim_start_matches('/'));
                    el.set_attr("src", local);
                }
            }
        }

        let alt = match el.attr("alt") {
            Some(alt) if !alt.is_empty() => alt,
            _ => DEFAULT_ALT,
        };
        let alt: String = alt.chars().filter(|c| !matches!(c, '&' | '<' | '>' | '"')).collect();
        el.set_attr("alt", alt);
        el.set_attr("style", format!("border: 7px solid {};", opts.accent_color));
    });
}

/// Absolute http(s) URL of an image source, relative sources resolved
/// against the site.
fn resolve_src(src: &str, base: &Url) -> Option<Url> {
    let url = base.join(src.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn opts(collect: bool) -> TransformOptions {
        TransformOptions {
            collect_image_urls: collect,
            accent_color: "#abc".into(),
            site: coursebook_shared::SiteConfig::parse("https://site.example").unwrap(),
            ..TransformOptions::default()
        }
    }

    fn run(html: &str, opts: &TransformOptions) -> (String, Vec<String>) {
        let mut doc = Document::parse(html);
        let mut urls = Vec::new();
        rewrite_images(&mut doc.root, opts, &mut urls);
        (doc.body().unwrap().inner_html(), urls)
    }

    #[test]
    fn rewrites_absolute_and_relative_sources() {
        let (html, urls) = run(
            r#"<img src="https://site.example/x/y.png" alt="A &quot;quoted&quot; <b>"><img src="/static/z.jpg">"#,
            &opts(true),
        );
        assert_eq!(
            html,
            r#"<img alt="A quoted b" src="imgs/x/y.png" style="border: 7px solid #abc;"><img src="imgs/static/z.jpg" alt="Image" style="border: 7px solid #abc;">"#
        );
        assert_eq!(
            urls,
            vec!["https://site.example/x/y.png", "https://site.example/static/z.jpg"]
        );
    }

    #[test]
    fn collection_is_optional() {
        let (_, urls) = run(r#"<img src="https://site.example/a.png">"#, &opts(false));
        assert!(urls.is_empty());
    }

    #[test]
    fn local_sources_are_left_alone() {
        let (html, urls) = run(r#"<img src="imgs/x/y.png" alt="Y">"#, &opts(true));
        assert!(html.contains(r#"src="imgs/x/y.png""#));
        assert!(urls.is_empty());
    }

    #[test]
    fn data_uris_are_not_collected() {
        let (html, urls) = run(r#"<img src="data:image/png;base64,AAAA">"#, &opts(true));
        assert!(html.contains("data:image/png"));
        assert!(urls.is_empty());
    }
}
