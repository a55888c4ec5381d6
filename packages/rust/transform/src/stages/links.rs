//! Stage 6: resolve same-site links to output filenames.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use coursebook_shared::{CoursebookError, SiteConfig};

use super::StageReport;
use crate::TransformOptions;
use crate::dom::{Element, Node};
use crate::index::normalize_path;

/// What to do with one anchor.
#[derive(Debug, PartialEq, Eq)]
enum LinkAction {
    Keep,
    Rewrite(String),
    /// Replace the anchor with its children.
    Unwrap(&'static str),
}

pub(super) fn resolve_links(parent: &mut Element, opts: &TransformOptions, report: &mut StageReport) {
    let children = std::mem::take(&mut parent.children);
    for node in children {
        let Node::Element(mut el) = node else {
            parent.children.push(node);
            continue;
        };
        if el.is("pre") || el.is("code") {
            parent.children.push(Node::Element(el));
            continue;
        }
        resolve_links(&mut el, opts, report);

        let action = match el.attr("href") {
            Some(href) if el.is("a") && !href.is_empty() => classify(href, opts),
            _ => LinkAction::Keep,
        };
        match action {
            LinkAction::Keep => parent.children.push(Node::Element(el)),
            LinkAction::Rewrite(target) => {
                el.set_attr("href", target);
                report.links_rewritten += 1;
                parent.children.push(Node::Element(el));
            }
            LinkAction::Unwrap(reason) => {
                let err = unresolved(el.attr("href").unwrap_or_default(), reason);
                debug!(error = %err, "unwrapping link");
                report.links_unwrapped += 1;
                parent.children.extend(el.children);
            }
        }
    }
}

fn classify(href: &str, opts: &TransformOptions) -> LinkAction {
    static BARE_SCHEME_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^https?://(#.*)?$").expect("valid regex"));

    if BARE_SCHEME_RE.is_match(href) {
        return LinkAction::Unwrap("URL has no host");
    }
    if href.starts_with("mailto:") || href.starts_with("tel:") || href.starts_with('#') {
        return LinkAction::Keep;
    }
    if is_other_domain(href, &opts.site) {
        return LinkAction::Keep;
    }

    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment).filter(|f| !f.is_empty())),
        None => (href, None),
    };
    let path = normalize_path(path, &opts.site);

    let Some(file) = opts.index.resolve(&path) else {
        return LinkAction::Unwrap("no document for path");
    };
    match fragment {
        Some(fragment) if opts.index.has_fragment(file, fragment) => {
            LinkAction::Rewrite(format!("{file}#{fragment}"))
        }
        Some(_) => LinkAction::Unwrap("fragment not found in target"),
        None => LinkAction::Rewrite(file.to_string()),
    }
}

fn is_other_domain(href: &str, site: &SiteConfig) -> bool {
    match Url::parse(href) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            !url.host_str().is_some_and(|host| site.is_site_host(host))
        }
        _ => false,
    }
}

/// Recovered resolution failure; the anchor's text stays in the document.
fn unresolved(href: &str, reason: &str) -> CoursebookError {
    CoursebookError::LinkResolution {
        href: href.to_string(),
        reason: reason.to_string(),
    }
}
