//! HTML link extractor (C3): parsed document + parent link + seed URL -> child links.

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::model::Link;

/// Extracts absolute in-scope child links from a parsed document.
///
/// Cancellation-aware: if `cancel` fires between elements, a prefix of the
/// links found so far is returned rather than the full set (spec.md §4.C3).
pub fn extract_links(
    doc: &Html,
    parent: &Link,
    seed: &Url,
    anchor_selector: &Selector,
    cancel: &CancellationToken,
) -> Vec<Link> {
    let mut children = Vec::new();

    for element in doc.select(anchor_selector) {
        if cancel.is_cancelled() {
            break;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if href.starts_with('#') {
            continue;
        }

        let resolved = match seed.join(href) {
            Ok(mut absolute) => {
                absolute.set_fragment(None);
                if absolute.scheme().is_empty() {
                    let _ = absolute.set_scheme(seed.scheme());
                }
                absolute.to_string()
            }
            Err(_) => String::new(),
        };

        children.push(Link::child(resolved, parent.depth));
    }

    children
}
