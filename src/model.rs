//! Core value types shared by the crawl engine and the classifier (C1).

/// Number of boolean features tracked per [`Response`].
pub const NUM_FEATURES: usize = 3;

/// At least one form element is present in the fetched document.
pub const HAS_FORM: usize = 0;
/// The fetched URL carries a non-empty query string.
pub const HAS_QUERY: usize = 1;
/// The HTTP status code was >= 500.
pub const HAS_STATUS_ERROR: usize = 2;

pub type FeatureVec = [bool; NUM_FEATURES];

/// A URL discovered at a given crawl depth. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub depth: u8,
}

impl Link {
    pub fn seed(url: impl Into<String>) -> Self {
        Self { url: url.into(), depth: 0 }
    }

    pub fn child(url: impl Into<String>, parent_depth: u8) -> Self {
        Self { url: url.into(), depth: parent_depth + 1 }
    }
}

/// The result of fetching (or attempting to fetch) a [`Link`].
///
/// `body` holds the raw fetched HTML text, not a parsed DOM — see the
/// "Rust representation note" in SPEC_FULL.md for why: it keeps every value
/// placed in the shared result map `Send + Sync` without depending on the
/// thread-safety of a third-party DOM type.
#[derive(Debug, Clone)]
pub struct Response {
    pub link: Link,
    pub status_code: u16,
    pub body: Option<String>,
    pub features: FeatureVec,
}

impl Response {
    /// A claim placeholder: reserves the URL in the result map before the
    /// fetch has actually happened.
    pub(crate) fn placeholder(link: Link) -> Self {
        Self { link, status_code: 0, body: None, features: [false; NUM_FEATURES] }
    }

    /// True iff some feature index is set in both `self.features` and `mask`.
    pub fn has_match_with(&self, mask: &FeatureVec) -> bool {
        (0..NUM_FEATURES).any(|i| self.features[i] && mask[i])
    }

    /// Drop the parsed body to release memory once link extraction is done.
    pub fn clear_body(&mut self) {
        self.body = None;
    }
}
