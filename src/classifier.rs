//! Result classifier (C5): partitions a completed crawl into per-probe URL
//! shards plus a list of full 5xx responses for the RPC sink.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::model::{FeatureVec, HAS_FORM, HAS_QUERY, HAS_STATUS_ERROR, Response};

/// The probe special-cased by the coordinator: its matches go out over RPC
/// as full `Response` records rather than as bus URL shards.
pub const PROBE_5XX: &str = "5XX";

/// The fixed probe topic set of spec.md §6, each with its feature mask over
/// `[HAS_FORM, HAS_QUERY, HAS_STATUS_ERROR]`.
pub fn probe_mask(probe: &str) -> Option<FeatureVec> {
    match probe {
        "SQLI" => Some(mask(true, false, false)),
        "BA" => Some(mask(true, false, false)),
        "XSS" => Some(mask(true, true, false)),
        "LFI" => Some(mask(false, true, false)),
        PROBE_5XX => Some(mask(false, false, true)),
        _ => None,
    }
}

fn mask(has_form: bool, has_query: bool, has_status_error: bool) -> FeatureVec {
    let mut m = [false; 3];
    m[HAS_FORM] = has_form;
    m[HAS_QUERY] = has_query;
    m[HAS_STATUS_ERROR] = has_status_error;
    m
}

pub struct ClassifiedResult {
    /// One entry per non-5xx probe in `forwardTo`, empty when nothing matched.
    pub shards: HashMap<String, Vec<String>>,
    /// Full Response records for probes that matched the 5xx mask.
    pub error_responses: Vec<Response>,
}

pub fn classify(results: &DashMap<String, Response>, forward_to: &[String]) -> ClassifiedResult {
    let mut shards = HashMap::new();
    for probe in forward_to {
        if probe != PROBE_5XX {
            shards.entry(probe.clone()).or_insert_with(Vec::new);
        }
    }

    let mut error_responses = Vec::new();

    for entry in results.iter() {
        let response = entry.value();
        for probe in forward_to {
            let Some(mask) = probe_mask(probe) else {
                continue;
            };

            if probe == PROBE_5XX {
                if response.has_match_with(&mask) {
                    error_responses.push(response.clone());
                }
            } else if response.has_match_with(&mask) {
                shards.get_mut(probe).expect("pre-populated above").push(response.link.url.clone());
            }
        }
    }

    ClassifiedResult { shards, error_responses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, Response};

    fn response(url: &str, features: FeatureVec) -> Response {
        Response { link: Link::seed(url), status_code: 200, body: None, features }
    }

    #[test]
    fn s2_forward_to_sqli_xss_lfi() {
        let results = DashMap::new();
        results.insert("https://ex/".to_string(), response("https://ex/", [true, false, false]));
        results.insert(
            "https://ex/q?x=1".to_string(),
            response("https://ex/q?x=1", [false, true, false]),
        );

        let forward_to = vec!["SQLI".to_string(), "XSS".to_string(), "LFI".to_string()];
        let out = classify(&results, &forward_to);

        assert_eq!(out.shards["SQLI"], vec!["https://ex/".to_string()]);
        assert_eq!(out.shards["XSS"], vec!["https://ex/".to_string()]);
        assert_eq!(out.shards["LFI"], vec!["https://ex/q?x=1".to_string()]);
        assert!(out.error_responses.is_empty());
    }

    #[test]
    fn unmatched_probe_still_gets_an_empty_shard() {
        let results = DashMap::new();
        results.insert("https://ex/".to_string(), response("https://ex/", [false, false, false]));

        let out = classify(&results, &["SQLI".to_string()]);

        assert_eq!(out.shards["SQLI"], Vec::<String>::new());
    }

    #[test]
    fn s3_5xx_goes_to_error_responses_not_shards() {
        let results = DashMap::new();
        results.insert("https://ex/".to_string(), response("https://ex/", [false, false, true]));

        let out = classify(&results, &[PROBE_5XX.to_string()]);

        assert!(!out.shards.contains_key(PROBE_5XX));
        assert_eq!(out.error_responses.len(), 1);
        assert_eq!(out.error_responses[0].link.url, "https://ex/");
    }

    #[test]
    fn s6_skip_crawler_forces_every_shard_to_contain_seed() {
        let results = DashMap::new();
        results.insert("https://ex/".to_string(), response("https://ex/", [true, true, true]));

        let out = classify(&results, &["SQLI".to_string(), "XSS".to_string(), "LFI".to_string()]);

        assert_eq!(out.shards["SQLI"], vec!["https://ex/".to_string()]);
        assert_eq!(out.shards["XSS"], vec!["https://ex/".to_string()]);
        assert_eq!(out.shards["LFI"], vec!["https://ex/".to_string()]);
    }
}
