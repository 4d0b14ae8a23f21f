use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Response, Source};

/// Confidence assumed for responses that did not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Combined output of a parallel multi-provider dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub primary: Response,
    pub secondary: Vec<Response>,
    pub combined: String,
    pub confidence: f64,
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
}

/// Merges successful responses given in dispatch order. Returns `None` for
/// an empty input.
pub fn merge_responses(responses: Vec<Response>) -> Option<MergedResult> {
    let combined = combine_content(&responses)?;
    let confidence = average_confidence(&responses);
    let sources = dedup_sources(responses.iter().flat_map(|r| r.sources.iter().cloned()));

    let mut iter = responses.into_iter();
    let primary = iter.next()?;
    Some(MergedResult {
        primary,
        secondary: iter.collect(),
        combined,
        confidence,
        sources,
        timestamp: Utc::now(),
    })
}

/// A single response is returned verbatim; several are labelled per provider
/// and joined with a visible separator.
pub fn combine_content(responses: &[Response]) -> Option<String> {
    match responses {
        [] => None,
        [only] => Some(only.content.clone()),
        many => Some(
            many.iter()
                .map(|r| format!("[{}]\n{}", r.provider, r.content))
                .collect::<Vec<_>>()
                .join(SECTION_SEPARATOR),
        ),
    }
}

/// Mean confidence. Missing values count as [`DEFAULT_CONFIDENCE`]; values
/// that are exactly zero are left out of the mean.
///
/// Note: this treats "reported zero" like "not reported", which is
/// questionable but kept for compatibility with existing clients.
pub fn average_confidence(responses: &[Response]) -> f64 {
    let values: Vec<f64> = responses
        .iter()
        .map(|r| r.confidence.unwrap_or(DEFAULT_CONFIDENCE))
        .filter(|c| *c != 0.0)
        .collect();

    if values.is_empty() {
        DEFAULT_CONFIDENCE
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Keeps the first source per URL-or-title key. Sources with neither are
/// kept as-is since there is nothing to compare them by.
pub fn dedup_sources<I>(sources: I) -> Vec<Source>
where
    I: IntoIterator<Item = Source>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| match s.dedup_key() {
            Some(key) => seen.insert(key.to_string()),
            None => true,
        })
        .collect()
}
