use serde::{Deserialize, Serialize};

use crate::client::RawWork;

const COVER_URL_BASE: &str = "https://covers.openlibrary.org/b/id";

/// Caller-supplied hints accompanying a resolution request. The works
/// endpoint carries author references rather than names, so author names in
/// particular arrive this way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveHints {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub subtitle: Option<String>,
    pub cover_id: Option<i64>,
    pub cover_image: Option<String>,
    pub release_date: Option<String>,
}

/// Canonical attribute set produced by normalization; input to the
/// enrichment merger.
#[derive(Debug, Clone, Default)]
pub struct WorkCandidate {
    /// The catalog's own identifier for the record, when it reported one.
    pub external_id: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub cover_id: Option<i64>,
    pub release_date: Option<String>,
}

/// Map a raw catalog record onto the canonical attribute set, filling gaps
/// from hints. Pure; no I/O.
pub fn normalize_work(raw: &RawWork, hints: &ResolveHints) -> WorkCandidate {
    let title = raw
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| hints.title.clone())
        .unwrap_or_default();

    let subtitle = non_empty(raw.subtitle.clone()).or_else(|| non_empty(hints.subtitle.clone()));

    let description = non_empty(raw.description.clone());

    let cover_id = raw.cover_ids.first().copied().or(hints.cover_id);
    let cover_image = cover_id
        .map(|id| format!("{COVER_URL_BASE}/{id}-L.jpg"))
        .or_else(|| non_empty(hints.cover_image.clone()));

    let release_date =
        non_empty(raw.first_publish_date.clone()).or_else(|| non_empty(hints.release_date.clone()));

    WorkCandidate {
        external_id: raw.key.clone(),
        title,
        subtitle,
        authors: hints.authors.clone(),
        genres: raw.subjects.clone(),
        description,
        cover_image,
        cover_id,
        release_date,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
