//! Field-level enrichment: merging freshly normalized catalog data into an
//! existing record without ever regressing it.

use readshelf_core::Book;

use crate::matching::{authors_overlap, normalize_author};
use crate::normalize::WorkCandidate;

/// Apply improve-never-regress rules to `existing`, returning whether any
/// field actually changed (the caller persists only then).
///
/// Rules, each independent:
/// - description: replaced only by a strictly longer non-empty one;
/// - cover image: filled only when absent, carrying the paired low-res
///   reference along;
/// - subtitle, release date: filled only when absent;
/// - authors: union via the normalized overlap check, never removing;
/// - genres: union by case/whitespace-normalized equality;
/// - identifier linking: the queried id joins `alternative_ids` when the
///   record does not already claim it.
pub fn merge_into(existing: &mut Book, candidate: &WorkCandidate, external_id: &str) -> bool {
    let mut dirty = false;

    let current_len = existing.description.as_deref().map_or(0, str::len);
    if let Some(description) = candidate.description.as_deref()
        && description.len() > current_len
    {
        existing.description = Some(description.to_string());
        dirty = true;
    }

    if existing.cover_image.is_none() && candidate.cover_image.is_some() {
        existing.cover_image = candidate.cover_image.clone();
        existing.cover_id = candidate.cover_id;
        dirty = true;
    }

    if existing.subtitle.is_none() && candidate.subtitle.is_some() {
        existing.subtitle = candidate.subtitle.clone();
        dirty = true;
    }

    if existing.release_date.is_none() && candidate.release_date.is_some() {
        existing.release_date = candidate.release_date.clone();
        dirty = true;
    }

    if !candidate.authors.is_empty() {
        let merged = merge_authors(&existing.authors, &candidate.authors);
        if merged.len() > existing.authors.len() {
            existing.authors = merged;
            dirty = true;
        }
    }

    if !candidate.genres.is_empty() {
        let merged = merge_genres(&existing.genres, &candidate.genres);
        if merged.len() > existing.genres.len() {
            existing.genres = merged;
            dirty = true;
        }
    }

    if !existing.is_linked(external_id) {
        existing.alternative_ids.push(external_id.to_string());
        dirty = true;
    }

    dirty
}

/// Union of two author lists. An incoming author already represented —
/// by normalized equality or substring containment either way — is skipped.
pub fn merge_authors(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    let mut normalized: Vec<String> = existing.iter().map(|a| normalize_author(a)).collect();

    for author in incoming {
        let candidate = normalize_author(author);
        if candidate.is_empty() {
            continue;
        }
        let duplicate = normalized.iter().any(|present| {
            present == &candidate
                || present.contains(candidate.as_str())
                || candidate.contains(present.as_str())
        });
        if !duplicate {
            merged.push(author.clone());
            normalized.push(candidate);
        }
    }

    merged
}

/// Union of two genre lists by case/whitespace-normalized equality.
pub fn merge_genres(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    let mut normalized: Vec<String> = existing
        .iter()
        .map(|g| g.trim().to_lowercase())
        .collect();

    for genre in incoming {
        let candidate = genre.trim().to_lowercase();
        if candidate.is_empty() || normalized.contains(&candidate) {
            continue;
        }
        merged.push(genre.clone());
        normalized.push(candidate);
    }

    merged
}

/// Build a brand-new book from a normalized candidate. When the catalog's
/// canonical identifier differs from the one the caller asked about, the
/// queried id is linked as an alternative from the start.
pub fn book_from_candidate(candidate: &WorkCandidate, external_id: &str) -> Book {
    let primary = candidate
        .external_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| external_id.to_string());

    let mut book = Book::new(primary, candidate.title.clone());
    if !book.is_linked(external_id) {
        book.alternative_ids.push(external_id.to_string());
    }
    book.subtitle = candidate.subtitle.clone();
    book.authors = candidate.authors.clone();
    book.genres = candidate.genres.clone();
    book.description = candidate.description.clone();
    book.cover_image = candidate.cover_image.clone();
    book.cover_id = candidate.cover_id;
    book.release_date = candidate.release_date.clone();
    book
}
