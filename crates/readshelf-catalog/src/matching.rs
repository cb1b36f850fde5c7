//! Fuzzy title/author matching used when an identifier lookup misses.
//!
//! The external catalog mints a fresh identifier per edition and
//! translation of a work; without this fallback, every edition would seed
//! its own local record.

use once_cell::sync::Lazy;
use regex::Regex;

use readshelf_core::{Book, Store};

use crate::error::Result;

static AUTHOR_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(jr\.?|sr\.?|ii|iii|iv)$").expect("valid regex"));
static LEADING_ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(the|a|an)\s+").expect("valid regex"));

/// Lowercase, strip generational suffixes, collapse whitespace.
pub fn normalize_author(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = AUTHOR_SUFFIX_RE.replace(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, strip a leading article, collapse separators to spaces.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let without_article = LEADING_ARTICLE_RE.replace(&lowered, "");
    without_article
        .chars()
        .map(|c| match c {
            ':' | '-' | '|' | '–' | '—' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether two author lists share at least one person, comparing normalized
/// names and tolerating substring containment ("F. Herbert" within
/// "Frank Herbert" style variations).
pub fn authors_overlap(left: &[String], right: &[String]) -> bool {
    if left.is_empty() || right.is_empty() {
        return false;
    }

    let normalized_left: Vec<String> = left.iter().map(|a| normalize_author(a)).collect();
    let normalized_right: Vec<String> = right.iter().map(|a| normalize_author(a)).collect();

    normalized_left.iter().any(|a| {
        normalized_right
            .iter()
            .any(|b| !a.is_empty() && !b.is_empty() && (a.contains(b.as_str()) || b.contains(a.as_str())))
    })
}

/// Multi-tier title/author fallback, first hit wins:
///
/// 1. exact case-insensitive title and every supplied author present;
/// 2. exact case-insensitive title and normalized author overlap;
/// 3. normalized-title substring containment against any book sharing at
///    least one supplied author.
///
/// Tier 3 can conflate two works by one author whose titles nest (bundled
/// editions make the substring check deliberate); strictness is unchanged
/// from the behavior this replaces.
pub fn find_by_title_and_authors(
    store: &Store,
    title: &str,
    authors: &[String],
) -> Result<Option<Book>> {
    if title.trim().is_empty() || authors.is_empty() {
        return Ok(None);
    }

    let title_matches = store.find_by_title(title)?;

    for book in &title_matches {
        let all_present = authors.iter().all(|author| {
            book.authors
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(author))
        });
        if all_present {
            return Ok(Some(book.clone()));
        }
    }

    for book in &title_matches {
        if authors_overlap(&book.authors, authors) {
            return Ok(Some(book.clone()));
        }
    }

    let normalized_query = normalize_title(title);
    for candidate in store.find_by_authors(authors)? {
        let normalized_candidate = normalize_title(&candidate.title);
        let titles_nest = normalized_candidate.contains(&normalized_query)
            || normalized_query.contains(&normalized_candidate);
        if titles_nest && authors_overlap(&candidate.authors, authors) {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}
