//! Author normalization: one flat row per (record, author) pair.
//!
//! Rows are derived fresh from records on every run and never mutated
//! in place. Name splitting takes the first whitespace token as the
//! first name and the remainder as the last name; an email is derived
//! from the author's affiliation text when one is present, otherwise
//! the `N/A` sentinel is used (uniform policy across the normalizer).

use crate::extract::Record;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Email sentinel when the affiliation text carries no address
pub const NO_EMAIL: &str = "N/A";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .unwrap_or_else(|_| Regex::new("$^").expect("regex"))
});

/// One author of one article, flattened for tabular export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRow {
    pub first_name: String,
    pub last_name: String,
    pub affiliation: String,
    pub email: String,
    /// 1-based position in the article's declared author order
    pub author_order: usize,
    // Denormalized record-level columns for flat export
    pub pmid: String,
    pub article_title: String,
    pub article_url: String,
    pub journal: String,
    pub date: String,
    pub doi: String,
}

/// Explode one record into author rows, preserving declared order.
///
/// A record with no authors yields zero rows, which is valid.
pub fn normalize_authors(record: &Record) -> Vec<AuthorRow> {
    record
        .authors
        .iter()
        .enumerate()
        .map(|(index, author)| {
            let (first_name, last_name) = split_name(&author.name);
            AuthorRow {
                first_name,
                last_name,
                affiliation: author.affiliations.clone(),
                email: derive_email(&author.affiliations),
                author_order: index + 1,
                pmid: record.pmid.clone(),
                article_title: record.title.clone(),
                article_url: record.url.clone(),
                journal: record.journal.clone(),
                date: record.date.clone(),
                doi: record.doi.clone(),
            }
        })
        .collect()
}

/// Explode a whole run's records, concatenating rows in record order.
pub fn normalize_all(records: &[Record]) -> Vec<AuthorRow> {
    records.iter().flat_map(normalize_authors).collect()
}

/// First whitespace token is the first name, the remainder the last
/// name; single-token names leave the last name empty.
fn split_name(name: &str) -> (String, String) {
    let mut parts = name.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.next().unwrap_or_default().trim().to_string();
    (first, last)
}

/// First email-looking token in the affiliation text, else the sentinel.
fn derive_email(affiliation: &str) -> String {
    EMAIL_RE
        .find(affiliation)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .unwrap_or_else(|| NO_EMAIL.to_string())
}
