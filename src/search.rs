//! PubMed listing search: query model, filter tokens and the index walker.
//!
//! The walker iterates listing pages for a query+filter combination and
//! pulls the ordered result identifiers out of the page-level metadata
//! marker (`log_displayeduids`) rather than the rendered result cards,
//! which churn more often. An absent or empty marker means the page has
//! no results; that is the exhaustion signal, not an error.

use crate::error::Result;
use crate::fetch::fetch_text;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Marker meta tag carrying the comma-separated result PMIDs for a page
const UID_MARKER: &str = r#"meta[name="log_displayeduids"]"#;

/// Publication date filter presets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRange {
    AnyTime,
    LastYear,
    LastFiveYears,
    LastTenYears,
    Custom { start: NaiveDate, end: NaiveDate },
}

/// Result sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    BestMatch,
    MostRecent,
    MostCited,
    RecentlyAdded,
}

/// A search request. Immutable once a run starts.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Free-text search term
    pub term: String,
    /// Ordered filter tokens, joined by `&` into the listing query string
    pub filters: Vec<String>,
    /// Number of listing pages to walk (1 page = 10 results)
    pub num_pages: u32,
}

impl SearchQuery {
    /// Create a query with no filters.
    pub fn new(term: impl Into<String>, num_pages: u32) -> Self {
        Self {
            term: term.into(),
            filters: Vec::new(),
            num_pages: num_pages.clamp(1, 100),
        }
    }

    /// Append the filter tokens for the given options.
    ///
    /// Token grammar matches the PubMed filter query string:
    /// `dates.5-years`, `article_type.clinical-trial`, `language.english`,
    /// `sort=date`.
    pub fn with_filters(
        mut self,
        date_range: DateRange,
        article_types: &[&str],
        language: Option<&str>,
        sort: SortOrder,
    ) -> Self {
        match date_range {
            DateRange::AnyTime => {}
            DateRange::LastYear => self.filters.push("dates.1-year".to_string()),
            DateRange::LastFiveYears => self.filters.push("dates.5-years".to_string()),
            DateRange::LastTenYears => self.filters.push("dates.10-years".to_string()),
            DateRange::Custom { start, end } => self.filters.push(format!(
                "custom_date_range={}-{}",
                start.format("%Y/%m/%d"),
                end.format("%Y/%m/%d")
            )),
        }

        for article_type in article_types {
            self.filters.push(format!(
                "article_type.{}",
                article_type.trim().to_lowercase().replace(' ', "-")
            ));
        }

        if let Some(lang) = language {
            self.filters
                .push(format!("language.{}", lang.trim().to_lowercase()));
        }

        match sort {
            SortOrder::BestMatch => self.filters.push("sort=relevance".to_string()),
            SortOrder::MostRecent => self.filters.push("sort=date".to_string()),
            SortOrder::MostCited => self.filters.push("sort=citation".to_string()),
            SortOrder::RecentlyAdded => self.filters.push("sort=pubdate".to_string()),
        }

        self
    }
}

/// Build the listing URL for one page of a query.
///
/// Filter tokens are already `key.value` / `key=value` fragments, so the
/// query string is assembled by hand; only the free-text term needs
/// percent-encoding.
pub fn build_listing_url(base_url: &str, query: &SearchQuery, page: u32) -> String {
    let mut url = format!(
        "{}/?term={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(query.term.trim())
    );
    for filter in &query.filters {
        url.push('&');
        url.push_str(filter);
    }
    url.push_str(&format!("&page={}", page));
    url
}

/// Extract the ordered PMIDs from one listing page body.
///
/// Returns an empty list when the marker is absent or empty.
pub fn parse_listing_uids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(UID_MARKER) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| {
            content
                .split(',')
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Walk listing pages `1..=num_pages` and collect the identifier list.
///
/// Every requested page is scanned regardless of empty pages in between
/// (sorted-by-date queries can legitimately have sparse pages after
/// filter application). A failed page logs a warning and contributes
/// zero identifiers; the walk continues. The result is de-duplicated
/// preserving first-seen order.
pub async fn collect_identifiers(
    client: &reqwest::Client,
    base_url: &str,
    query: &SearchQuery,
) -> Result<Vec<String>> {
    info!(
        term = %query.term,
        filters = ?query.filters,
        pages = query.num_pages,
        "Walking listing pages"
    );

    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();

    for page in 1..=query.num_pages {
        let url = build_listing_url(base_url, query, page);
        match fetch_text(client, &url).await {
            Ok(html) => {
                let uids = parse_listing_uids(&html);
                debug!(page = page, count = uids.len(), "Parsed listing page");
                for uid in uids {
                    if seen.insert(uid.clone()) {
                        identifiers.push(uid);
                    }
                }
            }
            Err(e) => {
                warn!(page = page, error = %e, "Listing page fetch failed, skipping");
            }
        }
    }

    info!(total = identifiers.len(), "Identifier collection complete");
    Ok(identifiers)
}
