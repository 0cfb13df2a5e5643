//! Record extraction from a PubMed article detail document.
//!
//! The detail page schema is versioned upstream and not under our
//! control, so every field is resolved through a small ordered chain of
//! anchor rules: a primary structural anchor, an alternate anchor for
//! schema drift, and a sentinel constant when both are absent. One
//! document in, exactly one [`Record`] out; extraction never errors and
//! a given body always produces the same record.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

// Sentinel values. Every record field is always populated, either with
// extracted content or one of these, so consumers never branch on a
// missing key.
pub const NO_TITLE: &str = "NO_TITLE";
pub const NO_ABSTRACT: &str = "NO_ABSTRACT";
pub const NO_BACKGROUND: &str = "NO_BACKGROUND";
pub const NO_RESULTS: &str = "NO_RESULTS";
pub const NO_CONCLUSION: &str = "NO_CONCLUSION";
pub const NO_KEYWORDS: &str = "NO_KEYWORDS";
pub const NO_DATE: &str = "NO_DATE";
pub const NO_JOURNAL: &str = "NO_JOURNAL";
pub const NO_DOI: &str = "NO_DOI";
pub const NO_COPYRIGHT: &str = "NO_COPYRIGHT";
pub const NO_PMID: &str = "NO_PMID";
pub const NO_PUB_TYPE: &str = "NO_PUB_TYPE";
pub const NO_MESH_TERMS: &str = "NO_MESH_TERMS";

/// Separator between an author's multiple affiliations
pub const AFFILIATION_SEPARATOR: &str = "; ";

static KEYWORDS_FALLBACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)keywords?:\s*([^.;]+)").unwrap_or_else(|_| Regex::new("$^").expect("regex"))
});

/// Outcome of the detail fetch that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Failed,
}

/// One author as declared by the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name as declared
    pub name: String,
    /// Joined affiliation text resolved through the footnote map
    pub affiliations: String,
}

/// The normalized output unit: one article, every field always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Input identifier this record was fetched under
    pub identifier: String,
    /// Detail page URL (filled in by the pipeline)
    pub url: String,
    pub title: String,
    pub abstract_text: String,
    pub background: String,
    pub results: String,
    pub conclusion: String,
    pub keywords: String,
    /// Raw citation date string; calendar parsing is a consumer concern
    pub date: String,
    pub journal: String,
    pub doi: String,
    pub copyright: String,
    pub pmid: String,
    pub publication_type: String,
    pub mesh_terms: String,
    pub authors: Vec<Author>,
    /// Supplementary affiliations merged from the enrichment origin
    pub supplementary_affiliations: Vec<String>,
    /// Supplementary keywords merged from the enrichment origin
    pub supplementary_keywords: Vec<String>,
    pub fetch_status: FetchStatus,
}

impl Record {
    /// A record for an identifier whose detail fetch failed: every
    /// content field at its sentinel, no authors.
    pub fn failed(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            url: String::new(),
            title: NO_TITLE.to_string(),
            abstract_text: NO_ABSTRACT.to_string(),
            background: NO_BACKGROUND.to_string(),
            results: NO_RESULTS.to_string(),
            conclusion: NO_CONCLUSION.to_string(),
            keywords: NO_KEYWORDS.to_string(),
            date: NO_DATE.to_string(),
            journal: NO_JOURNAL.to_string(),
            doi: NO_DOI.to_string(),
            copyright: NO_COPYRIGHT.to_string(),
            pmid: NO_PMID.to_string(),
            publication_type: NO_PUB_TYPE.to_string(),
            mesh_terms: NO_MESH_TERMS.to_string(),
            authors: Vec::new(),
            supplementary_affiliations: Vec::new(),
            supplementary_keywords: Vec::new(),
            fetch_status: FetchStatus::Failed,
        }
    }
}

/// Extract one record from a detail document body.
///
/// Pure transform: no side effects beyond parsing, never an error.
pub fn parse_record(identifier: &str, html: &str) -> Record {
    let document = Html::parse_document(html);

    let abstract_paragraphs = collect_abstract_paragraphs(&document);
    let abstract_text = if abstract_paragraphs.is_empty() {
        NO_ABSTRACT.to_string()
    } else {
        abstract_paragraphs
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    };
    let (background, results, conclusion) = split_sections(&abstract_paragraphs, &abstract_text);
    let keywords = extract_keywords(&document, &abstract_text);

    let affiliation_map = parse_affiliation_map(&document);
    let authors = parse_authors(&document, &affiliation_map);

    Record {
        identifier: identifier.to_string(),
        url: String::new(),
        title: resolve(&document, &[rule_title_heading, rule_title_meta], NO_TITLE),
        abstract_text,
        background,
        results,
        conclusion,
        keywords,
        date: resolve(&document, &[rule_date_citation, rule_date_meta], NO_DATE),
        journal: resolve(
            &document,
            &[rule_journal_trigger, rule_journal_meta],
            NO_JOURNAL,
        ),
        doi: resolve(&document, &[rule_doi_citation, rule_doi_meta], NO_DOI),
        copyright: resolve(
            &document,
            &[rule_copyright_div, rule_copyright_paragraph],
            NO_COPYRIGHT,
        ),
        pmid: resolve(&document, &[rule_pmid_current_id, rule_pmid_meta], NO_PMID),
        publication_type: resolve(
            &document,
            &[rule_pub_type_div, rule_pub_type_span],
            NO_PUB_TYPE,
        ),
        mesh_terms: resolve(&document, &[rule_mesh_buttons, rule_mesh_list], NO_MESH_TERMS),
        authors,
        supplementary_affiliations: Vec::new(),
        supplementary_keywords: Vec::new(),
        fetch_status: FetchStatus::Success,
    }
}

/// One anchor rule: locate a field's value in the document, or nothing.
type AnchorRule = fn(&Html) -> Option<String>;

/// Evaluate anchor rules in order; first non-empty result wins, the
/// sentinel is the final fallback.
fn resolve(document: &Html, rules: &[AnchorRule], sentinel: &str) -> String {
    rules
        .iter()
        .find_map(|rule| rule(document).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| sentinel.to_string())
}

/// Collect an element's text with whitespace normalized
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First matching element's normalized text
fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// First matching element's attribute value
fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// === Per-field anchor rules ===

fn rule_title_heading(document: &Html) -> Option<String> {
    select_text(document, "h1.heading-title")
}

fn rule_title_meta(document: &Html) -> Option<String> {
    select_attr(document, r#"meta[name="citation_title"]"#, "content")
}

fn rule_date_citation(document: &Html) -> Option<String> {
    // "2023 Jan 15;12(1):e0123." -> keep the date segment before the volume
    select_text(document, "span.cit")
        .map(|cit| cit.split(';').next().unwrap_or(&cit).trim().to_string())
        .filter(|d| !d.is_empty())
}

fn rule_date_meta(document: &Html) -> Option<String> {
    select_attr(document, r#"meta[name="citation_date"]"#, "content")
}

fn rule_journal_trigger(document: &Html) -> Option<String> {
    select_attr(document, "button#full-view-journal-trigger", "title")
        .or_else(|| select_text(document, "button#full-view-journal-trigger"))
}

fn rule_journal_meta(document: &Html) -> Option<String> {
    select_attr(document, r#"meta[name="citation_journal_title"]"#, "content")
}

fn rule_doi_citation(document: &Html) -> Option<String> {
    select_text(document, "span.citation-doi").map(|text| {
        text.trim_start_matches("doi:")
            .trim()
            .trim_end_matches('.')
            .to_string()
    })
}

fn rule_doi_meta(document: &Html) -> Option<String> {
    select_attr(document, r#"meta[name="citation_doi"]"#, "content")
}

fn rule_copyright_div(document: &Html) -> Option<String> {
    select_text(document, "div.copyright")
}

fn rule_copyright_paragraph(document: &Html) -> Option<String> {
    select_text(document, "p.copyright")
}

fn rule_pmid_current_id(document: &Html) -> Option<String> {
    select_text(document, "strong.current-id")
}

fn rule_pmid_meta(document: &Html) -> Option<String> {
    select_attr(document, r#"meta[name="citation_pmid"]"#, "content")
}

fn rule_pub_type_div(document: &Html) -> Option<String> {
    select_text(document, "div.publication-type")
}

fn rule_pub_type_span(document: &Html) -> Option<String> {
    select_text(document, "span.publication-type")
}

fn rule_mesh_buttons(document: &Html) -> Option<String> {
    let selector = Selector::parse("div#mesh-terms button.keyword-actions-trigger").ok()?;
    let terms: Vec<String> = document.select(&selector).map(element_text).collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join("; "))
    }
}

fn rule_mesh_list(document: &Html) -> Option<String> {
    let selector = Selector::parse("div.mesh-terms li").ok()?;
    let terms: Vec<String> = document.select(&selector).map(element_text).collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join("; "))
    }
}

// === Structured abstract ===

/// Sections a labeled abstract paragraph can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Background,
    Results,
    Conclusion,
    Other,
}

/// Map a paragraph label onto a section via the fixed vocabulary,
/// case-insensitive substring match.
fn classify_label(label: &str) -> Option<Section> {
    let label = label.to_lowercase();
    if label.contains("background") || label.contains("introduction") {
        Some(Section::Background)
    } else if label.contains("results") || label.contains("findings") {
        Some(Section::Results)
    } else if label.contains("conclusion") || label.contains("summary") {
        Some(Section::Conclusion)
    } else if label.contains("keyword") {
        // Keyword paragraphs are handled by the keyword rule, not sections
        None
    } else if !label.is_empty() {
        Some(Section::Other)
    } else {
        None
    }
}

/// (label, content) per abstract paragraph, in document order.
///
/// Primary anchor is the structured abstract content block; the bare
/// `#abstract` container is the drift fallback.
fn collect_abstract_paragraphs(document: &Html) -> Vec<(Option<String>, String)> {
    for css in ["div.abstract-content p", "div#abstract p"] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let Ok(label_selector) = Selector::parse("strong.sub-title, b") else {
            continue;
        };

        let paragraphs: Vec<(Option<String>, String)> = document
            .select(&selector)
            .filter_map(|p| {
                let full = element_text(p);
                if full.is_empty() {
                    return None;
                }
                // A bold run only counts as a section label when it
                // leads the paragraph
                let label = p
                    .select(&label_selector)
                    .next()
                    .map(element_text)
                    .filter(|l| !l.is_empty() && full.starts_with(l.as_str()));
                let content = match &label {
                    Some(l) => full
                        .strip_prefix(l.as_str())
                        .unwrap_or(&full)
                        .trim_start_matches(':')
                        .trim()
                        .to_string(),
                    None => full,
                };
                Some((label, content))
            })
            .filter(|(label, _)| {
                // Keyword paragraphs live inside #abstract but are not body text
                !label
                    .as_deref()
                    .map(|l| l.to_lowercase().contains("keyword"))
                    .unwrap_or(false)
            })
            .collect();

        if !paragraphs.is_empty() {
            return paragraphs;
        }
    }
    Vec::new()
}

/// Assign paragraph content to background/results/conclusion.
///
/// Once a label is seen, subsequent unlabeled content accrues to that
/// section until the next label. An abstract with no labels at all goes
/// wholesale into background.
fn split_sections(
    paragraphs: &[(Option<String>, String)],
    abstract_text: &str,
) -> (String, String, String) {
    let mut background = Vec::new();
    let mut results = Vec::new();
    let mut conclusion = Vec::new();
    let mut current: Option<Section> = None;
    let mut saw_label = false;

    for (label, content) in paragraphs {
        if let Some(section) = label.as_deref().and_then(classify_label) {
            saw_label = true;
            current = Some(section);
        }
        if content.is_empty() {
            continue;
        }
        match current {
            Some(Section::Background) => background.push(content.clone()),
            Some(Section::Results) => results.push(content.clone()),
            Some(Section::Conclusion) => conclusion.push(content.clone()),
            Some(Section::Other) | None => {}
        }
    }

    if !saw_label && !paragraphs.is_empty() {
        return (
            abstract_text.to_string(),
            NO_RESULTS.to_string(),
            NO_CONCLUSION.to_string(),
        );
    }

    let join = |parts: Vec<String>, sentinel: &str| {
        if parts.is_empty() {
            sentinel.to_string()
        } else {
            parts.join(" ")
        }
    };
    (
        join(background, NO_BACKGROUND),
        join(results, NO_RESULTS),
        join(conclusion, NO_CONCLUSION),
    )
}

// === Keywords ===

/// Dedicated keywords block first, then a regex scan of the abstract text.
fn extract_keywords(document: &Html, abstract_text: &str) -> String {
    if let Some(block) = keywords_block(document) {
        return block;
    }
    if abstract_text != NO_ABSTRACT {
        if let Some(caps) = KEYWORDS_FALLBACK_RE.captures(abstract_text) {
            if let Some(m) = caps.get(1) {
                let found = m.as_str().trim().to_string();
                if !found.is_empty() {
                    return found;
                }
            }
        }
    }
    NO_KEYWORDS.to_string()
}

fn keywords_block(document: &Html) -> Option<String> {
    let paragraph_selector = Selector::parse("div#abstract p").ok()?;
    let label_selector = Selector::parse("strong.sub-title").ok()?;

    for p in document.select(&paragraph_selector) {
        let Some(label_el) = p.select(&label_selector).next() else {
            continue;
        };
        let label = element_text(label_el);
        if !label.to_lowercase().contains("keyword") {
            continue;
        }
        let full = element_text(p);
        let content = full
            .strip_prefix(label.as_str())
            .unwrap_or(&full)
            .trim_start_matches(':')
            .trim()
            .trim_end_matches('.')
            .to_string();
        if !content.is_empty() {
            return Some(content);
        }
    }
    None
}

// === Affiliations and authors ===

/// Footnote index -> institution text, scanned once per document.
fn parse_affiliation_map(document: &Html) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for css in ["div.affiliations li", "ul.affiliation-list li"] {
        let Ok(item_selector) = Selector::parse(css) else {
            continue;
        };
        let Ok(sup_selector) = Selector::parse("sup") else {
            continue;
        };
        for item in document.select(&item_selector) {
            let index = item
                .select(&sup_selector)
                .next()
                .map(element_text)
                .unwrap_or_default();
            let full = element_text(item);
            let text = full
                .strip_prefix(index.as_str())
                .unwrap_or(&full)
                .trim()
                .to_string();
            if !index.is_empty() && !text.is_empty() {
                map.entry(index).or_insert(text);
            }
        }
        if !map.is_empty() {
            break;
        }
    }
    map
}

/// Authors in declared order, footnote refs resolved through the map.
///
/// A missing footnote index resolves to the empty string, not a failure;
/// the join is trimmed per the separator policy.
fn parse_authors(document: &Html, affiliation_map: &HashMap<String, String>) -> Vec<Author> {
    let mut authors = Vec::new();

    if let (Ok(item_selector), Ok(name_selector), Ok(refs_selector)) = (
        Selector::parse("div.authors-list span.authors-list-item"),
        Selector::parse("a.full-name"),
        Selector::parse("sup.affiliation-links"),
    ) {
        for item in document.select(&item_selector) {
            let Some(name) = item
                .select(&name_selector)
                .next()
                .map(element_text)
                .filter(|n| !n.is_empty())
            else {
                continue;
            };

            let refs: Vec<String> = item
                .select(&refs_selector)
                .next()
                .map(element_text)
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();

            authors.push(Author {
                name,
                affiliations: join_affiliations(&refs, affiliation_map),
            });
        }
    }

    if authors.is_empty() {
        // Drift fallback: citation meta tags carry names but no footnotes
        if let Ok(meta_selector) = Selector::parse(r#"meta[name="citation_author"]"#) {
            for meta in document.select(&meta_selector) {
                if let Some(name) = meta.value().attr("content") {
                    let name = name.trim();
                    if !name.is_empty() {
                        authors.push(Author {
                            name: name.to_string(),
                            affiliations: String::new(),
                        });
                    }
                }
            }
        }
    }

    authors
}

/// Resolve footnote refs and join with the fixed separator, trimming
/// dangling separators left by unresolved indices.
pub fn join_affiliations(refs: &[String], affiliation_map: &HashMap<String, String>) -> String {
    let joined = refs
        .iter()
        .map(|r| affiliation_map.get(r).map(String::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(AFFILIATION_SEPARATOR);
    joined
        .trim_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}
