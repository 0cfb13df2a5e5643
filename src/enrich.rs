//! Optional record enrichment from the MEDLINE rendering.
//!
//! PubMed serves a second, plain-text rendering of every article
//! (`?format=pubmed`) whose MEDLINE fields carry affiliation and keyword
//! data the HTML view sometimes truncates. Enrichment fetches it through
//! the shared [`RateLimiter`] and parses `AD` and `OT` fields with the
//! same anchor-then-fallback discipline as the primary extractor. The
//! supplement is strictly additive: any failure along the way degrades
//! to the empty supplement and the enclosing record stays valid.

use crate::fetch::fetch_text;
use crate::ratelimit::RateLimiter;
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Supplementary data merged additively into a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Supplement {
    pub affiliations: Vec<String>,
    pub keywords: Vec<String>,
}

impl Supplement {
    pub fn is_empty(&self) -> bool {
        self.affiliations.is_empty() && self.keywords.is_empty()
    }
}

/// Fetch and parse the MEDLINE rendering for one identifier.
///
/// Never fails the caller: fetch errors, unexpected status codes and
/// missing anchors all yield an empty supplement.
pub async fn fetch_supplement(
    client: &reqwest::Client,
    limiter: &RateLimiter,
    base_url: &str,
    identifier: &str,
) -> Supplement {
    limiter.acquire().await;

    let url = format!(
        "{}/{}/?format=pubmed",
        base_url.trim_end_matches('/'),
        identifier
    );

    match fetch_text(client, &url).await {
        Ok(html) => match extract_medline_blob(&html) {
            Some(blob) => {
                let supplement = parse_medline_fields(&blob);
                debug!(
                    identifier = %identifier,
                    affiliations = supplement.affiliations.len(),
                    keywords = supplement.keywords.len(),
                    "Enrichment parsed"
                );
                supplement
            }
            None => {
                debug!(identifier = %identifier, "MEDLINE blob absent, empty supplement");
                Supplement::default()
            }
        },
        Err(e) => {
            warn!(identifier = %identifier, error = %e, "Enrichment fetch failed, empty supplement");
            Supplement::default()
        }
    }
}

/// Locate the MEDLINE text blob inside the rendering envelope.
///
/// Primary anchor is the article-details pre block; any `pre` is the
/// drift fallback.
fn extract_medline_blob(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for css in ["pre.article-details", "pre"] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(pre) = document.select(&selector).next() {
            let text = pre.text().collect::<String>();
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Parse `AD` (affiliation) and `OT` (keyword) fields from MEDLINE text.
///
/// MEDLINE lines are `TAG - value`; continuation lines are indented and
/// extend the previous field's value.
fn parse_medline_fields(blob: &str) -> Supplement {
    let mut supplement = Supplement::default();
    let mut current_tag: Option<String> = None;

    for line in blob.lines() {
        if line.starts_with("      ") {
            // Continuation of the previous field
            if let Some(tag) = &current_tag {
                let continuation = line.trim();
                if continuation.is_empty() {
                    continue;
                }
                let target = match tag.as_str() {
                    "AD" => supplement.affiliations.last_mut(),
                    "OT" => supplement.keywords.last_mut(),
                    _ => None,
                };
                if let Some(value) = target {
                    value.push(' ');
                    value.push_str(continuation);
                }
            }
            continue;
        }

        let Some((tag, value)) = line.split_once('-') else {
            current_tag = None;
            continue;
        };
        let tag = tag.trim().to_string();
        let value = value.trim().to_string();

        match tag.as_str() {
            "AD" if !value.is_empty() => supplement.affiliations.push(value),
            "OT" if !value.is_empty() => supplement.keywords.push(value),
            _ => {}
        }
        current_tag = Some(tag);
    }

    supplement.affiliations.dedup();
    supplement.keywords.dedup();
    supplement
}

/// Report the enrichment outcome for one identifier.
///
/// Exposed for the pipeline's merge step; the merge itself is additive
/// assignment of the supplement fields onto the record.
pub fn apply_supplement(record: &mut crate::extract::Record, supplement: Supplement) {
    record.supplementary_affiliations = supplement.affiliations;
    record.supplementary_keywords = supplement.keywords;
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDLINE_PAGE: &str = r#"<html><body>
<pre class="article-details" id="article-details">
PMID- 38000001
TI  - Dexamethasone in hospitalized patients with severe
      community-acquired pneumonia.
AD  - Department of Medicine, Test University, Testville.
AD  - Institute of Trials, Example City.
OT  - steroids
OT  - mortality
MH  - Humans
</pre>
</body></html>"#;

    #[test]
    fn test_parse_medline_fields() {
        let blob = extract_medline_blob(MEDLINE_PAGE).expect("blob present");
        let supplement = parse_medline_fields(&blob);
        assert_eq!(
            supplement.affiliations,
            vec![
                "Department of Medicine, Test University, Testville.",
                "Institute of Trials, Example City."
            ]
        );
        assert_eq!(supplement.keywords, vec!["steroids", "mortality"]);
    }

    #[test]
    fn test_continuation_lines_extend_previous_field() {
        let blob = "AD  - Department of Medicine,\n      Test University.\nOT  - alpha\n";
        let supplement = parse_medline_fields(blob);
        assert_eq!(
            supplement.affiliations,
            vec!["Department of Medicine, Test University."]
        );
        assert_eq!(supplement.keywords, vec!["alpha"]);
    }

    #[test]
    fn test_missing_blob_yields_empty_supplement() {
        assert!(extract_medline_blob("<html><body><div>no pre here</div></body></html>").is_none());
    }

    #[test]
    fn test_fallback_to_bare_pre() {
        let html = "<html><body><pre>OT  - beta</pre></body></html>";
        let blob = extract_medline_blob(html).expect("fallback pre");
        let supplement = parse_medline_fields(&blob);
        assert_eq!(supplement.keywords, vec!["beta"]);
    }

    #[test]
    fn test_apply_supplement_is_additive_only() {
        let mut record = crate::extract::Record::failed("1");
        let title_before = record.title.clone();
        apply_supplement(
            &mut record,
            Supplement {
                affiliations: vec!["Dept".to_string()],
                keywords: vec!["kw".to_string()],
            },
        );
        assert_eq!(record.title, title_before);
        assert_eq!(record.supplementary_affiliations, vec!["Dept"]);
        assert_eq!(record.supplementary_keywords, vec!["kw"]);
    }
}
