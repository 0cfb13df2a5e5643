//! The concurrent retrieval-and-extraction pipeline.
//!
//! Fan-out: one task per result identifier, each performing
//! fetch -> extract -> optional enrich -> merge, with a counting
//! semaphore bounding how many tasks hold an open connection at once.
//! Fan-in preserves input identifier order. A failed detail fetch
//! produces a failed-status record with every content field at its
//! sentinel; it never aborts sibling tasks, so the output length always
//! equals the input identifier count.

use crate::config::ScrapeConfig;
use crate::enrich::{apply_supplement, fetch_supplement};
use crate::error::{PubmedError, Result};
use crate::extract::{parse_record, FetchStatus, Record};
use crate::fetch::{build_http_client, fetch_text};
use crate::ratelimit::RateLimiter;
use crate::search::{collect_identifiers, SearchQuery};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Run the full pipeline for one query.
///
/// Returns one record per discovered identifier, in listing rank order.
/// An empty result list means the query matched nothing ("no results"),
/// distinct from a partial run where some identifiers failed.
///
/// A blank search term is a configuration error, rejected before any
/// fetch is issued.
pub async fn run(config: &ScrapeConfig, query: &SearchQuery) -> Result<Vec<Record>> {
    config.validate()?;
    if query.term.trim().is_empty() {
        return Err(PubmedError::Config(
            "search term must not be empty".to_string(),
        ));
    }

    let client = build_http_client(config.request_timeout)?;
    let identifiers = collect_identifiers(&client, &config.base_url, query).await?;

    if identifiers.is_empty() {
        info!("No results for query");
        return Ok(Vec::new());
    }

    let records = process_identifiers(config, &client, identifiers).await;

    let failed = records
        .iter()
        .filter(|r| r.fetch_status == FetchStatus::Failed)
        .count();
    info!(
        total = records.len(),
        failed = failed,
        "Pipeline run complete"
    );
    Ok(records)
}

/// Dispatch one extraction task per identifier under the semaphore.
pub async fn process_identifiers(
    config: &ScrapeConfig,
    client: &reqwest::Client,
    identifiers: Vec<String>,
) -> Vec<Record> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let limiter = Arc::new(RateLimiter::new(config.rate_permits, config.rate_interval));
    let base_url = Arc::new(config.base_url.trim_end_matches('/').to_string());
    let enrich = config.enrich;

    let tasks: Vec<_> = identifiers
        .into_iter()
        .map(|identifier| {
            let semaphore = Arc::clone(&semaphore);
            let limiter = Arc::clone(&limiter);
            let base_url = Arc::clone(&base_url);
            let client = client.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Record::failed(identifier);
                };
                process_one(&client, &limiter, &base_url, identifier, enrich).await
            })
        })
        .collect();

    // join_all keeps input order, so listing rank survives the fan-in
    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Extraction task panicked");
                Record::failed("")
            }
        })
        .collect()
}

/// Fetch, extract and optionally enrich one identifier.
async fn process_one(
    client: &reqwest::Client,
    limiter: &RateLimiter,
    base_url: &str,
    identifier: String,
    enrich: bool,
) -> Record {
    let url = format!("{}/{}/", base_url, identifier);

    let mut record = match fetch_text(client, &url).await {
        Ok(body) => parse_record(&identifier, &body),
        Err(e) => {
            warn!(identifier = %identifier, error = %e, "Detail fetch failed");
            Record::failed(identifier)
        }
    };
    record.url = url;

    if enrich && record.fetch_status == FetchStatus::Success {
        let supplement = fetch_supplement(client, limiter, base_url, &record.identifier).await;
        apply_supplement(&mut record, supplement);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, RawQuery};
    use axum::response::Html;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });
        format!("http://{}", addr)
    }

    fn listing_page(uids: &str) -> String {
        format!(
            r#"<html><head><meta name="log_displayeduids" content="{}"></head><body></body></html>"#,
            uids
        )
    }

    fn detail_page(pmid: &str) -> String {
        format!(
            r#"<html><body>
                <h1 class="heading-title">Article {pmid}</h1>
                <strong class="current-id">{pmid}</strong>
                <div class="abstract-content"><p>Abstract of {pmid}.</p></div>
            </body></html>"#
        )
    }

    fn test_config(base_url: String) -> ScrapeConfig {
        ScrapeConfig {
            base_url,
            concurrency: 4,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scenario_all_fetches_succeed() {
        let app = Router::new()
            .route("/", get(|| async { Html(listing_page("101,102,103")) }))
            .route(
                "/{pmid}/",
                get(|Path(pmid): Path<String>| async move { Html(detail_page(&pmid)) }),
            );
        let base_url = spawn_server(app).await;

        let config = test_config(base_url);
        let query = SearchQuery::new("x", 1);
        let records = run(&config, &query).await.expect("pipeline run");

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].identifier, "101");
        assert_eq!(records[1].identifier, "102");
        assert_eq!(records[2].identifier, "103");
        for record in &records {
            assert_eq!(record.fetch_status, FetchStatus::Success);
            assert!(record.title.starts_with("Article "));
            assert!(record.url.ends_with(&format!("/{}/", record.identifier)));
        }
    }

    #[tokio::test]
    async fn test_scenario_marker_absent_means_no_results() {
        let app = Router::new().route(
            "/",
            get(|| async { Html("<html><body>no marker</body></html>".to_string()) }),
        );
        let base_url = spawn_server(app).await;

        let config = test_config(base_url);
        let query = SearchQuery::new("x", 2);
        let records = run(&config, &query).await.expect("pipeline run");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_blank_term_is_rejected_before_any_fetch() {
        let listing_hit = Arc::new(AtomicUsize::new(0));
        let listing_hit_handler = Arc::clone(&listing_hit);
        let app = Router::new().route(
            "/",
            get(move || {
                let listing_hit = Arc::clone(&listing_hit_handler);
                async move {
                    listing_hit.fetch_add(1, Ordering::SeqCst);
                    Html(listing_page("601"))
                }
            }),
        );
        let base_url = spawn_server(app).await;

        let config = test_config(base_url);
        let result = run(&config, &SearchQuery::new("   ", 1)).await;

        assert!(matches!(result, Err(PubmedError::Config(_))));
        assert_eq!(listing_hit.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_failed_record_and_preserves_length() {
        let app = Router::new()
            .route("/", get(|| async { Html(listing_page("201,202,203")) }))
            .route(
                "/{pmid}/",
                get(|Path(pmid): Path<String>| async move {
                    if pmid == "202" {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Html(detail_page(&pmid)))
                    }
                }),
            );
        let base_url = spawn_server(app).await;

        let config = test_config(base_url);
        let query = SearchQuery::new("x", 1);
        let records = run(&config, &query).await.expect("pipeline run");

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].fetch_status, FetchStatus::Failed);
        assert_eq!(records[1].title, crate::extract::NO_TITLE);
        assert_eq!(records[0].fetch_status, FetchStatus::Success);
        assert_eq!(records[2].fetch_status, FetchStatus::Success);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let in_flight_handler = Arc::clone(&in_flight);
        let max_seen_handler = Arc::clone(&max_seen);
        let app = Router::new().route(
            "/{pmid}/",
            get(move |Path(pmid): Path<String>| {
                let in_flight = Arc::clone(&in_flight_handler);
                let max_seen = Arc::clone(&max_seen_handler);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Html(detail_page(&pmid))
                }
            }),
        );
        let base_url = spawn_server(app).await;

        let config = ScrapeConfig {
            base_url,
            concurrency: 2,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let client = build_http_client(config.request_timeout).expect("client");
        let identifiers: Vec<String> = (301..309).map(|n| n.to_string()).collect();

        let records = process_identifiers(&config, &client, identifiers).await;

        assert_eq!(records.len(), 8);
        assert!(
            max_seen.load(Ordering::SeqCst) <= 2,
            "more than 2 tasks in flight: {}",
            max_seen.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_enrichment_merges_supplement() {
        let app = Router::new()
            .route("/", get(|| async { Html(listing_page("401")) }))
            .route(
                "/{pmid}/",
                get(|Path(pmid): Path<String>, RawQuery(query): RawQuery| async move {
                    if query.as_deref() == Some("format=pubmed") {
                        Html(
                            "<html><body><pre class=\"article-details\">\
                             AD  - Enriched Institute.\nOT  - enriched-keyword\n</pre></body></html>"
                                .to_string(),
                        )
                    } else {
                        Html(detail_page(&pmid))
                    }
                }),
            );
        let base_url = spawn_server(app).await;

        let config = ScrapeConfig {
            base_url,
            enrich: true,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let query = SearchQuery::new("x", 1);
        let records = run(&config, &query).await.expect("pipeline run");

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].supplementary_affiliations,
            vec!["Enriched Institute."]
        );
        assert_eq!(records[0].supplementary_keywords, vec!["enriched-keyword"]);
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_to_empty_supplement() {
        let app = Router::new()
            .route("/", get(|| async { Html(listing_page("501")) }))
            .route(
                "/{pmid}/",
                get(|Path(pmid): Path<String>, RawQuery(query): RawQuery| async move {
                    if query.as_deref() == Some("format=pubmed") {
                        Err(axum::http::StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Html(detail_page(&pmid)))
                    }
                }),
            );
        let base_url = spawn_server(app).await;

        let config = ScrapeConfig {
            base_url,
            enrich: true,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let query = SearchQuery::new("x", 1);
        let records = run(&config, &query).await.expect("pipeline run");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fetch_status, FetchStatus::Success);
        assert!(records[0].supplementary_affiliations.is_empty());
        assert!(records[0].supplementary_keywords.is_empty());
    }
}
