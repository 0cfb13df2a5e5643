//! rustpubmed - PubMed Search Pipeline with Structured Author Extraction
//!
//! A Rust microservice for searching PubMed, extracting structured
//! article records and author information, and exporting flat CSVs.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustpubmed search "gene therapy" --pages 3 --date-range 5-years --sort date
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustpubmed serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, routing::post, Json, Router};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rustpubmed::authors::{normalize_all, AuthorRow};
use rustpubmed::config::ScrapeConfig;
use rustpubmed::extract::{FetchStatus, Record};
use rustpubmed::pipeline;
use rustpubmed::search::{DateRange, SearchQuery, SortOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// PubMed Search Pipeline with Structured Author Extraction
#[derive(Parser)]
#[command(name = "rustpubmed")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search PubMed and export records and author rows
    Search {
        /// Search query term
        query: String,

        /// Number of listing pages to walk (1 page = 10 results, max 100)
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Publication date filter: any, 1-year, 5-years, 10-years, custom
        #[arg(long, default_value = "any")]
        date_range: String,

        /// Custom range start date (YYYY-MM-DD, with --date-range custom)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Custom range end date (YYYY-MM-DD, with --date-range custom)
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Article type filter (repeatable, e.g. "Clinical Trial")
        #[arg(long = "article-type")]
        article_types: Vec<String>,

        /// Language filter (e.g. english)
        #[arg(long)]
        language: Option<String>,

        /// Sort order: relevance, date, citation, pubdate
        #[arg(long, default_value = "relevance")]
        sort: String,

        /// Fetch the MEDLINE rendering per record for supplementary data
        #[arg(long)]
        enrich: bool,

        /// Override the concurrency cap for detail fetches
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Search {
            query,
            pages,
            date_range,
            start_date,
            end_date,
            article_types,
            language,
            sort,
            enrich,
            concurrency,
            output,
        } => {
            run_search(
                query,
                pages,
                date_range,
                start_date,
                end_date,
                article_types,
                language,
                sort,
                enrich,
                concurrency,
                output,
            )
            .await
        }
        Commands::Serve { port, host } => run_server(host, port).await,
    }
}

// ============================================================================
// Search Command
// ============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_search(
    term: String,
    pages: u32,
    date_range: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    article_types: Vec<String>,
    language: Option<String>,
    sort: String,
    enrich: bool,
    concurrency: Option<usize>,
    output_dir: PathBuf,
) -> Result<()> {
    if term.trim().is_empty() {
        anyhow::bail!("Search term must not be empty");
    }

    let mut config = ScrapeConfig::from_env().context("Invalid configuration")?;
    config.enrich = enrich;
    if let Some(cap) = concurrency {
        config.concurrency = cap;
    }
    config.validate().context("Invalid configuration")?;

    let query = build_query(
        &term,
        pages,
        &date_range,
        start_date,
        end_date,
        &article_types,
        language.as_deref(),
        &sort,
    )?;

    info!(term = %term, pages = query.num_pages, filters = ?query.filters, "Starting search");

    let records = pipeline::run(&config, &query).await?;

    if records.is_empty() {
        println!("No results found. Try a different query or increase the number of pages.");
        return Ok(());
    }

    let author_rows = normalize_all(&records);

    // Create output folder
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_keyword: String = term
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    let output_folder = output_dir.join(format!("{}_{}", timestamp, safe_keyword));
    std::fs::create_dir_all(&output_folder).context("Failed to create output directory")?;

    let records_path = output_folder.join("records.csv");
    save_records_csv(&records_path, &records).context("Failed to save records CSV")?;

    let authors_path = output_folder.join("authors.csv");
    save_authors_csv(&authors_path, &author_rows).context("Failed to save authors CSV")?;

    print_statistics(&records, &author_rows);
    println!("\nResults saved in: {}", output_folder.display());
    Ok(())
}

/// Translate CLI flags into query filter tokens
#[allow(clippy::too_many_arguments)]
fn build_query(
    term: &str,
    pages: u32,
    date_range: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    article_types: &[String],
    language: Option<&str>,
    sort: &str,
) -> Result<SearchQuery> {
    let date_range = match date_range {
        "any" => DateRange::AnyTime,
        "1-year" => DateRange::LastYear,
        "5-years" => DateRange::LastFiveYears,
        "10-years" => DateRange::LastTenYears,
        "custom" => {
            let (Some(start), Some(end)) = (start_date, end_date) else {
                anyhow::bail!("--date-range custom requires --start-date and --end-date");
            };
            DateRange::Custom { start, end }
        }
        other => anyhow::bail!("Invalid --date-range: {}", other),
    };

    let sort = match sort {
        "relevance" => SortOrder::BestMatch,
        "date" => SortOrder::MostRecent,
        "citation" => SortOrder::MostCited,
        "pubdate" => SortOrder::RecentlyAdded,
        other => anyhow::bail!("Invalid --sort: {}", other),
    };

    let type_refs: Vec<&str> = article_types.iter().map(String::as_str).collect();
    Ok(SearchQuery::new(term, pages).with_filters(date_range, &type_refs, language, sort))
}

/// Flat record row for CSV export (authors joined into one column)
#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    identifier: &'a str,
    url: &'a str,
    title: &'a str,
    abstract_text: &'a str,
    background: &'a str,
    results: &'a str,
    conclusion: &'a str,
    keywords: &'a str,
    date: &'a str,
    journal: &'a str,
    doi: &'a str,
    copyright: &'a str,
    pmid: &'a str,
    publication_type: &'a str,
    mesh_terms: &'a str,
    authors: String,
    supplementary_affiliations: String,
    supplementary_keywords: String,
    fetch_status: FetchStatus,
}

impl<'a> From<&'a Record> for RecordRow<'a> {
    fn from(record: &'a Record) -> Self {
        let authors = record
            .authors
            .iter()
            .map(|a| {
                if a.affiliations.is_empty() {
                    a.name.clone()
                } else {
                    format!("{} ({})", a.name, a.affiliations)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ");

        Self {
            identifier: &record.identifier,
            url: &record.url,
            title: &record.title,
            abstract_text: &record.abstract_text,
            background: &record.background,
            results: &record.results,
            conclusion: &record.conclusion,
            keywords: &record.keywords,
            date: &record.date,
            journal: &record.journal,
            doi: &record.doi,
            copyright: &record.copyright,
            pmid: &record.pmid,
            publication_type: &record.publication_type,
            mesh_terms: &record.mesh_terms,
            authors,
            supplementary_affiliations: record.supplementary_affiliations.join("; "),
            supplementary_keywords: record.supplementary_keywords.join("; "),
            fetch_status: record.fetch_status,
        }
    }
}

fn save_records_csv(path: &std::path::Path, records: &[Record]) -> rustpubmed::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        wtr.serialize(RecordRow::from(record))?;
    }
    wtr.flush()?;
    println!("Saved: {:?}", path);
    Ok(())
}

fn save_authors_csv(path: &std::path::Path, rows: &[AuthorRow]) -> rustpubmed::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    println!("Saved: {:?}", path);
    Ok(())
}

/// Print the run summary block
fn print_statistics(records: &[Record], author_rows: &[AuthorRow]) {
    let succeeded = records
        .iter()
        .filter(|r| r.fetch_status == FetchStatus::Success)
        .count();

    println!("\n--- Search Statistics ---");
    println!("Total results found: {}", records.len());
    if succeeded < records.len() {
        println!("Failed fetches: {}", records.len() - succeeded);
    }
    println!("Total authors: {}", author_rows.len());

    let mut journal_counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        if record.journal != rustpubmed::extract::NO_JOURNAL {
            *journal_counts.entry(record.journal.as_str()).or_default() += 1;
        }
    }
    if let Some((journal, count)) = journal_counts.iter().max_by_key(|(_, count)| **count) {
        println!("Most common journal: {} ({} articles)", journal, count);
    }

    let dates: Vec<&str> = records
        .iter()
        .map(|r| r.date.as_str())
        .filter(|d| *d != rustpubmed::extract::NO_DATE)
        .collect();
    if let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) {
        println!("Date range: {} to {}", min, max);
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let config = ScrapeConfig::from_env().context("Invalid configuration")?;
    let app_state = Arc::new(AppState { config });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

struct AppState {
    config: ScrapeConfig,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search request body
#[derive(Debug, Deserialize)]
struct SearchRequest {
    term: String,
    #[serde(default = "default_pages")]
    pages: u32,
    #[serde(default)]
    filters: Vec<String>,
    #[serde(default)]
    enrich: bool,
}

fn default_pages() -> u32 {
    1
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    records: Vec<Record>,
    authors: Vec<AuthorRow>,
}

/// Search endpoint handler
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(term = %req.term, pages = req.pages, "Search request");

    let mut query = SearchQuery::new(req.term, req.pages);
    query.filters = req.filters;

    let mut config = state.config.clone();
    config.enrich = req.enrich;

    match pipeline::run(&config, &query).await {
        Ok(records) => {
            let authors = normalize_all(&records);
            Json(SearchResponse {
                status: if records.is_empty() {
                    "no results".to_string()
                } else {
                    "success".to_string()
                },
                count: records.len(),
                records,
                authors,
            })
        }
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                records: vec![],
                authors: vec![],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpubmed::extract::Author;

    fn sample_record() -> Record {
        let mut record = Record::failed("38000001");
        record.fetch_status = FetchStatus::Success;
        record.title = "A Title".to_string();
        record.journal = "J Test".to_string();
        record.authors = vec![Author {
            name: "Alice B Carter".to_string(),
            affiliations: "Dept A".to_string(),
        }];
        record
    }

    #[test]
    fn test_build_query_filters() {
        let query = build_query(
            "cancer",
            2,
            "5-years",
            None,
            None,
            &["Review".to_string()],
            Some("english"),
            "date",
        )
        .expect("valid query");
        assert_eq!(
            query.filters,
            vec![
                "dates.5-years",
                "article_type.review",
                "language.english",
                "sort=date"
            ]
        );
    }

    #[test]
    fn test_build_query_rejects_bad_sort() {
        assert!(build_query("x", 1, "any", None, None, &[], None, "upvotes").is_err());
    }

    #[test]
    fn test_build_query_custom_range_requires_dates() {
        assert!(build_query("x", 1, "custom", None, None, &[], None, "date").is_err());
    }

    #[test]
    fn test_save_records_csv_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.csv");
        save_records_csv(&path, &[sample_record()]).expect("csv saved");

        let contents = std::fs::read_to_string(&path).expect("read csv");
        assert!(contents.starts_with("identifier,"));
        assert!(contents.contains("A Title"));
        assert!(contents.contains("Alice B Carter (Dept A)"));
    }

    #[test]
    fn test_save_authors_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("authors.csv");
        let rows = normalize_all(&[sample_record()]);
        save_authors_csv(&path, &rows).expect("csv saved");

        let contents = std::fs::read_to_string(&path).expect("read csv");
        assert!(contents.contains("first_name,last_name"));
        assert!(contents.contains("Alice,B Carter"));
    }

    #[test]
    fn test_search_response_serializes_to_json() {
        let records = vec![sample_record()];
        let authors = normalize_all(&records);
        let response = SearchResponse {
            status: "success".to_string(),
            count: records.len(),
            records,
            authors,
        };
        let value = serde_json::to_value(&response).expect("serialize response");
        assert_eq!(value["status"], "success");
        assert_eq!(value["count"], 1);
        assert_eq!(value["records"][0]["title"], "A Title");
        assert_eq!(value["authors"][0]["first_name"], "Alice");
    }

    #[test]
    fn test_save_records_csv_reports_typed_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("records.csv");
        let err = save_records_csv(&path, &[sample_record()]).expect_err("unwritable path");
        assert!(matches!(err, rustpubmed::PubmedError::Csv(_)));
    }
}
