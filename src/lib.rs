//! # rustpubmed
//!
//! PubMed Search Pipeline with Structured Author Extraction - Rust Microservice
//!
//! ## Modules
//!
//! - [`search`] - Query/filter model and listing-page index walking
//! - [`extract`] - Per-field record extraction with sentinel fallbacks
//! - [`enrich`] - Optional MEDLINE-rendering enrichment
//! - [`pipeline`] - Semaphore-bounded concurrent fetch+extract fan-out
//! - [`authors`] - Author row normalization for flat export
//! - [`ratelimit`] - Sliding-window rate limiter for the enrichment origin
//! - [`fetch`] - Single-request HTTP fetcher with identity rotation
//! - [`identity`] - Randomized user-agent pool
//! - [`config`] - Runtime configuration with environment overrides
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustpubmed::{config::ScrapeConfig, pipeline, search::SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScrapeConfig::from_env()?;
//!     let query = SearchQuery::new("covid vaccine", 2);
//!     let records = pipeline::run(&config, &query).await?;
//!     println!("Retrieved {} records", records.len());
//!     Ok(())
//! }
//! ```

pub mod authors;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod identity;
pub mod pipeline;
pub mod ratelimit;
pub mod search;

pub use error::{PubmedError, Result};
