//! Website scraping for discovered companies.
//!
//! This crate provides:
//! - [`PageFetcher`] — the fetch seam, with [`HttpFetcher`] as the real
//!   implementation
//! - [`BatchScraper`] — concurrency-bounded batch scrape over a set of
//!   companies, applying classifier verdicts and persisting results

pub mod batch;
pub mod fetch;

pub use batch::{BatchOutcome, BatchScraper};
pub use fetch::{FetchedPage, HttpFetcher, PageFetcher, extract_visible_text};
