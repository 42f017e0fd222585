//! Enrichment pipeline for a hosted university directory: ranking-table
//! imports, directory seeding, and a fallback chain of scrapers that fill
//! and refresh per-field data with confidence and staleness tracking.

pub mod config;
pub mod db;
pub mod enrich;
pub mod extract;
pub mod model;
pub mod normalize;
pub mod output;
pub mod quality;
pub mod runner;
pub mod schedule;
pub mod scrape;
pub mod sources;
pub mod staleness;
