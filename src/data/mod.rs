//! Data ingestion and storage
//!
//! fbref scraping and SQLite storage of per-player per-match stat rows.

pub mod database;
pub mod scrapers;

pub use database::PlayerStore;
