//! Bloggregator - An RSS Feed Aggregator
//!
//! This crate polls registered RSS feeds on a fixed interval, stores every
//! new post once, and serves users' feeds and posts through a JSON API.

pub mod config;
pub mod db;
pub mod error;
pub mod fault;
pub mod ingest;
pub mod reader;
pub mod routes;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod worker;
