//! HTTP API over pre-aggregated web technology reports, fronted by a query result cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
