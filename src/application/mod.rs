//! Application services: parameter normalization and the cached read paths.

pub mod catalog;
pub mod error;
pub mod lookups;
pub mod params;
pub mod reports;
pub mod repos;
