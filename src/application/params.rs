//! Request parameter normalization.
//!
//! Raw query strings are resolved once into typed parameters: comma lists are split,
//! list sizes are checked against the backend's `in` limit and flags become `bool`.

use serde::Deserialize;

use crate::application::error::QueryError;

/// Largest value list a single `in` / `array-contains-any` filter accepts.
pub const IN_FILTER_LIMIT: usize = 30;

/// Placeholder version meaning "all versions aggregated".
pub const ALL_VERSIONS: &str = "ALL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQueryParams {
    pub geo: Option<String>,
    pub rank: Option<String>,
    pub technology: Option<String>,
    pub version: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TechnologyQueryParams {
    pub technology: Option<String>,
    pub category: Option<String>,
    pub onlyname: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryQueryParams {
    pub category: Option<String>,
    pub onlyname: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionQueryParams {
    pub technology: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDate {
    /// Resolve to the newest date present in the report table.
    Latest,
    On(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportParams {
    pub geo: String,
    pub rank: String,
    pub technology: Vec<String>,
    pub version: Vec<String>,
    pub start: Option<StartDate>,
    pub end: Option<String>,
}

impl ReportParams {
    pub fn from_query(raw: &ReportQueryParams) -> Result<Self, QueryError> {
        let geo = present(raw.geo.as_deref());
        let rank = present(raw.rank.as_deref());
        let technology = present(raw.technology.as_deref())
            .map(split_list)
            .filter(|list| !list.is_empty());

        let (Some(geo), Some(rank), Some(technology)) = (geo, rank, technology.clone()) else {
            let mut missing = Vec::new();
            if geo.is_none() {
                missing.push("geo");
            }
            if rank.is_none() {
                missing.push("rank");
            }
            if technology.is_none() {
                missing.push("technology");
            }
            return Err(QueryError::MissingParams(missing));
        };
        check_limit(&technology, "technology")?;

        let version = match present(raw.version.as_deref()) {
            Some(version) if technology.len() == 1 => {
                let list = bounded_list(version, "version")?;
                if list.is_empty() {
                    vec![ALL_VERSIONS.to_string()]
                } else {
                    list
                }
            }
            _ => vec![ALL_VERSIONS.to_string()],
        };

        let start = present(raw.start.as_deref()).map(|start| match start {
            "latest" => StartDate::Latest,
            date => StartDate::On(date.to_string()),
        });

        Ok(Self {
            geo: geo.to_string(),
            rank: rank.to_string(),
            technology,
            version,
            start,
            end: present(raw.end.as_deref()).map(str::to_string),
        })
    }

    /// Whether a specific version list was requested rather than the aggregate.
    pub fn is_versioned(&self) -> bool {
        !(self.version.len() == 1 && self.version[0] == ALL_VERSIONS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TechnologyFilter {
    pub technology: Option<Vec<String>>,
    pub category: Option<Vec<String>>,
    pub onlyname: bool,
}

impl TechnologyFilter {
    pub fn from_query(raw: &TechnologyQueryParams) -> Result<Self, QueryError> {
        Ok(Self {
            technology: optional_list(raw.technology.as_deref(), "technology")?,
            category: optional_list(raw.category.as_deref(), "category")?,
            onlyname: parse_flag(raw.onlyname.as_deref()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    pub category: Option<Vec<String>>,
    pub onlyname: bool,
}

impl CategoryFilter {
    pub fn from_query(raw: &CategoryQueryParams) -> Result<Self, QueryError> {
        Ok(Self {
            category: optional_list(raw.category.as_deref(), "category")?,
            onlyname: parse_flag(raw.onlyname.as_deref()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    pub technology: Option<Vec<String>>,
}

impl VersionFilter {
    pub fn from_query(raw: &VersionQueryParams) -> Result<Self, QueryError> {
        Ok(Self {
            technology: optional_list(raw.technology.as_deref(), "technology")?,
        })
    }
}

/// Split a comma list, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn bounded_list(raw: &str, field: &'static str) -> Result<Vec<String>, QueryError> {
    let list = split_list(raw);
    check_limit(&list, field)?;
    Ok(list)
}

/// A flag is on when present, unless spelled `false` or `0`.
pub fn parse_flag(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => false,
        Some(value) => !(value.eq_ignore_ascii_case("false") || value == "0"),
    }
}

fn check_limit(list: &[String], field: &'static str) -> Result<(), QueryError> {
    if list.len() > IN_FILTER_LIMIT {
        return Err(QueryError::TooManyValues {
            field,
            limit: IN_FILTER_LIMIT,
        });
    }
    Ok(())
}

fn optional_list(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<Vec<String>>, QueryError> {
    match present(raw) {
        Some(raw) => {
            let list = bounded_list(raw, field)?;
            Ok((!list.is_empty()).then_some(list))
        }
        None => Ok(None),
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
