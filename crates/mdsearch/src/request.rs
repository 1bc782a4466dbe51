//! Search requests and their JSON wire form.
//!
//! A request carries either a structured [`Query`] or a [`LegacyRequest`].
//! On the wire the structured form arrives as `filterGroups`; when it is
//! present any legacy fields in the same payload are ignored.
//!
//! ```json
//! {
//!   "filterGroups": [
//!     { "filters": [{ "type": "extension", "values": ["pdf", "docx"] },
//!                   { "type": "paths", "values": ["/tmp/docs"] }],
//!       "combination": "and" }
//!   ],
//!   "sortBy": "dateModified",
//!   "sortDirection": "descending",
//!   "limit": 50,
//!   "timeoutMs": 2000
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SearchError};
use crate::query::{
    adapt, normalize_scope_path, Combinator, DateRange, FilterGroup, LegacyRequest, Query,
    SearchFilter, SizeRange, SortDirection, SortField, SortSpec,
};

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    Query(Query),
    Legacy(LegacyRequest),
}

impl SearchCriteria {
    /// The unified filter model for these criteria.
    pub fn to_query(&self) -> Query {
        match self {
            Self::Query(query) => query.clone(),
            Self::Legacy(legacy) => adapt(legacy),
        }
    }
}

/// One search call.
///
/// `limit` and `timeout` fall back to the orchestrator's config when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub criteria: SearchCriteria,
    pub sort: SortSpec,
    pub limit: Option<usize>,
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(criteria: SearchCriteria) -> Self {
        Self {
            criteria,
            sort: SortSpec::default(),
            limit: None,
            timeout: None,
        }
    }

    pub fn query(query: Query) -> Self {
        Self::new(SearchCriteria::Query(query))
    }

    pub fn legacy(request: LegacyRequest) -> Self {
        Self::new(SearchCriteria::Legacy(request))
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Decodes the wire form.
    ///
    /// Malformed filters and groups are `InvalidFilterShape`; anything else
    /// that fails to decode is `Serialization`.
    pub fn from_value(value: Value) -> Result<Self> {
        let wire: WireRequest = serde_json::from_value(value)?;

        let criteria = match wire.filter_groups {
            Some(groups) => SearchCriteria::Query(decode_groups(groups)?),
            None => SearchCriteria::Legacy(normalize_legacy(wire.legacy)?),
        };

        Ok(Self {
            criteria,
            sort: SortSpec::new(
                wire.sort_by.unwrap_or_default(),
                wire.sort_direction.unwrap_or_default(),
            ),
            limit: wire.limit,
            timeout: wire.timeout_ms.map(Duration::from_millis),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    #[serde(default)]
    filter_groups: Option<Vec<WireGroup>>,
    #[serde(flatten)]
    legacy: LegacyRequest,
    #[serde(default)]
    sort_by: Option<SortField>,
    #[serde(default)]
    sort_direction: Option<SortDirection>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    #[serde(default)]
    filters: Vec<Value>,
    #[serde(default, alias = "combinator")]
    combination: Combinator,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireFilter {
    Content {
        text: String,
    },
    Filename {
        text: String,
    },
    #[serde(alias = "extensions")]
    Extension {
        values: Vec<String>,
    },
    DateModified {
        #[serde(default)]
        from: Option<DateTime<Utc>>,
        #[serde(default)]
        to: Option<DateTime<Utc>>,
    },
    DateCreated {
        #[serde(default)]
        from: Option<DateTime<Utc>>,
        #[serde(default)]
        to: Option<DateTime<Utc>>,
    },
    Size {
        #[serde(default)]
        min: Option<u64>,
        #[serde(default)]
        max: Option<u64>,
    },
    Paths {
        values: Vec<String>,
    },
}

fn decode_groups(groups: Vec<WireGroup>) -> Result<Query> {
    let mut decoded = Vec::with_capacity(groups.len());
    for (index, group) in groups.into_iter().enumerate() {
        if group.filters.is_empty() {
            return Err(SearchError::InvalidFilterShape(format!(
                "filter group {index} has no filters"
            )));
        }
        let filters = group
            .filters
            .into_iter()
            .map(|filter| decode_filter(index, filter))
            .collect::<Result<Vec<_>>>()?;
        decoded.push(FilterGroup::new(filters, group.combination));
    }
    Ok(Query::new(decoded))
}

fn decode_filter(group: usize, value: Value) -> Result<SearchFilter> {
    let wire: WireFilter = serde_json::from_value(value).map_err(|error| {
        SearchError::InvalidFilterShape(format!("filter group {group}: {error}"))
    })?;

    let filter = match wire {
        WireFilter::Content { text } => SearchFilter::content(text),
        WireFilter::Filename { text } => SearchFilter::filename(text),
        WireFilter::Extension { values } => SearchFilter::extensions(values),
        WireFilter::DateModified { from, to } => SearchFilter::DateModified(DateRange::new(from, to)),
        WireFilter::DateCreated { from, to } => SearchFilter::DateCreated(DateRange::new(from, to)),
        WireFilter::Size { min, max } => SearchFilter::Size(SizeRange::new(min, max)),
        WireFilter::Paths { values } => SearchFilter::Paths(normalize_paths(values.iter())?),
    };
    Ok(filter)
}

fn normalize_legacy(mut legacy: LegacyRequest) -> Result<LegacyRequest> {
    let raw: Vec<String> = legacy
        .only_in
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    legacy.only_in = normalize_paths(raw.iter())?;
    Ok(legacy)
}

fn normalize_paths<'a>(values: impl Iterator<Item = &'a String>) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for value in values {
        let path = normalize_scope_path(value)?;
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}
