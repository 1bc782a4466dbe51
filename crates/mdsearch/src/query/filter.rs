//! Filter model: atomic criteria, groups, and the top-level query.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive date range. Either bound may be absent.
///
/// `from > to` is legal and simply matches nothing at the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn since(from: DateTime<Utc>) -> Self {
        Self::new(Some(from), None)
    }
}

/// An inclusive byte-size range. Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizeRange {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

impl SizeRange {
    pub fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }
}

/// A single search criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// Case-insensitive substring of the file's text content.
    Content(String),
    /// Case-insensitive substring of the file name.
    Filename(String),
    /// Name OR content as one indivisible criterion. Only produced by the
    /// legacy adapter for its `all` query type.
    NameOrContent(String),
    /// File name ends with any of the extensions (stored without the dot).
    Extensions(Vec<String>),
    DateModified(DateRange),
    DateCreated(DateRange),
    Size(SizeRange),
    /// Restricts the search scope. Never contributes to the predicate.
    Paths(Vec<PathBuf>),
}

impl SearchFilter {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn filename(text: impl Into<String>) -> Self {
        Self::Filename(text.into())
    }

    /// Builds an extension filter, dropping leading dots, blanks and
    /// case-insensitive duplicates while keeping the caller's order.
    pub fn extensions<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = Vec::new();
        for value in values {
            let trimmed = value.as_ref().trim().trim_start_matches('.');
            if trimmed.is_empty() {
                continue;
            }
            if extensions
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(trimmed))
            {
                continue;
            }
            extensions.push(trimmed.to_string());
        }
        Self::Extensions(extensions)
    }

    pub fn paths<I, P>(values: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::Paths(values.into_iter().map(Into::into).collect())
    }
}

/// How the filters of one group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// An ordered list of filters joined by one combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGroup {
    filters: Vec<SearchFilter>,
    combinator: Combinator,
}

impl FilterGroup {
    pub fn new(filters: Vec<SearchFilter>, combinator: Combinator) -> Self {
        Self {
            filters,
            combinator,
        }
    }

    /// A group whose filters must all match.
    pub fn all(filters: Vec<SearchFilter>) -> Self {
        Self::new(filters, Combinator::And)
    }

    /// A group where any filter may match.
    pub fn any(filters: Vec<SearchFilter>) -> Self {
        Self::new(filters, Combinator::Or)
    }

    pub fn filters(&self) -> &[SearchFilter] {
        &self.filters
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Groups joined by OR. No groups means match everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    groups: Vec<FilterGroup>,
}

impl Query {
    pub fn new(groups: Vec<FilterGroup>) -> Self {
        Self { groups }
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn single(group: FilterGroup) -> Self {
        Self::new(vec![group])
    }

    pub fn groups(&self) -> &[FilterGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_cleaned_and_deduplicated() {
        let filter = SearchFilter::extensions([".pdf", "PDF", " docx ", ""]);
        assert_eq!(
            filter,
            SearchFilter::Extensions(vec!["pdf".to_string(), "docx".to_string()])
        );
    }

    #[test]
    fn default_combinator_is_and() {
        assert_eq!(Combinator::default(), Combinator::And);
    }

    #[test]
    fn match_all_has_no_groups() {
        assert!(Query::match_all().groups().is_empty());
    }
}
