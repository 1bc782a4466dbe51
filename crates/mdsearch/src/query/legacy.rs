//! Adapter from the flat, single-criterion request shape to the filter model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::filter::{DateRange, FilterGroup, Query, SearchFilter};

/// Which attribute the legacy free-text query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LegacyQueryType {
    Extension,
    Contents,
    Filename,
    #[default]
    All,
}

impl LegacyQueryType {
    /// Parses a query type. Unknown values fall back to `All`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "extension" => Self::Extension,
            "contents" => Self::Contents,
            "filename" => Self::Filename,
            _ => Self::All,
        }
    }
}

impl From<String> for LegacyQueryType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

/// The flat request shape: free text plus a query type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub query_type: Option<LegacyQueryType>,
    /// Only consulted when the effective query type is `Extension`.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub only_in: Vec<PathBuf>,
    /// Applies to the modification date only.
    #[serde(default)]
    pub date_filter: Option<DateRange>,
    #[serde(default)]
    pub filename_only: Option<bool>,
}

impl LegacyRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// `filename_only = true` wins over any explicit query type.
    pub fn effective_query_type(&self) -> LegacyQueryType {
        if self.filename_only == Some(true) {
            return LegacyQueryType::Filename;
        }
        self.query_type.unwrap_or_default()
    }
}

/// Maps a legacy request onto a single-group query.
///
/// The group always combines with AND so a date filter narrows whatever
/// text criterion was produced. If nothing was produced the group is empty,
/// which compiles to match-everything.
pub fn adapt(request: &LegacyRequest) -> Query {
    let text = request.query.as_str();
    let mut filters = Vec::new();

    match request.effective_query_type() {
        LegacyQueryType::Extension => {
            let extensions = SearchFilter::extensions(&request.extensions);
            if matches!(&extensions, SearchFilter::Extensions(values) if !values.is_empty()) {
                filters.push(extensions);
            } else if !text.is_empty() {
                filters.push(SearchFilter::extensions([text]));
            }
        }
        LegacyQueryType::Contents => {
            if !text.is_empty() {
                filters.push(SearchFilter::content(text));
            }
        }
        LegacyQueryType::Filename => {
            if !text.is_empty() {
                filters.push(SearchFilter::filename(text));
            }
        }
        LegacyQueryType::All => {
            if !text.is_empty() {
                filters.push(SearchFilter::NameOrContent(text.to_string()));
            }
        }
    }

    if let Some(range) = request.date_filter {
        filters.push(SearchFilter::DateModified(range));
    }

    if !request.only_in.is_empty() {
        filters.push(SearchFilter::Paths(request.only_in.clone()));
    }

    Query::single(FilterGroup::all(filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::Combinator;
    use chrono::{TimeZone, Utc};

    fn only_group(query: &Query) -> &FilterGroup {
        assert_eq!(query.groups().len(), 1);
        &query.groups()[0]
    }

    #[test]
    fn unknown_query_type_falls_back_to_all() {
        assert_eq!(LegacyQueryType::parse("regex"), LegacyQueryType::All);
        assert_eq!(LegacyQueryType::parse("Contents"), LegacyQueryType::Contents);
    }

    #[test]
    fn filename_only_overrides_explicit_type() {
        for query_type in [
            LegacyQueryType::Extension,
            LegacyQueryType::Contents,
            LegacyQueryType::Filename,
            LegacyQueryType::All,
        ] {
            let request = LegacyRequest {
                query_type: Some(query_type),
                filename_only: Some(true),
                extensions: vec!["pdf".to_string()],
                ..LegacyRequest::new("2024")
            };
            let expected = LegacyRequest {
                query_type: Some(LegacyQueryType::Filename),
                extensions: vec!["pdf".to_string()],
                ..LegacyRequest::new("2024")
            };
            assert_eq!(adapt(&request), adapt(&expected));
        }
    }

    #[test]
    fn filename_only_false_keeps_explicit_type() {
        let request = LegacyRequest {
            query_type: Some(LegacyQueryType::Contents),
            filename_only: Some(false),
            ..LegacyRequest::new("todo")
        };
        assert_eq!(
            only_group(&adapt(&request)).filters(),
            &[SearchFilter::content("todo")]
        );
    }

    #[test]
    fn extension_prefers_list_over_free_text() {
        let request = LegacyRequest {
            query_type: Some(LegacyQueryType::Extension),
            extensions: vec!["pdf".to_string(), "docx".to_string()],
            ..LegacyRequest::new("txt")
        };
        assert_eq!(
            only_group(&adapt(&request)).filters(),
            &[SearchFilter::extensions(["pdf", "docx"])]
        );
    }

    #[test]
    fn extension_falls_back_to_free_text() {
        let request = LegacyRequest {
            query_type: Some(LegacyQueryType::Extension),
            ..LegacyRequest::new("md")
        };
        assert_eq!(
            only_group(&adapt(&request)).filters(),
            &[SearchFilter::extensions(["md"])]
        );
    }

    #[test]
    fn default_type_is_name_or_content() {
        let query = adapt(&LegacyRequest::new("invoice"));
        assert_eq!(
            only_group(&query).filters(),
            &[SearchFilter::NameOrContent("invoice".to_string())]
        );
    }

    #[test]
    fn date_and_paths_join_the_same_and_group() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = LegacyRequest {
            query_type: Some(LegacyQueryType::Filename),
            date_filter: Some(DateRange::since(from)),
            only_in: vec![PathBuf::from("/tmp/docs")],
            ..LegacyRequest::new("report")
        };
        let query = adapt(&request);
        let group = only_group(&query);
        assert_eq!(group.combinator(), Combinator::And);
        assert_eq!(
            group.filters(),
            &[
                SearchFilter::filename("report"),
                SearchFilter::DateModified(DateRange::since(from)),
                SearchFilter::paths(["/tmp/docs"]),
            ]
        );
    }

    #[test]
    fn query_text_is_used_verbatim() {
        let request = LegacyRequest {
            query_type: Some(LegacyQueryType::Filename),
            ..LegacyRequest::new(" 2024 ")
        };
        assert_eq!(
            only_group(&adapt(&request)).filters(),
            &[SearchFilter::filename(" 2024 ")]
        );

        let blank = adapt(&LegacyRequest::new("   "));
        assert_eq!(
            only_group(&blank).filters(),
            &[SearchFilter::NameOrContent("   ".to_string())]
        );
    }

    #[test]
    fn empty_request_yields_one_empty_group() {
        let query = adapt(&LegacyRequest::default());
        assert!(only_group(&query).is_empty());
    }

    #[test]
    fn deserializes_camel_case_shape() {
        let request: LegacyRequest = serde_json::from_str(
            r#"{"query": "x", "queryType": "nonsense", "onlyIn": ["/a"], "filenameOnly": true}"#,
        )
        .expect("legacy request");
        assert_eq!(request.query_type, Some(LegacyQueryType::All));
        assert_eq!(request.effective_query_type(), LegacyQueryType::Filename);
        assert_eq!(request.only_in, vec![PathBuf::from("/a")]);
    }
}
