//! Compiles the filter model into a backend predicate plus search scopes.
//!
//! Compilation is pure: no I/O, no validation beyond what the model types
//! already guarantee. Empty text filters and unbounded ranges are inert and
//! never produce a fragment. `Paths` filters are pulled out of each group
//! before combining and feed the scope list instead.

use std::path::PathBuf;

use super::filter::{Combinator, DateRange, FilterGroup, Query, SearchFilter, SizeRange};
use super::predicate::{Attribute, Predicate, Scalar};

/// A directory root the backend restricts enumeration to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// Everything the backend has indexed.
    IndexedVolume,
    Directory(PathBuf),
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub scopes: Vec<SearchScope>,
}

impl CompiledQuery {
    /// True when no group restricted the scope.
    pub fn uses_default_scope(&self) -> bool {
        self.scopes == [SearchScope::IndexedVolume]
    }
}

/// Compiles a query into a predicate and its search scopes.
pub fn compile(query: &Query) -> CompiledQuery {
    let mut scopes: Vec<PathBuf> = Vec::new();
    let mut group_predicates = Vec::with_capacity(query.groups().len());

    for group in query.groups() {
        let (predicate, group_scopes) = compile_group(group);
        for scope in group_scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        group_predicates.push(predicate);
    }

    let predicate = match group_predicates.len() {
        0 => Predicate::True,
        1 => group_predicates.remove(0),
        // Each group keeps its own node so the OR across groups stays visible.
        _ => Predicate::Or(group_predicates),
    };

    let scopes = if scopes.is_empty() {
        vec![SearchScope::IndexedVolume]
    } else {
        scopes.into_iter().map(SearchScope::Directory).collect()
    };

    CompiledQuery { predicate, scopes }
}

/// Compiles one group: its predicate and the paths its `Paths` filters name.
pub fn compile_group(group: &FilterGroup) -> (Predicate, Vec<PathBuf>) {
    let mut fragments = Vec::new();
    let mut scopes = Vec::new();

    for filter in group.filters() {
        if let SearchFilter::Paths(paths) = filter {
            for path in paths {
                if !scopes.contains(path) {
                    scopes.push(path.clone());
                }
            }
            continue;
        }
        if let Some(fragment) = compile_filter(filter) {
            fragments.push(fragment);
        }
    }

    let predicate = match group.combinator() {
        Combinator::And => Predicate::all(fragments),
        Combinator::Or => Predicate::any(fragments),
    };
    (predicate, scopes)
}

/// Compiles a single filter. `None` means the filter adds no constraint.
pub fn compile_filter(filter: &SearchFilter) -> Option<Predicate> {
    match filter {
        SearchFilter::Content(text) => text_fragment(Attribute::TextContent, text),
        SearchFilter::Filename(text) => text_fragment(Attribute::FileName, text),
        SearchFilter::NameOrContent(text) => {
            let name = text_fragment(Attribute::FileName, text)?;
            let content = text_fragment(Attribute::TextContent, text)?;
            Some(Predicate::Or(vec![name, content]))
        }
        SearchFilter::Extensions(extensions) => {
            let parts = extensions
                .iter()
                .map(|extension| extension.trim().trim_start_matches('.'))
                .filter(|extension| !extension.is_empty())
                .map(|extension| Predicate::ends_with(Attribute::FileName, format!(".{extension}")))
                .collect::<Vec<_>>();
            if parts.is_empty() {
                None
            } else {
                Some(Predicate::any(parts))
            }
        }
        SearchFilter::DateModified(range) => date_fragment(Attribute::ModifiedAt, range),
        SearchFilter::DateCreated(range) => date_fragment(Attribute::CreatedAt, range),
        SearchFilter::Size(range) => size_fragment(range),
        SearchFilter::Paths(_) => None,
    }
}

fn text_fragment(attribute: Attribute, text: &str) -> Option<Predicate> {
    if text.is_empty() {
        return None;
    }
    Some(Predicate::contains(attribute, text))
}

fn date_fragment(attribute: Attribute, range: &DateRange) -> Option<Predicate> {
    let mut bounds = Vec::with_capacity(2);
    if let Some(from) = range.from {
        bounds.push(Predicate::AtLeast {
            attribute,
            bound: Scalar::Time(from),
        });
    }
    if let Some(to) = range.to {
        bounds.push(Predicate::AtMost {
            attribute,
            bound: Scalar::Time(to),
        });
    }
    bounded(bounds)
}

fn size_fragment(range: &SizeRange) -> Option<Predicate> {
    let mut bounds = Vec::with_capacity(2);
    if let Some(min) = range.min {
        bounds.push(Predicate::AtLeast {
            attribute: Attribute::Size,
            bound: Scalar::Bytes(min),
        });
    }
    if let Some(max) = range.max {
        bounds.push(Predicate::AtMost {
            attribute: Attribute::Size,
            bound: Scalar::Bytes(max),
        });
    }
    bounded(bounds)
}

fn bounded(bounds: Vec<Predicate>) -> Option<Predicate> {
    if bounds.is_empty() {
        None
    } else {
        Some(Predicate::all(bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn name_contains(text: &str) -> Predicate {
        Predicate::contains(Attribute::FileName, text)
    }

    #[test]
    fn empty_query_matches_everything_on_default_scope() {
        let compiled = compile(&Query::match_all());
        assert_eq!(compiled.predicate, Predicate::True);
        assert!(compiled.uses_default_scope());
    }

    #[test]
    fn and_group_conjoins_non_empty_fragments_only() {
        let query = Query::single(FilterGroup::all(vec![
            SearchFilter::filename("report"),
            SearchFilter::content(""),
            SearchFilter::Size(SizeRange::new(Some(10), None)),
            SearchFilter::paths(["/tmp/docs"]),
        ]));
        let compiled = compile(&query);
        assert_eq!(
            compiled.predicate,
            Predicate::And(vec![
                name_contains("report"),
                Predicate::AtLeast {
                    attribute: Attribute::Size,
                    bound: Scalar::Bytes(10),
                },
            ])
        );
        assert_eq!(
            compiled.scopes,
            vec![SearchScope::Directory(PathBuf::from("/tmp/docs"))]
        );
    }

    #[test]
    fn or_group_disjoins_fragments() {
        let query = Query::single(FilterGroup::any(vec![
            SearchFilter::filename("a"),
            SearchFilter::filename("b"),
        ]));
        assert_eq!(
            compile(&query).predicate,
            Predicate::Or(vec![name_contains("a"), name_contains("b")])
        );
    }

    #[test]
    fn single_extension_is_not_wrapped() {
        let fragment = compile_filter(&SearchFilter::extensions(["pdf"]));
        assert_eq!(
            fragment,
            Some(Predicate::ends_with(Attribute::FileName, ".pdf"))
        );
    }

    #[test]
    fn extension_set_compiles_to_ordered_or() {
        let query = Query::single(FilterGroup::all(vec![
            SearchFilter::extensions(["pdf", "docx"]),
            SearchFilter::paths(["/tmp/docs"]),
        ]));
        let compiled = compile(&query);
        assert_eq!(
            compiled.predicate.to_string(),
            "(kMDItemFSName == \"*.pdf\"cd || kMDItemFSName == \"*.docx\"cd)"
        );
    }

    #[test]
    fn unbounded_ranges_and_empty_sets_are_inert() {
        assert_eq!(
            compile_filter(&SearchFilter::DateCreated(DateRange::default())),
            None
        );
        assert_eq!(compile_filter(&SearchFilter::Size(SizeRange::default())), None);
        assert_eq!(compile_filter(&SearchFilter::Extensions(vec![])), None);
    }

    #[test]
    fn one_sided_date_range_is_one_fragment() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            compile_filter(&SearchFilter::DateModified(DateRange::since(from))),
            Some(Predicate::AtLeast {
                attribute: Attribute::ModifiedAt,
                bound: Scalar::Time(from),
            })
        );
    }

    #[test]
    fn paths_only_group_is_true_restricted_by_scope() {
        let query = Query::single(FilterGroup::all(vec![
            SearchFilter::paths(["/a"]),
            SearchFilter::paths(["/b", "/a"]),
        ]));
        let compiled = compile(&query);
        assert_eq!(compiled.predicate, Predicate::True);
        assert_eq!(
            compiled.scopes,
            vec![
                SearchScope::Directory(PathBuf::from("/a")),
                SearchScope::Directory(PathBuf::from("/b")),
            ]
        );
    }

    #[test]
    fn groups_are_disjoined_and_scopes_unioned() {
        let query = Query::new(vec![
            FilterGroup::all(vec![
                SearchFilter::filename("a"),
                SearchFilter::paths(["/one"]),
            ]),
            FilterGroup::all(vec![SearchFilter::filename("b")]),
            FilterGroup::all(vec![
                SearchFilter::filename("c"),
                SearchFilter::paths(["/two"]),
            ]),
        ]);
        let compiled = compile(&query);
        assert_eq!(
            compiled.predicate,
            Predicate::Or(vec![
                name_contains("a"),
                name_contains("b"),
                name_contains("c"),
            ])
        );
        assert_eq!(
            compiled.scopes,
            vec![
                SearchScope::Directory(PathBuf::from("/one")),
                SearchScope::Directory(PathBuf::from("/two")),
            ]
        );
    }

    #[test]
    fn groups_without_paths_use_default_scope() {
        let query = Query::new(vec![
            FilterGroup::all(vec![SearchFilter::filename("a")]),
            FilterGroup::all(vec![SearchFilter::filename("b")]),
        ]);
        assert!(compile(&query).uses_default_scope());
    }

    #[test]
    fn name_or_content_is_one_fragment() {
        let fragment = compile_filter(&SearchFilter::NameOrContent("2024".to_string()));
        assert_eq!(
            fragment,
            Some(Predicate::Or(vec![
                name_contains("2024"),
                Predicate::contains(Attribute::TextContent, "2024"),
            ]))
        );
    }
}
