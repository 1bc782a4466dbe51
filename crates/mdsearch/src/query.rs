//! Filter model, legacy adaptation, and predicate compilation.
//!
//! This module provides:
//! - Filter model types (filters, groups, the OR-of-groups query)
//! - The legacy single-criterion request adapter
//! - The predicate AST and its Spotlight rendering
//! - Compilation of a query into predicate + scopes
//! - Sort planning and result capping

mod compile;
mod content;
mod filter;
mod legacy;
mod order;
mod path;
mod predicate;

pub use compile::{compile, compile_filter, compile_group, CompiledQuery, SearchScope};
pub use content::file_content_matches;
pub use filter::{Combinator, DateRange, FilterGroup, Query, SearchFilter, SizeRange};
pub use legacy::{adapt, LegacyQueryType, LegacyRequest};
pub use order::{cap, plan_order, OrderSpec, SortDirection, SortField, SortSpec};
pub use path::{extension_of_name, is_within_scope, normalize_scope_path};
pub use predicate::{Attribute, AttributeSource, Predicate, Scalar};
