//! Sort planning and result capping.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::predicate::{Attribute, AttributeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    DateModified,
    DateCreated,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Caller-facing sort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Backend ordering: one attribute key plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSpec {
    pub attribute: Attribute,
    pub ascending: bool,
}

impl Default for OrderSpec {
    fn default() -> Self {
        plan_order(SortSpec::default())
    }
}

impl OrderSpec {
    /// Orders two items by the planned attribute.
    ///
    /// Items missing the attribute sort after those that have it in either
    /// direction. Ties fall back to the path so the order is total.
    pub fn compare(&self, left: &dyn AttributeSource, right: &dyn AttributeSource) -> Ordering {
        let primary = match self.attribute {
            Attribute::Size => missing_last(
                left.bytes(self.attribute),
                right.bytes(self.attribute),
                self.ascending,
            ),
            Attribute::CreatedAt | Attribute::ModifiedAt => missing_last(
                left.time(self.attribute),
                right.time(self.attribute),
                self.ascending,
            ),
            attribute => missing_last(
                left.text(attribute).map(|value| value.to_lowercase()),
                right.text(attribute).map(|value| value.to_lowercase()),
                self.ascending,
            ),
        };
        primary.then_with(|| left.text(Attribute::Path).cmp(&right.text(Attribute::Path)))
    }
}

fn missing_last<T: Ord>(left: Option<T>, right: Option<T>, ascending: bool) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => {
            if ascending {
                left.cmp(&right)
            } else {
                right.cmp(&left)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Maps a sort request to the backend attribute and direction.
pub fn plan_order(sort: SortSpec) -> OrderSpec {
    let attribute = match sort.field {
        SortField::Name => Attribute::FileName,
        SortField::DateModified => Attribute::ModifiedAt,
        SortField::DateCreated => Attribute::CreatedAt,
        SortField::Size => Attribute::Size,
    };
    OrderSpec {
        attribute,
        ascending: sort.direction == SortDirection::Ascending,
    }
}

/// Keeps at most `limit` leading results.
///
/// Only call this once gathering has finished or timed out; the backend
/// order must be settled before truncating.
pub fn cap<I: IntoIterator>(results: I, limit: usize) -> std::iter::Take<I::IntoIter> {
    results.into_iter().take(limit)
}
