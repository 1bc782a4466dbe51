//! Backend predicate AST.
//!
//! A [`Predicate`] is what the compiler hands to a metadata backend. It
//! renders to Spotlight query-string syntax via `Display` and can also be
//! evaluated locally against any [`AttributeSource`], which is how the
//! in-memory and walking backends apply it.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};

/// File attributes a predicate or sort order can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Path,
    FileName,
    DisplayName,
    TextContent,
    Kind,
    Size,
    CreatedAt,
    ModifiedAt,
}

impl Attribute {
    /// Attributes copied into every raw record.
    pub const RECORD: [Attribute; 7] = [
        Attribute::Path,
        Attribute::FileName,
        Attribute::DisplayName,
        Attribute::Kind,
        Attribute::Size,
        Attribute::CreatedAt,
        Attribute::ModifiedAt,
    ];

    /// The Spotlight metadata key for this attribute.
    pub fn key(self) -> &'static str {
        match self {
            Self::Path => "kMDItemPath",
            Self::FileName => "kMDItemFSName",
            Self::DisplayName => "kMDItemDisplayName",
            Self::TextContent => "kMDItemTextContent",
            Self::Kind => "kMDItemKind",
            Self::Size => "kMDItemFSSize",
            Self::CreatedAt => "kMDItemFSCreationDate",
            Self::ModifiedAt => "kMDItemFSContentChangeDate",
        }
    }
}

/// A comparable bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bytes(u64),
    Time(DateTime<Utc>),
}

/// A boolean expression over file attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every item.
    True,
    /// Case-insensitive substring match.
    Contains { attribute: Attribute, needle: String },
    /// Case-insensitive suffix match.
    EndsWith { attribute: Attribute, suffix: String },
    /// `attribute >= bound`.
    AtLeast { attribute: Attribute, bound: Scalar },
    /// `attribute <= bound`.
    AtMost { attribute: Attribute, bound: Scalar },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn contains(attribute: Attribute, needle: impl Into<String>) -> Self {
        Self::Contains {
            attribute,
            needle: needle.into(),
        }
    }

    pub fn ends_with(attribute: Attribute, suffix: impl Into<String>) -> Self {
        Self::EndsWith {
            attribute,
            suffix: suffix.into(),
        }
    }

    /// Conjunction of `parts`. No parts is `True`; one part is returned as is.
    pub fn all(mut parts: Vec<Predicate>) -> Self {
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    /// Disjunction of `parts`. No parts is `True`; one part is returned as is.
    pub fn any(mut parts: Vec<Predicate>) -> Self {
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::Or(parts),
        }
    }

    /// Evaluates the predicate against locally available attributes.
    ///
    /// Missing attributes never match a constraint that refers to them.
    pub fn matches(&self, source: &dyn AttributeSource) -> bool {
        match self {
            Self::True => true,
            Self::Contains { attribute, needle } => {
                source.contains_text(*attribute, needle.to_lowercase().as_str())
            }
            Self::EndsWith { attribute, suffix } => source
                .text(*attribute)
                .map(|value| value.to_lowercase().ends_with(suffix.to_lowercase().as_str()))
                .unwrap_or(false),
            Self::AtLeast { attribute, bound } => {
                compare_bound(source, *attribute, bound).is_some_and(|ordering| ordering.is_ge())
            }
            Self::AtMost { attribute, bound } => {
                compare_bound(source, *attribute, bound).is_some_and(|ordering| ordering.is_le())
            }
            Self::And(parts) => parts.iter().all(|part| part.matches(source)),
            Self::Or(parts) => parts.is_empty() || parts.iter().any(|part| part.matches(source)),
        }
    }
}

fn compare_bound(
    source: &dyn AttributeSource,
    attribute: Attribute,
    bound: &Scalar,
) -> Option<std::cmp::Ordering> {
    match bound {
        Scalar::Bytes(value) => source.bytes(attribute).map(|actual| actual.cmp(value)),
        Scalar::Time(value) => source.time(attribute).map(|actual| actual.cmp(value)),
    }
}

/// Read access to the attributes of one candidate item.
pub trait AttributeSource {
    fn text(&self, attribute: Attribute) -> Option<Cow<'_, str>>;

    fn bytes(&self, attribute: Attribute) -> Option<u64>;

    fn time(&self, attribute: Attribute) -> Option<DateTime<Utc>>;

    /// `needle` is already lowercased.
    fn contains_text(&self, attribute: Attribute, needle: &str) -> bool {
        self.text(attribute)
            .map(|value| value.to_lowercase().contains(needle))
            .unwrap_or(false)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "{} == \"*\"", Attribute::FileName.key()),
            Self::Contains { attribute, needle } => {
                write!(f, "{} == \"*{}*\"cd", attribute.key(), escape(needle))
            }
            Self::EndsWith { attribute, suffix } => {
                write!(f, "{} == \"*{}\"cd", attribute.key(), escape(suffix))
            }
            Self::AtLeast { attribute, bound } => write!(
                f,
                "{} >= {}",
                attribute.key(),
                ScalarLiteral {
                    scalar: bound,
                    round_up: false,
                }
            ),
            Self::AtMost { attribute, bound } => write!(
                f,
                "{} <= {}",
                attribute.key(),
                ScalarLiteral {
                    scalar: bound,
                    round_up: true,
                }
            ),
            Self::And(parts) => write_joined(f, parts, " && "),
            Self::Or(parts) => write_joined(f, parts, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], separator: &str) -> fmt::Result {
    if parts.is_empty() {
        return write!(f, "{}", Predicate::True);
    }
    f.write_str("(")?;
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}

/// Time literals have whole-second precision, so sub-second bounds are
/// widened outward: lower bounds round down, upper bounds round up.
struct ScalarLiteral<'a> {
    scalar: &'a Scalar,
    round_up: bool,
}

impl fmt::Display for ScalarLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar {
            Scalar::Bytes(value) => write!(f, "{value}"),
            Scalar::Time(value) => {
                let mut seconds = value.timestamp();
                if self.round_up && value.timestamp_subsec_nanos() > 0 {
                    seconds = seconds.saturating_add(1);
                }
                let whole = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or(*value);
                write!(f, "$time.iso({})", whole.format("%Y-%m-%dT%H:%M:%SZ"))
            }
        }
    }
}

/// Escapes characters with meaning inside a Spotlight string literal.
fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\\', '*']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if matches!(ch, '"' | '\\' | '*') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Item {
        name: &'static str,
        size: Option<u64>,
        modified: Option<DateTime<Utc>>,
    }

    impl AttributeSource for Item {
        fn text(&self, attribute: Attribute) -> Option<Cow<'_, str>> {
            match attribute {
                Attribute::FileName => Some(Cow::Borrowed(self.name)),
                _ => None,
            }
        }

        fn bytes(&self, attribute: Attribute) -> Option<u64> {
            match attribute {
                Attribute::Size => self.size,
                _ => None,
            }
        }

        fn time(&self, attribute: Attribute) -> Option<DateTime<Utc>> {
            match attribute {
                Attribute::ModifiedAt => self.modified,
                _ => None,
            }
        }
    }

    fn item(name: &'static str) -> Item {
        Item {
            name,
            size: None,
            modified: None,
        }
    }

    #[test]
    fn contains_is_case_insensitive() {
        let predicate = Predicate::contains(Attribute::FileName, "REPORT");
        assert!(predicate.matches(&item("q3-report.pdf")));
        assert!(!predicate.matches(&item("summary.pdf")));
    }

    #[test]
    fn ends_with_matches_suffix_only() {
        let predicate = Predicate::ends_with(Attribute::FileName, ".pdf");
        assert!(predicate.matches(&item("A.PDF")));
        assert!(!predicate.matches(&item("a.pdf.txt")));
    }

    #[test]
    fn missing_attribute_fails_bound() {
        let predicate = Predicate::AtLeast {
            attribute: Attribute::Size,
            bound: Scalar::Bytes(10),
        };
        assert!(!predicate.matches(&item("a")));
        let sized = Item {
            size: Some(10),
            ..item("a")
        };
        assert!(predicate.matches(&sized));
    }

    #[test]
    fn inverted_date_bounds_match_nothing() {
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let predicate = Predicate::all(vec![
            Predicate::AtLeast {
                attribute: Attribute::ModifiedAt,
                bound: Scalar::Time(later),
            },
            Predicate::AtMost {
                attribute: Attribute::ModifiedAt,
                bound: Scalar::Time(earlier),
            },
        ]);
        for modified in [earlier, later] {
            let candidate = Item {
                modified: Some(modified),
                ..item("a")
            };
            assert!(!predicate.matches(&candidate));
        }
    }

    #[test]
    fn all_and_any_collapse_trivial_lists() {
        assert_eq!(Predicate::all(vec![]), Predicate::True);
        let single = Predicate::contains(Attribute::FileName, "x");
        assert_eq!(Predicate::any(vec![single.clone()]), single);
    }

    #[test]
    fn renders_spotlight_syntax() {
        let predicate = Predicate::all(vec![
            Predicate::any(vec![
                Predicate::ends_with(Attribute::FileName, ".pdf"),
                Predicate::ends_with(Attribute::FileName, ".docx"),
            ]),
            Predicate::AtLeast {
                attribute: Attribute::Size,
                bound: Scalar::Bytes(1024),
            },
        ]);
        assert_eq!(
            predicate.to_string(),
            "((kMDItemFSName == \"*.pdf\"cd || kMDItemFSName == \"*.docx\"cd) && kMDItemFSSize >= 1024)"
        );
    }

    #[test]
    fn renders_dates_as_iso_literals() {
        let predicate = Predicate::AtMost {
            attribute: Attribute::ModifiedAt,
            bound: Scalar::Time(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        };
        assert_eq!(
            predicate.to_string(),
            "kMDItemFSContentChangeDate <= $time.iso(2024-01-02T03:04:05Z)"
        );
    }

    #[test]
    fn sub_second_bounds_widen_to_whole_seconds() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(900);
        let upper = Predicate::AtMost {
            attribute: Attribute::ModifiedAt,
            bound: Scalar::Time(instant),
        };
        let lower = Predicate::AtLeast {
            attribute: Attribute::ModifiedAt,
            bound: Scalar::Time(instant),
        };
        assert_eq!(
            upper.to_string(),
            "kMDItemFSContentChangeDate <= $time.iso(2024-01-01T12:00:01Z)"
        );
        assert_eq!(
            lower.to_string(),
            "kMDItemFSContentChangeDate >= $time.iso(2024-01-01T12:00:00Z)"
        );
    }

    #[test]
    fn escapes_literal_specials() {
        let predicate = Predicate::contains(Attribute::FileName, "a\"b*c");
        assert_eq!(
            predicate.to_string(),
            "kMDItemFSName == \"*a\\\"b\\*c*\"cd"
        );
    }
}
