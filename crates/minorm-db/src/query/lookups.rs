//! Lookup suffixes for keyword filters.
//!
//! A filter key such as `age__gte` or `author__name__startswith` names a
//! field path and, optionally, a trailing lookup selecting the comparison.
//! [`resolve_lookup`] splits the two apart and [`for_lookup`] turns a
//! resolved column, lookup, and value into a [`WhereCondition`].
//!
//! ```
//! use minorm_db::query::lookups::{for_lookup, resolve_lookup, Lookup};
//!
//! let (path, lookup) = resolve_lookup("name__contains");
//! assert_eq!(path, "name");
//! assert_eq!(lookup, Some(Lookup::Contains));
//!
//! let cond = for_lookup("person.name", lookup, "foo".into());
//! assert_eq!(cond.to_string(), "person.name LIKE {0}");
//! ```

use super::expressions::{Operator, WhereCondition};
use crate::value::Value;

/// Separator between path segments and the trailing lookup.
pub const LOOKUP_SEP: &str = "__";

/// A comparison selected by a key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// `field = value`
    Exact,
    /// `field != value`
    Neq,
    /// `field < value`
    Lt,
    /// `field <= value`
    Lte,
    /// `field > value`
    Gt,
    /// `field >= value`
    Gte,
    /// `field IN (values...)`
    In,
    /// `field LIKE 'value%'`
    StartsWith,
    /// `field LIKE '%value'`
    EndsWith,
    /// `field LIKE '%value%'`
    Contains,
}

impl Lookup {
    /// Parses a suffix name, returning `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exact" => Self::Exact,
            "neq" => Self::Neq,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "in" => Self::In,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "contains" => Self::Contains,
            _ => return None,
        })
    }

    /// Returns the suffix name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Contains => "contains",
        }
    }

    /// Returns the SQL operator this lookup compiles to.
    pub const fn operator(self) -> Operator {
        match self {
            Self::Exact => Operator::Eq,
            Self::Neq => Operator::Neq,
            Self::Lt => Operator::Lt,
            Self::Lte => Operator::Lte,
            Self::Gt => Operator::Gt,
            Self::Gte => Operator::Gte,
            Self::In => Operator::In,
            Self::StartsWith | Self::EndsWith | Self::Contains => Operator::Like,
        }
    }

    /// Returns `true` for the `IN` lookup, whose value is a list.
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In)
    }
}

/// Splits a filter key into its field path and trailing lookup.
///
/// An unrecognised trailing segment is not an error here: the whole key is
/// returned as the path with no lookup, and validation of that path happens
/// when it is resolved against a model.
pub fn resolve_lookup(key: &str) -> (&str, Option<Lookup>) {
    key.rsplit_once(LOOKUP_SEP)
        .and_then(|(path, suffix)| Lookup::from_name(suffix).map(|lookup| (path, Some(lookup))))
        .unwrap_or((key, None))
}

/// Builds the condition for `field <lookup> value`.
///
/// No lookup means equality. The `LIKE` lookups wrap the value into a
/// pattern; `%` and `_` inside the value are passed through unescaped.
pub fn for_lookup(field: impl Into<String>, lookup: Option<Lookup>, value: Value) -> WhereCondition {
    let lookup = lookup.unwrap_or(Lookup::Exact);
    let value = match lookup {
        Lookup::StartsWith => Value::String(format!("{}%", like_text(&value))),
        Lookup::EndsWith => Value::String(format!("%{}", like_text(&value))),
        Lookup::Contains => Value::String(format!("%{}%", like_text(&value))),
        Lookup::In => match value {
            Value::List(_) => value,
            single => Value::List(vec![single]),
        },
        _ => value,
    };
    WhereCondition::new(field, lookup.operator(), value)
}

fn like_text(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_lookup_with_suffix() {
        assert_eq!(resolve_lookup("age__gt"), ("age", Some(Lookup::Gt)));
        assert_eq!(
            resolve_lookup("author__name__startswith"),
            ("author__name", Some(Lookup::StartsWith))
        );
    }

    #[test]
    fn test_resolve_lookup_without_suffix() {
        assert_eq!(resolve_lookup("age"), ("age", None));
        assert_eq!(resolve_lookup("author__name"), ("author__name", None));
    }

    #[test]
    fn test_resolve_lookup_unknown_suffix_is_path() {
        assert_eq!(resolve_lookup("age__nonsense"), ("age__nonsense", None));
    }

    #[test]
    fn test_lookup_names_round_trip() {
        for lookup in [
            Lookup::Exact,
            Lookup::Neq,
            Lookup::Lt,
            Lookup::Lte,
            Lookup::Gt,
            Lookup::Gte,
            Lookup::In,
            Lookup::StartsWith,
            Lookup::EndsWith,
            Lookup::Contains,
        ] {
            assert_eq!(Lookup::from_name(lookup.name()), Some(lookup));
        }
        assert_eq!(Lookup::from_name("iexact"), None);
    }

    #[test]
    fn test_for_lookup_default_is_equality() {
        let cond = for_lookup("person.id", None, Value::Int(1));
        assert_eq!(cond.to_string(), "person.id = {0}");
        assert_eq!(cond.values(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_for_lookup_comparisons() {
        let cases = [
            (Lookup::Neq, "person.age != {0}"),
            (Lookup::Lt, "person.age < {0}"),
            (Lookup::Lte, "person.age <= {0}"),
            (Lookup::Gt, "person.age > {0}"),
            (Lookup::Gte, "person.age >= {0}"),
        ];
        for (lookup, expected) in cases {
            assert_eq!(for_lookup("person.age", Some(lookup), Value::Int(3)).to_string(), expected);
        }
    }

    #[test]
    fn test_for_lookup_like_patterns() {
        let cond = for_lookup("person.name", Some(Lookup::Contains), "foo".into());
        assert_eq!(cond.to_string(), "person.name LIKE {0}");
        assert_eq!(cond.values(), vec![Value::from("%foo%")]);

        let cond = for_lookup("person.name", Some(Lookup::StartsWith), "foo".into());
        assert_eq!(cond.values(), vec![Value::from("foo%")]);

        let cond = for_lookup("person.name", Some(Lookup::EndsWith), "foo".into());
        assert_eq!(cond.values(), vec![Value::from("%foo")]);
    }

    #[test]
    fn test_for_lookup_like_does_not_escape() {
        let cond = for_lookup("person.name", Some(Lookup::Contains), "50%_off".into());
        assert_eq!(cond.values(), vec![Value::from("%50%_off%")]);
    }

    #[test]
    fn test_for_lookup_in() {
        let cond = for_lookup("person.age", Some(Lookup::In), Value::list([3, 4]));
        assert_eq!(cond.to_string(), "person.age IN ({0}, {0})");
        assert_eq!(cond.values(), vec![Value::Int(3), Value::Int(4)]);

        let cond = for_lookup("person.age", Some(Lookup::In), Value::Int(3));
        assert_eq!(cond.to_string(), "person.age IN ({0})");
    }
}
