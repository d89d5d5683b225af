//! Backend-agnostic database values.
//!
//! [`Value`] is the currency between models, the query builder and the
//! backends: field values on the way in, bound parameters, and decoded
//! result cells on the way out. Its variants mirror the storage types of
//! the field kinds in [`crate::fields`].

use std::fmt;

use rust_decimal::Decimal;

/// A single cell or parameter.
///
/// ```
/// use minorm_db::value::Value;
///
/// assert_eq!(Value::from(42_i64), Value::Int(42));
/// assert_eq!(Value::from(None::<&str>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// `BooleanField`.
    Bool(bool),
    /// `IntegerField`, `AutoField`, and integer foreign keys.
    Int(i64),
    /// `FloatField`.
    Float(f64),
    /// `DecimalField`.
    Decimal(Decimal),
    /// `CharField` and `TextField`.
    String(String),
    /// `DateField`.
    Date(chrono::NaiveDate),
    /// `DateTimeField`.
    DateTime(chrono::NaiveDateTime),
    /// Operand of an `IN` lookup; expanded to one placeholder per element.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
            Self::Float(x) => x.fmt(f),
            Self::Decimal(d) => d.fmt(f),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => d.fmt(f),
            Self::DateTime(dt) => dt.fmt(f),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident $(via $conv:path)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant($($conv)?(v))
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    u32 => Int via i64::from,
    i64 => Int,
    f32 => Float via f64::from,
    f64 => Float,
    Decimal => Decimal,
    String => String,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => DateTime,
    Vec<Value> => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Value {
    /// Builds a [`Value::List`] from any iterator of convertible items.
    ///
    /// ```
    /// use minorm_db::value::Value;
    ///
    /// assert_eq!(Value::list([1, 2]), Value::List(vec![Value::Int(1), Value::Int(2)]));
    /// ```
    pub fn list<T: Into<Self>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        if let Self::Float(x) = self {
            Some(*x)
        } else {
            None
        }
    }

    pub const fn as_decimal(&self) -> Option<Decimal> {
        if let Self::Decimal(d) = self {
            Some(*d)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        if let Self::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Returns `true` if this value counts as "set" for a primary key.
    ///
    /// `Null`, `0`, and the empty string mean the row has not been saved yet.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Int(i) => *i != 0,
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}
