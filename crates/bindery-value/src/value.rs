#![forbid(unsafe_code)]

//! Dynamically typed property values.
//!
//! A [`Value`] is what flows through every value model. Scalars are plain
//! immutable data; [`Value::Object`] carries a shared, type-erased domain
//! object whose equality is pointer identity.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Declared type of a property or the target of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueKind {
    /// Accepts any value unchanged.
    Any,
    Bool,
    Int,
    Float,
    Char,
    Text,
    /// A domain object ([`ObjectRef`]).
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Char => "char",
            Self::Text => "text",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Shared handle to a domain object.
///
/// Cloning shares the object. Two handles are equal only when they point at
/// the same allocation.
#[derive(Clone)]
pub struct ObjectRef {
    type_name: Rc<str>,
    data: Rc<dyn Any>,
}

impl ObjectRef {
    /// Wrap `data` under a descriptive type name.
    pub fn new<T: Any>(type_name: impl Into<Rc<str>>, data: Rc<T>) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }

    /// Descriptive type name given at construction.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Recover the concrete object, if it is a `T`.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.data).downcast::<T>().ok()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.data), Rc::as_ptr(&other.data))
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:p}",
            self.type_name,
            Rc::as_ptr(&self.data).cast::<()>()
        )
    }
}

/// A dynamically typed property value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Text(String),
    Object(ObjectRef),
}

impl Value {
    /// Kind of the held value; `None` for [`Value::Null`].
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Char(_) => Some(ValueKind::Char),
            Self::Text(_) => Some(ValueKind::Text),
            Self::Object(_) => Some(ValueKind::Object),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// `Null` or empty text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Char(c) => write!(f, "{c}"),
            Self::Text(s) => f.write_str(s),
            Self::Object(o) => write!(f, "{o:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_equality_is_identity() {
        let a = ObjectRef::new("Point", Rc::new((1, 2)));
        let b = ObjectRef::new("Point", Rc::new((1, 2)));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn downcast_recovers_concrete_type() {
        let obj = ObjectRef::new("Label", Rc::new(String::from("hi")));
        assert_eq!(
            obj.downcast::<String>().as_deref().map(String::as_str),
            Some("hi")
        );
        assert!(obj.downcast::<u32>().is_none());
        assert_eq!(obj.type_name(), "Label");
    }

    #[test]
    fn conversions_and_accessors() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert!(Value::from("  ").is_blank());
        assert_eq!(Value::Bool(true).kind(), Some(ValueKind::Bool));
        assert_eq!(Value::Null.kind(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn value_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ValueKind::Text).unwrap();
        assert_eq!(json, "\"text\"");
    }
}
