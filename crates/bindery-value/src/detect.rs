#![forbid(unsafe_code)]

//! Change detection policy.
//!
//! The default policy compares immutable scalar values ([`Value::Bool`],
//! [`Value::Int`], [`Value::Float`], [`Value::Char`], [`Value::Text`]) by
//! equality and domain objects ([`Value::Object`]) by identity. A different
//! but equal object instance therefore counts as a change. Properties whose
//! objects have meaningful value equality get their own detector, e.g.
//! [`EqualityChangeDetector`].

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::value::Value;

/// Decides whether moving from `old` to `new` is a change.
pub trait ChangeDetector {
    fn has_changed(&self, old: &Value, new: &Value) -> bool;
}

impl<F> ChangeDetector for F
where
    F: Fn(&Value, &Value) -> bool,
{
    fn has_changed(&self, old: &Value, new: &Value) -> bool {
        self(old, new)
    }
}

/// Scalars by equality, objects by identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChangeDetector;

impl ChangeDetector for DefaultChangeDetector {
    fn has_changed(&self, old: &Value, new: &Value) -> bool {
        match (old, new) {
            (Value::Null, Value::Null) => false,
            (Value::Bool(a), Value::Bool(b)) => a != b,
            (Value::Int(a), Value::Int(b)) => a != b,
            (Value::Float(a), Value::Float(b)) => !float_equals(*a, *b),
            (Value::Char(a), Value::Char(b)) => a != b,
            (Value::Text(a), Value::Text(b)) => a != b,
            (Value::Object(a), Value::Object(b)) => !a.ptr_eq(b),
            _ => true,
        }
    }
}

/// Bit-pattern equality with every NaN equal to every other NaN.
fn float_equals(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    a.to_bits() == b.to_bits()
}

/// Compares objects of type `T` with `PartialEq`; everything else falls back
/// to [`DefaultChangeDetector`].
pub struct EqualityChangeDetector<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> EqualityChangeDetector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for EqualityChangeDetector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EqualityChangeDetector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqualityChangeDetector")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Any + PartialEq> ChangeDetector for EqualityChangeDetector<T> {
    fn has_changed(&self, old: &Value, new: &Value) -> bool {
        if let (Value::Object(a), Value::Object(b)) = (old, new) {
            if let (Some(a), Some(b)) = (a.downcast::<T>(), b.downcast::<T>()) {
                return *a != *b;
            }
        }
        DefaultChangeDetector.has_changed(old, new)
    }
}

/// The detector used when nothing else is configured.
#[must_use]
pub fn default_change_detector() -> Rc<dyn ChangeDetector> {
    Rc::new(DefaultChangeDetector)
}
