#![forbid(unsafe_code)]

//! Type conversion between value kinds and the type-converting value model.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unparseable text | `"abc"` written to an int view | `set` returns [`ConversionError`] |
//! | Lossy number | `2.5` to int | [`ConversionError`] |
//! | Unreadable source | object read through a text view | `get` yields `Null`, logged |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::detect::{ChangeDetector, default_change_detector};
use crate::model::{ValueChange, ValueModel};
use crate::observable::{ListenerId, Subject, Subscription};
use crate::value::{Value, ValueKind};

/// A value could not be converted to (or stored as) a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    /// Display form of the offending value.
    pub value: String,
    /// The kind that was asked for.
    pub target: ValueKind,
    pub reason: String,
}

impl ConversionError {
    pub fn new(value: &Value, target: ValueKind, reason: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot convert '{}' to {}: {}",
            self.value, self.target, self.reason
        )
    }
}

impl std::error::Error for ConversionError {}

/// Converts values between kinds.
pub trait ConversionService {
    fn convert(&self, value: &Value, target: ValueKind) -> Result<Value, ConversionError>;
}

/// Text, numbers, booleans and characters.
///
/// `Null` converts to `Null` for every target; blank text converts to `Null`
/// for every non-text target.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConversionService;

impl ConversionService for DefaultConversionService {
    fn convert(&self, value: &Value, target: ValueKind) -> Result<Value, ConversionError> {
        if target == ValueKind::Any || value.kind() == Some(target) || value.is_null() {
            return Ok(value.clone());
        }
        match (value, target) {
            (Value::Text(s), _) if s.trim().is_empty() => Ok(Value::Null),
            (Value::Text(s), ValueKind::Int) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| ConversionError::new(value, target, e.to_string())),
            (Value::Text(s), ValueKind::Float) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConversionError::new(value, target, e.to_string())),
            (Value::Text(s), ValueKind::Bool) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(ConversionError::new(value, target, "not a boolean")),
            },
            (Value::Text(s), ValueKind::Char) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(ConversionError::new(
                        value,
                        target,
                        "expected exactly one character",
                    )),
                }
            }
            (Value::Int(i), ValueKind::Float) => Ok(Value::Float(*i as f64)),
            (Value::Float(x), ValueKind::Int) => float_to_int(*x)
                .map(Value::Int)
                .ok_or_else(|| ConversionError::new(value, target, "not integral")),
            (
                Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Char(_),
                ValueKind::Text,
            ) => Ok(Value::Text(value.to_string())),
            _ => Err(ConversionError::new(value, target, "no converter")),
        }
    }
}

fn float_to_int(x: f64) -> Option<i64> {
    if x.fract() != 0.0 || !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return None;
    }
    Some(x as i64)
}

// ---------------------------------------------------------------------------
// ConvertingValueModel
// ---------------------------------------------------------------------------

struct ConvertingInner {
    wrapped: Rc<dyn ValueModel>,
    target: ValueKind,
    source: ValueKind,
    service: Rc<dyn ConversionService>,
    detector: Rc<dyn ChangeDetector>,
    last: RefCell<Value>,
    writing: Cell<bool>,
    changes: Subject<ValueChange>,
    _wrapped_sub: RefCell<Option<Subscription>>,
}

impl ConvertingInner {
    fn read(&self) -> Value {
        let raw = self.wrapped.get();
        match self.service.convert(&raw, self.target) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "value not readable through converting view");
                Value::Null
            }
        }
    }

    fn refresh(&self, skip: Option<ListenerId>) {
        let new = self.read();
        let old = self.last.replace(new.clone());
        if self.detector.has_changed(&old, &new) {
            let change = ValueChange { old, new };
            match skip {
                Some(id) => self.changes.emit_skipping(&change, id),
                None => self.changes.emit(&change),
            }
        }
    }

    fn write(&self, value: Value, skip: Option<ListenerId>) -> Result<(), ConversionError> {
        let converted = self.service.convert(&value, self.source)?;
        self.writing.set(true);
        let result = self.wrapped.set(converted);
        self.writing.set(false);
        result?;
        self.refresh(skip);
        Ok(())
    }
}

/// Presents a value model as another [`ValueKind`].
///
/// Reads convert from the wrapped kind to the target kind; writes convert
/// back and surface failures as [`ConversionError`].
#[derive(Clone)]
pub struct ConvertingValueModel {
    inner: Rc<ConvertingInner>,
}

impl ConvertingValueModel {
    /// `source` is the kind the wrapped model stores, `target` the kind this
    /// view exposes.
    pub fn new(
        wrapped: Rc<dyn ValueModel>,
        source: ValueKind,
        target: ValueKind,
        service: Rc<dyn ConversionService>,
    ) -> Self {
        let inner = Rc::new(ConvertingInner {
            wrapped: Rc::clone(&wrapped),
            target,
            source,
            service,
            detector: default_change_detector(),
            last: RefCell::new(Value::Null),
            writing: Cell::new(false),
            changes: Subject::new(),
            _wrapped_sub: RefCell::new(None),
        });
        inner.last.replace(inner.read());

        let weak: Weak<ConvertingInner> = Rc::downgrade(&inner);
        let sub = wrapped.subscribe(Box::new(move |_| {
            if let Some(inner) = weak.upgrade() {
                if !inner.writing.get() {
                    inner.refresh(None);
                }
            }
        }));
        inner._wrapped_sub.replace(Some(sub));
        Self { inner }
    }

    #[must_use]
    pub fn target_kind(&self) -> ValueKind {
        self.inner.target
    }
}

impl ValueModel for ConvertingValueModel {
    fn get(&self) -> Value {
        self.inner.read()
    }

    fn set(&self, value: Value) -> Result<(), ConversionError> {
        self.inner.write(value, None)
    }

    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError> {
        self.inner.write(value, Some(skip))
    }

    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
        self.inner.changes.subscribe_boxed(callback)
    }
}

impl fmt::Debug for ConvertingValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertingValueModel")
            .field("source", &self.inner.source)
            .field("target", &self.inner.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::ValueHolder;
    use crate::model::ValueModelExt;

    fn svc() -> DefaultConversionService {
        DefaultConversionService
    }

    #[test]
    fn text_to_numbers() {
        assert_eq!(
            svc().convert(&"42".into(), ValueKind::Int),
            Ok(Value::Int(42))
        );
        assert_eq!(
            svc().convert(&" 2.5 ".into(), ValueKind::Float),
            Ok(Value::Float(2.5))
        );
        assert_eq!(svc().convert(&"".into(), ValueKind::Int), Ok(Value::Null));
        assert!(svc().convert(&"abc".into(), ValueKind::Int).is_err());
    }

    #[test]
    fn numbers_to_text_and_back() {
        assert_eq!(
            svc().convert(&Value::Int(7), ValueKind::Text),
            Ok("7".into())
        );
        assert_eq!(
            svc().convert(&Value::Float(3.0), ValueKind::Int),
            Ok(Value::Int(3))
        );
        assert!(svc().convert(&Value::Float(3.5), ValueKind::Int).is_err());
        assert_eq!(
            svc().convert(&Value::Int(3), ValueKind::Float),
            Ok(Value::Float(3.0))
        );
    }

    #[test]
    fn bool_and_char() {
        assert_eq!(
            svc().convert(&"Yes".into(), ValueKind::Bool),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            svc().convert(&"x".into(), ValueKind::Char),
            Ok(Value::Char('x'))
        );
        assert!(svc().convert(&"xy".into(), ValueKind::Char).is_err());
    }

    #[test]
    fn error_message_names_value_and_target() {
        let err = svc().convert(&"abc".into(), ValueKind::Int).unwrap_err();
        assert!(err.to_string().starts_with("cannot convert 'abc' to int"));
    }

    #[test]
    fn converting_view_reads_and_writes() {
        let holder = ValueHolder::new(Value::Int(5));
        let view = ConvertingValueModel::new(
            Rc::new(holder.clone()),
            ValueKind::Int,
            ValueKind::Text,
            Rc::new(DefaultConversionService),
        );
        assert_eq!(view.get(), Value::from("5"));

        view.set("12".into()).unwrap();
        assert_eq!(holder.get(), Value::Int(12));

        assert!(view.set("twelve".into()).is_err());
        assert_eq!(holder.get(), Value::Int(12));
    }

    #[test]
    fn converting_view_forwards_converted_changes() {
        let holder = ValueHolder::new(Value::Int(1));
        let view = ConvertingValueModel::new(
            Rc::new(holder.clone()),
            ValueKind::Int,
            ValueKind::Text,
            Rc::new(DefaultConversionService),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = view.on_change(move |c| s.borrow_mut().push(c.new.clone()));

        holder.set(Value::Int(2)).unwrap();
        view.set("3".into()).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("2"), Value::from("3")]);
    }
}
