#![forbid(unsafe_code)]

//! The atomic observable value container.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::convert::ConversionError;
use crate::detect::{ChangeDetector, default_change_detector};
use crate::model::{ValueChange, ValueModel};
use crate::observable::{ListenerId, Subject, Subscription};
use crate::value::Value;

struct HolderInner {
    value: RefCell<Value>,
    detector: Rc<dyn ChangeDetector>,
    changes: Subject<ValueChange>,
}

/// Holds a single value and notifies subscribers when it changes.
///
/// Every write is stored; a notification fires only when the change
/// detector reports a change. Clones share the same slot.
#[derive(Clone)]
pub struct ValueHolder {
    inner: Rc<HolderInner>,
}

impl ValueHolder {
    /// Create a holder using the default change detector.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_detector(value, default_change_detector())
    }

    pub fn with_detector(value: impl Into<Value>, detector: Rc<dyn ChangeDetector>) -> Self {
        Self {
            inner: Rc::new(HolderInner {
                value: RefCell::new(value.into()),
                detector,
                changes: Subject::new(),
            }),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.changes.listener_count()
    }

    /// Store `value` without notifying. Returns the change subscribers have
    /// not yet seen, if the detector reports one.
    pub(crate) fn replace_quietly(&self, value: Value) -> Option<ValueChange> {
        let old = self.inner.value.replace(value.clone());
        self.inner
            .detector
            .has_changed(&old, &value)
            .then_some(ValueChange { old, new: value })
    }

    /// Deliver a change previously held back by `replace_quietly`.
    pub(crate) fn notify(&self, change: &ValueChange) {
        self.inner.changes.emit(change);
    }

    fn store(&self, value: Value, skip: Option<ListenerId>) {
        let Some(change) = self.replace_quietly(value) else {
            return;
        };
        match skip {
            Some(id) => self.inner.changes.emit_skipping(&change, id),
            None => self.inner.changes.emit(&change),
        }
    }
}

impl ValueModel for ValueHolder {
    fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    fn set(&self, value: Value) -> Result<(), ConversionError> {
        self.store(value, None);
        Ok(())
    }

    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError> {
        self.store(value, Some(skip));
        Ok(())
    }

    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
        self.inner.changes.subscribe_boxed(callback)
    }
}

impl fmt::Debug for ValueHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHolder")
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueModelExt;
    use std::cell::Cell;

    #[test]
    fn set_notifies_once_per_change() {
        let holder = ValueHolder::new("a");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = holder.on_change(move |c| s.borrow_mut().push(c.clone()));

        holder.set("b".into()).unwrap();
        holder.set("b".into()).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![ValueChange {
                old: "a".into(),
                new: "b".into()
            }]
        );
    }

    #[test]
    fn set_silently_skips_only_the_excluded_listener() {
        let holder = ValueHolder::new(0);
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        let ac = Rc::clone(&a);
        let bc = Rc::clone(&b);
        let sub_a = holder.on_change(move |_| ac.set(ac.get() + 1));
        let _sub_b = holder.on_change(move |_| bc.set(bc.get() + 1));

        holder.set_silently(Value::Int(1), sub_a.id()).unwrap();
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
        assert_eq!(holder.get(), Value::Int(1));
    }

    #[test]
    fn custom_detector_can_suppress_notifications() {
        let never = |_: &Value, _: &Value| false;
        let holder = ValueHolder::with_detector(0, Rc::new(never));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = holder.on_change(move |_| h.set(h.get() + 1));

        holder.set(Value::Int(9)).unwrap();
        assert_eq!(holder.get(), Value::Int(9));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn accepts_null() {
        let holder = ValueHolder::new(1);
        holder.set(Value::Null).unwrap();
        assert!(holder.get().is_null());
    }
}
