#![forbid(unsafe_code)]

//! Buffered value model: a local shadow in front of a wrapped model.
//!
//! # State machine
//!
//! ```text
//!            set(v)                   commit / revert
//!   ┌──────────┐ ──────────────► ┌───────────┐ ─────────────► ┌──────────┐
//!   │ direct   │                 │ buffering │                │ direct   │
//!   └──────────┘ ◄────────────── └───────────┘                └──────────┘
//! ```
//!
//! # Invariants
//!
//! 1. Not buffering implies `get() == wrapped.get()`.
//! 2. Any `set`, even of the value the wrapped model already holds, enters
//!    the buffering state; only commit or revert leaves it.
//! 3. After a successful commit `get()` reflects what the wrapped model
//!    stored, which may differ from the shadow if the wrapped model coerced
//!    it; that difference is notified.
//! 4. While buffering, changes of the wrapped model are not forwarded; the
//!    shadow stays authoritative until commit or revert.
//!
//! # Failure Modes
//!
//! - The wrapped model rejects the shadow on commit: the model stays
//!   buffering, the error is kept in [`BufferedValueModel::commit_error`]
//!   and logged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::convert::ConversionError;
use crate::detect::{ChangeDetector, default_change_detector};
use crate::model::{ValueChange, ValueModel};
use crate::observable::{ListenerId, Subject, Subscription};
use crate::trigger::{CommitTrigger, CommitTriggerListener, ListenerRef};
use crate::value::Value;

struct BufferedInner {
    me: Weak<BufferedInner>,
    wrapped: Rc<dyn ValueModel>,
    detector: Rc<dyn ChangeDetector>,
    shadow: RefCell<Value>,
    buffering: Cell<bool>,
    trigger: RefCell<Option<CommitTrigger>>,
    commit_error: RefCell<Option<ConversionError>>,
    changes: Subject<ValueChange>,
    buffering_changes: Subject<bool>,
    wrapped_sub: RefCell<Option<Subscription>>,
}

impl BufferedInner {
    fn listener_ref(&self) -> ListenerRef {
        self.me.clone()
    }

    fn get(&self) -> Value {
        if self.buffering.get() {
            self.shadow.borrow().clone()
        } else {
            self.wrapped.get()
        }
    }

    fn notify(&self, old: Value, new: Value, skip: Option<ListenerId>) {
        if !self.detector.has_changed(&old, &new) {
            return;
        }
        let change = ValueChange { old, new };
        match skip {
            Some(id) => self.changes.emit_skipping(&change, id),
            None => self.changes.emit(&change),
        }
    }

    fn set_buffering(&self, buffering: bool) {
        if self.buffering.replace(buffering) != buffering {
            self.buffering_changes.emit(&buffering);
        }
    }

    fn write(&self, value: Value, skip: Option<ListenerId>) {
        let old = self.get();
        self.shadow.replace(value.clone());
        self.set_buffering(true);
        self.notify(old, value, skip);
    }

    fn on_wrapped_changed(&self, change: &ValueChange) {
        if self.buffering.get() {
            return;
        }
        self.notify(change.old.clone(), change.new.clone(), None);
    }

    fn commit(&self) {
        if !self.buffering.get() {
            return;
        }
        let shadow = self.shadow.borrow().clone();
        let skip = self.wrapped_sub.borrow().as_ref().map(Subscription::id);
        let result = match skip {
            Some(id) => self.wrapped.set_silently(shadow.clone(), id),
            None => self.wrapped.set(shadow.clone()),
        };
        match result {
            Ok(()) => {
                self.commit_error.replace(None);
                self.set_buffering(false);
                let stored = self.wrapped.get();
                trace!(value = %stored, "buffered value committed");
                self.notify(shadow, stored, None);
            }
            Err(err) => {
                warn!(%err, "wrapped model rejected buffered value; still buffering");
                self.commit_error.replace(Some(err));
            }
        }
    }

    fn revert(&self) {
        if !self.buffering.get() {
            return;
        }
        let shadow = self.shadow.replace(Value::Null);
        self.commit_error.replace(None);
        self.set_buffering(false);
        self.notify(shadow, self.wrapped.get(), None);
    }
}

impl CommitTriggerListener for BufferedInner {
    fn on_commit(&self) {
        self.commit();
    }

    fn on_revert(&self) {
        self.revert();
    }
}

/// Wraps a value model with a commit/revert buffer.
///
/// Clones share the same buffer.
#[derive(Clone)]
pub struct BufferedValueModel {
    inner: Rc<BufferedInner>,
}

impl BufferedValueModel {
    /// Buffer `wrapped`, optionally subscribed to `trigger`.
    pub fn new(wrapped: Rc<dyn ValueModel>, trigger: Option<CommitTrigger>) -> Self {
        Self::with_detector(wrapped, trigger, default_change_detector())
    }

    pub fn with_detector(
        wrapped: Rc<dyn ValueModel>,
        trigger: Option<CommitTrigger>,
        detector: Rc<dyn ChangeDetector>,
    ) -> Self {
        let inner = Rc::new_cyclic(|me: &Weak<BufferedInner>| {
            let weak = me.clone();
            let sub = wrapped.subscribe(Box::new(move |change| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_wrapped_changed(change);
                }
            }));
            BufferedInner {
                me: me.clone(),
                wrapped: Rc::clone(&wrapped),
                detector,
                shadow: RefCell::new(Value::Null),
                buffering: Cell::new(false),
                trigger: RefCell::new(None),
                commit_error: RefCell::new(None),
                changes: Subject::new(),
                buffering_changes: Subject::new(),
                wrapped_sub: RefCell::new(Some(sub)),
            }
        });
        let model = Self { inner };
        model.set_commit_trigger(trigger);
        model
    }

    /// Whether a local value is pending.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.inner.buffering.get()
    }

    /// Push the shadow into the wrapped model.
    pub fn commit(&self) {
        self.inner.commit();
    }

    /// Discard the shadow and expose the wrapped value again.
    pub fn revert(&self) {
        self.inner.revert();
    }

    /// The error of the last failed commit, cleared by a successful commit
    /// or a revert.
    #[must_use]
    pub fn commit_error(&self) -> Option<ConversionError> {
        self.inner.commit_error.borrow().clone()
    }

    /// The model being buffered.
    #[must_use]
    pub fn wrapped(&self) -> Rc<dyn ValueModel> {
        Rc::clone(&self.inner.wrapped)
    }

    #[must_use]
    pub fn commit_trigger(&self) -> Option<CommitTrigger> {
        self.inner.trigger.borrow().clone()
    }

    /// Switch to `trigger`, unsubscribing from the previous one first.
    pub fn set_commit_trigger(&self, trigger: Option<CommitTrigger>) {
        let me = self.inner.listener_ref();
        let old = self.inner.trigger.replace(trigger.clone());
        match (&old, &trigger) {
            (Some(a), Some(b)) if a.ptr_eq(b) => return,
            (None, None) => return,
            _ => {}
        }
        if let Some(old) = old {
            old.unsubscribe(&me);
        }
        if let Some(new) = trigger {
            new.subscribe(me);
        }
    }

    /// Subscribe to changes of the buffering flag.
    pub fn subscribe_buffering(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.buffering_changes.subscribe(callback)
    }
}

impl ValueModel for BufferedValueModel {
    fn get(&self) -> Value {
        self.inner.get()
    }

    fn set(&self, value: Value) -> Result<(), ConversionError> {
        self.inner.write(value, None);
        Ok(())
    }

    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError> {
        self.inner.write(value, Some(skip));
        Ok(())
    }

    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
        self.inner.changes.subscribe_boxed(callback)
    }
}

impl Drop for BufferedInner {
    fn drop(&mut self) {
        if let Some(trigger) = self.trigger.get_mut().take() {
            trigger.unsubscribe(&self.listener_ref());
        }
    }
}

impl fmt::Debug for BufferedValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedValueModel")
            .field("buffering", &self.inner.buffering.get())
            .field("value", &self.inner.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::ValueHolder;
    use crate::model::ValueModelExt;
    use crate::value::ValueKind;

    fn buffered(initial: impl Into<Value>) -> (ValueHolder, BufferedValueModel, CommitTrigger) {
        let holder = ValueHolder::new(initial);
        let trigger = CommitTrigger::new();
        let model = BufferedValueModel::new(Rc::new(holder.clone()), Some(trigger.clone()));
        (holder, model, trigger)
    }

    fn record(model: &BufferedValueModel) -> (Rc<RefCell<Vec<ValueChange>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let sub = model.on_change(move |c| s.borrow_mut().push(c.clone()));
        (seen, sub)
    }

    #[test]
    fn set_buffers_without_touching_wrapped() {
        let (holder, model, _trigger) = buffered("Alice");
        model.set("Bob".into()).unwrap();
        assert!(model.is_buffering());
        assert_eq!(model.get(), Value::from("Bob"));
        assert_eq!(holder.get(), Value::from("Alice"));
    }

    #[test]
    fn setting_the_wrapped_value_still_buffers() {
        let (_holder, model, _trigger) = buffered("Alice");
        model.set("Alice".into()).unwrap();
        assert!(model.is_buffering());
    }

    #[test]
    fn commit_pushes_and_clears_buffering() {
        let (holder, model, trigger) = buffered("Alice");
        model.set("Bob".into()).unwrap();
        trigger.commit();
        assert!(!model.is_buffering());
        assert_eq!(holder.get(), Value::from("Bob"));
        assert_eq!(model.get(), Value::from("Bob"));
    }

    #[test]
    fn second_commit_is_silent() {
        let (_holder, model, trigger) = buffered(1);
        model.set(Value::Int(2)).unwrap();
        let (seen, _sub) = record(&model);
        trigger.commit();
        trigger.commit();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn revert_restores_wrapped_value_and_notifies() {
        let (holder, model, trigger) = buffered("Alice");
        model.set("Bob".into()).unwrap();
        let (seen, _sub) = record(&model);
        trigger.revert();
        assert_eq!(model.get(), Value::from("Alice"));
        assert_eq!(holder.get(), Value::from("Alice"));
        assert_eq!(
            *seen.borrow(),
            vec![ValueChange {
                old: "Bob".into(),
                new: "Alice".into()
            }]
        );
    }

    #[test]
    fn wrapped_changes_pass_through_when_not_buffering() {
        let (holder, model, _trigger) = buffered(1);
        let (seen, _sub) = record(&model);
        holder.set(Value::Int(2)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(model.get(), Value::Int(2));
    }

    #[test]
    fn wrapped_changes_are_shadowed_while_buffering() {
        let (holder, model, _trigger) = buffered(1);
        model.set(Value::Int(5)).unwrap();
        let (seen, _sub) = record(&model);
        holder.set(Value::Int(2)).unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(model.get(), Value::Int(5));
    }

    struct Coercing {
        holder: ValueHolder,
    }

    impl ValueModel for Coercing {
        fn get(&self) -> Value {
            self.holder.get()
        }
        fn set(&self, value: Value) -> Result<(), ConversionError> {
            match value {
                Value::Int(i) => self.holder.set(Value::Float(i as f64)),
                Value::Text(_) => Err(ConversionError::new(&value, ValueKind::Float, "text")),
                other => self.holder.set(other),
            }
        }
        fn set_silently(&self, value: Value, _skip: ListenerId) -> Result<(), ConversionError> {
            self.set(value)
        }
        fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
            self.holder.subscribe(callback)
        }
    }

    #[test]
    fn commit_reflects_coercion_of_wrapped_model() {
        let wrapped = Rc::new(Coercing {
            holder: ValueHolder::new(Value::Float(0.0)),
        });
        let model = BufferedValueModel::new(wrapped, None);
        model.set(Value::Int(3)).unwrap();
        let (seen, _sub) = record(&model);
        model.commit();
        assert_eq!(model.get(), Value::Float(3.0));
        assert_eq!(
            *seen.borrow(),
            vec![ValueChange {
                old: Value::Int(3),
                new: Value::Float(3.0)
            }]
        );
    }

    #[test]
    fn rejected_commit_keeps_buffering() {
        let wrapped = Rc::new(Coercing {
            holder: ValueHolder::new(Value::Float(0.0)),
        });
        let model = BufferedValueModel::new(wrapped, None);
        model.set("x".into()).unwrap();
        model.commit();
        assert!(model.is_buffering());
        assert!(model.commit_error().is_some());
        model.revert();
        assert!(model.commit_error().is_none());
        assert_eq!(model.get(), Value::Float(0.0));
    }

    #[test]
    fn switching_triggers_unsubscribes_old_one() {
        let (holder, model, old) = buffered(1);
        let new = CommitTrigger::new();
        model.set_commit_trigger(Some(new.clone()));
        assert_eq!(old.listener_count(), 0);
        assert_eq!(new.listener_count(), 1);

        model.set(Value::Int(2)).unwrap();
        old.commit();
        assert_eq!(holder.get(), Value::Int(1));
        new.commit();
        assert_eq!(holder.get(), Value::Int(2));
    }

    #[test]
    fn buffering_flag_is_observable() {
        let (_holder, model, trigger) = buffered(1);
        let flags = Rc::new(RefCell::new(Vec::new()));
        let f = Rc::clone(&flags);
        let _sub = model.subscribe_buffering(move |b| f.borrow_mut().push(*b));
        model.set(Value::Int(2)).unwrap();
        model.set(Value::Int(3)).unwrap();
        trigger.commit();
        assert_eq!(*flags.borrow(), vec![true, false]);
    }
}
