#![forbid(unsafe_code)]

//! Mediating value model: dirty baseline tracking and event suspension
//! between a per-property model and the value exposed to the UI.
//!
//! # Invariants
//!
//! 1. `is_dirty() == track_dirty && has_changed(original, delivered)` where
//!    `delivered` is the last value handed to subscribers.
//! 2. While delivery is suspended no value or dirty notification fires and
//!    the delivered value is frozen; writes still reach the wrapped model.
//! 3. Resuming delivery re-synchronizes the delivered value with the
//!    wrapped model, emitting at most one value notification and at most
//!    one dirty notification (only if the dirty state net-changed).
//! 4. [`MediatingValueModel::resume_quietly`] performs the re-sync without
//!    emitting; the held notifications live in the returned
//!    [`PendingDelivery`]. A group of models resumed this way is fully
//!    consistent before the first of them notifies.
//! 5. `clear_dirty` accepts the wrapped model's current value as the new
//!    baseline and never writes to the wrapped model.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::convert::ConversionError;
use crate::detect::{ChangeDetector, default_change_detector};
use crate::holder::ValueHolder;
use crate::model::{ValueChange, ValueModel};
use crate::observable::{ListenerId, Subject, Subscription};
use crate::value::Value;

struct MediatingInner {
    wrapped: Rc<dyn ValueModel>,
    detector: Rc<dyn ChangeDetector>,
    delivered: ValueHolder,
    original: RefCell<Value>,
    deliver_events: Cell<bool>,
    track_dirty: bool,
    dirty: Cell<bool>,
    writing: Cell<bool>,
    dirty_changes: Subject<bool>,
    _wrapped_sub: RefCell<Option<Subscription>>,
}

impl MediatingInner {
    fn compute_dirty(&self) -> bool {
        self.track_dirty
            && self
                .detector
                .has_changed(&self.original.borrow(), &self.delivered.get())
    }

    fn update_dirty(&self) {
        if !self.deliver_events.get() {
            return;
        }
        let dirty = self.compute_dirty();
        if self.dirty.replace(dirty) != dirty {
            trace!(dirty, "mediated dirty state changed");
            self.dirty_changes.emit(&dirty);
        }
    }

    fn sync(&self, skip: Option<ListenerId>) {
        let current = self.wrapped.get();
        let result = match skip {
            Some(id) => self.delivered.set_silently(current, id),
            None => self.delivered.set(current),
        };
        // Plain holders never reject a value.
        debug_assert!(result.is_ok());
        self.update_dirty();
    }

    /// Re-sync the delivered value and dirty flag without notifying.
    fn resync_quietly(&self) -> (Option<ValueChange>, Option<bool>) {
        let change = self.delivered.replace_quietly(self.wrapped.get());
        let dirty = self.compute_dirty();
        let dirty_change = (self.dirty.replace(dirty) != dirty).then_some(dirty);
        (change, dirty_change)
    }

    fn on_wrapped_changed(&self) {
        if self.writing.get() || !self.deliver_events.get() {
            return;
        }
        self.sync(None);
    }

    fn write(&self, value: Value, skip: Option<ListenerId>) -> Result<(), ConversionError> {
        self.writing.set(true);
        let result = self.wrapped.set(value);
        self.writing.set(false);
        result?;
        if self.deliver_events.get() {
            self.sync(skip);
        }
        Ok(())
    }
}

/// Sits between a (possibly buffered) property model and the UI.
///
/// Clones share state.
#[derive(Clone)]
pub struct MediatingValueModel {
    inner: Rc<MediatingInner>,
}

impl MediatingValueModel {
    /// Mediate `wrapped`; the current wrapped value becomes the baseline.
    pub fn new(wrapped: Rc<dyn ValueModel>, track_dirty: bool) -> Self {
        Self::with_detector(wrapped, track_dirty, default_change_detector())
    }

    pub fn with_detector(
        wrapped: Rc<dyn ValueModel>,
        track_dirty: bool,
        detector: Rc<dyn ChangeDetector>,
    ) -> Self {
        let initial = wrapped.get();
        let inner = Rc::new(MediatingInner {
            wrapped: Rc::clone(&wrapped),
            detector: Rc::clone(&detector),
            delivered: ValueHolder::with_detector(initial.clone(), detector),
            original: RefCell::new(initial),
            deliver_events: Cell::new(true),
            track_dirty,
            dirty: Cell::new(false),
            writing: Cell::new(false),
            dirty_changes: Subject::new(),
            _wrapped_sub: RefCell::new(None),
        });
        let weak: Weak<MediatingInner> = Rc::downgrade(&inner);
        let sub = wrapped.subscribe(Box::new(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.on_wrapped_changed();
            }
        }));
        inner._wrapped_sub.replace(Some(sub));
        Self { inner }
    }

    /// Whether the delivered value differs from the baseline.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn is_tracking_dirty(&self) -> bool {
        self.inner.track_dirty
    }

    /// The dirty baseline.
    #[must_use]
    pub fn original_value(&self) -> Value {
        self.inner.original.borrow().clone()
    }

    #[must_use]
    pub fn delivers_value_change_events(&self) -> bool {
        self.inner.deliver_events.get()
    }

    /// Suspend (`false`) or resume (`true`) value and dirty notifications.
    pub fn set_deliver_value_change_events(&self, deliver: bool) {
        if deliver {
            self.resume_quietly().flush();
        } else {
            self.inner.deliver_events.set(false);
        }
    }

    /// Resume delivery and re-sync with the wrapped model, holding back the
    /// resulting notifications until [`PendingDelivery::flush`].
    ///
    /// Resuming a model that is not suspended yields an empty delivery.
    pub fn resume_quietly(&self) -> PendingDelivery {
        let (change, dirty) = if self.inner.deliver_events.replace(true) {
            (None, None)
        } else {
            self.inner.resync_quietly()
        };
        PendingDelivery {
            inner: Rc::clone(&self.inner),
            change,
            dirty,
        }
    }

    /// Accept the wrapped model's current value as the new baseline.
    pub fn clear_dirty(&self) {
        self.inner.original.replace(self.inner.wrapped.get());
        self.inner.update_dirty();
    }

    /// Write the baseline back into the wrapped model when they differ.
    ///
    /// # Errors
    ///
    /// Propagates the wrapped model's [`ConversionError`].
    pub fn revert_to_original(&self) -> Result<(), ConversionError> {
        let original = self.original_value();
        if self
            .inner
            .detector
            .has_changed(&original, &self.inner.wrapped.get())
        {
            self.inner.write(original, None)?;
        }
        Ok(())
    }

    /// Subscribe to dirty state changes.
    pub fn subscribe_dirty(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.dirty_changes.subscribe(callback)
    }

    /// The mediated model.
    #[must_use]
    pub fn wrapped(&self) -> Rc<dyn ValueModel> {
        Rc::clone(&self.inner.wrapped)
    }
}

impl ValueModel for MediatingValueModel {
    fn get(&self) -> Value {
        self.inner.delivered.get()
    }

    fn set(&self, value: Value) -> Result<(), ConversionError> {
        self.inner.write(value, None)
    }

    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError> {
        self.inner.write(value, Some(skip))
    }

    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
        self.inner.delivered.subscribe(callback)
    }
}

/// Notifications held back by [`MediatingValueModel::resume_quietly`].
///
/// A notification that went stale in the meantime (a later write already
/// delivered a newer state) is dropped instead of replayed.
#[must_use = "held notifications are lost unless flushed"]
pub struct PendingDelivery {
    inner: Rc<MediatingInner>,
    change: Option<ValueChange>,
    dirty: Option<bool>,
}

impl PendingDelivery {
    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.change.is_none() && self.dirty.is_none()
    }

    /// Emit only the held dirty transition, keeping the value change.
    pub fn flush_dirty(&mut self) {
        if let Some(dirty) = self.dirty.take() {
            if self.inner.dirty.get() == dirty {
                trace!(dirty, "mediated dirty state changed");
                self.inner.dirty_changes.emit(&dirty);
            }
        }
    }

    /// Emit the held value change, then the held dirty transition.
    pub fn flush(mut self) {
        if let Some(change) = self.change.take() {
            let current = self.inner.delivered.get();
            if !self.inner.detector.has_changed(&change.new, &current) {
                self.inner.delivered.notify(&change);
            }
        }
        self.flush_dirty();
    }
}

impl fmt::Debug for PendingDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDelivery")
            .field("change", &self.change)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl fmt::Debug for MediatingValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatingValueModel")
            .field("value", &self.inner.delivered.get())
            .field("original", &*self.inner.original.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("deliver_events", &self.inner.deliver_events.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffered::BufferedValueModel;
    use crate::model::ValueModelExt;
    use crate::trigger::CommitTrigger;

    struct Probe {
        values: Rc<RefCell<Vec<Value>>>,
        dirty: Rc<RefCell<Vec<bool>>>,
        _subs: Vec<Subscription>,
    }

    fn probe(model: &MediatingValueModel) -> Probe {
        let values = Rc::new(RefCell::new(Vec::new()));
        let dirty = Rc::new(RefCell::new(Vec::new()));
        let v = Rc::clone(&values);
        let d = Rc::clone(&dirty);
        let subs = vec![
            model.on_change(move |c| v.borrow_mut().push(c.new.clone())),
            model.subscribe_dirty(move |x| d.borrow_mut().push(*x)),
        ];
        Probe {
            values,
            dirty,
            _subs: subs,
        }
    }

    #[test]
    fn dirty_follows_baseline_comparison() {
        let holder = ValueHolder::new("a");
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        let p = probe(&model);

        model.set("b".into()).unwrap();
        assert!(model.is_dirty());
        model.set("a".into()).unwrap();
        assert!(!model.is_dirty());
        assert_eq!(*p.dirty.borrow(), vec![true, false]);
        assert_eq!(holder.get(), Value::from("a"));
    }

    #[test]
    fn untracked_model_is_never_dirty() {
        let holder = ValueHolder::new(1);
        let model = MediatingValueModel::new(Rc::new(holder), false);
        model.set(Value::Int(2)).unwrap();
        assert!(!model.is_dirty());
    }

    #[test]
    fn clear_dirty_accepts_current_value() {
        let holder = ValueHolder::new(1);
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        model.set(Value::Int(2)).unwrap();
        model.clear_dirty();
        assert!(!model.is_dirty());
        assert_eq!(model.original_value(), Value::Int(2));
        assert_eq!(holder.get(), Value::Int(2));
    }

    #[test]
    fn revert_to_original_writes_baseline() {
        let holder = ValueHolder::new(1);
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        model.set(Value::Int(2)).unwrap();
        model.revert_to_original().unwrap();
        assert_eq!(holder.get(), Value::Int(1));
        assert!(!model.is_dirty());
    }

    #[test]
    fn suspension_coalesces_notifications() {
        let holder = ValueHolder::new(0);
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        let p = probe(&model);

        model.set_deliver_value_change_events(false);
        model.set(Value::Int(1)).unwrap();
        model.set(Value::Int(2)).unwrap();
        model.set(Value::Int(3)).unwrap();
        assert!(p.values.borrow().is_empty());
        assert!(p.dirty.borrow().is_empty());
        assert_eq!(holder.get(), Value::Int(3));
        assert_eq!(model.get(), Value::Int(0));

        model.set_deliver_value_change_events(true);
        assert_eq!(*p.values.borrow(), vec![Value::Int(3)]);
        assert_eq!(*p.dirty.borrow(), vec![true]);
    }

    #[test]
    fn suspension_with_net_zero_change_fires_nothing() {
        let holder = ValueHolder::new(0);
        let model = MediatingValueModel::new(Rc::new(holder), true);
        let p = probe(&model);

        model.set_deliver_value_change_events(false);
        model.set(Value::Int(5)).unwrap();
        model.set(Value::Int(0)).unwrap();
        model.set_deliver_value_change_events(true);
        assert!(p.values.borrow().is_empty());
        assert!(p.dirty.borrow().is_empty());
    }

    #[test]
    fn clear_dirty_while_suspended_rebases_before_resume() {
        let holder = ValueHolder::new("old");
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        model.set("edited".into()).unwrap();
        assert!(model.is_dirty());
        let p = probe(&model);

        model.set_deliver_value_change_events(false);
        holder.set("swapped".into()).unwrap();
        model.clear_dirty();
        model.set_deliver_value_change_events(true);

        assert!(!model.is_dirty());
        assert_eq!(*p.values.borrow(), vec![Value::from("swapped")]);
        assert_eq!(*p.dirty.borrow(), vec![false]);
    }

    #[test]
    fn buffered_commit_then_clear_dirty_is_clean() {
        let holder = ValueHolder::new("Alice");
        let trigger = CommitTrigger::new();
        let buffered = BufferedValueModel::new(Rc::new(holder.clone()), Some(trigger.clone()));
        let model = MediatingValueModel::new(Rc::new(buffered), true);

        model.set("Bob".into()).unwrap();
        assert!(model.is_dirty());
        assert_eq!(holder.get(), Value::from("Alice"));

        trigger.commit();
        model.clear_dirty();
        assert!(!model.is_dirty());
        assert_eq!(holder.get(), Value::from("Bob"));
    }

    #[test]
    fn set_silently_skips_listener() {
        let holder = ValueHolder::new(0);
        let model = MediatingValueModel::new(Rc::new(holder), true);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = model.on_change(move |_| h.set(h.get() + 1));
        model.set_silently(Value::Int(1), sub.id()).unwrap();
        assert_eq!(hits.get(), 0);
        assert_eq!(model.get(), Value::Int(1));
        assert!(model.is_dirty());
    }

    #[test]
    fn quiet_resume_makes_a_group_consistent_before_notifying() {
        let name = ValueHolder::new("Alice");
        let age = ValueHolder::new(30);
        let name_model = MediatingValueModel::new(Rc::new(name.clone()), true);
        let age_model = MediatingValueModel::new(Rc::new(age.clone()), true);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let a = age_model.clone();
        let _sub = name_model.on_change(move |c| s.borrow_mut().push((c.new.clone(), a.get())));

        name_model.set_deliver_value_change_events(false);
        age_model.set_deliver_value_change_events(false);
        name.set("Bob".into()).unwrap();
        age.set(Value::Int(45)).unwrap();
        name_model.clear_dirty();
        age_model.clear_dirty();

        let pending = vec![name_model.resume_quietly(), age_model.resume_quietly()];
        assert!(seen.borrow().is_empty());
        assert_eq!(age_model.get(), Value::Int(45));
        for delivery in pending {
            delivery.flush();
        }
        assert_eq!(*seen.borrow(), vec![(Value::from("Bob"), Value::Int(45))]);
    }

    #[test]
    fn held_dirty_transition_flushes_separately() {
        let holder = ValueHolder::new(0);
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        let p = probe(&model);

        model.set_deliver_value_change_events(false);
        holder.set(Value::Int(1)).unwrap();
        let mut pending = model.resume_quietly();
        assert!(!pending.is_empty());
        pending.flush_dirty();
        assert_eq!(*p.dirty.borrow(), vec![true]);
        assert!(p.values.borrow().is_empty());
        pending.flush();
        assert_eq!(*p.values.borrow(), vec![Value::Int(1)]);
        assert_eq!(*p.dirty.borrow(), vec![true]);
    }

    #[test]
    fn stale_held_change_is_dropped() {
        let holder = ValueHolder::new(0);
        let model = MediatingValueModel::new(Rc::new(holder.clone()), true);
        let p = probe(&model);

        model.set_deliver_value_change_events(false);
        holder.set(Value::Int(1)).unwrap();
        let pending = model.resume_quietly();
        model.set(Value::Int(2)).unwrap();
        pending.flush();
        assert_eq!(*p.values.borrow(), vec![Value::Int(2)]);
    }

    #[test]
    fn resuming_an_active_model_holds_nothing() {
        let model = MediatingValueModel::new(Rc::new(ValueHolder::new(0)), true);
        assert!(model.resume_quietly().is_empty());
    }
}
