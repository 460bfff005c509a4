#![forbid(unsafe_code)]

//! Listener registries and version-tracked observable cells.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. The listener list is snapshotted before dispatch, so a callback that
//!    subscribes or unsubscribes during a notification neither loses nor
//!    duplicates a delivery in the current cycle.
//! 3. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 4. [`Subject::emit_skipping`] suppresses delivery to exactly one listener
//!    and still notifies all the others.
//! 5. [`Observable::set`] with a value equal to the current one is a no-op
//!    (no version bump, no notification).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique listener ids.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered listener across every [`Subject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

type Callback<E> = dyn Fn(&E);

struct Slot<E> {
    id: ListenerId,
    callback: Weak<Callback<E>>,
}

/// An ordered registry of callbacks for events of type `E`.
///
/// Callbacks are stored weakly; the owning [`Subscription`] keeps them alive.
/// Dead entries are pruned lazily on the next dispatch.
pub struct Subject<E> {
    slots: Rc<RefCell<Vec<Slot<E>>>>,
}

impl<E> Clone for Subject<E> {
    fn clone(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }
}

impl<E> Default for Subject<E> {
    fn default() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<E: 'static> Subject<E> {
    /// Create an empty subject.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        self.subscribe_rc(Rc::new(callback))
    }

    /// Register an already boxed callback.
    pub fn subscribe_boxed(&self, callback: Box<dyn Fn(&E)>) -> Subscription {
        self.subscribe_rc(Rc::from(callback))
    }

    fn subscribe_rc(&self, callback: Rc<Callback<E>>) -> Subscription {
        let id = ListenerId::next();
        self.slots.borrow_mut().push(Slot {
            id,
            callback: Rc::downgrade(&callback),
        });
        Subscription {
            id,
            _callback: Box::new(callback),
        }
    }

    /// Deliver `event` to every live listener.
    pub fn emit(&self, event: &E) {
        self.dispatch(event, None);
    }

    /// Deliver `event` to every live listener except `skip`.
    pub fn emit_skipping(&self, event: &E, skip: ListenerId) {
        self.dispatch(event, Some(skip));
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.callback.strong_count() > 0)
            .count()
    }

    fn dispatch(&self, event: &E, skip: Option<ListenerId>) {
        let live: Vec<(ListenerId, Rc<Callback<E>>)> = {
            let mut slots = self.slots.borrow_mut();
            slots.retain(|slot| slot.callback.strong_count() > 0);
            slots
                .iter()
                .filter_map(|slot| slot.callback.upgrade().map(|cb| (slot.id, cb)))
                .collect()
        };
        for (id, callback) in live {
            if Some(id) == skip {
                continue;
            }
            callback(event);
        }
    }
}

impl<E> fmt::Debug for Subject<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("slots", &self.slots.borrow().len())
            .finish()
    }
}

/// RAII guard for a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: ListenerId,
    _callback: Box<dyn Any>,
}

impl Subscription {
    /// Id of the registered listener, usable with `emit_skipping` and
    /// `set_silently`.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Observable<T>
// ---------------------------------------------------------------------------

struct ObservableInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    subject: Subject<T>,
}

/// A shared, version-tracked value with change notification.
///
/// Clones share state. Used for the aggregate boolean properties of forms,
/// fields and validation results.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                subject: Subject::new(),
            }),
        }
    }

    /// Current value (cloned).
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value` and notify subscribers if it differs from the current
    /// value. Returns whether a change happened.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.subject.emit(&value);
        true
    }

    /// Number of effective changes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Subscribe to changes; the callback receives the new value.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.subject.subscribe(callback)
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_delivers_in_registration_order() {
        let subject = Subject::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _a = subject.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let _b = subject.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        subject.emit(&7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let subject = Subject::<u32>::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = subject.subscribe(move |_| h.set(h.get() + 1));
        subject.emit(&1);
        drop(sub);
        subject.emit(&2);
        assert_eq!(hits.get(), 1);
        assert_eq!(subject.listener_count(), 0);
    }

    #[test]
    fn emit_skipping_excludes_exactly_one_listener() {
        let subject = Subject::<()>::new();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        let ac = Rc::clone(&a);
        let bc = Rc::clone(&b);
        let sub_a = subject.subscribe(move |()| ac.set(ac.get() + 1));
        let _sub_b = subject.subscribe(move |()| bc.set(bc.get() + 1));

        subject.emit_skipping(&(), sub_a.id());
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn subscribing_during_dispatch_does_not_deliver_to_newcomer() {
        let subject = Subject::<u32>::new();
        let late_hits = Rc::new(Cell::new(0));
        let holder: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let s = subject.clone();
        let h = Rc::clone(&holder);
        let lh = Rc::clone(&late_hits);
        let _first = subject.subscribe(move |_| {
            let lh = Rc::clone(&lh);
            h.borrow_mut()
                .push(s.subscribe(move |_| lh.set(lh.get() + 1)));
        });

        subject.emit(&1);
        assert_eq!(late_hits.get(), 0);
        subject.emit(&2);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn observable_equal_set_is_noop() {
        let obs = Observable::new(false);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));

        assert!(!obs.set(false));
        assert_eq!(obs.version(), 0);
        assert!(obs.set(true));
        assert_eq!(obs.version(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn observable_reentrant_set_from_callback() {
        let obs = Observable::new(0);
        let o = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v < 3 {
                o.set(v + 1);
            }
        });
        obs.set(1);
        assert_eq!(obs.get(), 3);
    }
}
