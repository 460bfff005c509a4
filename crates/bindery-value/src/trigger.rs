#![forbid(unsafe_code)]

//! Commit/revert broadcast for buffered value models.
//!
//! # Invariants
//!
//! 1. `commit()` and `revert()` reach every subscriber registered when the
//!    call starts exactly once, in subscription order, before returning.
//! 2. Subscribing or unsubscribing from inside a callback does not affect
//!    the delivery in progress.
//! 3. `subscribe` and `unsubscribe` are idempotent.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Receiver of commit trigger signals.
pub trait CommitTriggerListener {
    fn on_commit(&self);
    fn on_revert(&self);
}

/// Weak handle under which a listener is registered.
pub type ListenerRef = Weak<dyn CommitTriggerListener>;

fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

/// A two-signal switch shared by the buffered models of one edit session.
///
/// Listeners are held weakly; a dropped listener silently leaves the set.
/// Clones share the listener set.
#[derive(Clone, Default)]
pub struct CommitTrigger {
    listeners: Rc<RefCell<Vec<ListenerRef>>>,
}

enum Signal {
    Commit,
    Revert,
}

impl CommitTrigger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` unless it is already subscribed.
    pub fn subscribe(&self, listener: ListenerRef) {
        let mut listeners = self.listeners.borrow_mut();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove `listener` if present.
    pub fn unsubscribe(&self, listener: &ListenerRef) {
        self.listeners
            .borrow_mut()
            .retain(|l| !same_listener(l, listener));
    }

    /// Ask every subscriber to push its buffered value down.
    pub fn commit(&self) {
        self.fire(Signal::Commit);
    }

    /// Ask every subscriber to discard its buffered value.
    pub fn revert(&self) {
        self.fire(Signal::Revert);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Whether both handles share the same listener set.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.listeners, &other.listeners)
    }

    fn fire(&self, signal: Signal) {
        let live: Vec<Rc<dyn CommitTriggerListener>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            match signal {
                Signal::Commit => listener.on_commit(),
                Signal::Revert => listener.on_revert(),
            }
        }
    }
}

impl fmt::Debug for CommitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitTrigger")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl CommitTriggerListener for Recorder {
        fn on_commit(&self) {
            self.log.borrow_mut().push(format!("{}:commit", self.name));
        }
        fn on_revert(&self) {
            self.log.borrow_mut().push(format!("{}:revert", self.name));
        }
    }

    fn recorder(
        name: &'static str,
        log: &Rc<RefCell<Vec<String>>>,
    ) -> Rc<dyn CommitTriggerListener> {
        Rc::new(Recorder {
            name,
            log: Rc::clone(log),
        })
    }

    #[test]
    fn fans_out_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let trigger = CommitTrigger::new();
        trigger.subscribe(Rc::downgrade(&a));
        trigger.subscribe(Rc::downgrade(&b));

        trigger.commit();
        trigger.revert();
        assert_eq!(
            *log.borrow(),
            ["a:commit", "b:commit", "a:revert", "b:revert"]
        );
    }

    #[test]
    fn subscribe_is_idempotent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        let trigger = CommitTrigger::new();
        trigger.subscribe(Rc::downgrade(&a));
        trigger.subscribe(Rc::downgrade(&a));
        assert_eq!(trigger.listener_count(), 1);

        trigger.commit();
        assert_eq!(log.borrow().len(), 1);

        trigger.unsubscribe(&Rc::downgrade(&a));
        trigger.unsubscribe(&Rc::downgrade(&a));
        trigger.commit();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn dropped_listener_leaves_the_set() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let trigger = CommitTrigger::new();
        {
            let a = recorder("a", &log);
            trigger.subscribe(Rc::downgrade(&a));
        }
        trigger.commit();
        assert!(log.borrow().is_empty());
        assert_eq!(trigger.listener_count(), 0);
    }

    struct Unsubscriber {
        trigger: CommitTrigger,
        me: RefCell<Option<ListenerRef>>,
        hits: Cell<u32>,
    }

    impl CommitTriggerListener for Unsubscriber {
        fn on_commit(&self) {
            self.hits.set(self.hits.get() + 1);
            if let Some(me) = self.me.borrow().as_ref() {
                self.trigger.unsubscribe(me);
            }
        }
        fn on_revert(&self) {}
    }

    #[test]
    fn unsubscribing_during_fire_keeps_current_delivery() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let trigger = CommitTrigger::new();
        let first = Rc::new(Unsubscriber {
            trigger: trigger.clone(),
            me: RefCell::new(None),
            hits: Cell::new(0),
        });
        let first_dyn: Rc<dyn CommitTriggerListener> = first.clone();
        first.me.replace(Some(Rc::downgrade(&first_dyn)));
        let second = recorder("b", &log);
        trigger.subscribe(Rc::downgrade(&first_dyn));
        trigger.subscribe(Rc::downgrade(&second));

        trigger.commit();
        assert_eq!(first.hits.get(), 1);
        assert_eq!(*log.borrow(), ["b:commit"]);

        trigger.commit();
        assert_eq!(first.hits.get(), 1);
        assert_eq!(log.borrow().len(), 2);
    }
}
