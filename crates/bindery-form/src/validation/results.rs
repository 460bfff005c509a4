#![forbid(unsafe_code)]

//! Observable aggregate of a form's validation state.
//!
//! # Invariants
//!
//! 1. `messages()` is, in order: validator output, binding errors (in key
//!    order), ad-hoc messages, then each child's `messages()` in attach
//!    order.
//! 2. The observable flags and `message_count` always describe
//!    `messages()`; they only notify when their value actually changes.
//! 3. A child results model reports to every parent it is attached to;
//!    dropping the parent detaches it.
//! 4. At most one binding error exists per [`BindingKey`]; recording a new
//!    one replaces the previous.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bindery_value::{Observable, Subject, Subscription};
use tracing::trace;

use super::message::{Severity, ValidationMessage};

static BINDING_KEY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies the value model a binding error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey(u64);

impl BindingKey {
    /// Allocate a fresh, process-unique key.
    #[must_use]
    pub fn next() -> Self {
        Self(BINDING_KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

struct ChildResults {
    model: ValidationResultsModel,
    _sub: Subscription,
}

struct ResultsInner {
    validator: RefCell<Vec<ValidationMessage>>,
    binding: RefCell<BTreeMap<BindingKey, ValidationMessage>>,
    adhoc: RefCell<Vec<ValidationMessage>>,
    children: RefCell<Vec<ChildResults>>,
    all: RefCell<Vec<ValidationMessage>>,
    has_errors: Observable<bool>,
    has_warnings: Observable<bool>,
    has_info: Observable<bool>,
    message_count: Observable<usize>,
    changes: Subject<()>,
}

impl ResultsInner {
    fn collect(&self) -> Vec<ValidationMessage> {
        let mut all = self.validator.borrow().clone();
        all.extend(self.binding.borrow().values().cloned());
        all.extend(self.adhoc.borrow().iter().cloned());
        let children: Vec<ValidationResultsModel> = self
            .children
            .borrow()
            .iter()
            .map(|c| c.model.clone())
            .collect();
        for child in children {
            all.extend(child.messages());
        }
        all
    }

    fn recompute(&self) {
        let all = self.collect();
        if *self.all.borrow() == all {
            return;
        }
        let has = |severity| all.iter().any(|m| m.severity == severity);
        let (errors, warnings, info, count) = (
            has(Severity::Error),
            has(Severity::Warning),
            has(Severity::Info),
            all.len(),
        );
        self.all.replace(all);
        trace!(errors, warnings, count, "validation results changed");
        self.has_errors.set(errors);
        self.has_warnings.set(warnings);
        self.has_info.set(info);
        self.message_count.set(count);
        self.changes.emit(&());
    }
}

/// The messages of one form plus those of its children.
///
/// Clones share state.
#[derive(Clone)]
pub struct ValidationResultsModel {
    inner: Rc<ResultsInner>,
}

impl Default for ValidationResultsModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResultsModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ResultsInner {
                validator: RefCell::new(Vec::new()),
                binding: RefCell::new(BTreeMap::new()),
                adhoc: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                all: RefCell::new(Vec::new()),
                has_errors: Observable::new(false),
                has_warnings: Observable::new(false),
                has_info: Observable::new(false),
                message_count: Observable::new(0),
                changes: Subject::new(),
            }),
        }
    }

    // -- validator output ---------------------------------------------------

    /// Replace all validator output.
    pub fn set_validator_messages(&self, messages: Vec<ValidationMessage>) {
        self.inner.validator.replace(messages);
        self.inner.recompute();
    }

    /// Replace the validator output concerning `property` only.
    pub fn update_property_messages(&self, property: &str, messages: Vec<ValidationMessage>) {
        {
            let mut validator = self.inner.validator.borrow_mut();
            validator.retain(|m| !m.is_for(property));
            validator.extend(messages);
        }
        self.inner.recompute();
    }

    // -- binding errors -----------------------------------------------------

    /// Record the binding error of `key`, replacing any previous one.
    pub fn set_binding_error(&self, key: BindingKey, message: ValidationMessage) {
        self.inner.binding.borrow_mut().insert(key, message);
        self.inner.recompute();
    }

    pub fn clear_binding_error(&self, key: BindingKey) {
        let removed = self.inner.binding.borrow_mut().remove(&key).is_some();
        if removed {
            self.inner.recompute();
        }
    }

    #[must_use]
    pub fn binding_error(&self, key: BindingKey) -> Option<ValidationMessage> {
        self.inner.binding.borrow().get(&key).cloned()
    }

    /// Drop every binding error of this model (children untouched).
    pub fn clear_binding_errors(&self) {
        self.inner.binding.borrow_mut().clear();
        self.inner.recompute();
    }

    // -- ad-hoc messages ----------------------------------------------------

    /// Add an explicitly raised message. Duplicates are ignored.
    pub fn add_message(&self, message: ValidationMessage) {
        {
            let mut adhoc = self.inner.adhoc.borrow_mut();
            if adhoc.contains(&message) {
                return;
            }
            adhoc.push(message);
        }
        self.inner.recompute();
    }

    /// Remove an explicitly raised message. Returns whether it was present.
    pub fn remove_message(&self, message: &ValidationMessage) -> bool {
        let removed = {
            let mut adhoc = self.inner.adhoc.borrow_mut();
            let before = adhoc.len();
            adhoc.retain(|m| m != message);
            adhoc.len() != before
        };
        if removed {
            self.inner.recompute();
        }
        removed
    }

    /// Clear validator output, binding errors and ad-hoc messages of this
    /// model. Children keep their messages.
    pub fn clear(&self) {
        self.inner.validator.borrow_mut().clear();
        self.inner.binding.borrow_mut().clear();
        self.inner.adhoc.borrow_mut().clear();
        self.inner.recompute();
    }

    // -- hierarchy ----------------------------------------------------------

    /// Merge `child`'s messages into this model. Attaching twice is a no-op.
    pub fn add_child(&self, child: &ValidationResultsModel) {
        if Rc::ptr_eq(&self.inner, &child.inner) || self.has_child(child) {
            return;
        }
        let weak: Weak<ResultsInner> = Rc::downgrade(&self.inner);
        let sub = child.inner.changes.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.recompute();
            }
        });
        self.inner.children.borrow_mut().push(ChildResults {
            model: child.clone(),
            _sub: sub,
        });
        self.inner.recompute();
    }

    pub fn remove_child(&self, child: &ValidationResultsModel) {
        let removed = {
            let mut children = self.inner.children.borrow_mut();
            let before = children.len();
            children.retain(|c| !Rc::ptr_eq(&c.model.inner, &child.inner));
            children.len() != before
        };
        if removed {
            self.inner.recompute();
        }
    }

    fn has_child(&self, child: &ValidationResultsModel) -> bool {
        self.inner
            .children
            .borrow()
            .iter()
            .any(|c| Rc::ptr_eq(&c.model.inner, &child.inner))
    }

    // -- queries ------------------------------------------------------------

    /// Every message, own first, then children's.
    #[must_use]
    pub fn messages(&self) -> Vec<ValidationMessage> {
        self.inner.all.borrow().clone()
    }

    /// Messages attached to `property`.
    #[must_use]
    pub fn messages_for(&self, property: &str) -> Vec<ValidationMessage> {
        self.inner
            .all
            .borrow()
            .iter()
            .filter(|m| m.is_for(property))
            .cloned()
            .collect()
    }

    /// The first message of the highest severity present.
    #[must_use]
    pub fn most_severe(&self) -> Option<ValidationMessage> {
        let all = self.inner.all.borrow();
        let max = all.iter().map(|m| m.severity).max()?;
        all.iter().find(|m| m.severity == max).cloned()
    }

    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.inner.all.borrow().iter().map(|m| m.severity).max()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.has_errors.get()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.inner.has_warnings.get()
    }

    #[must_use]
    pub fn has_info(&self) -> bool {
        self.inner.has_info.get()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.message_count.get()
    }

    /// Observable form of [`has_errors`](Self::has_errors).
    #[must_use]
    pub fn has_errors_observable(&self) -> Observable<bool> {
        self.inner.has_errors.clone()
    }

    pub fn subscribe_has_errors(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.has_errors.subscribe(callback)
    }

    pub fn subscribe_has_warnings(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.has_warnings.subscribe(callback)
    }

    pub fn subscribe_has_info(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.has_info.subscribe(callback)
    }

    pub fn subscribe_message_count(&self, callback: impl Fn(&usize) + 'static) -> Subscription {
        self.inner.message_count.subscribe(callback)
    }

    /// Notified after any change of `messages()`.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.changes.subscribe(move |_| callback())
    }
}

impl fmt::Debug for ValidationResultsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationResultsModel")
            .field("messages", &*self.inner.all.borrow())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}
