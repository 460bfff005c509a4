#![forbid(unsafe_code)]

//! Per-field descriptive and behavioral state.
//!
//! # Invariants
//!
//! 1. `is_read_only() == force_read_only || local_read_only || form_read_only`.
//! 2. `is_enabled() == local_enabled && form_enabled`.
//! 3. The effective flags notify only when their value changes, whether the
//!    change came from a local setter or from the owning form.
//! 4. A user-metadata notification is delivered only to subscribers of the
//!    key that changed.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bindery_value::{MediatingValueModel, Observable, Subject, Subscription, Value, ValueKind};
use tracing::trace;

/// A change of one user-metadata entry. `Null` stands for "absent".
#[derive(Debug, Clone, PartialEq)]
pub struct UserMetadataChange {
    pub key: String,
    pub old: Value,
    pub new: Value,
}

struct MetadataInner {
    property: String,
    kind: ValueKind,
    force_read_only: bool,
    local_read_only: Cell<bool>,
    local_enabled: Cell<bool>,
    form_read_only: Cell<bool>,
    form_enabled: Cell<bool>,
    read_only: Observable<bool>,
    enabled: Observable<bool>,
    mediating: MediatingValueModel,
    user: RefCell<BTreeMap<String, Value>>,
    user_changes: Subject<UserMetadataChange>,
}

impl MetadataInner {
    fn update(&self) {
        let read_only =
            self.force_read_only || self.local_read_only.get() || self.form_read_only.get();
        let enabled = self.local_enabled.get() && self.form_enabled.get();
        if self.read_only.set(read_only) {
            trace!(property = %self.property, read_only, "field read-only changed");
        }
        if self.enabled.set(enabled) {
            trace!(property = %self.property, enabled, "field enabled changed");
        }
    }
}

/// Metadata of one form field. Clones share state.
#[derive(Clone)]
pub struct FieldMetadata {
    inner: Rc<MetadataInner>,
}

impl FieldMetadata {
    pub(crate) fn new(
        property: &str,
        kind: ValueKind,
        force_read_only: bool,
        mediating: MediatingValueModel,
        form_read_only: bool,
        form_enabled: bool,
    ) -> Self {
        let read_only = force_read_only || form_read_only;
        Self {
            inner: Rc::new(MetadataInner {
                property: property.to_owned(),
                kind,
                force_read_only,
                local_read_only: Cell::new(false),
                local_enabled: Cell::new(true),
                form_read_only: Cell::new(form_read_only),
                form_enabled: Cell::new(form_enabled),
                read_only: Observable::new(read_only),
                enabled: Observable::new(form_enabled),
                mediating,
                user: RefCell::new(BTreeMap::new()),
                user_changes: Subject::new(),
            }),
        }
    }

    /// Called by the owning form after its aggregate flags changed.
    pub(crate) fn form_state_changed(&self, read_only: bool, enabled: bool) {
        self.inner.form_read_only.set(read_only);
        self.inner.form_enabled.set(enabled);
        self.inner.update();
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.inner.property
    }

    /// Declared type of the property.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.inner.kind
    }

    // -- read-only / enabled ------------------------------------------------

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.get()
    }

    /// Whether the property itself is not writable.
    #[must_use]
    pub fn is_force_read_only(&self) -> bool {
        self.inner.force_read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.local_read_only.set(read_only);
        self.inner.update();
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.local_enabled.set(enabled);
        self.inner.update();
    }

    pub fn subscribe_read_only(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.read_only.subscribe(callback)
    }

    pub fn subscribe_enabled(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.enabled.subscribe(callback)
    }

    // -- dirty --------------------------------------------------------------

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.mediating.is_dirty()
    }

    pub fn subscribe_dirty(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.mediating.subscribe_dirty(callback)
    }

    // -- user metadata ------------------------------------------------------

    /// Store `value` under `key` and notify that key's subscribers.
    pub fn set_user_metadata(&self, key: &str, value: impl Into<Value>) {
        let new = value.into();
        let old = self
            .inner
            .user
            .borrow_mut()
            .insert(key.to_owned(), new.clone())
            .unwrap_or_default();
        if old != new {
            self.inner.user_changes.emit(&UserMetadataChange {
                key: key.to_owned(),
                old,
                new,
            });
        }
    }

    #[must_use]
    pub fn user_metadata(&self, key: &str) -> Option<Value> {
        self.inner.user.borrow().get(key).cloned()
    }

    /// Every user-metadata key currently set.
    #[must_use]
    pub fn user_metadata_keys(&self) -> Vec<String> {
        self.inner.user.borrow().keys().cloned().collect()
    }

    /// Subscribe to changes of the entry `key` only.
    pub fn subscribe_user_metadata(
        &self,
        key: &str,
        callback: impl Fn(&UserMetadataChange) + 'static,
    ) -> Subscription {
        let key = key.to_owned();
        self.inner.user_changes.subscribe(move |change| {
            if change.key == key {
                callback(change);
            }
        })
    }

    /// Remove every entry, notifying each key's subscribers.
    ///
    /// Works from a snapshot of the keys, so a subscriber may write new
    /// entries while the clear is in progress; those survive.
    pub fn clear_user_metadata(&self) {
        let keys = self.user_metadata_keys();
        for key in keys {
            let old = self.inner.user.borrow_mut().remove(&key);
            if let Some(old) = old {
                self.inner.user_changes.emit(&UserMetadataChange {
                    key,
                    old,
                    new: Value::Null,
                });
            }
        }
    }
}

impl fmt::Debug for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMetadata")
            .field("property", &self.inner.property)
            .field("kind", &self.inner.kind)
            .field("read_only", &self.is_read_only())
            .field("enabled", &self.is_enabled())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
