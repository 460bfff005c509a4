#![forbid(unsafe_code)]

//! Hierarchical form model over a swappable domain object.
//!
//! A [`FormModel`] owns one field per registered property. Each field is a
//! stack of value models:
//!
//! ```text
//! strategy property model ─► BufferedValueModel ─► MediatingValueModel ─► ValidatingValueModel
//!     (domain object)          (shared trigger)       (dirty baseline)        (binding errors)
//! ```
//!
//! Forms nest: a parent owns its children, a child only keeps a weak link
//! to its parent. Aggregate flags are recomputed explicitly and notify only
//! when their value changes:
//!
//! | Flag          | Computed as                                                     |
//! |---------------|-----------------------------------------------------------------|
//! | `enabled`     | `local_enabled && parent.enabled`                               |
//! | `read_only`   | `local_read_only \|\| !authorized \|\| parent.read_only`          |
//! | `dirty`       | some field or child is dirty                                    |
//! | `committable` | every child is committable and no validation error is present  |
//!
//! # Invariants
//!
//! 1. A form has at most one parent and is never its own ancestor.
//! 2. `commit()` and `revert()` process children before the form itself,
//!    and flush buffered values before clearing dirty baselines.
//! 3. Replacing the form object emits no field notification until every
//!    field has been re-pointed, reverted, re-baselined and revalidated;
//!    afterwards each field notifies at most once, and every listener
//!    observes the new object's values in all fields.
//! 4. Inherited flags propagate node first, then its fields, then its
//!    children.
//!
//! # Failure Modes
//!
//! - `commit()` on a non-committable form returns
//!   [`FormError::NotCommittable`] and changes nothing.
//! - A pre-commit hook that leaves the form non-committable yields
//!   [`FormError::CommittabilityChanged`]; nothing is flushed.
//! - A buffered value the domain object rejects on commit stays buffered and
//!   dirty; the failure becomes that field's binding error.
//! - `revert()` never fails; a baseline the domain object rejects is logged.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bindery_value::{
    BufferedValueModel, ChangeDetector, CommitTrigger, ConvertingValueModel, MediatingValueModel,
    Observable, PendingDelivery, Subscription, Value, ValueKind, ValueModel, ValueModelExt,
};
use tracing::{debug, trace, warn};

use crate::access::PropertyAccessStrategy;
use crate::env::FormEnvironment;
use crate::error::FormError;
use crate::metadata::FieldMetadata;
use crate::record::{Record, RecordAccessStrategy, RecordSchema};
use crate::validation::{
    FormView, ValidatingValueModel, ValidationMessage, ValidationResultsModel, Validator,
};

/// Global counter for unique form ids.
static FORM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a form model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(u64);

impl FormId {
    fn next() -> Self {
        Self(FORM_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

/// Callbacks around [`FormModel::commit`].
pub trait CommitHook {
    /// Runs before anything is flushed. May still edit the form.
    fn pre_commit(&self, form: &FormModel) {
        let _ = form;
    }

    /// Runs after every field has been flushed and re-baselined.
    fn post_commit(&self, form: &FormModel) {
        let _ = form;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DirtySource {
    Field(String),
    Child(FormId),
}

struct Field {
    property: String,
    buffered: Option<BufferedValueModel>,
    mediating: MediatingValueModel,
    model: Rc<ValidatingValueModel>,
    metadata: FieldMetadata,
    _dirty_sub: Subscription,
}

struct ChildLink {
    form: FormModel,
    _subs: [Subscription; 2],
}

struct FormInner {
    id: FormId,
    name: String,
    env: FormEnvironment,
    buffered: bool,
    strategy: Rc<dyn PropertyAccessStrategy>,
    holder: Rc<dyn ValueModel>,
    trigger: CommitTrigger,
    detectors: HashMap<String, Rc<dyn ChangeDetector>>,
    fields: RefCell<Vec<Rc<Field>>>,
    converted: RefCell<HashMap<(String, ValueKind), Rc<dyn ValueModel>>>,
    children: RefCell<Vec<ChildLink>>,
    parent: RefCell<Weak<FormInner>>,
    local_enabled: Cell<bool>,
    local_read_only: Cell<bool>,
    authorized: Cell<bool>,
    enabled: Observable<bool>,
    read_only: Observable<bool>,
    dirty: Observable<bool>,
    committable: Observable<bool>,
    validating: Observable<bool>,
    dirty_set: RefCell<BTreeSet<DirtySource>>,
    hooks: RefCell<Vec<Rc<dyn CommitHook>>>,
    validator: RefCell<Option<Rc<dyn Validator>>>,
    results: ValidationResultsModel,
    reloading: Cell<bool>,
    subs: RefCell<Vec<Subscription>>,
}

/// A form over one domain object. Clones are handles to the same form.
#[derive(Clone)]
pub struct FormModel {
    inner: Rc<FormInner>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl FormModel {
    /// Start building a form over `strategy`'s domain object.
    pub fn builder(strategy: Rc<dyn PropertyAccessStrategy>) -> FormModelBuilder {
        FormModelBuilder::new(strategy)
    }

    /// A form with default environment and no fields yet.
    pub fn new(strategy: Rc<dyn PropertyAccessStrategy>) -> Self {
        Self::create(
            strategy,
            FormEnvironment::default(),
            None,
            None,
            HashMap::new(),
            None,
        )
    }

    /// A buffered form with a field for every property of `record`.
    ///
    /// # Errors
    ///
    /// Propagates [`FormError::UnknownProperty`] from field registration.
    pub fn for_record(record: &Record) -> Result<Self, FormError> {
        Self::builder(Rc::new(RecordAccessStrategy::new(record)))
            .all_fields()
            .build()
    }

    fn create(
        strategy: Rc<dyn PropertyAccessStrategy>,
        env: FormEnvironment,
        name: Option<String>,
        buffered: Option<bool>,
        detectors: HashMap<String, Rc<dyn ChangeDetector>>,
        validator: Option<Rc<dyn Validator>>,
    ) -> Self {
        let id = FormId::next();
        let holder = strategy.domain_object_holder();
        let inner = Rc::new(FormInner {
            id,
            name: name.unwrap_or_else(|| id.to_string()),
            buffered: buffered.unwrap_or(env.buffered()),
            env,
            strategy,
            holder,
            trigger: CommitTrigger::new(),
            detectors,
            fields: RefCell::new(Vec::new()),
            converted: RefCell::new(HashMap::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            local_enabled: Cell::new(true),
            local_read_only: Cell::new(false),
            authorized: Cell::new(true),
            enabled: Observable::new(true),
            read_only: Observable::new(false),
            dirty: Observable::new(false),
            committable: Observable::new(true),
            validating: Observable::new(true),
            dirty_set: RefCell::new(BTreeSet::new()),
            hooks: RefCell::new(Vec::new()),
            validator: RefCell::new(validator),
            results: ValidationResultsModel::new(),
            reloading: Cell::new(false),
            subs: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let holder_sub = inner.holder.on_change(move |_| {
            if let Some(form) = Self::upgrade(&weak) {
                if !form.inner.reloading.get() {
                    debug!(form = %form.inner.name, "domain object replaced externally");
                    form.reload(|| {}, None);
                }
            }
        });
        let weak = Rc::downgrade(&inner);
        let results_sub = inner.results.subscribe_has_errors(move |_| {
            if let Some(form) = Self::upgrade(&weak) {
                form.update_committable();
            }
        });
        inner.subs.borrow_mut().extend([holder_sub, results_sub]);
        Self { inner }
    }

    fn upgrade(weak: &Weak<FormInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn weak(&self) -> Weak<FormInner> {
        Rc::downgrade(&self.inner)
    }

    #[must_use]
    pub fn id(&self) -> FormId {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn environment(&self) -> &FormEnvironment {
        &self.inner.env
    }

    /// Whether edits are buffered until commit.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.inner.buffered
    }

    /// Whether both handles refer to the same form.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

impl FormModel {
    /// Register a field for `property`. Registering twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if the domain object has no such
    /// property.
    pub fn add(&self, property: &str) -> Result<(), FormError> {
        if self.has_field(property) {
            return Ok(());
        }
        let inner = &self.inner;
        let meta = inner.strategy.property_metadata(property)?;
        let raw = inner.strategy.property_value_model(property)?;
        let detector = inner
            .detectors
            .get(property)
            .cloned()
            .unwrap_or_else(|| inner.env.change_detector());

        let buffered = inner.buffered.then(|| {
            BufferedValueModel::with_detector(
                Rc::clone(&raw),
                Some(inner.trigger.clone()),
                Rc::clone(&detector),
            )
        });
        let source: Rc<dyn ValueModel> = match &buffered {
            Some(model) => Rc::new(model.clone()),
            None => raw,
        };
        let mediating = MediatingValueModel::with_detector(source, true, detector);

        let weak = self.weak();
        let revalidate: Rc<dyn Fn(&str)> = Rc::new(move |property: &str| {
            if let Some(form) = Self::upgrade(&weak) {
                form.validate_property(property);
            }
        });
        let model = Rc::new(ValidatingValueModel::new(
            Rc::new(mediating.clone()),
            property,
            inner.results.clone(),
            Some(revalidate),
        ));
        let metadata = FieldMetadata::new(
            property,
            meta.kind,
            !meta.writable,
            mediating.clone(),
            self.is_read_only(),
            self.is_enabled(),
        );

        let weak = self.weak();
        let source = DirtySource::Field(property.to_owned());
        let dirty_sub = mediating.subscribe_dirty(move |dirty| {
            if let Some(form) = Self::upgrade(&weak) {
                form.set_dirty_source(source.clone(), *dirty);
            }
        });

        inner.fields.borrow_mut().push(Rc::new(Field {
            property: property.to_owned(),
            buffered,
            mediating,
            model,
            metadata,
            _dirty_sub: dirty_sub,
        }));
        trace!(form = %inner.name, property, "field registered");
        self.validate_property(property);
        Ok(())
    }

    #[must_use]
    pub fn has_field(&self, property: &str) -> bool {
        self.inner
            .fields
            .borrow()
            .iter()
            .any(|f| f.property == property)
    }

    /// Registered properties in registration order.
    #[must_use]
    pub fn properties(&self) -> Vec<String> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|f| f.property.clone())
            .collect()
    }

    fn field(&self, property: &str) -> Result<Rc<Field>, FormError> {
        self.inner
            .fields
            .borrow()
            .iter()
            .find(|f| f.property == property)
            .cloned()
            .ok_or_else(|| FormError::UnknownProperty(property.to_owned()))
    }

    fn fields(&self) -> Vec<Rc<Field>> {
        self.inner.fields.borrow().clone()
    }

    /// The UI-facing value model of a registered field.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if `property` was never registered.
    pub fn value_model(&self, property: &str) -> Result<Rc<dyn ValueModel>, FormError> {
        let field = self.field(property)?;
        Ok(field.model.clone())
    }

    /// A view of the field converted to `kind`, using the environment's
    /// conversion service. Values that cannot be converted back become
    /// binding errors. Views are cached per property and kind.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if `property` was never registered.
    pub fn value_model_as(
        &self,
        property: &str,
        kind: ValueKind,
    ) -> Result<Rc<dyn ValueModel>, FormError> {
        let field = self.field(property)?;
        let source = field.metadata.kind();
        if kind == source || kind == ValueKind::Any {
            return Ok(field.model.clone());
        }
        let key = (property.to_owned(), kind);
        if let Some(model) = self.inner.converted.borrow().get(&key) {
            return Ok(Rc::clone(model));
        }
        let converting = ConvertingValueModel::new(
            field.model.clone(),
            source,
            kind,
            self.inner.env.conversion_service(),
        );
        let model: Rc<dyn ValueModel> = Rc::new(ValidatingValueModel::new(
            Rc::new(converting),
            property,
            self.inner.results.clone(),
            None,
        ));
        self.inner
            .converted
            .borrow_mut()
            .insert(key, Rc::clone(&model));
        Ok(model)
    }

    /// Metadata of a registered field.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if `property` was never registered.
    pub fn field_metadata(&self, property: &str) -> Result<FieldMetadata, FormError> {
        Ok(self.field(property)?.metadata.clone())
    }

    /// Whether the field of `property` holds an uncommitted value.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if `property` was never registered.
    pub fn is_buffering(&self, property: &str) -> Result<bool, FormError> {
        let field = self.field(property)?;
        Ok(field
            .buffered
            .as_ref()
            .is_some_and(BufferedValueModel::is_buffering))
    }
}

// ---------------------------------------------------------------------------
// Form object, commit and revert
// ---------------------------------------------------------------------------

/// Suspends value and dirty delivery of a set of fields until resumed or
/// dropped.
struct SuspendGuard {
    fields: Vec<Rc<Field>>,
}

impl SuspendGuard {
    fn new(fields: Vec<Rc<Field>>) -> Self {
        for field in &fields {
            field.mediating.set_deliver_value_change_events(false);
        }
        Self { fields }
    }

    /// Re-sync every field without notifying anyone.
    fn resume(mut self) -> HeldDeliveries {
        HeldDeliveries::resume(&std::mem::take(&mut self.fields))
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        HeldDeliveries::resume(&self.fields).flush();
    }
}

/// Notifications of a group of resumed fields. Every field is re-synced
/// before the first notification goes out.
struct HeldDeliveries(Vec<PendingDelivery>);

impl HeldDeliveries {
    fn resume(fields: &[Rc<Field>]) -> Self {
        let pending = fields.iter().map(|f| f.mediating.resume_quietly());
        Self(pending.collect())
    }

    /// Dirty transitions first, so value listeners see the final
    /// form-level dirty state.
    fn flush(mut self) {
        for pending in &mut self.0 {
            pending.flush_dirty();
        }
        for pending in self.0 {
            pending.flush();
        }
    }
}

impl FormModel {
    /// The domain object currently edited.
    #[must_use]
    pub fn form_object(&self) -> Value {
        self.inner.holder.get()
    }

    /// Replace the domain object, discarding every buffered edit and dirty
    /// state.
    ///
    /// `None` (or `Null`) installs a fresh default object and disables the
    /// form; any other object enables it.
    pub fn set_form_object(&self, object: Option<Value>) {
        let (object, enabled) = match object {
            Some(value) if !value.is_null() => (value, true),
            _ => (self.inner.strategy.new_form_object(), false),
        };
        debug!(form = %self.inner.name, enabled, "setting form object");
        let holder = Rc::clone(&self.inner.holder);
        self.reload(
            move || {
                if let Err(err) = holder.set(object) {
                    warn!(%err, "domain object holder rejected the new object");
                }
            },
            Some(enabled),
        );
    }

    /// Install a fresh default object and disable the form.
    pub fn reset(&self) {
        self.set_form_object(None);
    }

    /// Swap the domain object as one step: no field notifies until every
    /// field is re-pointed, reverted, re-baselined and revalidated, and the
    /// form's enabled state is settled.
    fn reload(&self, swap: impl FnOnce(), enabled: Option<bool>) {
        let fields = self.fields();
        let suspended = SuspendGuard::new(fields.clone());
        self.inner.reloading.set(true);
        swap();
        self.inner.reloading.set(false);
        self.inner.trigger.revert();
        for field in &fields {
            field.mediating.clear_dirty();
        }
        let held = suspended.resume();

        self.inner.results.clear_binding_errors();
        self.validate();
        if let Some(enabled) = enabled {
            self.inner.local_enabled.set(enabled);
            self.update_inherited_flags();
        }
        held.flush();
    }

    /// Flush every buffered edit to the domain object.
    ///
    /// Order: pre-commit hooks, children (depth-first), the form's own
    /// buffered fields, dirty baselines, post-commit hooks.
    ///
    /// # Errors
    ///
    /// [`FormError::NotCommittable`] if the form is not committable,
    /// [`FormError::CommittabilityChanged`] if a pre-commit hook made it so,
    /// or a child's commit error.
    pub fn commit(&self) -> Result<(), FormError> {
        let name = &self.inner.name;
        if !self.is_committable() {
            return Err(FormError::NotCommittable { form: name.clone() });
        }
        let hooks = self.inner.hooks.borrow().clone();
        for hook in &hooks {
            hook.pre_commit(self);
        }
        if !self.is_committable() {
            warn!(form = %name, "pre-commit hook made the form non-committable");
            return Err(FormError::CommittabilityChanged { form: name.clone() });
        }
        debug!(form = %name, "committing");

        for child in self.children() {
            child.commit()?;
        }
        self.inner.trigger.commit();
        for field in self.fields() {
            match field
                .buffered
                .as_ref()
                .and_then(BufferedValueModel::commit_error)
            {
                Some(err) => field.model.record_binding_error(&err),
                None => field.mediating.clear_dirty(),
            }
        }

        for hook in &hooks {
            hook.post_commit(self);
        }
        Ok(())
    }

    /// Discard every edit: children first, then buffered values, then each
    /// field's dirty baseline is written back. Binding errors are dropped
    /// and the form is revalidated.
    pub fn revert(&self) {
        debug!(form = %self.inner.name, "reverting");
        for child in self.children() {
            child.revert();
        }
        self.inner.trigger.revert();
        for field in self.fields() {
            if let Err(err) = field.mediating.revert_to_original() {
                warn!(property = %field.property, %err, "original value rejected on revert");
            }
        }
        self.inner.results.clear_binding_errors();
        self.validate();
    }

    /// Register a hook around [`commit`](Self::commit).
    pub fn add_commit_hook(&self, hook: Rc<dyn CommitHook>) {
        self.inner.hooks.borrow_mut().push(hook);
    }

    pub fn remove_commit_hook(&self, hook: &Rc<dyn CommitHook>) {
        self.inner
            .hooks
            .borrow_mut()
            .retain(|h| !std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(hook)));
    }
}

// ---------------------------------------------------------------------------
// Aggregate flags
// ---------------------------------------------------------------------------

impl FormModel {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.local_enabled.set(enabled);
        self.update_inherited_flags();
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.get()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.local_read_only.set(read_only);
        self.update_inherited_flags();
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.inner.authorized.get()
    }

    /// An unauthorized form is read-only.
    pub fn set_authorized(&self, authorized: bool) {
        self.inner.authorized.set(authorized);
        self.update_inherited_flags();
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn is_committable(&self) -> bool {
        self.inner.committable.get()
    }

    pub fn subscribe_enabled(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.enabled.subscribe(callback)
    }

    pub fn subscribe_read_only(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.read_only.subscribe(callback)
    }

    pub fn subscribe_dirty(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.dirty.subscribe(callback)
    }

    pub fn subscribe_committable(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.committable.subscribe(callback)
    }

    fn update_inherited_flags(&self) {
        let (parent_enabled, parent_read_only) = self
            .parent()
            .map_or((true, false), |p| (p.is_enabled(), p.is_read_only()));
        let enabled = self.inner.local_enabled.get() && parent_enabled;
        let read_only =
            self.inner.local_read_only.get() || !self.inner.authorized.get() || parent_read_only;

        let enabled_changed = self.inner.enabled.set(enabled);
        let read_only_changed = self.inner.read_only.set(read_only);
        if !(enabled_changed || read_only_changed) {
            return;
        }
        trace!(form = %self.inner.name, enabled, read_only, "inherited flags changed");
        for field in self.fields() {
            field.metadata.form_state_changed(read_only, enabled);
        }
        for child in self.children() {
            child.update_inherited_flags();
        }
    }

    fn set_dirty_source(&self, source: DirtySource, dirty: bool) {
        let changed = {
            let mut set = self.inner.dirty_set.borrow_mut();
            if dirty {
                set.insert(source)
            } else {
                set.remove(&source)
            }
        };
        if changed {
            let dirty = !self.inner.dirty_set.borrow().is_empty();
            if self.inner.dirty.set(dirty) {
                trace!(form = %self.inner.name, dirty, "dirty changed");
            }
        }
    }

    fn update_committable(&self) {
        let children_committable = self.children().iter().all(Self::is_committable);
        let committable = children_committable && !self.inner.results.has_errors();
        if self.inner.committable.set(committable) {
            trace!(form = %self.inner.name, committable, "committable changed");
        }
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

impl FormModel {
    #[must_use]
    pub fn parent(&self) -> Option<FormModel> {
        Self::upgrade(&self.inner.parent.borrow())
    }

    /// Child forms in attach order.
    #[must_use]
    pub fn children(&self) -> Vec<FormModel> {
        self.inner
            .children
            .borrow()
            .iter()
            .map(|c| c.form.clone())
            .collect()
    }

    /// Attach `child`: it inherits this form's enabled/read-only state and
    /// contributes its dirty, committable and validation state.
    ///
    /// # Errors
    ///
    /// [`FormError::ChildHasParent`] if `child` is attached elsewhere,
    /// [`FormError::WouldCreateCycle`] if `child` is this form or one of
    /// its ancestors.
    pub fn add_child(&self, child: &FormModel) -> Result<(), FormError> {
        if let Some(parent) = child.parent() {
            if parent.ptr_eq(self) {
                return Ok(());
            }
            return Err(FormError::ChildHasParent {
                child: child.name().to_owned(),
                parent: parent.name().to_owned(),
            });
        }
        let mut ancestor = Some(self.clone());
        while let Some(form) = ancestor {
            if form.ptr_eq(child) {
                return Err(FormError::WouldCreateCycle {
                    form: child.name().to_owned(),
                });
            }
            ancestor = form.parent();
        }

        child.inner.parent.replace(self.weak());
        let id = child.id();
        let weak = self.weak();
        let dirty_sub = child.inner.dirty.subscribe(move |dirty| {
            if let Some(form) = Self::upgrade(&weak) {
                form.set_dirty_source(DirtySource::Child(id), *dirty);
            }
        });
        let weak = self.weak();
        let committable_sub = child.inner.committable.subscribe(move |_| {
            if let Some(form) = Self::upgrade(&weak) {
                form.update_committable();
            }
        });
        self.inner.children.borrow_mut().push(ChildLink {
            form: child.clone(),
            _subs: [dirty_sub, committable_sub],
        });
        debug!(parent = %self.inner.name, child = %child.inner.name, "child form attached");

        self.inner.results.add_child(&child.inner.results);
        child.update_inherited_flags();
        if child.is_dirty() {
            self.set_dirty_source(DirtySource::Child(id), true);
        }
        self.update_committable();
        Ok(())
    }

    /// Detach `child`, undoing everything [`add_child`](Self::add_child) wired.
    ///
    /// # Errors
    ///
    /// [`FormError::NotAChild`] if `child` is not attached to this form.
    pub fn remove_child(&self, child: &FormModel) -> Result<(), FormError> {
        let link = {
            let mut children = self.inner.children.borrow_mut();
            match children.iter().position(|c| c.form.ptr_eq(child)) {
                Some(index) => children.remove(index),
                None => {
                    return Err(FormError::NotAChild {
                        child: child.name().to_owned(),
                        parent: self.name().to_owned(),
                    });
                }
            }
        };
        drop(link);
        child.inner.parent.replace(Weak::new());
        debug!(parent = %self.inner.name, child = %child.inner.name, "child form detached");

        self.inner.results.remove_child(&child.inner.results);
        self.set_dirty_source(DirtySource::Child(child.id()), false);
        self.update_committable();
        child.update_inherited_flags();
        Ok(())
    }

    /// Build and attach a child form editing the record held by `property`.
    ///
    /// The child's domain-object holder is this form's field, so replacing
    /// the parent's object (or the property's record) reloads the child.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if `property` is not a registered
    /// field, or errors from attaching the child.
    pub fn create_child_for_property(
        &self,
        property: &str,
        schema: Rc<RecordSchema>,
    ) -> Result<FormModel, FormError> {
        let holder = self.value_model(property)?;
        let strategy = RecordAccessStrategy::for_holder(schema, holder);
        let child = FormModel::builder(Rc::new(strategy))
            .name(format!("{}.{property}", self.inner.name))
            .environment(self.inner.env.clone())
            .buffered(self.inner.buffered)
            .all_fields()
            .build()?;
        self.add_child(&child)?;
        Ok(child)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl FormModel {
    pub fn set_validator(&self, validator: Option<Rc<dyn Validator>>) {
        self.inner.validator.replace(validator);
        self.validate();
    }

    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.inner.validating.get()
    }

    /// Turning validation off clears this form's results without running
    /// the validator; turning it on validates immediately.
    pub fn set_validating(&self, validating: bool) {
        if !self.inner.validating.set(validating) {
            return;
        }
        debug!(form = %self.inner.name, validating, "validation toggled");
        if validating {
            self.validate();
        } else {
            self.inner.results.clear();
        }
    }

    pub fn subscribe_validating(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.validating.subscribe(callback)
    }

    /// Run the validator over the whole form. Child forms validate
    /// themselves.
    pub fn validate(&self) {
        if !self.is_validating() {
            return;
        }
        let validator = self.inner.validator.borrow().clone();
        let messages = match validator {
            Some(validator) => validator.validate(&self.form_view()),
            None => Vec::new(),
        };
        self.inner.results.set_validator_messages(messages);
    }

    fn validate_property(&self, property: &str) {
        if !self.is_validating() {
            return;
        }
        let validator = self.inner.validator.borrow().clone();
        let Some(validator) = validator else {
            return;
        };
        if validator.supports_property_scope() {
            let messages = validator.validate_property(&self.form_view(), property);
            self.inner
                .results
                .update_property_messages(property, messages);
        } else {
            self.validate();
        }
    }

    /// Snapshot of the form as validators see it.
    #[must_use]
    pub fn form_view(&self) -> FormView {
        FormView::new(
            self.form_object(),
            self.fields()
                .iter()
                .map(|f| (f.property.clone(), f.model.get())),
        )
    }

    /// This form's results, including its children's.
    #[must_use]
    pub fn validation_results(&self) -> ValidationResultsModel {
        self.inner.results.clone()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.results.has_errors()
    }

    pub fn subscribe_has_errors(&self, callback: impl Fn(&bool) + 'static) -> Subscription {
        self.inner.results.subscribe_has_errors(callback)
    }

    /// Add an ad-hoc message, kept until cleared or validation is turned off.
    pub fn raise_message(&self, message: ValidationMessage) {
        self.inner.results.add_message(message);
    }

    /// Remove an ad-hoc message. Returns whether it was present.
    pub fn clear_message(&self, message: &ValidationMessage) -> bool {
        self.inner.results.remove_message(message)
    }
}

impl fmt::Debug for FormModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormModel")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("fields", &self.properties())
            .field("enabled", &self.is_enabled())
            .field("read_only", &self.is_read_only())
            .field("dirty", &self.is_dirty())
            .field("committable", &self.is_committable())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Registers a form's fields and services up front.
///
/// ```ignore
/// let form = FormModel::builder(strategy)
///     .name("person")
///     .fields(["name", "age"])
///     .validator(RulesValidator::new().rule("name", Constraint::Required))
///     .build()?;
/// ```
pub struct FormModelBuilder {
    strategy: Rc<dyn PropertyAccessStrategy>,
    env: FormEnvironment,
    name: Option<String>,
    buffered: Option<bool>,
    fields: Vec<String>,
    all_fields: bool,
    detectors: HashMap<String, Rc<dyn ChangeDetector>>,
    validator: Option<Rc<dyn Validator>>,
}

impl FormModelBuilder {
    fn new(strategy: Rc<dyn PropertyAccessStrategy>) -> Self {
        Self {
            strategy,
            env: FormEnvironment::default(),
            name: None,
            buffered: None,
            fields: Vec::new(),
            all_fields: false,
            detectors: HashMap::new(),
            validator: None,
        }
    }

    /// Display name used in errors and logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn environment(mut self, env: FormEnvironment) -> Self {
        self.env = env;
        self
    }

    /// Override the environment's buffered default.
    #[must_use]
    pub fn buffered(mut self, buffered: bool) -> Self {
        self.buffered = Some(buffered);
        self
    }

    #[must_use]
    pub fn field(mut self, property: impl Into<String>) -> Self {
        self.fields.push(property.into());
        self
    }

    #[must_use]
    pub fn fields<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Register every property the strategy declares.
    #[must_use]
    pub fn all_fields(mut self) -> Self {
        self.all_fields = true;
        self
    }

    /// Change detector for one property instead of the environment's.
    #[must_use]
    pub fn change_detector_for(
        mut self,
        property: impl Into<String>,
        detector: Rc<dyn ChangeDetector>,
    ) -> Self {
        self.detectors.insert(property.into(), detector);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Create the form and register its fields.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] for a field the strategy does not
    /// know.
    pub fn build(self) -> Result<FormModel, FormError> {
        let mut properties = if self.all_fields {
            self.strategy.property_names()
        } else {
            Vec::new()
        };
        properties.extend(self.fields);

        let form = FormModel::create(
            self.strategy,
            self.env,
            self.name,
            self.buffered,
            self.detectors,
            self.validator,
        );
        for property in &properties {
            form.add(property)?;
        }
        form.validate();
        debug!(form = %form.inner.name, fields = properties.len(), "form built");
        Ok(form)
    }
}

impl fmt::Debug for FormModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormModelBuilder")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("all_fields", &self.all_fields)
            .finish_non_exhaustive()
    }
}
