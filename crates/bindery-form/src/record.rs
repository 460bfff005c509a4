#![forbid(unsafe_code)]

//! A schema-checked record object model and its property-access strategy.
//!
//! [`Record`] is a shared, mutable property bag conforming to a
//! [`RecordSchema`]. [`RecordAccessStrategy`] exposes a record held in a
//! domain-object holder to a form model.
//!
//! # Invariants
//!
//! 1. A record only ever holds values its schema accepts: writes are coerced
//!    (`Int` widens into `Float` properties, `Null` is always accepted) or
//!    rejected with a [`ConversionError`].
//! 2. Property value models track both replacement of the record in the
//!    holder and in-place mutation of the current record.
//! 3. Writes through a property value model notify the model's subscribers
//!    exactly once, honoring `set_silently`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use bindery_value::{
    ChangeDetector, ConversionError, DefaultChangeDetector, ListenerId, ObjectRef, Subject,
    Subscription, Value, ValueChange, ValueHolder, ValueKind, ValueModel, ValueModelExt,
    default_change_detector,
};

use crate::access::{PropertyAccessStrategy, PropertyMetadata};
use crate::error::FormError;

/// Declaration of one record property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub name: String,
    pub kind: ValueKind,
    pub writable: bool,
    pub default: Value,
}

impl PropertySchema {
    /// A writable property defaulting to `Null`.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            writable: true,
            default: Value::Null,
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }
}

/// Named, ordered set of property declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    type_name: String,
    properties: Vec<PropertySchema>,
}

impl RecordSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    /// Add (or replace) a property declaration.
    #[must_use]
    pub fn with_property(mut self, property: PropertySchema) -> Self {
        self.properties.retain(|p| p.name != property.name);
        self.properties.push(property);
        self
    }

    /// Shorthand for a writable property without default.
    #[must_use]
    pub fn property(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.with_property(PropertySchema::new(name, kind))
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter()
    }

    /// Coerce `value` into what `property` stores.
    ///
    /// # Errors
    ///
    /// [`ConversionError`] for unknown properties and kind mismatches.
    pub fn coerce(&self, property: &str, value: Value) -> Result<Value, ConversionError> {
        let Some(decl) = self.get(property) else {
            return Err(ConversionError::new(
                &value,
                ValueKind::Any,
                format!("{} has no property '{property}'", self.type_name),
            ));
        };
        match (&value, decl.kind) {
            (Value::Null, _) | (_, ValueKind::Any) => Ok(value),
            (Value::Int(i), ValueKind::Float) => Ok(Value::Float(*i as f64)),
            (v, kind) if v.kind() == Some(kind) => Ok(value),
            (_, kind) => Err(ConversionError::new(
                &value,
                kind,
                format!("{}.{property} expects {kind}", self.type_name),
            )),
        }
    }
}

/// A change to one property of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub property: String,
    pub old: Value,
    pub new: Value,
}

struct RecordData {
    schema: Rc<RecordSchema>,
    values: RefCell<BTreeMap<String, Value>>,
    changes: Subject<PropertyChange>,
}

/// Shared mutable record. Clones refer to the same record.
#[derive(Clone)]
pub struct Record {
    data: Rc<RecordData>,
}

impl Record {
    /// A record holding every property's default.
    #[must_use]
    pub fn new(schema: Rc<RecordSchema>) -> Self {
        let values = schema
            .properties()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        Self {
            data: Rc::new(RecordData {
                schema,
                values: RefCell::new(values),
                changes: Subject::new(),
            }),
        }
    }

    /// Builder-style write for constructing test and seed data.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn with(self, property: &str, value: impl Into<Value>) -> Result<Self, ConversionError> {
        self.set(property, value.into())?;
        Ok(self)
    }

    #[must_use]
    pub fn schema(&self) -> &Rc<RecordSchema> {
        &self.data.schema
    }

    /// Current value of `property`, `Null` if unknown.
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        self.data
            .values
            .borrow()
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    /// Store `value` after coercion and notify on change.
    ///
    /// # Errors
    ///
    /// [`ConversionError`] when the schema rejects the value.
    pub fn set(&self, property: &str, value: Value) -> Result<(), ConversionError> {
        let value = self.data.schema.coerce(property, value)?;
        let old = self
            .data
            .values
            .borrow_mut()
            .insert(property.to_owned(), value.clone())
            .unwrap_or_default();
        if DefaultChangeDetector.has_changed(&old, &value) {
            self.data.changes.emit(&PropertyChange {
                property: property.to_owned(),
                old,
                new: value,
            });
        }
        Ok(())
    }

    /// Subscribe to property changes of this record.
    pub fn subscribe(&self, callback: impl Fn(&PropertyChange) + 'static) -> Subscription {
        self.data.changes.subscribe(callback)
    }

    /// Wrap as a domain-object [`Value`].
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(ObjectRef::new(
            self.data.schema.type_name(),
            Rc::clone(&self.data),
        ))
    }

    /// Recover a record from a domain-object value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_object()
            .and_then(ObjectRef::downcast::<RecordData>)
            .map(|data| Self { data })
    }

    /// Whether both handles refer to the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.data.schema.type_name())
            .field("values", &*self.data.values.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Property value model
// ---------------------------------------------------------------------------

struct PropertyModelInner {
    holder: Rc<dyn ValueModel>,
    property: String,
    detector: Rc<dyn ChangeDetector>,
    last: RefCell<Value>,
    writing: Cell<bool>,
    changes: Subject<ValueChange>,
    record_sub: RefCell<Option<Subscription>>,
    _holder_sub: RefCell<Option<Subscription>>,
}

impl PropertyModelInner {
    fn record(&self) -> Option<Record> {
        Record::from_value(&self.holder.get())
    }

    fn read(&self) -> Value {
        self.record()
            .map(|r| r.get(&self.property))
            .unwrap_or_default()
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

    fn rebind(self: &Rc<Self>) {
        let sub = self.record().map(|record| {
            let weak: Weak<PropertyModelInner> = Rc::downgrade(self);
            record.subscribe(move |change| {
                if let Some(inner) = weak.upgrade() {
                    if !inner.writing.get() && change.property == inner.property {
                        inner.refresh(None);
                    }
                }
            })
        });
        self.record_sub.replace(sub);
    }

    fn write(&self, value: Value, skip: Option<ListenerId>) -> Result<(), ConversionError> {
        let Some(record) = self.record() else {
            return Err(ConversionError::new(
                &value,
                ValueKind::Object,
                "no domain object to write to",
            ));
        };
        self.writing.set(true);
        let result = record.set(&self.property, value);
        self.writing.set(false);
        result?;
        self.refresh(skip);
        Ok(())
    }
}

/// Value model of one property of the record currently in a holder.
#[derive(Clone)]
pub struct RecordPropertyValueModel {
    inner: Rc<PropertyModelInner>,
}

impl RecordPropertyValueModel {
    pub fn new(holder: Rc<dyn ValueModel>, property: impl Into<String>) -> Self {
        let inner = Rc::new(PropertyModelInner {
            holder: Rc::clone(&holder),
            property: property.into(),
            detector: default_change_detector(),
            last: RefCell::new(Value::Null),
            writing: Cell::new(false),
            changes: Subject::new(),
            record_sub: RefCell::new(None),
            _holder_sub: RefCell::new(None),
        });
        inner.last.replace(inner.read());
        inner.rebind();

        let weak = Rc::downgrade(&inner);
        let sub = holder.on_change(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.rebind();
                inner.refresh(None);
            }
        });
        inner._holder_sub.replace(Some(sub));
        Self { inner }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.inner.property
    }
}

impl ValueModel for RecordPropertyValueModel {
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

impl fmt::Debug for RecordPropertyValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordPropertyValueModel")
            .field("property", &self.inner.property)
            .field("value", &self.inner.read())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Property access over a [`Record`] held in a domain-object holder.
pub struct RecordAccessStrategy {
    schema: Rc<RecordSchema>,
    holder: Rc<dyn ValueModel>,
    models: RefCell<HashMap<String, Rc<dyn ValueModel>>>,
}

impl RecordAccessStrategy {
    /// Strategy over `record`, held in a fresh holder.
    #[must_use]
    pub fn new(record: &Record) -> Self {
        let holder: Rc<dyn ValueModel> = Rc::new(ValueHolder::new(record.to_value()));
        Self::for_holder(Rc::clone(record.schema()), holder)
    }

    /// Strategy over whatever record `holder` contains. Used for nested
    /// forms, where the holder is the parent form's field value model.
    #[must_use]
    pub fn for_holder(schema: Rc<RecordSchema>, holder: Rc<dyn ValueModel>) -> Self {
        Self {
            schema,
            holder,
            models: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Rc<RecordSchema> {
        &self.schema
    }
}

impl PropertyAccessStrategy for RecordAccessStrategy {
    fn domain_object_holder(&self) -> Rc<dyn ValueModel> {
        Rc::clone(&self.holder)
    }

    fn property_value_model(&self, property: &str) -> Result<Rc<dyn ValueModel>, FormError> {
        if self.schema.get(property).is_none() {
            return Err(FormError::UnknownProperty(property.to_owned()));
        }
        let mut models = self.models.borrow_mut();
        let model = models.entry(property.to_owned()).or_insert_with(|| {
            Rc::new(RecordPropertyValueModel::new(
                Rc::clone(&self.holder),
                property,
            ))
        });
        Ok(Rc::clone(model))
    }

    fn property_metadata(&self, property: &str) -> Result<PropertyMetadata, FormError> {
        self.schema
            .get(property)
            .map(|p| PropertyMetadata {
                kind: p.kind,
                writable: p.writable,
            })
            .ok_or_else(|| FormError::UnknownProperty(property.to_owned()))
    }

    fn property_names(&self) -> Vec<String> {
        self.schema.properties().map(|p| p.name.clone()).collect()
    }

    fn new_form_object(&self) -> Value {
        Record::new(Rc::clone(&self.schema)).to_value()
    }
}

impl fmt::Debug for RecordAccessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordAccessStrategy")
            .field("type_name", &self.schema.type_name())
            .finish_non_exhaustive()
    }
}
