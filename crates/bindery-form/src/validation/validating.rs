#![forbid(unsafe_code)]

//! Field wrapper connecting writes to the validation results.
//!
//! # Failure Modes
//!
//! - The wrapped model rejects a write: the error is recorded as this
//!   model's binding error, logged, and the write reports success. Typing
//!   invalid input never fails the write path.

use std::fmt;
use std::rc::Rc;

use bindery_value::{ConversionError, ListenerId, Subscription, Value, ValueChange, ValueModel};
use tracing::warn;

use super::message::ValidationMessage;
use super::results::{BindingKey, ValidationResultsModel};

type Revalidate = Rc<dyn Fn(&str)>;

/// Wraps a field value model: successful writes clear this model's binding
/// error and trigger revalidation, failed writes record one.
pub struct ValidatingValueModel {
    wrapped: Rc<dyn ValueModel>,
    property: String,
    key: BindingKey,
    results: ValidationResultsModel,
    revalidate: Option<Revalidate>,
}

impl ValidatingValueModel {
    /// `revalidate` is called with the property name after every successful
    /// write; pass `None` when a wrapped model already triggers it.
    pub fn new(
        wrapped: Rc<dyn ValueModel>,
        property: impl Into<String>,
        results: ValidationResultsModel,
        revalidate: Option<Rc<dyn Fn(&str)>>,
    ) -> Self {
        Self {
            wrapped,
            property: property.into(),
            key: BindingKey::next(),
            results,
            revalidate,
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Key of this model's binding error in the results model.
    #[must_use]
    pub fn binding_key(&self) -> BindingKey {
        self.key
    }

    /// Current binding error, if the last write (or commit) failed.
    #[must_use]
    pub fn binding_error(&self) -> Option<ValidationMessage> {
        self.results.binding_error(self.key)
    }

    /// Record `err` as this field's binding error.
    pub fn record_binding_error(&self, err: &ConversionError) {
        warn!(property = %self.property, %err, "conversion failed; recorded as binding error");
        let message = ValidationMessage::error(&self.property, err.to_string());
        self.results.set_binding_error(self.key, message);
    }

    pub fn clear_binding_error(&self) {
        self.results.clear_binding_error(self.key);
    }

    #[must_use]
    pub fn wrapped(&self) -> Rc<dyn ValueModel> {
        Rc::clone(&self.wrapped)
    }

    fn write(&self, value: Value, skip: Option<ListenerId>) {
        let result = match skip {
            Some(id) => self.wrapped.set_silently(value, id),
            None => self.wrapped.set(value),
        };
        match result {
            Ok(()) => {
                self.clear_binding_error();
                if let Some(revalidate) = &self.revalidate {
                    revalidate(&self.property);
                }
            }
            Err(err) => self.record_binding_error(&err),
        }
    }
}

impl ValueModel for ValidatingValueModel {
    fn get(&self) -> Value {
        self.wrapped.get()
    }

    fn set(&self, value: Value) -> Result<(), ConversionError> {
        self.write(value, None);
        Ok(())
    }

    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError> {
        self.write(value, Some(skip));
        Ok(())
    }

    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription {
        self.wrapped.subscribe(callback)
    }
}

impl fmt::Debug for ValidatingValueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatingValueModel")
            .field("property", &self.property)
            .field("key", &self.key)
            .field("value", &self.wrapped.get())
            .finish_non_exhaustive()
    }
}
