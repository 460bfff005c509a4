#![forbid(unsafe_code)]

//! The property-access strategy: how a form reads and writes a domain
//! object without knowing its object model.

use std::rc::Rc;

use bindery_value::{Value, ValueKind, ValueModel};

use crate::error::FormError;

/// Static facts about one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyMetadata {
    /// Declared type.
    pub kind: ValueKind,
    /// Whether the domain object accepts writes to the property.
    pub writable: bool,
}

/// Supplies per-property value models over a swappable domain object.
///
/// Property value models must follow the domain-object holder: replacing
/// the object re-points every model at the new object and notifies.
pub trait PropertyAccessStrategy {
    /// Holder of the domain object itself.
    fn domain_object_holder(&self) -> Rc<dyn ValueModel>;

    /// Raw value model for `property` on the current domain object.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if the object model has no such
    /// property.
    fn property_value_model(&self, property: &str) -> Result<Rc<dyn ValueModel>, FormError>;

    /// Declared type and writability of `property`.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownProperty`] if the object model has no such
    /// property.
    fn property_metadata(&self, property: &str) -> Result<PropertyMetadata, FormError>;

    /// Every property the object model declares, in declaration order.
    fn property_names(&self) -> Vec<String>;

    /// A fresh default instance of the domain object's type.
    fn new_form_object(&self) -> Value;
}
