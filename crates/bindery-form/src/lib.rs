#![forbid(unsafe_code)]

//! Hierarchical form models for Bindery.
//!
//! A [`FormModel`] edits one domain object through a
//! [`PropertyAccessStrategy`], buffering edits until commit, tracking dirty
//! state per field and per child form, and folding validation results into
//! whether the form may be committed.
//!
//! # Example
//!
//! ```ignore
//! use bindery_form::{FormModel, Record, RecordSchema};
//! use bindery_value::{Value, ValueKind};
//!
//! let schema = Rc::new(RecordSchema::new("Person").property("name", ValueKind::Text));
//! let person = Record::new(schema).with("name", "Alice")?;
//! let form = FormModel::for_record(&person)?;
//!
//! form.value_model("name")?.set("Bob".into())?;
//! assert!(form.is_dirty());
//! form.commit()?;
//! assert_eq!(person.get("name"), Value::from("Bob"));
//! ```

pub mod access;
pub mod env;
pub mod error;
pub mod form;
pub mod metadata;
pub mod record;
pub mod validation;

pub use access::{PropertyAccessStrategy, PropertyMetadata};
pub use env::FormEnvironment;
pub use error::FormError;
pub use form::{CommitHook, FormId, FormModel, FormModelBuilder};
pub use metadata::{FieldMetadata, UserMetadataChange};
pub use record::{
    PropertyChange, PropertySchema, Record, RecordAccessStrategy, RecordPropertyValueModel,
    RecordSchema,
};
pub use validation::{
    BindingKey, Constraint, FormView, RulesValidator, Severity, ValidatingValueModel,
    ValidationMessage, ValidationResultsModel, Validator,
};
