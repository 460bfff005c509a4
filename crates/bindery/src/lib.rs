#![forbid(unsafe_code)]

//! Bindery: buffered, validated data binding between domain objects and
//! UI-facing value models.
//!
//! # Crate Structure
//!
//! - [`value`]: value models, change detection, commit triggers, buffering,
//!   mediation, type conversion and UI bindings (`bindery-value`).
//! - [`form`]: hierarchical form models, field metadata, the record object
//!   model and validation (`bindery-form`).
//!
//! Most applications only need the [`prelude`].

pub use bindery_form as form;
pub use bindery_value as value;

pub use bindery_form::{FormError, FormModel};
pub use bindery_value::{ConversionError, Value, ValueKind, ValueModel};

/// Prelude for the common case of building and binding a form.
pub mod prelude {
    pub use bindery_form::{
        CommitHook, Constraint, FieldMetadata, FormEnvironment, FormError, FormModel,
        FormModelBuilder, FormView, PropertyAccessStrategy, Record, RecordAccessStrategy,
        RecordSchema, RulesValidator, Severity, ValidationMessage, ValidationResultsModel,
        Validator,
    };
    pub use bindery_value::{
        BindingScope, ConversionError, Observable, Subscription, Value, ValueBinding, ValueKind,
        ValueModel, ValueModelExt,
    };
}
