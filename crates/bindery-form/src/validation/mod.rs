#![forbid(unsafe_code)]

//! Validation layer of a form model.
//!
//! - [`ValidationMessage`] / [`Severity`]: a single finding.
//! - [`Validator`]: domain rules evaluated against a [`FormView`].
//! - [`RulesValidator`]: per-property constraints with scoped runs.
//! - [`ValidationResultsModel`]: observable aggregate of validator output,
//!   binding errors, ad-hoc messages and child forms' results.
//! - [`ValidatingValueModel`]: the field wrapper that turns conversion
//!   failures into binding errors and schedules revalidation.

mod message;
mod results;
mod rules;
mod validating;
mod validator;

pub use message::{Severity, ValidationMessage};
pub use results::{BindingKey, ValidationResultsModel};
pub use rules::{Constraint, RulesValidator};
pub use validating::ValidatingValueModel;
pub use validator::{FormView, Validator};
