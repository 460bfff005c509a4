#![forbid(unsafe_code)]

//! Errors raised by form operations.
//!
//! Conversion failures while writing a field never surface here; they are
//! captured as binding-error validation messages. These variants report
//! caller bugs: contract violations of commit and tree wiring, and lookups
//! of fields that were never registered.

use std::fmt;

/// Errors from form model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// `commit()` on a form that is not committable.
    NotCommittable { form: String },
    /// A pre-commit hook made the form non-committable.
    CommittabilityChanged { form: String },
    /// The child is already attached to another parent.
    ChildHasParent { child: String, parent: String },
    /// Attaching the form would make it its own ancestor.
    WouldCreateCycle { form: String },
    /// The form to remove is not a child of this form.
    NotAChild { child: String, parent: String },
    /// The property is not registered on the form or unknown to the
    /// property-access strategy.
    UnknownProperty(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCommittable { form } => write!(f, "form '{form}' is not committable"),
            Self::CommittabilityChanged { form } => {
                write!(f, "form '{form}' became non-committable during pre-commit")
            }
            Self::ChildHasParent { child, parent } => {
                write!(f, "form '{child}' already has parent '{parent}'")
            }
            Self::WouldCreateCycle { form } => {
                write!(f, "form '{form}' cannot become its own descendant")
            }
            Self::NotAChild { child, parent } => {
                write!(f, "form '{child}' is not a child of '{parent}'")
            }
            Self::UnknownProperty(name) => write!(f, "unknown property '{name}'"),
        }
    }
}

impl std::error::Error for FormError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_form() {
        let err = FormError::NotCommittable {
            form: "person".into(),
        };
        assert_eq!(err.to_string(), "form 'person' is not committable");
    }

    #[test]
    fn tree_errors_name_both_forms() {
        let err = FormError::ChildHasParent {
            child: "address".into(),
            parent: "person".into(),
        };
        assert_eq!(
            err.to_string(),
            "form 'address' already has parent 'person'"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(FormError::UnknownProperty("age".into()));
        assert_eq!(boxed.to_string(), "unknown property 'age'");
    }
}
