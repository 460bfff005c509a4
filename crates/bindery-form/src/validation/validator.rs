#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use bindery_value::Value;

use super::message::ValidationMessage;

/// Read-only snapshot of a form handed to validators: the domain object
/// and the current (possibly buffered) value of every field.
#[derive(Clone, Default)]
pub struct FormView {
    object: Value,
    values: BTreeMap<String, Value>,
}

impl FormView {
    pub fn new(object: Value, values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            object,
            values: values.into_iter().collect(),
        }
    }

    /// Current value of `property`, `Null` if the form has no such field.
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        self.values.get(property).cloned().unwrap_or_default()
    }

    /// Whether the form has a field for `property`.
    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    /// The domain object. Committed state only; use [`get`](Self::get)
    /// for what the user sees.
    #[must_use]
    pub fn form_object(&self) -> &Value {
        &self.object
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for FormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

/// Domain rules evaluated against a form.
///
/// Implement [`validate_property`](Self::validate_property) and return
/// `true` from [`supports_property_scope`](Self::supports_property_scope)
/// to let a field write re-run only that field's rules.
pub trait Validator {
    /// Validate the whole form.
    fn validate(&self, form: &FormView) -> Vec<ValidationMessage>;

    /// Validate a single property. Only called when
    /// [`supports_property_scope`](Self::supports_property_scope) is true.
    fn validate_property(&self, form: &FormView, property: &str) -> Vec<ValidationMessage> {
        self.validate(form)
            .into_iter()
            .filter(|m| m.is_for(property))
            .collect()
    }

    fn supports_property_scope(&self) -> bool {
        false
    }
}

impl<F> Validator for F
where
    F: Fn(&FormView) -> Vec<ValidationMessage>,
{
    fn validate(&self, form: &FormView) -> Vec<ValidationMessage> {
        self(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_validator() {
        let v = |form: &FormView| {
            if form.get("name").is_blank() {
                vec![ValidationMessage::error("name", "required")]
            } else {
                Vec::new()
            }
        };
        let empty = FormView::new(Value::Null, [("name".to_owned(), Value::from(""))]);
        let full = FormView::new(Value::Null, [("name".to_owned(), Value::from("Ada"))]);
        assert_eq!(v.validate(&empty).len(), 1);
        assert!(v.validate(&full).is_empty());
        assert!(!v.supports_property_scope());
        assert!(v.validate_property(&empty, "age").is_empty());
    }

    #[test]
    fn view_defaults_to_null() {
        let view = FormView::default();
        assert!(view.get("missing").is_null());
        assert!(!view.contains("missing"));
        assert_eq!(view.properties().count(), 0);
    }
}
