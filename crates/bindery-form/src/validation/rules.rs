#![forbid(unsafe_code)]

//! Declarative per-property constraints.
//!
//! Constraints other than [`Constraint::Required`] treat a blank value as
//! valid, so optional fields only need the constraints on their content.

use std::fmt;
use std::rc::Rc;

use bindery_value::Value;

use super::message::{Severity, ValidationMessage};
use super::validator::{FormView, Validator};

/// A check on a single property value.
#[derive(Clone)]
pub enum Constraint {
    /// Not `Null` and not whitespace-only text.
    Required,
    /// Text of at least this many characters.
    MinLength(usize),
    /// Text of at most this many characters.
    MaxLength(usize),
    /// Number within `min..=max`.
    Range { min: f64, max: f64 },
    /// Arbitrary predicate with the message reported on failure.
    Custom {
        test: Rc<dyn Fn(&Value) -> bool>,
        message: String,
    },
}

impl Constraint {
    /// Arbitrary predicate constraint.
    pub fn custom(message: impl Into<String>, test: impl Fn(&Value) -> bool + 'static) -> Self {
        Self::Custom {
            test: Rc::new(test),
            message: message.into(),
        }
    }

    /// The failure text, or `None` if `value` satisfies the constraint.
    #[must_use]
    pub fn check(&self, value: &Value) -> Option<String> {
        if let Self::Required = self {
            return value.is_blank().then(|| "is required".to_owned());
        }
        if value.is_blank() {
            return None;
        }
        match self {
            Self::Required => None,
            Self::MinLength(min) => {
                let len = text_len(value);
                (len < *min).then(|| format!("must be at least {min} characters"))
            }
            Self::MaxLength(max) => {
                let len = text_len(value);
                (len > *max).then(|| format!("must be at most {max} characters"))
            }
            Self::Range { min, max } => match value.as_float() {
                Some(n) if n >= *min && n <= *max => None,
                Some(_) => Some(format!("must be between {min} and {max}")),
                None => Some("must be a number".to_owned()),
            },
            Self::Custom { test, message } => (!test(value)).then(|| message.clone()),
        }
    }
}

fn text_len(value: &Value) -> usize {
    match value.as_text() {
        Some(text) => text.chars().count(),
        None => value.to_string().chars().count(),
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            Self::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Custom { message, .. } => {
                f.debug_struct("Custom").field("message", message).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    property: String,
    constraint: Constraint,
    severity: Severity,
}

impl Rule {
    fn evaluate(&self, form: &FormView) -> Option<ValidationMessage> {
        self.constraint
            .check(&form.get(&self.property))
            .map(|text| {
                ValidationMessage::new(Some(&self.property), self.severity, text)
            })
    }
}

/// A [`Validator`] built from per-property [`Constraint`]s.
///
/// Supports property-scoped runs: a field write only re-checks that
/// field's rules.
#[derive(Debug, Clone, Default)]
pub struct RulesValidator {
    rules: Vec<Rule>,
}

impl RulesValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error-severity constraint on `property`.
    #[must_use]
    pub fn rule(self, property: impl Into<String>, constraint: Constraint) -> Self {
        self.rule_with_severity(property, constraint, Severity::Error)
    }

    #[must_use]
    pub fn rule_with_severity(
        mut self,
        property: impl Into<String>,
        constraint: Constraint,
        severity: Severity,
    ) -> Self {
        self.rules.push(Rule {
            property: property.into(),
            constraint,
            severity,
        });
        self
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Validator for RulesValidator {
    fn validate(&self, form: &FormView) -> Vec<ValidationMessage> {
        self.rules.iter().filter_map(|r| r.evaluate(form)).collect()
    }

    fn validate_property(&self, form: &FormView, property: &str) -> Vec<ValidationMessage> {
        self.rules
            .iter()
            .filter(|r| r.property == property)
            .filter_map(|r| r.evaluate(form))
            .collect()
    }

    fn supports_property_scope(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(pairs: &[(&str, Value)]) -> FormView {
        FormView::new(
            Value::Null,
            pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())),
        )
    }

    #[test]
    fn required_rejects_blank() {
        assert!(Constraint::Required.check(&Value::Null).is_some());
        assert!(Constraint::Required.check(&"  ".into()).is_some());
        assert!(Constraint::Required.check(&"x".into()).is_none());
        assert!(Constraint::Required.check(&Value::Int(0)).is_none());
    }

    #[test]
    fn length_and_range_ignore_blank() {
        assert!(Constraint::MinLength(3).check(&Value::Null).is_none());
        assert!(Constraint::MinLength(3).check(&"ab".into()).is_some());
        assert!(Constraint::MaxLength(3).check(&"abcd".into()).is_some());
        assert!(Constraint::MaxLength(3).check(&"äöü".into()).is_none());

        let range = Constraint::Range { min: 0.0, max: 150.0 };
        assert!(range.check(&Value::Int(42)).is_none());
        assert!(range.check(&Value::Float(-1.0)).is_some());
        assert_eq!(
            range.check(&"old".into()).as_deref(),
            Some("must be a number")
        );
    }

    #[test]
    fn custom_uses_its_message() {
        let even = Constraint::custom("must be even", |v| v.as_int().is_some_and(|n| n % 2 == 0));
        assert_eq!(even.check(&Value::Int(3)).as_deref(), Some("must be even"));
        assert!(even.check(&Value::Int(4)).is_none());
        assert!(format!("{even:?}").contains("must be even"));
    }

    #[test]
    fn scoped_validation_only_runs_property_rules() {
        let rules = RulesValidator::new()
            .rule("name", Constraint::Required)
            .rule_with_severity(
                "age",
                Constraint::Range {
                    min: 18.0,
                    max: 99.0,
                },
                Severity::Warning,
            );
        let form = view(&[("name", Value::Null), ("age", Value::Int(12))]);

        let all = rules.validate(&form);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].severity, Severity::Warning);

        let scoped = rules.validate_property(&form, "name");
        assert_eq!(
            scoped,
            vec![ValidationMessage::error("name", "is required")]
        );
        assert!(rules.supports_property_scope());
        assert_eq!(rules.len(), 2);
    }
}
