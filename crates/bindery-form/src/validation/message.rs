#![forbid(unsafe_code)]

use std::fmt;

/// How serious a [`ValidationMessage`] is. Ordered `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Info,
    Warning,
    /// Blocks commit.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One validation finding, optionally attached to a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationMessage {
    /// `None` for object-level messages.
    pub property: Option<String>,
    pub severity: Severity,
    pub text: String,
}

impl ValidationMessage {
    pub fn new(property: Option<&str>, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            property: property.map(str::to_owned),
            severity,
            text: text.into(),
        }
    }

    /// An error on `property`.
    pub fn error(property: &str, text: impl Into<String>) -> Self {
        Self::new(Some(property), Severity::Error, text)
    }

    /// A warning on `property`.
    pub fn warning(property: &str, text: impl Into<String>) -> Self {
        Self::new(Some(property), Severity::Warning, text)
    }

    /// An informational message on `property`.
    pub fn info(property: &str, text: impl Into<String>) -> Self {
        Self::new(Some(property), Severity::Info, text)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether the message concerns `property`.
    #[must_use]
    pub fn is_for(&self, property: &str) -> bool {
        self.property.as_deref() == Some(property)
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property {
            Some(property) => write!(f, "{} [{property}]: {}", self.severity, self.text),
            None => write!(f, "{}: {}", self.severity, self.text),
        }
    }
}
