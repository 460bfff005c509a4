#![forbid(unsafe_code)]

//! Explicit configuration handed to each form model.

use std::fmt;
use std::rc::Rc;

use bindery_value::{
    ChangeDetector, ConversionService, DefaultConversionService, default_change_detector,
};

/// Services and defaults a form model is constructed with.
///
/// Child forms created through a parent inherit the parent's environment.
#[derive(Clone)]
pub struct FormEnvironment {
    conversion: Rc<dyn ConversionService>,
    change_detector: Rc<dyn ChangeDetector>,
    buffered: bool,
}

impl Default for FormEnvironment {
    fn default() -> Self {
        Self {
            conversion: Rc::new(DefaultConversionService),
            change_detector: default_change_detector(),
            buffered: true,
        }
    }
}

impl FormEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversion service used by type-converting value models.
    #[must_use]
    pub fn with_conversion_service(mut self, service: Rc<dyn ConversionService>) -> Self {
        self.conversion = service;
        self
    }

    /// Change detector used for fields without their own.
    #[must_use]
    pub fn with_change_detector(mut self, detector: Rc<dyn ChangeDetector>) -> Self {
        self.change_detector = detector;
        self
    }

    /// Whether new forms buffer edits until commit (default `true`).
    #[must_use]
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    #[must_use]
    pub fn conversion_service(&self) -> Rc<dyn ConversionService> {
        Rc::clone(&self.conversion)
    }

    #[must_use]
    pub fn change_detector(&self) -> Rc<dyn ChangeDetector> {
        Rc::clone(&self.change_detector)
    }

    #[must_use]
    pub fn buffered(&self) -> bool {
        self.buffered
    }
}

impl fmt::Debug for FormEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEnvironment")
            .field("buffered", &self.buffered)
            .finish_non_exhaustive()
    }
}
