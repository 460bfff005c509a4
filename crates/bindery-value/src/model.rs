#![forbid(unsafe_code)]

//! The value model contract shared by every layer.

use crate::convert::ConversionError;
use crate::observable::{ListenerId, Subscription};
use crate::value::Value;

/// A value transition delivered to value model subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

/// An observable, writable holder of one [`Value`].
///
/// Notifications are synchronous: every subscriber has run by the time
/// `set` returns. Only writes that the model's change detector considers a
/// change notify.
pub trait ValueModel {
    /// Current value.
    fn get(&self) -> Value;

    /// Store `value` and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the value cannot be stored in the
    /// underlying representation. Plain holders never fail.
    fn set(&self, value: Value) -> Result<(), ConversionError>;

    /// Like [`set`](Self::set) but the listener `skip` is not notified.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    fn set_silently(&self, value: Value, skip: ListenerId) -> Result<(), ConversionError>;

    /// Subscribe to value changes.
    fn subscribe(&self, callback: Box<dyn Fn(&ValueChange)>) -> Subscription;
}

/// Closure-friendly helpers for any [`ValueModel`], including trait objects.
pub trait ValueModelExt: ValueModel {
    /// Subscribe with an unboxed closure.
    fn on_change(&self, callback: impl Fn(&ValueChange) + 'static) -> Subscription {
        self.subscribe(Box::new(callback))
    }
}

impl<M: ValueModel + ?Sized> ValueModelExt for M {}
