#![forbid(unsafe_code)]

//! Ergonomic bindings between value models and UI-side state.
//!
//! A [`Binding<T>`] reads a value model through a projection, on demand. A [`ValueBinding`] keeps a widget's
//! [`Observable<Value>`] and a field value model in sync in both directions.
//! A [`BindingScope`] owns the subscriptions of one logical owner.
//!
//! # Usage
//!
//! ```ignore
//! use bindery_value::{Observable, ValueBinding, bind_model_mapped};
//!
//! let widget_text = Observable::new(Value::Null);
//! let _link = ValueBinding::new(&field_model, &widget_text);
//!
//! widget_text.set("Bob".into());        // reaches the field model
//! let label = bind_model_mapped(&field_model, |v| format!("Name: {v}"));
//! assert_eq!(label.get(), "Name: Bob");
//! ```
//!
//! # Invariants
//!
//! 1. `Binding::get()` always returns the current (not stale) value.
//! 2. `ValueBinding` prevents infinite cycles via a re-entrancy guard.
//! 3. Dropping a `ValueBinding` cleanly unsubscribes both directions.
//! 4. Dropping a `BindingScope` releases every held subscription.
//!
//! # Failure Modes
//!
//! - The field model rejects a widget value: the widget keeps the rejected
//!   value, the model is unchanged and the rejection is logged. Validating
//!   models never reject, they record a binding error instead.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::model::{ValueModel, ValueModelExt};
use crate::observable::{Observable, Subscription};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Binding<T>: one-way read binding
// ---------------------------------------------------------------------------

/// Read view of a value model's current value, optionally projected.
///
/// Nothing is cached: every `get()` reads the model, so a binding handed to
/// a widget never goes stale. Clones share the source and projection.
pub struct Binding<T> {
    source: Rc<dyn ValueModel>,
    project: Rc<dyn Fn(&Value) -> T>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            project: Rc::clone(&self.project),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("value", &self.get())
            .finish()
    }
}

impl<T: 'static> Binding<T> {
    /// Read `source` through `project`.
    pub fn new(source: &Rc<dyn ValueModel>, project: impl Fn(&Value) -> T + 'static) -> Self {
        Self {
            source: Rc::clone(source),
            project: Rc::new(project),
        }
    }

    /// The projected value of the model right now.
    #[must_use]
    pub fn get(&self) -> T {
        (self.project)(&self.source.get())
    }

    #[must_use]
    pub fn source(&self) -> &Rc<dyn ValueModel> {
        &self.source
    }

    /// Stack another projection on top of this one.
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Binding<U> {
        let project = self.project;
        Binding {
            source: self.source,
            project: Rc::new(move |value: &Value| f(project(value))),
        }
    }

    /// Receive the projected new value on every change of the model.
    pub fn on_change(&self, callback: impl Fn(T) + 'static) -> Subscription {
        let project = Rc::clone(&self.project);
        self.source
            .on_change(move |change| callback(project(&change.new)))
    }
}

/// Binding to a value model's raw value.
pub fn bind_model(source: &Rc<dyn ValueModel>) -> Binding<Value> {
    Binding::new(source, Value::clone)
}

/// Binding to a value model's value transformed by `map`.
pub fn bind_model_mapped<T: 'static>(
    source: &Rc<dyn ValueModel>,
    map: impl Fn(&Value) -> T + 'static,
) -> Binding<T> {
    Binding::new(source, map)
}

// ---------------------------------------------------------------------------
// ValueBinding: widget ⇄ value model
// ---------------------------------------------------------------------------

/// Bidirectional link between a widget's state and a value model.
///
/// The widget is initialized from the model. Drop the `ValueBinding` to
/// disconnect both directions.
pub struct ValueBinding {
    _model_to_widget: Subscription,
    _widget_to_model: Subscription,
    _guard: Rc<Cell<bool>>,
}

impl ValueBinding {
    pub fn new(model: &Rc<dyn ValueModel>, widget: &Observable<Value>) -> Self {
        widget.set(model.get());

        let syncing = Rc::new(Cell::new(false));

        // model → widget
        let w = widget.clone();
        let guard_mw = Rc::clone(&syncing);
        let sub_mw = model.on_change(move |change| {
            if !guard_mw.get() {
                guard_mw.set(true);
                w.set(change.new.clone());
                guard_mw.set(false);
            }
        });

        // widget → model
        let m = Rc::clone(model);
        let guard_wm = Rc::clone(&syncing);
        let sub_wm = widget.subscribe(move |value| {
            if !guard_wm.get() {
                guard_wm.set(true);
                if let Err(err) = m.set(value.clone()) {
                    debug!(%err, "widget value rejected by model");
                }
                guard_wm.set(false);
            }
        });

        Self {
            _model_to_widget: sub_mw,
            _widget_to_model: sub_wm,
            _guard: syncing,
        }
    }
}

impl std::fmt::Debug for ValueBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueBinding").finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope: lifecycle management
// ---------------------------------------------------------------------------

/// Collects subscriptions for a logical scope (a form, a field, a widget).
///
/// When the scope is dropped, all held subscriptions are released.
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Keep `sub` alive until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Subscribe to a value model within this scope.
    pub fn subscribe(
        &mut self,
        source: &dyn ValueModel,
        callback: impl Fn(&Value) + 'static,
    ) -> &mut Self {
        let sub = source.on_change(move |change| callback(&change.new));
        self.subscriptions.push(sub);
        self
    }

    /// Number of held subscriptions.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release all subscriptions immediately (scope stays reusable).
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .finish()
    }
}
