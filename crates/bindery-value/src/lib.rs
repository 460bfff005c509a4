#![forbid(unsafe_code)]

//! Value models for Bindery.
//!
//! This crate provides the value-propagation layers a form is built from,
//! leaves first:
//!
//! - [`ValueHolder`]: the atomic observable container of one [`Value`].
//! - [`ChangeDetector`]: decides whether two values count as a change.
//! - [`CommitTrigger`]: broadcasts commit/revert to buffered models.
//! - [`BufferedValueModel`]: shadows writes until commit or revert.
//! - [`MediatingValueModel`]: owns the dirty baseline and can suspend
//!   notifications during bulk updates.
//! - [`ConvertingValueModel`]: a type-converting view backed by a
//!   [`ConversionService`].
//!
//! # Architecture
//!
//! All models are single-threaded (`Rc<RefCell<..>>`) and notify
//! synchronously. Subscribers are stored as `Weak` callbacks owned by RAII
//! [`Subscription`] guards, and every dispatch iterates a snapshot of the
//! listener list so re-entrant subscribe/unsubscribe is safe.

pub mod binding;
pub mod buffered;
pub mod convert;
pub mod detect;
pub mod holder;
pub mod mediating;
pub mod model;
pub mod observable;
pub mod trigger;
pub mod value;

pub use binding::{Binding, BindingScope, ValueBinding, bind_model, bind_model_mapped};
pub use buffered::BufferedValueModel;
pub use convert::{
    ConversionError, ConversionService, ConvertingValueModel, DefaultConversionService,
};
pub use detect::{
    ChangeDetector, DefaultChangeDetector, EqualityChangeDetector, default_change_detector,
};
pub use holder::ValueHolder;
pub use mediating::{MediatingValueModel, PendingDelivery};
pub use model::{ValueChange, ValueModel, ValueModelExt};
pub use observable::{ListenerId, Observable, Subject, Subscription};
pub use trigger::{CommitTrigger, CommitTriggerListener, ListenerRef};
pub use value::{ObjectRef, Value, ValueKind};
