//! `tankfarm-core` - form model, tank assignment and result presentation for
//! tank-farm scheduling.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Tank category assignment and idle validation.
pub mod assign;
/// Crude-mix rows and daily volumes.
pub mod crude_mix;
/// Core errors.
pub mod error;
/// Form fields, collect and apply.
pub mod form;
/// Inventory range check.
pub mod inventory;
/// Tolerant number and string decoding.
pub mod lenient;
/// Display blocks for backend responses.
pub mod present;
/// Custom tank data snapshot before re-render.
pub mod reconcile;
/// Tank record rendering.
pub mod render;
/// Backend response types.
pub mod response;
/// Tank ids, categories and records.
pub mod tank;
/// Duplicate-name check and the validation gate.
pub mod validate;

pub use assign::{assign, IdleValidation, TankAssignment, TankConfiguration};
pub use error::CoreError;
pub use form::{FieldValue, FormState, PersistedFormState};
pub use tank::{CrudeLine, TankCategory, TankId, TankRecord};
