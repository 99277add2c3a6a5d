//! Domain models for the medication safety engine.

mod interaction;
mod medication;
mod patient;
mod prescription;
mod safety;

pub use interaction::*;
pub use medication::*;
pub use patient::*;
pub use prescription::*;
pub use safety::*;
