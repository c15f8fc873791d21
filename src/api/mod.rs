//! Request encoding for the remote operations.

pub mod command;

pub use command::{MouseAction, Selector, StepCommand};
