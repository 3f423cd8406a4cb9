//! Bus targets to run the core against.

pub mod ram;
