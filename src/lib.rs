//! gridcalc - a terminal spreadsheet.
//!
//! The [`domain`] layer holds the cell store and the arithmetic formula
//! language, [`infrastructure`] persists sheets and moves CSV data,
//! [`application`] drives editing, and [`presentation`] draws the terminal UI.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::*;
pub use domain::*;
