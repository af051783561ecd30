//! Application layer: editor state and workflows.
//!
//! Sits between the domain store and the terminal front end.

pub mod state;

pub use state::*;
