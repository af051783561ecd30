//! Infrastructure layer: persistence, CSV and settings.
//!
//! Nothing here evaluates formulas; these modules move [`CellStore`](crate::domain::CellStore)
//! data to and from disk.

pub mod config;
pub mod csv_io;
pub mod errors;
pub mod persistence;

pub use config::*;
pub use csv_io::*;
pub use errors::*;
pub use persistence::*;
