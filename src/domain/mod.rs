pub mod models;
pub mod parser;
pub mod services;
pub mod store;
pub mod errors;

pub use models::*;
pub use services::*;
pub use store::*;
pub use errors::*;
