pub mod types;
pub mod errors;
pub mod config;

pub use types::*;
pub use errors::*;
pub use config::*;
