pub mod atomic;
pub mod labels;
pub mod library;
pub mod models;
pub mod vectors;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
