#[cfg(feature = "cli")]
pub mod cli;
pub mod clean;
pub mod errors;
pub mod models;
pub mod providers;
pub mod timestamp;

pub use clean::{CleanReport, Cleaned, clean};
pub use errors::Error;
