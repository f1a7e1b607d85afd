pub mod api;
pub mod models;
pub mod outcome;

pub use outcome::Outcome;
