// src/error/mod.rs
//
// Crate-wide error type

mod types;

pub use types::{AppError, AppResult};
