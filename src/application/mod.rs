// src/application/mod.rs
//
// Application Layer
//
// ARCHITECTURE:
// - Sits above the services and owns their wiring (AppState)
// - Provides the boundary to callers outside the crate
// - Translates internal errors into stable responses

pub mod error_handling;
pub mod state;

pub use error_handling::{ErrorResponse, ErrorType};
pub use state::AppState;
