// src/application/mod.rs
//
// Application Layer
//
// ARCHITECTURE:
// - Sits above the services and wires them together
// - Provides the boundary between the CLI and the services
// - Translates errors into presentation categories

pub mod error_handling;
pub mod state;

pub use error_handling::{ErrorResponse, ErrorType};
pub use state::{open_cache, AppState};
