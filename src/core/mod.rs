//! Core types shared by the update engine and the CLI.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
