//! Shared identifiers and path helpers used across the workspace.

pub mod path;
pub mod types;

pub use types::SessionId;
