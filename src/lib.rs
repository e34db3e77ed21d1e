//! Molt - Python build pipeline
//!
//! Turns an application source tree into a launchable build: resolves
//! the Python version, provisions the runtime and dependencies, and
//! carries a validated cache between builds.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod context;
pub mod error;
pub mod hooks;
pub mod install;
pub mod metadata;
mod net;
pub mod package_manager;
pub mod pipeline;
pub mod profile;
pub mod version;

pub use error::{MoltError, MoltResult};
