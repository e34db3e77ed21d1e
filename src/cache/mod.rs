//! Persistent artifact cache
//!
//! One artifact snapshot per cache directory: the extracted runtime and
//! the installed dependency environment from the last successful build.
//! A build either reuses the snapshot (valid on all three compatibility
//! dimensions), reuses part of it, or replaces it entirely. Partial
//! mixing across incompatible dimensions is never attempted, so binary
//! skew between runtime and compiled extensions cannot occur.
//!
//! # Validity dimensions (checked in order, first mismatch wins)
//!
//! | Check | Invalidates |
//! |-------|-------------|
//! | Stack changed | everything |
//! | Runtime line (major.minor) changed | runtime + dependencies |
//! | Package manager changed | dependencies |

pub mod manager;

pub use manager::{CacheManager, PriorBuild, RestoreOutcome};
