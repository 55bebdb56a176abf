//! # Berth Testkit
//!
//! Test utilities for the Berth state engine.
//!
//! This crate provides:
//! - Test fixtures, predictable id generation and common scenarios
//! - Property-based generators for records and operation sequences
//! - Whole-state consistency checks
//! - Crash simulation for the record log
//! - Stress runs with concurrent writers and readers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use berth_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_state() {
//!     with_temp_state(|state| {
//!         let (project, targets) = scenarios::project_with_targets(state, "demo", 3);
//!         assert_consistent(state);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod consistency;
pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::consistency::*;
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use consistency::*;
pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
