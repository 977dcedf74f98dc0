//! # partosync testkit
//!
//! Test utilities for partosync.
//!
//! This crate provides:
//! - Clinical payload fixtures and engine helpers
//! - Property-based test generators using proptest
//! - An in-process remote authority for push and pull scenarios
//!
//! The cross-crate scenario and property suites live in this crate's
//! `tests/` directory.
//!
//! ## Usage
//!
//! ```rust
//! use partosync_testkit::prelude::*;
//!
//! with_engine(|engine| {
//!     let temps = engine.repository::<Temperature>();
//!     let record = temps.create(temperature(371)).unwrap();
//!     assert_eq!(record.envelope.local_version, 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use remote::*;
