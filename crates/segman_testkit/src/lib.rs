//! # Segman Testkit
//!
//! Test utilities for segman.
//!
//! This crate provides:
//! - Fake segment implementations with lifecycle counters
//! - Failure injection for start, stop and delete
//! - Local and distributed manager fixtures
//! - Property-based test generators using proptest
//! - Concurrent access helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segman_testkit::prelude::*;
//!
//! #[test]
//! fn loads_once() {
//!     let fixture = LocalFixture::in_memory();
//!     let collection = fixture.create_collection("docs");
//!     fixture.manager.get_segment(collection.id, Capability::VectorReader).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use segman_core::{
        Capability, CoreError, ManagerConfig, Operation, SegmentInstance, SegmentManager,
        SegmentScope, SegmentType,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
