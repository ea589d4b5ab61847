// src/resolve/mod.rs

//! Task resolution.
//!
//! - [`spec`] parses unit specification strings into typed [`UnitSpec`]s.
//! - [`resolver`] expands them (querying the backend for `*`) into the
//!   ordered task list for a session.

pub mod resolver;
pub mod spec;

pub use resolver::{Resolution, TaskResolver};
pub use spec::{TableSelection, UnitSpec};
