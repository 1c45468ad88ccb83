//! Common test utilities for plinth-registry
//!
//! Stub host seams (plugin loader, route registrar, query executor), a slim
//! package builder for upload archives, and a harness that stands up a full
//! registry over a temporary data root.

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;

pub use fixtures::*;
