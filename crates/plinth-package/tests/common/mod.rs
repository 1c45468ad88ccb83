//! Common test utilities for plinth-package
//!
//! Shared infrastructure for building package archives and on-disk package
//! trees used across the integration tests.

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;

pub use builders::*;
