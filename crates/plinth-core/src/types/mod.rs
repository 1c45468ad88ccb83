//! Type definitions for extension packages and registry records

mod manifest;
mod record;

pub use manifest::*;
pub use record::*;
