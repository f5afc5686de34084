//! # catmig common library
//!
//! Shared code for the catalog migration tools:
//! - Tagged bibliographic record model
//! - Record file codecs (ISO 2709, pretty text, MARCXML)
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod marc;

pub use error::{Error, Result};
pub use marc::{Leader, Subfield, TaggedField, TaggedRecord};
