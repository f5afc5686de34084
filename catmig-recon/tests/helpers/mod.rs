//! Test Helper Utilities
//!
//! Shared utilities for testing catmig-recon

#![allow(dead_code, unused_imports)]

pub mod fakes;
pub mod records;

pub use fakes::{CapturingSink, ScriptedTransport, SharedBuffer};
pub use records::{authority_payload, authority_record, data, local_record, AUTHORITY_LEADER};
