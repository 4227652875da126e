//! Integration test crate for murmur.
//!
//! This crate exists solely to run integration tests that span the core and
//! node crates. It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
