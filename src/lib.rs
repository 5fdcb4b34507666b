//! `mboxindex`: a streaming mbox indexer with lazily loaded message bodies.
//!
//! This crate scans mbox files once, keeping only header fields and byte
//! offsets in memory, and reads individual bodies back on demand.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod store;
