//! `webbrief` crate (library surface).
//!
//! The primary entrypoint for end users is the `webbrief` binary (CLI + HTTP API).
//! This library exposes the HTTP router so it can be embedded and tested in-process.

pub mod api;

pub use webbrief_core as core;
pub use webbrief_local as local;
